use crate::p2p::Magic;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown network: {0}")]
pub struct UnknownNetworkError(String);

/// The Ferrum networks a node can join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Network {
    /// The merge-mined main network.
    Mainnet,
    /// The public test network.
    Testnet,
    /// Local regression testing.
    Regtest,
}

impl Network {
    pub fn magic(self) -> Magic {
        Magic::from(self)
    }

    pub fn default_port(self) -> u16 {
        match self {
            Network::Mainnet => 9333,
            Network::Testnet => 19333,
            Network::Regtest => 19444,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "ferrum",
            Network::Testnet => "ferrumtest",
            Network::Regtest => "ferrumreg",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = UnknownNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" | "main" | "ferrum" => Ok(Network::Mainnet),
            "testnet" | "test" | "ferrumtest" => Ok(Network::Testnet),
            "regtest" | "ferrumreg" => Ok(Network::Regtest),
            other => Err(UnknownNetworkError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_network_names() {
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("regtest".parse::<Network>().unwrap(), Network::Regtest);
        assert!("florinet".parse::<Network>().is_err());
    }

    #[test]
    fn default_ports_differ() {
        assert_ne!(
            Network::Mainnet.default_port(),
            Network::Testnet.default_port()
        );
        assert_ne!(
            Network::Testnet.default_port(),
            Network::Regtest.default_port()
        );
    }
}
