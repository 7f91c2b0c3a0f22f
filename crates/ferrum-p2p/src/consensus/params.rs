use crate::blockdata::genesis::GenesisInfo;
use crate::network::Network;
use bitcoin::BlockHash;

/// Network parameters a relaying node consults.
///
/// Consensus rule checking lives in the chain store; what the session
/// engine needs is the network identity, the port to dial, whether block
/// headers on this network may carry merge-mined auxiliary proof-of-work,
/// and where the chain starts.
#[derive(Debug, Clone, Copy)]
pub struct Params {
    /// Network for which these parameters are defined.
    pub network: Network,
    /// Default P2P port.
    pub default_port: u16,
    /// Whether headers may carry an appended auxiliary proof-of-work.
    pub aux_pow: bool,
}

impl Params {
    /// Parameters for the Ferrum mainnet (merge-mined).
    pub const MAINNET: Self = Self {
        network: Network::Mainnet,
        default_port: 9333,
        aux_pow: true,
    };
    /// Parameters for the Ferrum testnet.
    pub const TESTNET: Self = Self {
        network: Network::Testnet,
        default_port: 19333,
        aux_pow: false,
    };
    /// Parameters for regression testing.
    pub const REGTEST: Self = Self {
        network: Network::Regtest,
        default_port: 19444,
        aux_pow: false,
    };

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::MAINNET,
            Network::Testnet => Self::TESTNET,
            Network::Regtest => Self::REGTEST,
        }
    }

    /// Hash of the network's genesis block.
    pub fn genesis_hash(&self) -> BlockHash {
        GenesisInfo::for_network(self.network).hash
    }
}
