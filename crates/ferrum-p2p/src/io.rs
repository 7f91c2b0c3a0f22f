//! I/O shims over the `bitcoin` crate's reader/writer traits.

pub use bitcoin::io::{Error, ErrorKind, Read, Write};
