//! Host-side errors: I/O and protocol failures distinct from `emucore`'s
//! closed `Status` enum, which never leaves the library's API boundary.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EmuError {
    #[error("failed to read flash image {path:?}: {source}")]
    FlashLoad { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to bind GDB listener on {addr}: {source}")]
    GdbBind { addr: String, #[source] source: std::io::Error },

    #[error("malformed address {0:?}: expected a 0x-prefixed or decimal integer")]
    BadAddress(String),

    #[error("malformed RSP packet: {0}")]
    Protocol(String),
}
