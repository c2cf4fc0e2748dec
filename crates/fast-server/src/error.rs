//! Startup errors for the server binary.

use std::io;

use fast_proto::ProtocolError;
use thiserror::Error;

/// Failure starting or running the server process
#[derive(Error, Debug)]
pub enum ServerError {
    /// A `--realm` argument is not a valid address
    #[error("invalid realm {realm:?}: {source}")]
    InvalidRealm {
        /// Argument as given
        realm: String,
        /// Why it was rejected
        source: ProtocolError,
    },

    /// Binding or accepting failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
