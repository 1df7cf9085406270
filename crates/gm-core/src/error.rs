use crate::store::StoreError;
use crate::transport::TransportError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A bounded operation ran past its deadline and was abandoned.
    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("failed to sign reply: {0}")]
    Signing(String),

    #[error("failed to encode {0}")]
    Encoding(String),

    #[error("no reply defined for the {0} command")]
    NoReply(String),
}
