use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypeError {
    #[error("invalid hex string of length {0}")]
    InvalidHex(usize),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}
