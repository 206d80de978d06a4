use raze_types::BlockHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("block {0} is not in the store")]
    UnknownBlock(BlockHash),

    #[error("account chain for block {0} is missing")]
    MissingAccount(BlockHash),

    #[error("truncated block payload: need {need} bytes, have {have}")]
    TruncatedBlock { need: usize, have: usize },

    #[error("unknown block type code {0}")]
    UnknownBlockType(u8),

    #[error("rollback depth limit exceeded at {0}")]
    RollbackTooDeep(BlockHash),
}
