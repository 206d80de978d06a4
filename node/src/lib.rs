//! The raze node — owns every subsystem and wires them together.
//!
//! Data flows: datagram → parser → message handling → (peer table, block
//! processor, vote pipeline). Accepted fresh blocks seed elections; votes
//! feed elections, the gap cache, and representative discovery; elections
//! hand confirmed winners back to the block processor, with rollback
//! permission when the tally displaced our block.

pub mod alarm;
pub mod block_processor;
pub mod bootstrap;
pub mod callback;
pub mod config;
pub mod error;
pub mod local_reps;
pub mod logging;
pub mod node;
pub mod vote_processor;

pub use alarm::Alarm;
pub use block_processor::{BlockProcessor, ProcessorContext};
pub use bootstrap::{BootstrapInitiator, NullBootstrap};
pub use config::NodeConfig;
pub use error::NodeError;
pub use local_reps::{LocalRep, LocalRepSet};
pub use node::Node;
pub use vote_processor::VoteProcessor;
