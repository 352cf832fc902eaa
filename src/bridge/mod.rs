//! Bridge runner and its two pipeline stages
//!
//! - [`ingest`] reads frames, decodes them and fills the transfer queue
//! - [`publish_stage`] empties the queue into the publisher
//! - [`runner`] drives the lifecycle and the shutdown drain

pub mod ingest;
pub mod publish_stage;
pub mod runner;

pub use ingest::{run_ingest, wait_for_shutdown, IngestOutcome};
pub use publish_stage::{run_publish_stage, PublishStageReport};
pub use runner::{BridgeRunner, BridgeState, RunSummary, RunnerSettings, StopReason};
