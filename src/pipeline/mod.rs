//! Generic concurrent batch pipeline.
//!
//! Every processing stage (download, encrypt, upload, cleanup) is a per-item
//! action handed to [`PipelineExecutor::run`]. The executor fans the items
//! out to one task each and fans the outcomes back in through a single
//! aggregator task that owns the counters.

mod executor;
mod outcome;

pub use executor::{PipelineError, PipelineExecutor};
pub use outcome::{ItemOutcome, PipelineResult};
