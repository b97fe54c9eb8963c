//! Resumable batch processing of country scans
//!
//! A validation cycle covers every known country exactly once. Cycle state
//! lives in the metadata store, so a cycle survives process restarts: each run
//! claims a batch of pending countries, scans them, and records terminal
//! outcomes. Runs stop cleanly before exhausting their wall-clock budget and
//! return unfinished claims to the pending queue.

mod coordinator;
mod runner;

pub use coordinator::BatchCoordinator;
pub use runner::{run_batch, BatchOptions, BatchOutcome, STOP_THRESHOLD};
