//! # Jobs Module
//!
//! Upload-to-download pipeline for caption jobs.
//!
//! ## Key Components:
//! - **model**: Job record, status, outcome and the API views
//! - **files**: Where job files live and how they are removed
//! - **registry**: Bounded, insertion-ordered job store with eviction
//! - **queue**: FIFO of job ids waiting for the worker
//! - **worker**: The single background consumer that runs jobs
//! - **manager**: Composition root that request handlers talk to
//!
//! ## Flow:
//! Upload → `JobManager::create_job` (status `waiting`) → worker picks it up
//! (`processing`) → `completed` or `error` → client downloads the captions.

pub mod files;
pub mod manager;
pub mod model;
pub mod queue;
pub mod registry;
pub mod worker;

pub use manager::{spawn_retention_sweep, JobManager};
pub use model::{JobId, JobStatus, NewJob};
