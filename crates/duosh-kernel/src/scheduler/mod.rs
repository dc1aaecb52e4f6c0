//! Scheduler module for duosh: ports, pipelines and background jobs.
//!
//! This module provides:
//! - **Ports**: a per-form descriptor table. Each output end carries a byte
//!   sub-stream and a value sub-stream side by side.
//! - **Pipeline execution**: forms run concurrently, one task each, joined
//!   by port pairs; outcomes are combined after every task finishes.
//! - **Background jobs**: pipelines started with `&` run with captured
//!   output and are tracked until waited on.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        run_pipeline                          │
//! │  ┌─────────┐  port pair  ┌─────────┐  port pair  ┌─────────┐ │
//! │  │ form 1  │────────────▶│ form 2  │────────────▶│ form 3  │ │
//! │  │ (spawn) │ bytes+values│ (spawn) │ bytes+values│ (spawn) │ │
//! │  └─────────┘             └─────────┘             └─────────┘ │
//! │             join all → compose_outcomes                      │
//! └──────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        JobManager                            │
//! │  jobs: BTreeMap<JobId, Job>                                  │
//! │  - spawn(text, future) → JobId                               │
//! │  - wait(JobId) → ExecResult                                  │
//! │  - wait_all() → Vec<(JobId, ExecResult)>                     │
//! │  - list() → Vec<JobInfo>                                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod byte_pipe;
mod job;
mod pipeline;
mod ports;

pub use byte_pipe::{byte_pipe, ByteReader, ByteWriter, PIPE_BUFFER_SIZE};
pub use job::{JobId, JobInfo, JobManager, JobStatus};
pub use pipeline::{compose_outcomes, run_pipeline, Wiring};
pub use ports::{
    drain, open_redirect, port_pair, BoxedReader, BoxedWriter, InPort, OutPort, Port, Ports,
    ValueSink, VALUE_BUFFER_SIZE,
};
