//! Background tokenization on a pool of worker threads.
//!
//! [`Scheduler`] is the pure routing state machine; [`WorkerPool`] runs it
//! inside an actor task and owns the [`ThreadWorker`]s.

pub mod pool;
pub mod protocol;
pub mod scheduler;
pub mod thread;

pub use pool::{PoolOptions, WorkerPool};
pub use protocol::{
    InitializeOptions, RequestId, RequestKind, ResultPayload, TaskRequest, WorkerRequest,
    WorkerResponse, WorkerResult,
};
pub use scheduler::{ManagedWorker, PoolStats, Scheduler, WorkerHandle, WorkerState};
pub use thread::{ThreadWorker, WorkerEvent, handle_request};
