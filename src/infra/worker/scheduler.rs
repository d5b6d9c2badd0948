//! Language-affinity task scheduling, independent of how workers run.
//!
//! The scheduler owns every worker handle, the FIFO queue and the pending
//! map. It never blocks and holds no locks; the pool actor drives it from a
//! single task.

use super::protocol::{
    InitializeOptions, RequestId, RequestKind, TaskRequest, WorkerRequest, WorkerResponse,
    WorkerResult,
};
use crate::domain::PoolError;
use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

pub type Reply = oneshot::Sender<Result<WorkerResult, PoolError>>;

/// Transport to one worker.
pub trait WorkerHandle {
    fn send(&self, request: WorkerRequest) -> Result<(), PoolError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Initializing,
    Idle,
    Busy,
    /// The worker's thread exited; it is never scheduled again.
    Stopped,
}

pub struct ManagedWorker<H> {
    pub handle: H,
    pub state: WorkerState,
    /// Languages loaded or being loaded. Never shrinks.
    pub langs: HashSet<String>,
}

pub struct PendingTask {
    pub id: RequestId,
    pub kind: RequestKind,
    pub worker: usize,
    pub reply: Reply,
    pub request_start: Instant,
    pub cache_key: Option<String>,
}

struct QueuedTask {
    id: RequestId,
    request: TaskRequest,
    langs: Vec<String>,
    reply: Reply,
    request_start: Instant,
    cache_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub total_workers: usize,
    pub busy_workers: usize,
    pub queued_tasks: usize,
    pub pending_tasks: usize,
}

/// A task that finished successfully, for the caller's result cache.
#[derive(Debug)]
pub struct Completed {
    pub cache_key: Option<String>,
    pub result: WorkerResult,
}

pub struct Scheduler<H> {
    workers: Vec<ManagedWorker<H>>,
    queue: VecDeque<QueuedTask>,
    pending: HashMap<RequestId, PendingTask>,
    next_id: RequestId,
    terminated: bool,
}

impl<H> Default for Scheduler<H> {
    fn default() -> Self {
        Self {
            workers: Vec::new(),
            queue: VecDeque::new(),
            pending: HashMap::new(),
            next_id: 1,
            terminated: false,
        }
    }
}

impl<H: WorkerHandle> Scheduler<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_worker(&mut self, handle: H) -> usize {
        self.workers.push(ManagedWorker {
            handle,
            state: WorkerState::Uninitialized,
            langs: HashSet::new(),
        });
        self.workers.len() - 1
    }

    pub fn worker(&self, index: usize) -> Option<&ManagedWorker<H>> {
        self.workers.get(index)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Every worker has finished initializing.
    pub fn is_ready(&self) -> bool {
        !self.workers.is_empty()
            && self
                .workers
                .iter()
                .all(|w| matches!(w.state, WorkerState::Idle | WorkerState::Busy))
    }

    fn live_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.state != WorkerState::Stopped)
            .count()
    }

    /// Send the `initialize` request to worker `index`.
    pub fn initialize_worker(&mut self, index: usize, options: InitializeOptions, reply: Reply) {
        if self.terminated {
            let _ = reply.send(Err(PoolError::Terminated));
            return;
        }
        let id = self.allocate_id();
        let Some(worker) = self.workers.get_mut(index) else {
            let _ = reply.send(Err(PoolError::WorkerUnavailable { index }));
            return;
        };

        worker.state = WorkerState::Initializing;
        worker.langs.extend(options.langs.iter().cloned());
        if let Err(err) = worker.handle.send(WorkerRequest::Initialize { id, options }) {
            worker.state = WorkerState::Uninitialized;
            let _ = reply.send(Err(err));
            return;
        }

        self.pending.insert(
            id,
            PendingTask {
                id,
                kind: RequestKind::Initialize,
                worker: index,
                reply,
                request_start: Instant::now(),
                cache_key: None,
            },
        );
    }

    /// Dispatch `request` to the best idle worker, or queue it.
    pub fn submit(&mut self, request: TaskRequest, cache_key: Option<String>, reply: Reply) {
        if self.terminated {
            let _ = reply.send(Err(PoolError::Terminated));
            return;
        }
        if !self.workers.is_empty() && self.live_workers() == 0 {
            let _ = reply.send(Err(PoolError::NoWorkers));
            return;
        }

        let task = QueuedTask {
            id: self.allocate_id(),
            langs: request.required_languages(),
            request,
            reply,
            request_start: Instant::now(),
            cache_key,
        };

        match self.select_worker(&task.langs) {
            Some(index) => self.dispatch(index, task),
            None => {
                log::debug!(target: "patchlens::worker", "Queueing task {} ({} queued)", task.id, self.queue.len() + 1);
                self.queue.push_back(task);
            }
        }
    }

    /// Resolve the pending task `response` answers and hand its worker the
    /// next queued task. Unknown ids are logged and ignored.
    pub fn handle_response(&mut self, response: WorkerResponse) -> Option<Completed> {
        let Some(task) = self.pending.remove(&response.id()) else {
            log::error!(target: "patchlens::worker", "Received response for unknown task {}", response.id());
            return None;
        };

        log::debug!(
            target: "patchlens::worker",
            "Task {} ({}) finished on worker {} in {:?}",
            task.id,
            task.kind,
            task.worker,
            task.request_start.elapsed()
        );

        let outcome = match response {
            WorkerResponse::Success {
                request_type,
                result,
                ..
            } => WorkerResult::from_success(task.kind, request_type, result),
            WorkerResponse::Error { error, stack, .. } => Err(PoolError::Task {
                message: error,
                stack,
            }),
        };

        // A worker that failed to initialize takes no work until the pool
        // is initialized again.
        let init_failed = task.kind == RequestKind::Initialize && outcome.is_err();
        if let Some(worker) = self.workers.get_mut(task.worker)
            && worker.state != WorkerState::Stopped
        {
            worker.state = if init_failed {
                WorkerState::Uninitialized
            } else {
                WorkerState::Idle
            };
        }

        let completed = match &outcome {
            Ok(result) if task.kind != RequestKind::Initialize => Some(Completed {
                cache_key: task.cache_key.clone(),
                result: result.clone(),
            }),
            _ => None,
        };
        let _ = task.reply.send(outcome);

        self.dispatch_next(task.worker);
        completed
    }

    /// The worker's thread is gone: fail its in-flight tasks and stop
    /// scheduling onto it. Losing the last worker fails the queue too.
    pub fn worker_lost(&mut self, index: usize) {
        let Some(worker) = self.workers.get_mut(index) else {
            return;
        };
        if worker.state == WorkerState::Stopped {
            return;
        }
        log::error!(target: "patchlens::worker", "Worker {} stopped responding", index);
        worker.state = WorkerState::Stopped;

        let lost: Vec<RequestId> = self
            .pending
            .values()
            .filter(|task| task.worker == index)
            .map(|task| task.id)
            .collect();
        for id in lost {
            if let Some(task) = self.pending.remove(&id) {
                let _ = task.reply.send(Err(PoolError::WorkerUnavailable { index }));
            }
        }

        if self.live_workers() == 0 {
            for task in self.queue.drain(..) {
                let _ = task.reply.send(Err(PoolError::NoWorkers));
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_workers: self.live_workers(),
            busy_workers: self
                .workers
                .iter()
                .filter(|w| w.state == WorkerState::Busy)
                .count(),
            queued_tasks: self.queue.len(),
            pending_tasks: self.pending.len(),
        }
    }

    /// Reject everything in flight or queued and give back the worker
    /// handles so the caller can shut them down.
    pub fn terminate(&mut self) -> Vec<H> {
        self.terminated = true;
        self.retire(PoolError::Terminated)
    }

    /// Like [`Scheduler::terminate`], but new workers may be added afterwards.
    pub fn retire(&mut self, error: PoolError) -> Vec<H> {
        for (_, task) in self.pending.drain() {
            let _ = task.reply.send(Err(error.clone()));
        }
        for task in self.queue.drain(..) {
            let _ = task.reply.send(Err(error.clone()));
        }
        self.workers.drain(..).map(|w| w.handle).collect()
    }

    /// Prefer an idle worker with every language loaded, else any idle one.
    fn select_worker(&self, langs: &[String]) -> Option<usize> {
        let mut fallback = None;
        for (index, worker) in self.workers.iter().enumerate() {
            if worker.state != WorkerState::Idle {
                continue;
            }
            if langs.iter().all(|lang| worker.langs.contains(lang)) {
                return Some(index);
            }
            fallback.get_or_insert(index);
        }
        fallback
    }

    fn dispatch(&mut self, index: usize, task: QueuedTask) {
        let QueuedTask {
            id,
            request,
            langs,
            reply,
            request_start,
            cache_key,
        } = task;
        let kind = request.kind();

        let Some(worker) = self.workers.get_mut(index) else {
            let _ = reply.send(Err(PoolError::WorkerUnavailable { index }));
            return;
        };
        worker.state = WorkerState::Busy;
        worker.langs.extend(langs);

        if let Err(err) = worker.handle.send(request.into_worker_request(id)) {
            worker.state = WorkerState::Uninitialized;
            let _ = reply.send(Err(err));
            return;
        }

        self.pending.insert(
            id,
            PendingTask {
                id,
                kind,
                worker: index,
                reply,
                request_start,
                cache_key,
            },
        );
    }

    fn dispatch_next(&mut self, index: usize) {
        let idle = self
            .workers
            .get(index)
            .is_some_and(|w| w.state == WorkerState::Idle);
        if !idle {
            return;
        }
        if let Some(task) = self.queue.pop_front() {
            self.dispatch(index, task);
        }
    }

    fn allocate_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
