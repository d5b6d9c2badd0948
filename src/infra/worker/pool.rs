use super::protocol::{InitializeOptions, TaskRequest, WorkerResult};
use super::scheduler::{PoolStats, Reply, Scheduler};
use super::thread::{ThreadWorker, WorkerEvent};
use crate::domain::{
    DiffHighlightResult, FileContents, FileDiffMetadata, FileHighlightResult, PoolError,
    ThemeSelection, TokenizeOptions,
};
use crate::infra::app_config::{AppConfig, DEFAULT_POOL_SIZE, DEFAULT_RESULT_CACHE_SIZE};
use crate::infra::highlight::{ResourceLoader, SyntectLoader};
use futures::channel::oneshot;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    pub pool_size: usize,
    pub themes: ThemeSelection,
    /// Loaded by every worker during initialization.
    pub preload_langs: Vec<String>,
    /// Completed results to keep; 0 disables caching.
    pub result_cache_size: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            themes: ThemeSelection::default(),
            preload_langs: Vec::new(),
            result_cache_size: DEFAULT_RESULT_CACHE_SIZE,
        }
    }
}

impl From<&AppConfig> for PoolOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            pool_size: config.pool_size.max(1),
            themes: config.themes.clone(),
            preload_langs: config.preload_langs.clone(),
            result_cache_size: config.result_cache_size,
        }
    }
}

enum Command {
    Initialize {
        reply: oneshot::Sender<Result<(), PoolError>>,
    },
    Submit {
        request: TaskRequest,
        reply: Reply,
    },
    Stats {
        reply: oneshot::Sender<PoolStats>,
    },
    Terminate {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a pool of highlight worker threads.
///
/// Cloning is cheap; every clone talks to the same actor task. Must be
/// created inside a Tokio runtime.
#[derive(Clone)]
pub struct WorkerPool {
    commands: mpsc::UnboundedSender<Command>,
}

impl WorkerPool {
    pub fn new(options: PoolOptions) -> Self {
        Self::with_loader(options, Arc::new(SyntectLoader::new()))
    }

    pub fn with_loader(options: PoolOptions, loader: Arc<dyn ResourceLoader>) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (settled_tx, settled) = mpsc::unbounded_channel();
        let cache = NonZeroUsize::new(options.result_cache_size).map(LruCache::new);
        let actor = PoolActor {
            options,
            loader,
            scheduler: Scheduler::new(),
            init: InitState::Uninitialized,
            cache,
            commands: inbox,
            events,
            events_tx,
            settled,
            settled_tx,
        };
        tokio::spawn(actor.run());
        Self { commands }
    }

    /// Spawn the workers and wait until each has loaded its themes and
    /// preloaded languages.
    ///
    /// Concurrent calls share one initialization. After a failure the
    /// workers are torn down and the next call starts over.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Initialize { reply })?;
        response.await.unwrap_or(Err(PoolError::Terminated))
    }

    pub async fn submit_task(&self, request: TaskRequest) -> Result<WorkerResult, PoolError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Submit { request, reply })?;
        response.await.unwrap_or(Err(PoolError::Terminated))
    }

    pub async fn get_stats(&self) -> PoolStats {
        let (reply, response) = oneshot::channel();
        if self.send(Command::Stats { reply }).is_err() {
            return PoolStats::default();
        }
        response.await.unwrap_or_default()
    }

    /// Reject every pending and queued task and stop the worker threads.
    pub async fn terminate(&self) {
        let (reply, response) = oneshot::channel();
        if self.send(Command::Terminate { reply }).is_ok() {
            let _ = response.await;
        }
    }

    pub async fn highlight_file(
        &self,
        file: FileContents,
        options: TokenizeOptions,
    ) -> Result<FileHighlightResult, PoolError> {
        match self.submit_task(TaskRequest::File { file, options }).await? {
            WorkerResult::File(result) => Ok(result),
            other => Err(unexpected("file", &other)),
        }
    }

    pub async fn highlight_diff_files(
        &self,
        old_file: FileContents,
        new_file: FileContents,
        options: TokenizeOptions,
    ) -> Result<DiffHighlightResult, PoolError> {
        let request = TaskRequest::DiffFiles {
            old_file,
            new_file,
            options,
        };
        match self.submit_task(request).await? {
            WorkerResult::Diff(result) => Ok(result),
            other => Err(unexpected("diff-files", &other)),
        }
    }

    pub async fn highlight_diff_metadata(
        &self,
        diff: FileDiffMetadata,
        options: TokenizeOptions,
    ) -> Result<DiffHighlightResult, PoolError> {
        match self.submit_task(TaskRequest::DiffMetadata { diff, options }).await? {
            WorkerResult::Diff(result) => Ok(result),
            other => Err(unexpected("diff-metadata", &other)),
        }
    }

    fn send(&self, command: Command) -> Result<(), PoolError> {
        self.commands
            .send(command)
            .map_err(|_| PoolError::Terminated)
    }
}

fn unexpected(request: &str, result: &WorkerResult) -> PoolError {
    PoolError::Protocol {
        request: request.to_string(),
        message: format!("unexpected result {result:?}"),
    }
}

type InitReply = oneshot::Sender<Result<(), PoolError>>;

enum InitState {
    /// Never initialized, or the last attempt failed.
    Uninitialized,
    Initializing(Vec<InitReply>),
    Ready,
}

/// Owns the scheduler; all pool state changes happen on this task.
struct PoolActor {
    options: PoolOptions,
    loader: Arc<dyn ResourceLoader>,
    scheduler: Scheduler<ThreadWorker>,
    init: InitState,
    cache: Option<LruCache<String, WorkerResult>>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Replaced on every initialization so stale workers cannot reach the
    /// scheduler.
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    settled: mpsc::UnboundedReceiver<Result<(), PoolError>>,
    settled_tx: mpsc::UnboundedSender<Result<(), PoolError>>,
}

impl PoolActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Terminate { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = self.events.recv() => self.handle_event(event),
                Some(outcome) = self.settled.recv() => self.settle(outcome),
            }
        }
        log::debug!(target: "patchlens::worker", "Worker pool stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Initialize { reply } => self.initialize(reply),
            Command::Submit { request, reply } => self.submit(request, reply),
            Command::Stats { reply } => {
                let _ = reply.send(self.scheduler.stats());
            }
            Command::Terminate { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn initialize(&mut self, reply: InitReply) {
        match &mut self.init {
            InitState::Ready => {
                let _ = reply.send(Ok(()));
                return;
            }
            InitState::Initializing(waiters) => {
                waiters.push(reply);
                return;
            }
            InitState::Uninitialized => {}
        }

        let options = InitializeOptions {
            themes: self.options.themes.clone(),
            langs: self.options.preload_langs.clone(),
            prefer_wasm_highlighter: false,
        };

        let (events_tx, events) = mpsc::unbounded_channel();
        self.events_tx = events_tx;
        self.events = events;

        let mut pending = Vec::with_capacity(self.options.pool_size);
        for index in 0..self.options.pool_size {
            let worker = match ThreadWorker::spawn(index, self.loader.clone(), self.events_tx.clone())
            {
                Ok(worker) => worker,
                Err(err) => {
                    log::error!(target: "patchlens::worker", "{}", err);
                    self.retire_workers(PoolError::NotInitialized);
                    let _ = reply.send(Err(err));
                    return;
                }
            };
            let slot = self.scheduler.add_worker(worker);
            let (tx, rx) = oneshot::channel();
            self.scheduler.initialize_worker(slot, options.clone(), tx);
            pending.push(rx);
        }

        log::debug!(target: "patchlens::worker", "Initializing {} workers", pending.len());
        self.init = InitState::Initializing(vec![reply]);
        let settled = self.settled_tx.clone();
        tokio::spawn(async move {
            let outcome = futures::future::join_all(pending)
                .await
                .into_iter()
                .try_for_each(|result| result.unwrap_or(Err(PoolError::Terminated)).map(|_| ()));
            let _ = settled.send(outcome);
        });
    }

    /// Every worker answered its `initialize` request.
    fn settle(&mut self, outcome: Result<(), PoolError>) {
        let InitState::Initializing(waiters) =
            std::mem::replace(&mut self.init, InitState::Uninitialized)
        else {
            return;
        };
        match &outcome {
            Ok(()) => self.init = InitState::Ready,
            Err(err) => {
                log::error!(target: "patchlens::worker", "Worker pool initialization failed: {}", err);
                self.retire_workers(PoolError::NotInitialized);
            }
        }
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Drop every worker without terminating the pool; joins happen off the
    /// actor task.
    fn retire_workers(&mut self, error: PoolError) {
        let workers = self.scheduler.retire(error);
        if workers.is_empty() {
            return;
        }
        tokio::task::spawn_blocking(move || {
            for worker in workers {
                worker.shutdown();
            }
        });
    }

    fn submit(&mut self, request: TaskRequest, reply: Reply) {
        if self.scheduler.is_terminated() {
            let _ = reply.send(Err(PoolError::Terminated));
            return;
        }
        if matches!(self.init, InitState::Uninitialized) {
            let _ = reply.send(Err(PoolError::NotInitialized));
            return;
        }

        let key = match self.cache {
            Some(_) => request.cache_key(),
            None => None,
        };
        if let (Some(cache), Some(key)) = (self.cache.as_mut(), key.as_ref())
            && let Some(hit) = cache.get(key)
        {
            log::debug!(target: "patchlens::worker", "Result cache hit for {}", key);
            let _ = reply.send(Ok(hit.clone()));
            return;
        }

        self.scheduler.submit(request, key, reply);
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Response(response) => {
                if let Some(done) = self.scheduler.handle_response(response)
                    && let (Some(cache), Some(key)) = (self.cache.as_mut(), done.cache_key)
                {
                    cache.put(key, done.result);
                }
            }
            WorkerEvent::Stopped { index } => {
                if !self.scheduler.is_terminated() {
                    self.scheduler.worker_lost(index);
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        let workers = self.scheduler.terminate();
        if workers.is_empty() {
            return;
        }
        log::debug!(target: "patchlens::worker", "Stopping {} workers", workers.len());
        let joined = tokio::task::spawn_blocking(move || {
            for worker in workers {
                worker.shutdown();
            }
        })
        .await;
        if let Err(err) = joined {
            log::error!(target: "patchlens::worker", "Failed to join workers: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pool_size: usize) -> PoolOptions {
        PoolOptions {
            pool_size,
            preload_langs: vec!["rust".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn submit_before_initialize_is_rejected() {
        let pool = WorkerPool::new(options(1));
        let result = pool
            .highlight_file(FileContents::new("a.rs", "fn a() {}\n"), TokenizeOptions::default())
            .await;
        assert_eq!(result, Err(PoolError::NotInitialized));
        pool.terminate().await;
    }

    #[tokio::test]
    async fn highlights_files_and_caches_results() {
        let pool = WorkerPool::new(options(2));
        pool.initialize().await.unwrap();
        assert_eq!(pool.get_stats().await.total_workers, 2);

        let file = FileContents::new("lib.rs", "pub fn answer() -> u32 {\n    42\n}\n");
        let first = pool
            .highlight_file(file.clone(), TokenizeOptions::default())
            .await
            .unwrap();
        assert_eq!(first.lines.len(), 3);

        let second = pool
            .highlight_file(file, TokenizeOptions::default())
            .await
            .unwrap();
        assert_eq!(first, second);

        let stats = pool.get_stats().await;
        assert_eq!(stats.pending_tasks, 0);
        assert_eq!(stats.queued_tasks, 0);
        pool.terminate().await;
    }

    #[tokio::test]
    async fn concurrent_initialize_calls_share_one_start() {
        let pool = WorkerPool::new(options(2));
        let (first, second) = tokio::join!(pool.initialize(), pool.initialize());
        assert_eq!(first, Ok(()));
        assert_eq!(second, Ok(()));
        assert_eq!(pool.initialize().await, Ok(()));
        assert_eq!(pool.get_stats().await.total_workers, 2);
        pool.terminate().await;
    }

    #[tokio::test]
    async fn terminate_rejects_later_work() {
        let pool = WorkerPool::new(options(1));
        pool.initialize().await.unwrap();
        pool.terminate().await;

        let result = pool
            .highlight_file(FileContents::new("a.rs", "x"), TokenizeOptions::default())
            .await;
        assert_eq!(result, Err(PoolError::Terminated));
        assert_eq!(pool.get_stats().await, PoolStats::default());
    }
}
