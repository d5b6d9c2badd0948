use super::protocol::{ResultPayload, WorkerRequest, WorkerResponse};
use super::scheduler::WorkerHandle;
use crate::domain::{HighlightError, PoolError};
use crate::infra::highlight::{HighlighterCache, ResourceLoader, diff_languages, file_language};
use anyhow::Context as _;
use std::sync::Arc;
use std::thread;
use tokio::runtime::Builder;
use tokio::sync::mpsc;

/// Message from a worker thread back to the pool.
#[derive(Debug)]
pub enum WorkerEvent {
    Response(WorkerResponse),
    /// The worker's runtime exited; nothing more will arrive from it.
    Stopped { index: usize },
}

/// A background OS thread running its own highlighter cache.
pub struct ThreadWorker {
    index: usize,
    requests: mpsc::UnboundedSender<WorkerRequest>,
    thread: thread::JoinHandle<()>,
}

impl ThreadWorker {
    pub fn spawn(
        index: usize,
        loader: Arc<dyn ResourceLoader>,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<Self, PoolError> {
        let (requests, inbox) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name(format!("patchlens-worker-{index}"))
            .spawn(move || {
                let _stopped = StoppedOnDrop {
                    index,
                    events: events.clone(),
                };
                if let Err(err) = run_worker(inbox, loader, events) {
                    log::error!(target: "patchlens::worker", "Worker {} failed: {:#}", index, err);
                }
            })
            .map_err(|e| PoolError::Spawn {
                index,
                message: e.to_string(),
            })?;

        Ok(Self {
            index,
            requests,
            thread,
        })
    }

    /// Close the inbox and wait for the thread to finish its current request.
    pub fn shutdown(self) {
        let Self {
            index,
            requests,
            thread,
        } = self;
        drop(requests);
        if thread.join().is_err() {
            log::error!(target: "patchlens::worker", "Worker {} panicked", index);
        }
    }
}

/// Reports the worker as stopped when its thread exits, including by panic.
struct StoppedOnDrop {
    index: usize,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl Drop for StoppedOnDrop {
    fn drop(&mut self) {
        let _ = self.events.send(WorkerEvent::Stopped { index: self.index });
    }
}

impl WorkerHandle for ThreadWorker {
    fn send(&self, request: WorkerRequest) -> Result<(), PoolError> {
        self.requests
            .send(request)
            .map_err(|_| PoolError::WorkerUnavailable { index: self.index })
    }
}

fn run_worker(
    mut inbox: mpsc::UnboundedReceiver<WorkerRequest>,
    loader: Arc<dyn ResourceLoader>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) -> anyhow::Result<()> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build worker runtime")?;

    runtime.block_on(async move {
        let cache = HighlighterCache::new(loader);
        while let Some(request) = inbox.recv().await {
            let response = handle_request(&cache, request).await;
            if events.send(WorkerEvent::Response(response)).is_err() {
                break;
            }
        }
        cache.dispose();
    });
    Ok(())
}

/// Serve one request. Failures become `error` responses, never panics.
pub async fn handle_request(cache: &HighlighterCache, request: WorkerRequest) -> WorkerResponse {
    let id = request.id();
    let kind = request.kind();
    match execute(cache, request).await {
        Ok(result) => WorkerResponse::Success {
            id,
            request_type: kind,
            result,
        },
        Err(err) => WorkerResponse::Error {
            id,
            error: err.to_string(),
            stack: Some(format!("{kind} request {id}: {err:?}")),
        },
    }
}

async fn execute(
    cache: &HighlighterCache,
    request: WorkerRequest,
) -> Result<Option<ResultPayload>, HighlightError> {
    match request {
        WorkerRequest::Initialize { options, .. } => {
            cache.get_or_load(&options.themes, &options.langs).await?;
            Ok(None)
        }
        WorkerRequest::File { file, options, .. } => {
            let langs = vec![file_language(&file, &options)];
            let highlighter = cache.get_or_load(&options.theme, &langs).await?;
            Ok(Some(ResultPayload::File(
                highlighter.tokenize_file(&file, &options)?,
            )))
        }
        WorkerRequest::DiffFiles {
            old_file,
            new_file,
            options,
            ..
        } => {
            let langs = vec![
                file_language(&old_file, &options),
                file_language(&new_file, &options),
            ];
            let highlighter = cache.get_or_load(&options.theme, &langs).await?;
            Ok(Some(ResultPayload::Diff(
                highlighter.tokenize_file_pair(&old_file, &new_file, &options)?,
            )))
        }
        WorkerRequest::DiffMetadata { diff, options, .. } => {
            let (old, new) = diff_languages(&diff, &options);
            let highlighter = cache.get_or_load(&options.theme, &[old, new]).await?;
            Ok(Some(ResultPayload::Diff(
                highlighter.tokenize_diff(&diff, &options)?,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FileContents, ThemeSelection, TokenizeOptions};
    use crate::infra::highlight::SyntectLoader;
    use crate::infra::worker::protocol::{InitializeOptions, RequestKind};

    #[tokio::test]
    async fn serves_file_requests() {
        let cache = HighlighterCache::new(Arc::new(SyntectLoader::new()));
        let init = handle_request(
            &cache,
            WorkerRequest::Initialize {
                id: 1,
                options: InitializeOptions {
                    langs: vec!["rust".into()],
                    ..Default::default()
                },
            },
        )
        .await;
        assert_eq!(
            init,
            WorkerResponse::Success {
                id: 1,
                request_type: RequestKind::Initialize,
                result: None
            }
        );

        let response = handle_request(
            &cache,
            WorkerRequest::File {
                id: 2,
                file: FileContents::new("main.rs", "fn main() {}\n"),
                options: TokenizeOptions::default(),
            },
        )
        .await;
        let WorkerResponse::Success {
            result: Some(ResultPayload::File(result)),
            ..
        } = response
        else {
            panic!("expected file result");
        };
        assert_eq!(result.lines.len(), 1);
    }

    #[tokio::test]
    async fn failures_become_error_responses() {
        let cache = HighlighterCache::new(Arc::new(SyntectLoader::new()));
        let response = handle_request(
            &cache,
            WorkerRequest::File {
                id: 9,
                file: FileContents::new("main.rs", "x"),
                options: TokenizeOptions {
                    theme: ThemeSelection::Single("no-such-theme".into()),
                    ..Default::default()
                },
            },
        )
        .await;
        let WorkerResponse::Error { id, error, stack } = response else {
            panic!("expected error");
        };
        assert_eq!(id, 9);
        assert_eq!(error, "Unknown theme: no-such-theme");
        assert!(stack.is_some());
    }
}
