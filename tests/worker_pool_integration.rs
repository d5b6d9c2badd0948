//! End-to-end tests for the highlight worker pool.

use async_trait::async_trait;
use patchlens::domain::{
    FileContents, HighlightError, PoolError, ThemeSelection, TokenizeOptions,
};
use patchlens::infra::diff::parse_diff_from_file;
use patchlens::infra::highlight::{ResourceLoader, SyntectLoader};
use patchlens::infra::worker::{PoolOptions, PoolStats, TaskRequest, WorkerPool, WorkerResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use syntect::highlighting::Theme;
use syntect::parsing::SyntaxSet;

/// Fails the first `failures` theme loads, then behaves like syntect.
struct FlakyThemes {
    inner: SyntectLoader,
    failures: AtomicUsize,
}

#[async_trait]
impl ResourceLoader for FlakyThemes {
    async fn load_syntaxes(&self) -> Result<SyntaxSet, HighlightError> {
        self.inner.load_syntaxes().await
    }

    async fn load_theme(&self, name: &str) -> Result<Theme, HighlightError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(HighlightError::UnknownTheme(name.to_string()));
        }
        self.inner.load_theme(name).await
    }

    async fn load_language(
        &self,
        syntaxes: Arc<SyntaxSet>,
        lang: &str,
    ) -> Result<String, HighlightError> {
        self.inner.load_language(syntaxes, lang).await
    }
}

/// Panics while loading python, taking its worker thread down.
struct CrashOnPython(SyntectLoader);

#[async_trait]
impl ResourceLoader for CrashOnPython {
    async fn load_syntaxes(&self) -> Result<SyntaxSet, HighlightError> {
        self.0.load_syntaxes().await
    }

    async fn load_theme(&self, name: &str) -> Result<Theme, HighlightError> {
        self.0.load_theme(name).await
    }

    async fn load_language(
        &self,
        syntaxes: Arc<SyntaxSet>,
        lang: &str,
    ) -> Result<String, HighlightError> {
        if lang == "python" {
            panic!("grammar loader crashed on {lang}");
        }
        self.0.load_language(syntaxes, lang).await
    }
}

fn pool(size: usize) -> WorkerPool {
    WorkerPool::new(PoolOptions {
        pool_size: size,
        preload_langs: vec!["rust".into()],
        result_cache_size: 0,
        ..Default::default()
    })
}

#[tokio::test]
async fn concurrent_tasks_all_complete() {
    let pool = pool(3);
    pool.initialize().await.unwrap();

    let tasks = (0..12).map(|i| {
        let pool = pool.clone();
        async move {
            let file = FileContents::new(
                format!("src/m{i}.rs"),
                format!("pub fn m{i}() -> usize {{\n    {i}\n}}\n"),
            );
            pool.highlight_file(file, TokenizeOptions::default()).await
        }
    });
    let results = futures::future::join_all(tasks).await;
    for result in results {
        assert_eq!(result.unwrap().lines.len(), 3);
    }

    let stats = pool.get_stats().await;
    assert_eq!(stats.total_workers, 3);
    assert_eq!(stats.busy_workers, 0);
    assert_eq!(stats.pending_tasks, 0);
    assert_eq!(stats.queued_tasks, 0);
    pool.terminate().await;
}

#[tokio::test]
async fn diff_requests_return_both_sides() {
    let pool = pool(2);
    pool.initialize().await.unwrap();

    let old = FileContents::new("main.py", "def a():\n    return 1\n");
    let new = FileContents::new("main.py", "def a():\n    return 2\n\nprint(a())\n");

    let from_files = pool
        .highlight_diff_files(old.clone(), new.clone(), TokenizeOptions::default())
        .await
        .unwrap();
    assert_eq!(from_files.old_lines.len(), 2);
    assert_eq!(from_files.new_lines.len(), 4);

    let diff = parse_diff_from_file(&old, &new).unwrap();
    let from_metadata = pool
        .highlight_diff_metadata(diff, TokenizeOptions::default())
        .await
        .unwrap();
    assert_eq!(from_metadata, from_files);
    pool.terminate().await;
}

#[tokio::test]
async fn unknown_language_rejects_only_that_task() {
    let pool = pool(1);
    pool.initialize().await.unwrap();

    let bad = TaskRequest::File {
        file: FileContents::new("a.txt", "hello\n").with_lang("klingon"),
        options: TokenizeOptions::default(),
    };
    assert!(matches!(
        pool.submit_task(bad).await,
        Err(PoolError::Task { .. })
    ));

    let good = TaskRequest::File {
        file: FileContents::new("a.rs", "fn a() {}\n"),
        options: TokenizeOptions::default(),
    };
    assert!(matches!(
        pool.submit_task(good).await,
        Ok(WorkerResult::File(_))
    ));
    pool.terminate().await;
}

#[tokio::test]
async fn terminate_rejects_queued_work() {
    let pool = pool(1);
    pool.initialize().await.unwrap();

    let big: String = (0..2000).map(|i| format!("let v{i} = {i};\n")).collect();
    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let pool = pool.clone();
            let file = FileContents::new(format!("f{i}.rs"), big.clone());
            tokio::spawn(async move { pool.highlight_file(file, TokenizeOptions::default()).await })
        })
        .collect();

    tokio::task::yield_now().await;
    pool.terminate().await;

    for task in tasks {
        match task.await.unwrap() {
            Ok(result) => assert_eq!(result.lines.len(), 2000),
            Err(err) => assert_eq!(err, PoolError::Terminated),
        }
    }
}

#[tokio::test]
async fn failed_initialization_is_reported_again_on_retry() {
    let pool = WorkerPool::new(PoolOptions {
        pool_size: 2,
        themes: ThemeSelection::Single("no-such-theme".into()),
        result_cache_size: 0,
        ..Default::default()
    });

    for _ in 0..2 {
        assert!(matches!(
            pool.initialize().await,
            Err(PoolError::Task { .. })
        ));
        assert_eq!(pool.get_stats().await, PoolStats::default());
    }

    let result = pool
        .highlight_file(FileContents::new("a.rs", "fn a() {}\n"), TokenizeOptions::default())
        .await;
    assert_eq!(result, Err(PoolError::NotInitialized));
    pool.terminate().await;
}

#[tokio::test]
async fn initialization_can_be_retried_after_a_transient_failure() {
    let loader = Arc::new(FlakyThemes {
        inner: SyntectLoader::new(),
        failures: AtomicUsize::new(1),
    });
    let pool = WorkerPool::with_loader(
        PoolOptions {
            pool_size: 1,
            result_cache_size: 0,
            ..Default::default()
        },
        loader,
    );

    assert!(pool.initialize().await.is_err());
    pool.initialize().await.unwrap();
    assert_eq!(pool.get_stats().await.total_workers, 1);

    let result = pool
        .highlight_file(FileContents::new("a.rs", "fn a() {}\n"), TokenizeOptions::default())
        .await
        .unwrap();
    assert_eq!(result.lines.len(), 1);
    pool.terminate().await;
}

#[tokio::test]
async fn crashed_worker_fails_its_task_and_the_queue() {
    let pool = WorkerPool::with_loader(
        PoolOptions {
            pool_size: 1,
            preload_langs: vec!["rust".into()],
            result_cache_size: 0,
            ..Default::default()
        },
        Arc::new(CrashOnPython(SyntectLoader::new())),
    );
    pool.initialize().await.unwrap();

    let python = pool.highlight_file(
        FileContents::new("main.py", "print(1)\n"),
        TokenizeOptions::default(),
    );
    let rust = pool.highlight_file(
        FileContents::new("main.rs", "fn main() {}\n"),
        TokenizeOptions::default(),
    );
    let (python, rust) = tokio::time::timeout(Duration::from_secs(30), async {
        tokio::join!(python, rust)
    })
    .await
    .expect("tasks on a crashed worker must settle");

    assert_eq!(python, Err(PoolError::WorkerUnavailable { index: 0 }));
    assert_eq!(rust, Err(PoolError::NoWorkers));
    assert_eq!(pool.get_stats().await, PoolStats::default());

    let later = pool
        .highlight_file(FileContents::new("b.rs", "x\n"), TokenizeOptions::default())
        .await;
    assert_eq!(later, Err(PoolError::NoWorkers));
    pool.terminate().await;
}
