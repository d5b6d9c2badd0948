//! Messages exchanged between the pool and its workers.
//!
//! Both directions are plain serde enums tagged by `type`, so the same
//! shapes can cross a thread channel or a process boundary as JSON.

use crate::domain::{
    DiffHighlightResult, FileContents, FileDiffMetadata, FileHighlightResult, PoolError,
    ThemeSelection, TokenizeOptions,
};
use crate::infra::hash::hash_parts;
use crate::infra::highlight::{diff_languages, file_language};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    Initialize,
    File,
    DiffFiles,
    DiffMetadata,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Initialize => write!(f, "initialize"),
            RequestKind::File => write!(f, "file"),
            RequestKind::DiffFiles => write!(f, "diff-files"),
            RequestKind::DiffMetadata => write!(f, "diff-metadata"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InitializeOptions {
    pub themes: ThemeSelection,
    #[serde(default)]
    pub langs: Vec<String>,
    /// Accepted for wire compatibility; there is only one highlighter engine.
    #[serde(default)]
    pub prefer_wasm_highlighter: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerRequest {
    Initialize {
        id: RequestId,
        options: InitializeOptions,
    },
    File {
        id: RequestId,
        file: FileContents,
        options: TokenizeOptions,
    },
    #[serde(rename_all = "camelCase")]
    DiffFiles {
        id: RequestId,
        old_file: FileContents,
        new_file: FileContents,
        options: TokenizeOptions,
    },
    DiffMetadata {
        id: RequestId,
        diff: FileDiffMetadata,
        options: TokenizeOptions,
    },
}

impl WorkerRequest {
    pub fn id(&self) -> RequestId {
        match self {
            WorkerRequest::Initialize { id, .. }
            | WorkerRequest::File { id, .. }
            | WorkerRequest::DiffFiles { id, .. }
            | WorkerRequest::DiffMetadata { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            WorkerRequest::Initialize { .. } => RequestKind::Initialize,
            WorkerRequest::File { .. } => RequestKind::File,
            WorkerRequest::DiffFiles { .. } => RequestKind::DiffFiles,
            WorkerRequest::DiffMetadata { .. } => RequestKind::DiffMetadata,
        }
    }
}

/// Payload of a successful response. The request type disambiguates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultPayload {
    File(FileHighlightResult),
    Diff(DiffHighlightResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerResponse {
    #[serde(rename_all = "camelCase")]
    Success {
        id: RequestId,
        request_type: RequestKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<ResultPayload>,
    },
    Error {
        id: RequestId,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
}

impl WorkerResponse {
    pub fn id(&self) -> RequestId {
        match self {
            WorkerResponse::Success { id, .. } | WorkerResponse::Error { id, .. } => *id,
        }
    }
}

/// What a caller gets back for a completed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResult {
    Initialized,
    File(FileHighlightResult),
    Diff(DiffHighlightResult),
}

impl WorkerResult {
    /// Check a success payload against the request that produced it.
    pub fn from_success(
        expected: RequestKind,
        request_type: RequestKind,
        result: Option<ResultPayload>,
    ) -> Result<Self, PoolError> {
        if expected != request_type {
            return Err(PoolError::Protocol {
                request: expected.to_string(),
                message: format!("response is for {request_type}"),
            });
        }
        match (expected, result) {
            (RequestKind::Initialize, _) => Ok(WorkerResult::Initialized),
            (RequestKind::File, Some(ResultPayload::File(result))) => Ok(WorkerResult::File(result)),
            (RequestKind::DiffFiles | RequestKind::DiffMetadata, Some(ResultPayload::Diff(result))) => {
                Ok(WorkerResult::Diff(result))
            }
            (kind, _) => Err(PoolError::Protocol {
                request: kind.to_string(),
                message: "missing or mismatched result".into(),
            }),
        }
    }
}

/// A highlight job as submitted by a caller; the pool assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRequest {
    File {
        file: FileContents,
        options: TokenizeOptions,
    },
    DiffFiles {
        old_file: FileContents,
        new_file: FileContents,
        options: TokenizeOptions,
    },
    DiffMetadata {
        diff: FileDiffMetadata,
        options: TokenizeOptions,
    },
}

impl TaskRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            TaskRequest::File { .. } => RequestKind::File,
            TaskRequest::DiffFiles { .. } => RequestKind::DiffFiles,
            TaskRequest::DiffMetadata { .. } => RequestKind::DiffMetadata,
        }
    }

    pub fn options(&self) -> &TokenizeOptions {
        match self {
            TaskRequest::File { options, .. }
            | TaskRequest::DiffFiles { options, .. }
            | TaskRequest::DiffMetadata { options, .. } => options,
        }
    }

    /// Languages a worker needs loaded to serve this request, sorted.
    pub fn required_languages(&self) -> Vec<String> {
        let mut langs = match self {
            TaskRequest::File { file, options } => vec![file_language(file, options)],
            TaskRequest::DiffFiles {
                old_file,
                new_file,
                options,
            } => vec![
                file_language(old_file, options),
                file_language(new_file, options),
            ],
            TaskRequest::DiffMetadata { diff, options } => {
                let (old, new) = diff_languages(diff, options);
                vec![old, new]
            }
        };
        langs.sort();
        langs.dedup();
        langs
    }

    /// Key for the pool's result cache. Explicit cache keys on the inputs are
    /// preferred; otherwise contents are hashed. `None` means "do not cache".
    pub fn cache_key(&self) -> Option<String> {
        let options = serde_json::to_string(self.options()).ok()?;
        let subject = match self {
            TaskRequest::File { file, .. } => file_key(file),
            TaskRequest::DiffFiles {
                old_file, new_file, ..
            } => format!("{}:{}", file_key(old_file), file_key(new_file)),
            TaskRequest::DiffMetadata { diff, .. } => match &diff.cache_key {
                Some(key) => key.clone(),
                None => format!("{:x}", hash_parts(&[&serde_json::to_string(diff).ok()?])),
            },
        };
        Some(format!(
            "{}:{}:{:x}",
            self.kind(),
            subject,
            hash_parts(&[&options])
        ))
    }

    pub fn into_worker_request(self, id: RequestId) -> WorkerRequest {
        match self {
            TaskRequest::File { file, options } => WorkerRequest::File { id, file, options },
            TaskRequest::DiffFiles {
                old_file,
                new_file,
                options,
            } => WorkerRequest::DiffFiles {
                id,
                old_file,
                new_file,
                options,
            },
            TaskRequest::DiffMetadata { diff, options } => {
                WorkerRequest::DiffMetadata { id, diff, options }
            }
        }
    }
}

fn file_key(file: &FileContents) -> String {
    match &file.cache_key {
        Some(key) => key.clone(),
        None => format!("{:x}", hash_parts(&[&file.name, &file.contents])),
    }
}
