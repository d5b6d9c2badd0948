use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which column of a diff an annotation points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationSide {
    Additions,
    Deletions,
}

/// Caller metadata pinned to a line of a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLineAnnotation<T> {
    pub line_number: usize,
    pub side: AnnotationSide,
    pub metadata: T,
}

/// Caller metadata pinned to a line of a plain file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineAnnotation<T> {
    pub line_number: usize,
    pub metadata: T,
}

/// Annotations grouped by destination line, keeping insertion order per line.
#[derive(Debug, Clone)]
pub struct AnnotationIndex<T> {
    by_line: HashMap<(Option<AnnotationSide>, usize), Vec<T>>,
}

impl<T> Default for AnnotationIndex<T> {
    fn default() -> Self {
        Self {
            by_line: HashMap::new(),
        }
    }
}

impl<T: Clone> AnnotationIndex<T> {
    pub fn for_diff(annotations: &[DiffLineAnnotation<T>]) -> Self {
        let mut index = Self::default();
        for annotation in annotations {
            index
                .by_line
                .entry((Some(annotation.side), annotation.line_number))
                .or_default()
                .push(annotation.metadata.clone());
        }
        index
    }

    pub fn for_file(annotations: &[LineAnnotation<T>]) -> Self {
        let mut index = Self::default();
        for annotation in annotations {
            index
                .by_line
                .entry((None, annotation.line_number))
                .or_default()
                .push(annotation.metadata.clone());
        }
        index
    }

    pub fn get(&self, side: Option<AnnotationSide>, line_number: usize) -> Vec<T> {
        self.by_line
            .get(&(side, line_number))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_line.is_empty()
    }
}
