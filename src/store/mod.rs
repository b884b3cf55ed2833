// Store module
// In-memory vector record store and its on-disk form

#[cfg(test)]
mod tests;

pub mod files;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::MatchError;

pub use files::{Manifest, StorePaths, load_store, read_display_names, read_manifest, write_store};

/// One catalog entry as it was ingested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub keyword: String,
    pub text: String,
}

impl Document {
    #[inline]
    pub fn new(keyword: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            text: text.into(),
        }
    }

    /// Text handed to the embedding provider, so both fields shape the vector
    #[inline]
    pub fn embedding_text(&self) -> String {
        format!("Keyword: {}\nText: {}", self.keyword, self.text)
    }
}

/// Read-only positional store of normalized vectors and their documents.
///
/// Vectors are kept in one flat row-major buffer; record `i` owns
/// `vectors[i * dimension..(i + 1) * dimension]` and `documents[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecordStore {
    dimension: usize,
    vectors: Vec<f32>,
    documents: Vec<Document>,
    display_names: HashMap<String, String>,
}

impl VectorRecordStore {
    /// Build a store from a flat vector buffer. The buffer length must be
    /// exactly `dimension * documents.len()`.
    #[inline]
    pub fn new(
        dimension: usize,
        vectors: Vec<f32>,
        documents: Vec<Document>,
    ) -> crate::Result<Self> {
        if dimension == 0 && !documents.is_empty() {
            return Err(MatchError::Integrity(
                "store has records but zero-dimensional vectors".to_string(),
            ));
        }

        let expected = dimension
            .checked_mul(documents.len())
            .ok_or_else(|| MatchError::Integrity("vector buffer size overflows".to_string()))?;
        if vectors.len() != expected {
            return Err(MatchError::Integrity(format!(
                "{} documents need {} vector values at dimension {}, found {}",
                documents.len(),
                expected,
                dimension,
                vectors.len()
            )));
        }

        Ok(Self {
            dimension,
            vectors,
            documents,
            display_names: HashMap::new(),
        })
    }

    /// Build a store from one vector per document. Every row must share the
    /// first row's dimensionality.
    #[inline]
    pub fn from_rows(rows: Vec<Vec<f32>>, documents: Vec<Document>) -> crate::Result<Self> {
        if rows.len() != documents.len() {
            return Err(MatchError::Integrity(format!(
                "{} vectors for {} documents",
                rows.len(),
                documents.len()
            )));
        }

        let dimension = rows.first().map_or(0, Vec::len);
        let mut vectors = Vec::with_capacity(dimension * rows.len());
        for row in rows {
            if row.len() != dimension {
                return Err(MatchError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            vectors.extend(row);
        }

        Self::new(dimension, vectors, documents)
    }

    #[inline]
    pub fn with_display_names(mut self, display_names: HashMap<String, String>) -> Self {
        self.display_names = display_names;
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimension;
        self.vectors.get(start..start + self.dimension)
    }

    #[inline]
    pub fn document(&self, position: usize) -> Option<&Document> {
        self.documents.get(position)
    }

    #[inline]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    #[inline]
    pub fn display_names(&self) -> &HashMap<String, String> {
        &self.display_names
    }

    /// Human-facing name for `position`, falling back to the raw keyword
    #[inline]
    pub fn display_name(&self, position: usize) -> Option<&str> {
        let document = self.documents.get(position)?;
        Some(
            self.display_names
                .get(&document.keyword)
                .map_or(document.keyword.as_str(), String::as_str),
        )
    }

    /// Vectors in position order
    #[inline]
    pub fn vectors(&self) -> impl ExactSizeIterator<Item = &[f32]> {
        // A zero dimension only occurs for an empty buffer
        self.vectors.chunks_exact(self.dimension.max(1))
    }

    #[inline]
    pub fn as_flat(&self) -> &[f32] {
        &self.vectors
    }
}
