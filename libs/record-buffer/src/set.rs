use std::collections::HashMap;
use std::sync::Arc;

use converge_api::{ConfigError, FieldFilter, Record};

use crate::RecordBuffer;

// ═══════════════════════════════════════════════════════════════
//  BufferSet
// ═══════════════════════════════════════════════════════════════

/// One buffer per registered kind.
///
/// The set of kinds is fixed at construction; afterwards only the buffers'
/// contents change. Queries and appends for a kind that was never
/// registered fail with `ConfigError::UnknownKind`.
pub struct BufferSet<R> {
    buffers: HashMap<String, Arc<RecordBuffer<R>>>,
}

impl<R> std::fmt::Debug for BufferSet<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&String> = self.buffers.keys().collect();
        kinds.sort();
        f.debug_struct("BufferSet").field("kinds", &kinds).finish()
    }
}

impl<R: Record> BufferSet<R> {
    pub fn new<I, K>(kinds: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let buffers = kinds
            .into_iter()
            .map(|k| {
                let kind = k.into();
                (kind.clone(), Arc::new(RecordBuffer::new(kind)))
            })
            .collect();
        Self { buffers }
    }

    pub fn buffer(&self, kind: &str) -> Result<&Arc<RecordBuffer<R>>, ConfigError> {
        self.buffers
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownKind(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.buffers.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.buffers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Route the record to its kind's buffer.
    pub fn append(&self, record: R) -> Result<usize, ConfigError> {
        self.buffer(record.kind())?.append(record)
    }

    pub fn find_first(&self, kind: &str, filter: &FieldFilter) -> Result<Option<Arc<R>>, ConfigError> {
        Ok(self.buffer(kind)?.find_first(filter))
    }

    pub fn find_latest(&self, kind: &str, filter: &FieldFilter) -> Result<Option<Arc<R>>, ConfigError> {
        Ok(self.buffer(kind)?.find_latest(filter))
    }

    pub fn count(&self, kind: &str, filter: &FieldFilter) -> Result<usize, ConfigError> {
        Ok(self.buffer(kind)?.count(filter))
    }

    /// All records of one kind, in append order.
    pub fn snapshot(&self, kind: &str) -> Result<Vec<Arc<R>>, ConfigError> {
        Ok(self.buffer(kind)?.snapshot())
    }

    /// Total records across all kinds.
    pub fn len(&self) -> usize {
        self.buffers.values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.values().all(|b| b.is_empty())
    }

    /// Clear every buffer. For use between isolated runs, with ingestion stopped.
    pub fn reset(&self) {
        for buffer in self.buffers.values() {
            buffer.clear();
        }
        tracing::info!(kinds = self.buffers.len(), "buffers reset");
    }
}
