use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use converge_api::{ConfigError, FieldFilter, Record};

// ═══════════════════════════════════════════════════════════════
//  RecordBuffer
// ═══════════════════════════════════════════════════════════════

/// Append-only in-memory store for records of a single kind.
///
/// Appends take the write lock only for a `Vec::push`. Readers scan under
/// the read lock, so a query sees every append that completed before it
/// started and never a half-written record. Records are handed out as
/// `Arc<R>` and never mutated after append.
pub struct RecordBuffer<R> {
    kind: String,
    records: RwLock<Vec<Arc<R>>>,
}

impl<R> std::fmt::Debug for RecordBuffer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordBuffer").field("kind", &self.kind).finish()
    }
}

impl<R: Record> RecordBuffer<R> {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Append to the tail. Returns the insertion position.
    pub fn append(&self, record: R) -> Result<usize, ConfigError> {
        if record.kind() != self.kind {
            return Err(ConfigError::KindMismatch {
                expected: self.kind.clone(),
                actual: record.kind().to_string(),
            });
        }
        let record = Arc::new(record);
        let mut guard = self.write();
        guard.push(record);
        Ok(guard.len() - 1)
    }

    /// Earliest-inserted record matching `filter`.
    pub fn find_first(&self, filter: &FieldFilter) -> Option<Arc<R>> {
        self.read().iter().find(|r| filter.matches(r.as_ref())).cloned()
    }

    /// Latest-inserted record matching `filter`.
    pub fn find_latest(&self, filter: &FieldFilter) -> Option<Arc<R>> {
        self.read().iter().rev().find(|r| filter.matches(r.as_ref())).cloned()
    }

    /// Number of records currently matching `filter`.
    pub fn count(&self, filter: &FieldFilter) -> usize {
        self.read().iter().filter(|r| filter.matches(r.as_ref())).count()
    }

    /// Every match in insertion order, taken from one snapshot.
    pub fn find_all(&self, filter: &FieldFilter) -> Vec<Arc<R>> {
        self.read().iter().filter(|r| filter.matches(r.as_ref())).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy of the current contents (cheap: clones `Arc`s only).
    pub fn snapshot(&self) -> Vec<Arc<R>> {
        self.read().clone()
    }

    /// Drop everything. Only meant for the gap between isolated runs,
    /// when ingestion has been stopped.
    pub fn clear(&self) {
        let mut guard = self.write();
        tracing::debug!(kind = %self.kind, dropped = guard.len(), "buffer cleared");
        guard.clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<R>>> {
        match self.records.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!(kind = %self.kind, "buffer read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<R>>> {
        match self.records.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!(kind = %self.kind, "buffer write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_api::JsonRecord;
    use serde_json::json;

    fn event(player: &str, seq: u64) -> JsonRecord {
        JsonRecord::new("wallet-event", json!({ "playerId": player, "seq": seq }))
    }

    #[test]
    fn first_and_latest_follow_insertion_order() {
        let buf = RecordBuffer::new("wallet-event");
        for seq in 0..5 {
            buf.append(event(if seq % 2 == 0 { "a" } else { "b" }, seq)).unwrap();
        }
        let f = FieldFilter::new().with("playerId", "a");
        assert_eq!(buf.find_first(&f).unwrap().field("seq").as_deref(), Some("0"));
        assert_eq!(buf.find_latest(&f).unwrap().field("seq").as_deref(), Some("4"));
        assert_eq!(buf.count(&f), 3);
        assert_eq!(buf.find_all(&f).len(), 3);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn no_match_yields_none_and_zero() {
        let buf = RecordBuffer::new("wallet-event");
        buf.append(event("a", 1)).unwrap();
        let f = FieldFilter::new().with("playerId", "zzz");
        assert!(buf.find_first(&f).is_none());
        assert!(buf.find_latest(&f).is_none());
        assert_eq!(buf.count(&f), 0);
    }

    #[test]
    fn append_rejects_foreign_kind() {
        let buf = RecordBuffer::new("wallet-event");
        let err = buf.append(JsonRecord::new("limit-event", json!({}))).unwrap_err();
        assert!(matches!(err, ConfigError::KindMismatch { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn snapshot_is_not_affected_by_later_appends() {
        let buf = RecordBuffer::new("wallet-event");
        buf.append(event("a", 1)).unwrap();
        let snap = buf.snapshot();
        buf.append(event("a", 2)).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn concurrent_appends_keep_position_order() {
        let buf = RecordBuffer::new("wallet-event");
        let positions: Vec<(usize, u64)> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8u64)
                .map(|t| {
                    let buf = &buf;
                    s.spawn(move || {
                        (0..50u64)
                            .map(|i| {
                                let seq = t * 1000 + i;
                                // every 10th record shares a player so the filter hits many writers
                                let player = if i % 10 == 0 { "shared" } else { "solo" };
                                (buf.append(event(player, seq)).unwrap(), seq)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(buf.len(), 400);
        let shared = FieldFilter::new().with("playerId", "shared");
        let earliest = positions
            .iter()
            .filter(|(_, seq)| seq % 1000 % 10 == 0)
            .min_by_key(|(pos, _)| *pos)
            .unwrap();
        let first = buf.find_first(&shared).unwrap();
        assert_eq!(first.field("seq").as_deref(), Some(earliest.1.to_string().as_str()));
    }
}
