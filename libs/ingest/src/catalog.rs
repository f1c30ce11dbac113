use std::collections::HashMap;

use converge_api::{ConfigError, Decoder, Record};
use record_buffer::BufferSet;

use crate::config::KindConfig;
use crate::error::LandingError;

// ═══════════════════════════════════════════════════════════════
//  KindCatalog
// ═══════════════════════════════════════════════════════════════

/// Registered kind: topic/subject suffix + decoder.
pub struct KindEntry<R> {
    kind: String,
    suffix: String,
    decoder: Decoder<R>,
}

impl<R> KindEntry<R> {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

/// Immutable kind → (suffix, decoder) mapping, built once at startup and
/// shared by reference (`Arc`) with every ingestor.
pub struct KindCatalog<R> {
    entries: Vec<KindEntry<R>>,
}

impl<R> std::fmt::Debug for KindCatalog<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for e in &self.entries {
            map.entry(&e.kind, &e.suffix);
        }
        map.finish()
    }
}

pub struct KindCatalogBuilder<R> {
    entries: Vec<KindEntry<R>>,
}

impl<R: Record> KindCatalogBuilder<R> {
    pub fn register(
        mut self,
        kind: impl Into<String>,
        suffix: impl Into<String>,
        decoder: Decoder<R>,
    ) -> Self {
        self.entries.push(KindEntry {
            kind: kind.into(),
            suffix: suffix.into(),
            decoder,
        });
        self
    }

    /// Reject duplicate kinds, duplicate suffixes and empty names.
    pub fn build(self) -> Result<KindCatalog<R>, ConfigError> {
        let mut by_suffix: HashMap<&str, &str> = HashMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.kind.is_empty() || entry.suffix.is_empty() {
                return Err(ConfigError::Invalid {
                    context: "kind registration",
                    detail: format!("entry #{i} has an empty kind or suffix"),
                });
            }
            if self.entries[..i].iter().any(|e| e.kind == entry.kind) {
                return Err(ConfigError::DuplicateKind(entry.kind.clone()));
            }
            if let Some(first) = by_suffix.insert(&entry.suffix, &entry.kind) {
                return Err(ConfigError::DuplicateSuffix {
                    suffix: entry.suffix.clone(),
                    first: first.to_string(),
                    second: entry.kind.clone(),
                });
            }
        }
        Ok(KindCatalog { entries: self.entries })
    }
}

impl<R: Record> KindCatalog<R> {
    pub fn builder() -> KindCatalogBuilder<R> {
        KindCatalogBuilder { entries: Vec::new() }
    }

    /// Build from `[[kinds]]` config, binding decoders by kind name.
    ///
    /// A configured kind without a decoder and a decoder without a
    /// configured kind are both errors.
    pub fn from_config(
        kinds: &[KindConfig],
        mut decoders: HashMap<String, Decoder<R>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::builder();
        for kind in kinds {
            let decoder = decoders
                .remove(&kind.name)
                .ok_or_else(|| ConfigError::MissingDecoder(kind.name.clone()))?;
            builder = builder.register(kind.name.clone(), kind.suffix.clone(), decoder);
        }
        let mut leftover: Vec<String> = decoders.into_keys().collect();
        leftover.sort();
        if let Some(kind) = leftover.into_iter().next() {
            return Err(ConfigError::UnknownKind(kind));
        }
        builder.build()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.kind.as_str())
    }

    pub fn get(&self, kind: &str) -> Option<&KindEntry<R>> {
        self.entries.iter().find(|e| e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry whose suffix the topic ends with. Longest suffix wins.
    pub fn resolve(&self, topic: &str) -> Option<&KindEntry<R>> {
        self.entries
            .iter()
            .filter(|e| topic.ends_with(e.suffix.as_str()))
            .max_by_key(|e| e.suffix.len())
    }

    /// Empty buffers for every registered kind.
    pub fn buffers(&self) -> BufferSet<R> {
        BufferSet::new(self.kinds())
    }

    /// Startup check: every kind has a buffer, every topic resolves to a kind.
    pub fn check(&self, buffers: &BufferSet<R>, topics: &[String]) -> Result<(), ConfigError> {
        if let Some(kind) = self.kinds().find(|k| !buffers.contains(k)) {
            return Err(ConfigError::UnknownKind(kind.to_string()));
        }
        if let Some(topic) = topics.iter().find(|t| self.resolve(t).is_none()) {
            return Err(ConfigError::UnroutableTopic(topic.clone()));
        }
        Ok(())
    }

    /// Decode a raw payload and append it to its kind's buffer.
    pub fn land(&self, buffers: &BufferSet<R>, topic: &str, payload: &[u8]) -> Result<usize, LandingError> {
        let entry = self
            .resolve(topic)
            .ok_or_else(|| LandingError::Unroutable(topic.to_string()))?;
        let record = (entry.decoder)(payload)?;
        if record.kind() != entry.kind {
            return Err(LandingError::Decode(converge_api::DecodeError::new(
                entry.kind.clone(),
                format!("decoder produced kind '{}'", record.kind()),
            )));
        }
        Ok(buffers.append(record)?)
    }
}
