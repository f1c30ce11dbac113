use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::DecodeError;

// ════════════════════════════════════════════════════════════════
//  Record
// ════════════════════════════════════════════════════════════════

/// A decoded message or entity as seen by the buffers and the correlator.
///
/// The engine never looks inside a record beyond its kind and the named
/// fields a filter asks for. Field values are compared as strings.
pub trait Record: Send + Sync + 'static {
    /// Type identity tag, e.g. `"wallet-projection-event"`.
    fn kind(&self) -> &str;

    /// Stringified value of a named field, `None` if absent.
    fn field(&self, name: &str) -> Option<Cow<'_, str>>;
}

/// Per-kind decoder: raw bytes → record.
pub type Decoder<R> = Arc<dyn Fn(&[u8]) -> Result<R, DecodeError> + Send + Sync>;

// ════════════════════════════════════════════════════════════════
//  FieldFilter
// ════════════════════════════════════════════════════════════════

/// Conjunction of `field = expected` pairs.
///
/// Backed by a `BTreeMap`, so `Display` is always sorted by key and
/// failure messages are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldFilter {
    fields: BTreeMap<String, String>,
}

impl FieldFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `field = expected` pair. A repeated field replaces the earlier value.
    pub fn with(mut self, field: impl Into<String>, expected: impl Into<String>) -> Self {
        self.fields.insert(field.into(), expected.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Exact, case-sensitive match on every pair. A missing field never matches.
    pub fn matches<R: Record + ?Sized>(&self, record: &R) -> bool {
        self.fields
            .iter()
            .all(|(field, expected)| record.field(field).is_some_and(|actual| actual == expected.as_str()))
    }
}

impl std::fmt::Display for FieldFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldFilter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for FieldFilter {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

// ════════════════════════════════════════════════════════════════
//  CheckResult
// ════════════════════════════════════════════════════════════════

/// Verdict of an accept predicate. The message is kept on success too,
/// so it can be attached to reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub success: bool,
    pub message: String,
}

impl CheckResult {
    pub fn pass(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }

    /// Default verdict for existence checks.
    pub fn present() -> Self {
        Self::pass("present")
    }
}

// ════════════════════════════════════════════════════════════════
//  JsonRecord
// ════════════════════════════════════════════════════════════════

/// Resolve a dot-notation path in a `serde_json::Value`.
///
/// - `"symbol"` → `value["symbol"]`
/// - `"player.id"` → `value["player"]["id"]`
///
/// Returns `None` if any segment is missing.
pub fn resolve_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Record backed by a JSON document.
///
/// Strings compare by their content, numbers and booleans by their JSON
/// text (`42`, `1.5`, `true`). Null, objects and arrays never match.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRecord {
    kind: String,
    value: serde_json::Value,
}

impl JsonRecord {
    pub fn new(kind: impl Into<String>, value: serde_json::Value) -> Self {
        Self { kind: kind.into(), value }
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn into_value(self) -> serde_json::Value {
        self.value
    }
}

impl Record for JsonRecord {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match resolve_path(&self.value, name)? {
            serde_json::Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            serde_json::Value::Number(n) => Some(Cow::Owned(n.to_string())),
            serde_json::Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            _ => None,
        }
    }
}

/// Decoder that parses the payload as a JSON document of the given kind.
pub fn json_decoder(kind: impl Into<String>) -> Decoder<JsonRecord> {
    let kind = kind.into();
    Arc::new(move |bytes: &[u8]| {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::new(kind.clone(), e))?;
        Ok(JsonRecord::new(kind.clone(), value))
    })
}
