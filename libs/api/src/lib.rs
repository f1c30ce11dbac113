pub mod error;
pub mod record;
pub mod source;

pub use error::{ConfigError, DecodeError, ErrorKind, FetchError};
pub use record::{CheckResult, Decoder, FieldFilter, JsonRecord, Record, json_decoder, resolve_path};
pub use source::{Delivery, KvFetch, PullSource, PushSource, PushSubscription, RawMessage};

