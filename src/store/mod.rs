//! Column persistence: key-value backends and the snapshot codec.

pub mod kv;
pub mod snapshot;
