//! Structured activity logging: JSONL file writer fed by a background thread.

pub mod activity;
pub mod jsonl;
