//! Per-source fetch scheduling: backoff steps and the polling state machine.

pub mod backoff;
pub mod status;
