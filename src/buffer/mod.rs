//! Scroll buffering: the committed/pending scroll buffer, its viewport state
//! machine and event handler, and the small ring limiter used for history.

pub mod ring_limiter;
pub mod scroll;
pub mod update;
pub mod viewport;

#[cfg(test)]
mod test_properties;
