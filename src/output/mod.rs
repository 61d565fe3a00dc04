//! Output module
//!
//! Singer messages and the sinks they are written to.
//!
//! # Overview
//!
//! - `Message` - SCHEMA, RECORD, STATE and ACTIVATE_VERSION messages
//! - `MessageSink` - destination trait, with a JSON-lines sink for stdout and
//!   an in-memory sink

mod message;
mod sink;

pub use message::Message;
pub use sink::{JsonLinesSink, MemorySink, MessageSink};
