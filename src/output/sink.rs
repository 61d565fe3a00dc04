//! Message sinks

use super::message::Message;
use crate::error::Result;
use crate::types::{JsonObject, JsonValue};
use std::io::{self, Stdout, Write};

/// Destination for Singer messages
pub trait MessageSink {
    /// Write one message
    fn write(&mut self, message: &Message) -> Result<()>;
}

/// Writes each message as one line of JSON
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl JsonLinesSink<Stdout> {
    /// Sink writing to stdout
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonLinesSink<W> {
    /// Sink writing to `writer`
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Get the underlying writer back
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MessageSink for JsonLinesSink<W> {
    fn write(&mut self, message: &Message) -> Result<()> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        // downstream targets consume messages as they arrive
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Vec<Message>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages, in emission order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Take the messages out of the sink
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Records emitted for a stream
    pub fn records(&self, stream_id: &str) -> Vec<&JsonObject> {
        self.messages
            .iter()
            .filter_map(|message| match message {
                Message::Record { stream, record, .. } if stream == stream_id => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Value of the last STATE message
    pub fn last_state(&self) -> Option<&JsonValue> {
        self.messages.iter().rev().find_map(|message| match message {
            Message::State { value } => Some(value),
            _ => None,
        })
    }

    /// Number of messages matching a predicate
    pub fn count(&self, predicate: impl Fn(&Message) -> bool) -> usize {
        self.messages.iter().filter(|m| predicate(m)).count()
    }

    /// Drop every message
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl MessageSink for MemorySink {
    fn write(&mut self, message: &Message) -> Result<()> {
        self.messages.push(message.clone());
        Ok(())
    }
}

impl<S: MessageSink + ?Sized> MessageSink for &mut S {
    fn write(&mut self, message: &Message) -> Result<()> {
        (**self).write(message)
    }
}
