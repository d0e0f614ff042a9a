//! Operator log channel.
//!
//! A `tracing` layer that copies warnings and errors into the outbound
//! stream as `log` lines, so the gateway can post them to a channel the
//! operators watch. Stderr logging is unaffected.

use crate::candidate::ChannelId;
use crate::wire::{JsonLinesSink, Outbound};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Forwards `WARN` and `ERROR` records to a chat channel.
///
/// Holds only a weak handle on the outbound queue, so the writer still
/// finishes once every [`JsonLinesSink`] is dropped.
#[derive(Debug)]
pub struct OperatorLog {
    tx: mpsc::WeakSender<Outbound>,
    channel: ChannelId,
    dropped: AtomicU64,
}

impl OperatorLog {
    /// Forward records through `sink` to `channel`.
    #[must_use]
    pub fn new(sink: &JsonLinesSink, channel: ChannelId) -> Self {
        Self {
            tx: sink.downgrade(),
            channel,
            dropped: AtomicU64::new(0),
        }
    }

    /// Records that could not be queued (queue full or closed).
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<S: Subscriber> Layer<S> for OperatorLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::WARN {
            return;
        }
        let Some(tx) = self.tx.upgrade() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        // Nothing may be logged from here: the record would loop back in.
        let line = Outbound::Log {
            channel: self.channel,
            level: level.to_string().to_ascii_lowercase(),
            message: visitor.finish(),
        };
        if tx.try_send(line).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={value}", field.name()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={value:?}", field.name()));
        }
    }
}
