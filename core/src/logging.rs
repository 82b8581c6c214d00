//! Logging setup and the in-memory console buffer
//!
//! Hosts without a terminal (the mobile apps) show the supervisor's recent
//! log lines in their UI. [`ConsoleLog`] is a `tracing` layer that keeps the
//! last [`CONSOLE_CAPACITY`] formatted events for that purpose.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Lines retained by the console buffer
pub const CONSOLE_CAPACITY: usize = 100;

/// Bounded ring of formatted log lines, shareable across threads
#[derive(Clone, Default)]
pub struct ConsoleLog {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line, evicting the oldest beyond capacity
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        if lines.len() == CONSOLE_CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    /// All lines joined with newlines
    pub fn render(&self) -> String {
        let lines = self.lines.lock();
        let mut out = String::new();
        for line in lines.iter() {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for ConsoleLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.push(format!(
            "[{}] {} {}{}",
            secs,
            event.metadata().level(),
            visitor.message,
            visitor.fields
        ));
    }
}

/// Install the global subscriber: `RUST_LOG`-style filtering (falling back
/// to `default_filter`), formatted output and the console buffer.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(default_filter: &str, console: ConsoleLog) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(console)
        .try_init()
}
