//! Logging setup and per-unit log capture.
//!
//! Three layers are installed on one registry:
//! - a colored stderr layer filtered by `RUST_LOG` (default `info`)
//! - a plain-text file layer appending to the run log
//! - [`CaptureLayer`], which copies INFO+ events into a thread-local buffer
//!   while [`capture`] is active and keeps process-wide counters
//!
//! Transforms run inside `capture`, which is how each transformation record
//! gets its own console log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt::{self, Write as _};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    pub rendered_message: String,
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageType,
}

impl LogMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            rendered_message: message.into(),
            timestamp: Utc::now(),
            message_type: MessageType::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.message_type == MessageType::Error
    }

    /// One line of a `console.log` file.
    pub fn to_line(&self) -> String {
        let tag = match self.message_type {
            MessageType::Info => "INFO",
            MessageType::Error => "ERROR",
        };
        format!("[{}] [{}] {}", self.timestamp.to_rfc3339(), tag, self.rendered_message)
    }
}

static INFO_COUNT: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNT: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static CAPTURED: RefCell<Option<Vec<LogMessage>>> = const { RefCell::new(None) };
}

/// Number of INFO-or-above events seen since start.
pub fn info_count() -> u64 {
    INFO_COUNT.load(Ordering::Relaxed)
}

/// Number of ERROR events seen since start.
pub fn error_count() -> u64 {
    ERROR_COUNT.load(Ordering::Relaxed)
}

/// Run `f`, returning every INFO+ event it emitted on this thread.
///
/// Nested captures are isolated: the inner call gets only its own messages
/// and the outer buffer resumes afterwards.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<LogMessage>) {
    let saved = CAPTURED.with(|slot| slot.replace(Some(Vec::new())));
    let result = f();
    let messages = CAPTURED.with(|slot| slot.replace(saved)).unwrap_or_default();
    (result, messages)
}

pub struct CaptureLayer;

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::INFO {
            return;
        }
        let message_type = if level == Level::ERROR {
            ERROR_COUNT.fetch_add(1, Ordering::Relaxed);
            MessageType::Error
        } else {
            INFO_COUNT.fetch_add(1, Ordering::Relaxed);
            MessageType::Info
        };

        CAPTURED.with(|slot| {
            if let Some(buffer) = slot.borrow_mut().as_mut() {
                let mut visitor = MessageVisitor::default();
                event.record(&mut visitor);
                buffer.push(LogMessage {
                    rendered_message: visitor.finish(),
                    timestamp: Utc::now(),
                    message_type,
                });
            }
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.record_debug(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            if !self.fields.is_empty() {
                self.fields.push(' ');
            }
            let _ = write!(self.fields, "{}={:?}", field.name(), value);
        }
    }
}

/// Install the global subscriber. Call once, before any work starts.
pub fn init(log_file: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(CaptureLayer.with_filter(LevelFilter::INFO))
        .try_init()?;
    Ok(())
}
