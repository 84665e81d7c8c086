//! Collaborator interfaces consumed by the pipeline
//!
//! The core never talks to the OS notifier, the on-disk log store, or the
//! error reporter directly; it hands events to these traits. Delivery is
//! fire-and-forget and persistence is an ordered, non-blocking queue; the
//! pipeline does not wait for durable writes before the next line.

use crate::error::{Result, TermpulseError};
use crate::events::{NotificationEvent, ParsedLogEntry};
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

/// How bad an error reported through [`ErrorSink`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Ordered, at-least-once persistence of parsed entries.
pub trait PersistenceSink: Send + Sync {
    /// Queue an entry for storage. Must not block on I/O.
    fn append_entry(&self, entry: ParsedLogEntry);

    /// Best-effort flush of queued entries; bounded wait, may time out.
    fn flush(&self);
}

/// Fire-and-forget notification delivery.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, event: NotificationEvent);
}

/// Error reporting; the pipeline reports and continues, never crashes.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &TermpulseError, context: &str, severity: Severity);
}

enum WriterMessage {
    Entry(Box<ParsedLogEntry>),
    Flush(mpsc::Sender<()>),
}

/// Appends parsed entries as JSON lines through a dedicated writer thread,
/// preserving arrival order without ever blocking the pipeline worker.
pub struct JsonlPersistenceSink {
    tx: mpsc::Sender<WriterMessage>,
}

impl JsonlPersistenceSink {
    /// Fatal only when the parent directory cannot be created; that is the
    /// one startup error surfaced to the operator.
    pub fn create(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TermpulseError::Io {
                source: e,
                context: format!("Failed to create storage directory: {}", parent.display()),
            })?;
        }

        let (tx, rx) = mpsc::channel::<WriterMessage>();
        std::thread::Builder::new()
            .name("termpulse-persist".to_string())
            .spawn(move || writer_loop(path, rx))
            .map_err(|e| TermpulseError::Io {
                source: e,
                context: "Failed to spawn persistence writer thread".to_string(),
            })?;

        Ok(Self { tx })
    }
}

fn writer_loop(path: PathBuf, rx: mpsc::Receiver<WriterMessage>) {
    let file = match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Persistence file unavailable");
            // Drain so senders never block; entries are lost, which the
            // at-least-once contract tolerates across failures
            for _ in rx {}
            return;
        }
    };
    let mut writer = std::io::BufWriter::new(file);

    for message in rx {
        match message {
            WriterMessage::Entry(entry) => match serde_json::to_string(&entry) {
                Ok(json) => {
                    if let Err(e) = writeln!(writer, "{}", json) {
                        tracing::warn!(error = %e, "Failed to persist entry");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to serialize entry"),
            },
            WriterMessage::Flush(ack) => {
                if let Err(e) = writer.flush() {
                    tracing::warn!(error = %e, "Persistence flush failed");
                }
                let _ = ack.send(());
            }
        }
    }
    let _ = writer.flush();
}

impl PersistenceSink for JsonlPersistenceSink {
    fn append_entry(&self, entry: ParsedLogEntry) {
        let _ = self.tx.send(WriterMessage::Entry(Box::new(entry)));
    }

    fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.tx.send(WriterMessage::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv_timeout(Duration::from_millis(500));
        }
    }
}

/// Logs delivered notifications; stands in for a native notifier.
#[derive(Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn deliver(&self, event: NotificationEvent) {
        tracing::info!(
            category = ?event.category,
            title = %event.title,
            confidence = event.confidence,
            "{}",
            event.message
        );
    }
}

/// Logs reported errors; stands in for a telemetry/error-reporting service.
#[derive(Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: &TermpulseError, context: &str, severity: Severity) {
        match severity {
            Severity::Info => tracing::info!(context, "{}", error),
            Severity::Warning => tracing::warn!(context, "{}", error),
            Severity::Error => tracing::error!(context, "{}", error),
        }
    }
}
