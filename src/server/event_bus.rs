//! Event bus: bounded channels carrying server-originated notifications
//! from plugin code to the router's fan-out tasks.
//!
//! Channels are kept separate per notification kind so each keeps its own
//! type and its own backpressure. A full channel blocks the producer; events
//! are never dropped silently.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{McpError, McpResult};
use crate::protocol::lifecycle::ProgressNotification;
use crate::protocol::logging::{LoggingLevel, LoggingMessageNotification};
use crate::protocol::prompts::PromptListChangedNotification;
use crate::protocol::resources::{ResourceListChangedNotification, ResourceUpdatedNotification};
use crate::protocol::tools::ToolListChangedNotification;

/// Capacity of each event-bus channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Producer handle for one event kind.
pub type EventSender<T> = mpsc::Sender<T>;

/// Cloneable set of producer handles given to plugin code.
#[derive(Clone)]
pub struct EventSink {
    pub tool_list_changed: EventSender<ToolListChangedNotification>,
    pub resource_list_changed: EventSender<ResourceListChangedNotification>,
    pub resource_updated: EventSender<ResourceUpdatedNotification>,
    pub prompt_list_changed: EventSender<PromptListChangedNotification>,
    pub logging_message: EventSender<LoggingMessageNotification>,
    pub progress: EventSender<ProgressNotification>,
}

/// Consumer side of the bus, drained by the router's fan-out tasks.
pub struct EventStreams {
    pub(crate) tool_list_changed: mpsc::Receiver<ToolListChangedNotification>,
    pub(crate) resource_list_changed: mpsc::Receiver<ResourceListChangedNotification>,
    pub(crate) resource_updated: mpsc::Receiver<ResourceUpdatedNotification>,
    pub(crate) prompt_list_changed: mpsc::Receiver<PromptListChangedNotification>,
    pub(crate) logging_message: mpsc::Receiver<LoggingMessageNotification>,
    pub(crate) progress: mpsc::Receiver<ProgressNotification>,
}

/// Create the bus: one bounded channel per notification kind.
pub fn event_bus() -> (EventSink, EventStreams) {
    let (tool_tx, tool_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (res_list_tx, res_list_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (res_upd_tx, res_upd_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (prompt_tx, prompt_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (log_tx, log_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (progress_tx, progress_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    (
        EventSink {
            tool_list_changed: tool_tx,
            resource_list_changed: res_list_tx,
            resource_updated: res_upd_tx,
            prompt_list_changed: prompt_tx,
            logging_message: log_tx,
            progress: progress_tx,
        },
        EventStreams {
            tool_list_changed: tool_rx,
            resource_list_changed: res_list_rx,
            resource_updated: res_upd_rx,
            prompt_list_changed: prompt_rx,
            logging_message: log_rx,
            progress: progress_rx,
        },
    )
}

/// Publishes `notifications/message` packets, filtered by the minimum level
/// the client asked for via `logging/setLevel`.
#[derive(Clone)]
pub struct LogSender {
    min_severity: Arc<AtomicU8>,
    sink: EventSender<LoggingMessageNotification>,
}

impl LogSender {
    pub(crate) fn new(
        min_severity: Arc<AtomicU8>,
        sink: EventSender<LoggingMessageNotification>,
    ) -> Self {
        Self { min_severity, sink }
    }

    /// Current threshold level.
    pub fn min_level(&self) -> LoggingLevel {
        LoggingLevel::from_severity(self.min_severity.load(Ordering::Relaxed))
            .unwrap_or(LoggingLevel::Info)
    }

    /// Queue a log message for the client. Messages below the threshold are
    /// discarded; a full bus channel blocks.
    pub async fn send(
        &self,
        level: LoggingLevel,
        logger: Option<String>,
        data: Value,
    ) -> McpResult<()> {
        if level.severity() < self.min_severity.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.sink
            .send(LoggingMessageNotification {
                level,
                logger,
                data,
            })
            .await
            .map_err(|_| McpError::ConnectionClosed)
    }

    pub async fn debug(&self, logger: impl Into<String>, data: Value) -> McpResult<()> {
        self.send(LoggingLevel::Debug, Some(logger.into()), data).await
    }

    pub async fn info(&self, logger: impl Into<String>, data: Value) -> McpResult<()> {
        self.send(LoggingLevel::Info, Some(logger.into()), data).await
    }

    pub async fn warning(&self, logger: impl Into<String>, data: Value) -> McpResult<()> {
        self.send(LoggingLevel::Warning, Some(logger.into()), data).await
    }

    pub async fn error(&self, logger: impl Into<String>, data: Value) -> McpResult<()> {
        self.send(LoggingLevel::Error, Some(logger.into()), data).await
    }
}
