//! In-process event dispatcher.
//!
//! The bus is built once at startup: handlers are registered on an
//! [`EventBusBuilder`] in the order they should run, then `build()`
//! freezes the registration table. After that the bus is immutable and
//! safe to share behind an `Arc`.
//!
//! `publish` invokes every handler registered for the event's exact
//! kind, in registration order. A handler failure is logged and never
//! prevents sibling handlers from running or the publisher from
//! returning.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::events::{Event, EventKind};

/// How the bus runs a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Run inline; the publisher waits for the handler to finish.
    Await,
    /// Fire-and-continue on a spawned task. Used by handlers that do
    /// network delivery and must not hold up the sweep.
    Spawn,
}

/// A subscriber on the event feed.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in log lines when the handler fails.
    fn name(&self) -> &'static str;

    fn mode(&self) -> DispatchMode {
        DispatchMode::Await
    }

    async fn handle(&self, event: &Event) -> Result<(), CoreError>;
}

/// Collects registrations, then freezes into an [`EventBus`].
#[derive(Default)]
pub struct EventBusBuilder {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl EventBusBuilder {
    pub fn register(mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.entry(kind).or_default().push(handler);
        self
    }

    /// Register one handler for every event kind.
    pub fn register_all(mut self, handler: Arc<dyn EventHandler>) -> Self {
        for kind in EventKind::ALL {
            self.handlers
                .entry(kind)
                .or_default()
                .push(Arc::clone(&handler));
        }
        self
    }

    pub fn build(self) -> EventBus {
        EventBus {
            handlers: self.handlers,
        }
    }
}

/// Frozen publish/subscribe dispatcher.
pub struct EventBus {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    /// Dispatch one event to its handlers in registration order.
    pub async fn publish(&self, event: &Event) {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            return;
        };
        for handler in handlers {
            match handler.mode() {
                DispatchMode::Await => {
                    if let Err(err) = handler.handle(event).await {
                        tracing::warn!(
                            handler = handler.name(),
                            kind = ?event.kind(),
                            %err,
                            "event handler failed"
                        );
                    }
                }
                DispatchMode::Spawn => {
                    let handler = Arc::clone(handler);
                    let event = event.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handler.handle(&event).await {
                            tracing::warn!(
                                handler = handler.name(),
                                kind = ?event.kind(),
                                %err,
                                "event handler failed"
                            );
                        }
                    });
                }
            }
        }
    }

    /// Dispatch a drained event buffer, preserving append order.
    pub async fn publish_all(&self, events: Vec<Event>) {
        for event in &events {
            self.publish(event).await;
        }
    }
}

/// Logs every event it sees. Registered for the whole feed so the
/// event stream shows up in the worker logs.
pub struct EventLogger;

#[async_trait]
impl EventHandler for EventLogger {
    fn name(&self) -> &'static str {
        "event-logger"
    }

    async fn handle(&self, event: &Event) -> Result<(), CoreError> {
        tracing::info!(kind = ?event.kind(), event = ?event, "event");
        Ok(())
    }
}
