use crate::domain::event::{DomainEvent, EventKind};
use crate::domain::ports::EventPublisher;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// A side effect run for every published event of the kinds it is subscribed to.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, event: &DomainEvent) -> Result<()>;
}

/// Publish/subscribe registry assembled once at startup.
///
/// Handlers run in registration order. A failing handler is logged and the
/// remaining handlers still run: by the time an event is published the
/// settlement that caused it is already committed.
#[derive(Default, Clone)]
pub struct EventBus {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.entry(kind).or_default().push(handler);
        self
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            return Ok(());
        };
        for handler in handlers {
            if let Err(e) = handler.handle(&event).await {
                error!(handler = handler.name(), ?event, error = %e, "event handler failed");
            }
        }
        Ok(())
    }
}

/// Writes every event it sees to the log.
pub struct LogEventHandler;

#[async_trait]
impl EventHandler for LogEventHandler {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        info!(order = event.order_reference(), ?event, "domain event published");
        Ok(())
    }
}

/// Keeps every event it sees, for inspection by callers and tests.
#[derive(Default, Clone)]
pub struct RecordingEventHandler {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl RecordingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventHandler for RecordingEventHandler {
    fn name(&self) -> &str {
        "recording"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
