//! Event Bus (spec §4.3): in-process typed pub/sub. Fan-out to all
//! subscribers; a failing handler never blocks or fails the others;
//! dispatch runs under a bounded concurrency budget. Every event's
//! `correlation_id` propagates unchanged so cascades can be traced end to
//! end.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use forge_primitives::BusEvent;
use tokio::sync::Semaphore;

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &BusEvent) -> Result<(), String>;
}

pub struct EventBus {
    subscribers: DashMap<String, Vec<Arc<dyn EventHandler>>>,
    fan_out_budget: Arc<Semaphore>,
}

impl EventBus {
    pub fn new(max_concurrent_handlers: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            fan_out_budget: Arc::new(Semaphore::new(max_concurrent_handlers.max(1))),
        }
    }

    pub fn subscribe(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.subscribers
            .entry(event_type.into())
            .or_default()
            .push(handler);
    }

    /// Fan out to every subscriber of `event.event_type`, each call isolated
    /// from the others; per-subscriber delivery order matches publication
    /// order since this awaits the whole fan-out before returning.
    pub async fn publish(&self, event: BusEvent) {
        let Some(handlers) = self.subscribers.get(&event.event_type) else {
            return;
        };
        let handlers: Vec<_> = handlers.clone();

        let mut tasks = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let permit = self.fan_out_budget.clone().acquire_owned().await.ok();
            let event = event.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) = handler.handle(&event).await {
                    tracing::warn!(event_type = %event.event_type, error = %err, "event handler failed");
                }
            }));
        }

        for task in tasks {
            let _ = task.await;
        }
    }
}
