//! Broadcast event bus implementing the [`EventSink`] port.
//!
//! Every published event gets a sequence number, is logged, kept in a bounded
//! history and fanned out to subscribers. Publishing never fails; with no
//! subscribers the broadcast is simply dropped.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};

use crate::domain::models::{OrchestratorEvent, ProjectId};
use crate::domain::ports::EventSink;

/// An event with its bus-assigned sequence number.
#[derive(Debug, Clone, Serialize)]
pub struct SequencedEvent {
    pub sequence: u64,
    #[serde(flatten)]
    pub event: OrchestratorEvent,
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast channel.
    pub channel_capacity: usize,
    /// Events retained for `history`.
    pub history_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            history_capacity: 512,
        }
    }
}

pub struct EventBus {
    sender: broadcast::Sender<SequencedEvent>,
    sequence: AtomicU64,
    history: RwLock<VecDeque<SequencedEvent>>,
    config: EventBusConfig,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
            history: RwLock::new(VecDeque::with_capacity(config.history_capacity)),
            config,
        }
    }

    /// Publish an event.
    pub async fn publish(&self, event: OrchestratorEvent) {
        log_event(&event);

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let sequenced = SequencedEvent { sequence, event };

        if self.config.history_capacity > 0 {
            let mut history = self.history.write().await;
            if history.len() >= self.config.history_capacity {
                history.pop_front();
            }
            history.push_back(sequenced.clone());
        }

        // No subscribers is fine
        let _ = self.sender.send(sequenced);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SequencedEvent> {
        self.sender.subscribe()
    }

    /// Retained events, oldest first, optionally for one project.
    pub async fn history(&self, project_id: Option<ProjectId>) -> Vec<OrchestratorEvent> {
        let history = self.history.read().await;
        history
            .iter()
            .filter(|e| project_id.map_or(true, |id| e.event.project_id() == id))
            .map(|e| e.event.clone())
            .collect()
    }

    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn emit(&self, event: OrchestratorEvent) {
        self.publish(event).await;
    }
}

fn log_event(event: &OrchestratorEvent) {
    let project_id = event.project_id();
    match event {
        OrchestratorEvent::Started { interval_ms, .. } => {
            tracing::info!(project_id = %project_id, interval_ms, "Continuous builds started");
        }
        OrchestratorEvent::Stopped { reason, .. } => {
            tracing::info!(project_id = %project_id, reason = %reason, "Continuous builds stopped");
        }
        OrchestratorEvent::BuildCompleted {
            build_number,
            success,
            error_count,
            fixed_from_pattern,
            ..
        } => {
            tracing::info!(
                project_id = %project_id,
                build_number,
                success,
                error_count,
                fixed_from_pattern,
                "Build completed"
            );
        }
        OrchestratorEvent::Error {
            message,
            classification,
            ..
        } => {
            tracing::warn!(
                project_id = %project_id,
                classification = %classification,
                "Build cycle error: {}",
                message
            );
        }
        OrchestratorEvent::CircuitTripped {
            failure_count,
            retry_after_secs,
            ..
        } => {
            tracing::error!(
                project_id = %project_id,
                failure_count,
                retry_after_secs,
                "Circuit breaker tripped, automatic builds suspended"
            );
        }
        OrchestratorEvent::WatchdogRestart {
            stalled_for_secs,
            success,
            ..
        } => {
            tracing::warn!(
                project_id = %project_id,
                stalled_for_secs,
                success,
                "Watchdog restarted stalled project"
            );
        }
    }
}
