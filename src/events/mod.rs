use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain notifications emitted by the order engine. Consumers are
/// in-process (the logging drain in `main`); cross-record consistency
/// never depends on these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        order_number: String,
        workspace_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OnboardingCompleted {
        order_id: Uuid,
    },
    OrderFulfilled {
        order_id: Uuid,
        domains: usize,
        mailboxes: usize,
        personas: usize,
        subscription: bool,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. A full or closed channel is an
    /// observability gap, not a business failure; callers decide whether
    /// to surface it.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates an event channel plus a drain task that logs everything it
/// receives. Returns the sender and the drain handle.
pub fn spawn_event_logger(buffer: usize) -> (EventSender, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(buffer);
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            info!(?event, "domain event");
        }
    });
    (EventSender::new(tx), handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_events() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender
            .send(Event::OnboardingCompleted {
                order_id: Uuid::new_v4(),
            })
            .await
            .expect("send should succeed");

        let received = rx.recv().await.expect("event expected");
        assert!(matches!(received, Event::OnboardingCompleted { .. }));
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        let result = sender
            .send(Event::OnboardingCompleted {
                order_id: Uuid::new_v4(),
            })
            .await;
        assert!(result.is_err());
    }
}
