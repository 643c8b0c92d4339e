use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// Broadcast publisher for application events.
///
/// Events are fire-and-forget: publishing with no subscribers is not an
/// error, and slow subscribers that lag past the channel capacity simply
/// miss older events.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event with the given name and context
    pub fn publish(&self, event_name: impl Into<String>, context: Value) {
        let event = PublishedEvent {
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };

        // send() errors only when there are no subscribers, which is fine here.
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event) {
            debug!(event = %event.name, "Event published with no subscribers");
        }
    }

    /// Publish an event after a delay, without blocking the caller.
    ///
    /// Used for the error-prompt broadcast, which must land after the alert
    /// side channel has had a chance to render.
    pub fn publish_delayed(&self, event_name: impl Into<String>, context: Value, delay: Duration) {
        let publisher = self.clone();
        let event_name = event_name.into();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            publisher.publish(event_name, context);
        });
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::events;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::default();
        publisher.publish(events::OPERATION_ERROR_PROMPT, json!({"operation": "bind"}));
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();

        publisher.publish(events::CALCULATION_RETRIGGER_REQUESTED, json!({}));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.name, events::CALCULATION_RETRIGGER_REQUESTED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_publish_waits_for_the_delay() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();

        publisher.publish_delayed(
            events::OPERATION_ERROR_PROMPT,
            json!({}),
            Duration::from_millis(500),
        );

        // Nothing lands before the delay has elapsed.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(
            receiver.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        tokio::time::sleep(Duration::from_millis(500)).await;
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.name, events::OPERATION_ERROR_PROMPT);
    }
}
