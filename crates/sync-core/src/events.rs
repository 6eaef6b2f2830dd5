use model::events::Event;
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

// Event TypeId -> senders of every live subscriber for that type.
type Subscribers = Arc<RwLock<HashMap<TypeId, Vec<Box<dyn Any + Send + Sync>>>>>;

/// Typed publish/subscribe fabric connecting the queue, the workers and the
/// supervisor. Publishing never blocks; a subscriber that cannot keep up
/// loses events with a warning.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Subscribers,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber for events of type `E` and returns its
    /// receiving end. Dropping the receiver ends the subscription.
    pub async fn subscribe<E>(&self, capacity: usize) -> mpsc::Receiver<Arc<E>>
    where
        E: Event,
    {
        let (tx, rx) = mpsc::channel::<Arc<E>>(capacity.max(1));

        let mut subscribers = self.subscribers.write().await;
        subscribers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Box::new(tx));

        debug!(event_type = std::any::type_name::<E>(), "subscribed");
        rx
    }

    pub async fn publish<E>(&self, event: E)
    where
        E: Event,
    {
        let event = Arc::new(event);
        let mut subscribers = self.subscribers.write().await;

        let Some(senders) = subscribers.get_mut(&TypeId::of::<E>()) else {
            return;
        };

        senders.retain(|boxed| {
            let Some(sender) = boxed.downcast_ref::<mpsc::Sender<Arc<E>>>() else {
                warn!(
                    event_type = std::any::type_name::<E>(),
                    "failed to downcast subscriber sender"
                );
                return false;
            };

            match sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        event_type = std::any::type_name::<E>(),
                        "dropped event for slow subscriber (channel full)"
                    );
                    true
                }
                // Receiver dropped: forget the subscription.
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    pub async fn subscriber_count<E>(&self) -> usize
    where
        E: Event,
    {
        let subscribers = self.subscribers.read().await;
        subscribers
            .get(&TypeId::of::<E>())
            .map(|senders| senders.len())
            .unwrap_or(0)
    }
}
