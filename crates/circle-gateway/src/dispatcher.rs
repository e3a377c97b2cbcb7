use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use circle_types::events::GatewayEvent;

/// Routes events to connected users. A user is online while they hold a
/// registered channel; a newer connection replaces an older one.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// Per-user targeted send channels: user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    pub async fn register_user_channel(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.user_channels.write().await.insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches.
    /// Returns true if the channel was removed.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut channels = self.inner.user_channels.write().await;
        match channels.get(&user_id) {
            Some((stored_conn_id, _)) if *stored_conn_id == conn_id => {
                channels.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Send a targeted event to a specific user. Returns false if they are
    /// not connected.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let channels = self.inner.user_channels.read().await;
        match channels.get(&user_id) {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.user_channels.read().await.contains_key(&user_id)
    }

    /// Tell every online friend that `user_id` came online. Returns the
    /// friends that are online right now.
    pub async fn user_online(&self, user_id: Uuid, friends: &[Uuid]) -> Vec<Uuid> {
        let mut online = Vec::new();
        for &friend in friends {
            if self.send_to_user(friend, GatewayEvent::PresenceUpdate { user_id, online: true }).await {
                online.push(friend);
            }
        }
        online
    }

    /// Drop the user's channel and tell their friends, unless a newer
    /// connection has already taken over.
    pub async fn user_offline(&self, user_id: Uuid, conn_id: Uuid, friends: &[Uuid]) {
        if !self.unregister_user_channel(user_id, conn_id).await {
            return;
        }

        for &friend in friends {
            self.send_to_user(friend, GatewayEvent::PresenceUpdate { user_id, online: false })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_targeted_delivery() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (_, mut rx) = dispatcher.register_user_channel(alice).await;
        assert!(dispatcher.is_online(alice).await);
        assert!(!dispatcher.is_online(bob).await);

        assert!(
            dispatcher
                .send_to_user(alice, GatewayEvent::PresenceUpdate { user_id: bob, online: true })
                .await
        );
        assert!(
            !dispatcher
                .send_to_user(bob, GatewayEvent::PresenceUpdate { user_id: alice, online: true })
                .await
        );

        match rx.recv().await {
            Some(GatewayEvent::PresenceUpdate { user_id, online }) => {
                assert_eq!(user_id, bob);
                assert!(online);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stale_connection_does_not_unregister_newer_one() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();

        let (old_conn, _old_rx) = dispatcher.register_user_channel(alice).await;
        let (_new_conn, _new_rx) = dispatcher.register_user_channel(alice).await;

        dispatcher.user_offline(alice, old_conn, &[]).await;
        assert!(dispatcher.is_online(alice).await);
    }

    #[tokio::test]
    async fn test_presence_reaches_online_friends_only() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let carol = Uuid::new_v4();

        let (_, mut bob_rx) = dispatcher.register_user_channel(bob).await;
        let (alice_conn, _alice_rx) = dispatcher.register_user_channel(alice).await;

        let online = dispatcher.user_online(alice, &[bob, carol]).await;
        assert_eq!(online, vec![bob]);
        assert!(matches!(
            bob_rx.recv().await,
            Some(GatewayEvent::PresenceUpdate { online: true, .. })
        ));

        dispatcher.user_offline(alice, alice_conn, &[bob, carol]).await;
        assert!(matches!(
            bob_rx.recv().await,
            Some(GatewayEvent::PresenceUpdate { online: false, .. })
        ));
        assert!(!dispatcher.is_online(alice).await);
    }
}
