use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use circle_types::api::Claims;
use circle_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket may stay silent before identifying.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Answers "who are this user's friends" for presence fan-out. Called from
/// a blocking thread.
pub trait FriendDirectory: Send + Sync + 'static {
    fn friends_of(&self, user_id: Uuid) -> Vec<Uuid>;
}

/// Handle a single WebSocket connection: Identify handshake, then push
/// events addressed to the user until either side goes away.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    jwt_secret: String,
    directory: Arc<dyn FriendDirectory>,
) {
    let (mut sender, mut receiver) = socket.split();

    let (user_id, name) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", name, user_id);

    if !send_event(&mut sender, &GatewayEvent::Ready { user_id, name: name.clone() }).await {
        return;
    }

    let friends = tokio::task::spawn_blocking(move || directory.friends_of(user_id))
        .await
        .unwrap_or_else(|e| {
            warn!("Friend lookup for {} failed: {}", user_id, e);
            Vec::new()
        });

    let (conn_id, user_rx) = dispatcher.register_user_channel(user_id).await;

    // Tell this client which friends are already here, then announce ourselves
    for friend in dispatcher.user_online(user_id, &friends).await {
        if !send_event(&mut sender, &GatewayEvent::PresenceUpdate { user_id: friend, online: true }).await {
            dispatcher.user_offline(user_id, conn_id, &friends).await;
            return;
        }
    }

    run_connection_loop(sender, receiver, user_rx, &name, user_id).await;

    dispatcher.user_offline(user_id, conn_id, &friends).await;
    info!("{} ({}) disconnected from gateway", name, user_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut user_rx: tokio::sync::mpsc::UnboundedReceiver<GatewayEvent>,
    name: &str,
    user_id: Uuid,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = user_rx.recv() => {
                    let Some(event) = event else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let label = format!("{} ({})", name, user_id);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                Message::Text(text) => {
                    let preview: String = text.chars().take(200).collect();
                    warn!("{} sent unexpected command: {}", label, preview);
                }
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize gateway event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>, jwt_secret: &str) -> Option<(Uuid, String)> {
    let handshake = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) = serde_json::from_str::<GatewayCommand>(&text) {
                    let claims = verify_token(&token, jwt_secret)?;
                    return Some((claims.sub, claims.name));
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, handshake).await.ok().flatten()
}

fn verify_token(token: &str, jwt_secret: &str) -> Option<Claims> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}
