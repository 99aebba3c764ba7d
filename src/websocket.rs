use crate::error::{AppError, AppResult};
use crate::models::{Dispute, EscrowRecord, Match};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// WebSocket message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "subscribe")]
    Subscribe {
        channel: String, // "match:{id}" or "user:{id}"
    },
    #[serde(rename = "unsubscribe")]
    Unsubscribe {
        channel: String,
    },
    #[serde(rename = "match_status_changed")]
    MatchStatusChanged {
        match_id: String,
        status: String,
        previous_status: Option<String>,
        label: String,
        timestamp: i64,
    },
    #[serde(rename = "escrow_updated")]
    EscrowUpdated {
        match_id: String,
        escrow_id: String,
        status: String,
        amount: Decimal,
        timestamp: i64,
    },
    #[serde(rename = "dispute_updated")]
    DisputeUpdated {
        dispute_id: String,
        match_id: String,
        status: String,
        resolution: Option<String>,
        timestamp: i64,
    },
    #[serde(rename = "error")]
    Error {
        message: String,
    },
}

/// A message addressed to one channel
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub channel: String,
    pub message: WsMessage,
}

pub fn match_channel(match_id: Uuid) -> String {
    format!("match:{}", match_id)
}

pub fn user_channel(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

/// Only `match:{uuid}` and `user:{uuid}` channels exist
pub fn is_valid_channel(channel: &str) -> bool {
    match channel.split_once(':') {
        Some(("match", id)) | Some(("user", id)) => Uuid::parse_str(id).is_ok(),
        _ => false,
    }
}

/// WebSocket server for real-time match updates
pub struct WebSocketServer {
    /// Fan-out of every published message; each connection filters by channel
    tx: broadcast::Sender<ChannelMessage>,
    /// Active subscriptions: channel -> client IDs
    subscriptions: Arc<RwLock<HashMap<String, HashSet<Uuid>>>>,
    /// Client subscriptions: client_id -> channels
    client_channels: Arc<RwLock<HashMap<Uuid, HashSet<String>>>>,
}

impl WebSocketServer {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000); // Buffer up to 1000 messages

        Self {
            tx,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            client_channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Receiver for every published message
    pub fn receiver(&self) -> broadcast::Receiver<ChannelMessage> {
        self.tx.subscribe()
    }

    /// Publish a message to the subscribers of a channel
    pub async fn broadcast_to_channel(&self, channel: &str, message: WsMessage) {
        let subscribers = self
            .subscriptions
            .read()
            .await
            .get(channel)
            .map(|s| s.len())
            .unwrap_or(0);
        if subscribers == 0 {
            return;
        }

        debug!("Broadcasting to {} subscribers on channel {}", subscribers, channel);
        let envelope = ChannelMessage {
            channel: channel.to_string(),
            message,
        };
        if let Err(e) = self.tx.send(envelope) {
            warn!("Failed to broadcast message: {}", e);
        }
    }

    pub async fn subscribe(&self, client_id: Uuid, channel: String) {
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        subscriptions
            .entry(channel.clone())
            .or_default()
            .insert(client_id);
        client_channels
            .entry(client_id)
            .or_default()
            .insert(channel.clone());

        info!("Client {} subscribed to {}", client_id, channel);
    }

    pub async fn unsubscribe(&self, client_id: Uuid, channel: &str) {
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        if let Some(subscribers) = subscriptions.get_mut(channel) {
            subscribers.remove(&client_id);
            if subscribers.is_empty() {
                subscriptions.remove(channel);
            }
        }
        if let Some(channels) = client_channels.get_mut(&client_id) {
            channels.remove(channel);
        }

        info!("Client {} unsubscribed from {}", client_id, channel);
    }

    /// Drop every subscription of a disconnected client
    pub async fn disconnect(&self, client_id: Uuid) {
        let channels = self
            .client_channels
            .write()
            .await
            .remove(&client_id)
            .unwrap_or_default();

        let mut subscriptions = self.subscriptions.write().await;
        for channel in channels {
            if let Some(subscribers) = subscriptions.get_mut(&channel) {
                subscribers.remove(&client_id);
                if subscribers.is_empty() {
                    subscriptions.remove(&channel);
                }
            }
        }
    }

    pub async fn get_client_channels(&self, client_id: Uuid) -> Vec<String> {
        let client_channels = self.client_channels.read().await;
        let mut channels: Vec<String> = client_channels
            .get(&client_id)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default();
        channels.sort();
        channels
    }

    pub async fn is_client_subscribed(&self, client_id: Uuid, channel: &str) -> bool {
        let subscriptions = self.subscriptions.read().await;
        subscriptions
            .get(channel)
            .map(|s| s.contains(&client_id))
            .unwrap_or(false)
    }

    /// Handle a new WebSocket connection
    pub async fn handle_connection(&self, stream: tokio::net::TcpStream) -> AppResult<()> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| AppError::Message(format!("WebSocket handshake failed: {}", e)))?;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut rx = self.tx.subscribe();
        let client_id = Uuid::new_v4();

        info!("New WebSocket connection: {}", client_id);

        let welcome = serde_json::json!({
            "type": "connected",
            "client_id": client_id.to_string(),
            "message": "Connected to Airbar WebSocket server"
        });
        if let Err(e) = ws_sender.send(Message::Text(welcome.to_string())).await {
            warn!("Failed to send welcome message: {}", e);
        }

        let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));
        let ws_sender_for_receiver = ws_sender.clone();
        let ws_server_for_receiver = self.clone();

        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let reply = match serde_json::from_str::<WsMessage>(&text) {
                            Ok(WsMessage::Subscribe { channel }) if is_valid_channel(&channel) => {
                                ws_server_for_receiver
                                    .subscribe(client_id, channel.clone())
                                    .await;
                                serde_json::json!({ "type": "subscribed", "channel": channel })
                            }
                            Ok(WsMessage::Unsubscribe { channel }) => {
                                ws_server_for_receiver.unsubscribe(client_id, &channel).await;
                                serde_json::json!({ "type": "unsubscribed", "channel": channel })
                            }
                            Ok(WsMessage::Subscribe { channel }) => {
                                warn!("Client {} asked for unknown channel {}", client_id, channel);
                                serde_json::json!({ "type": "error", "message": "Unknown channel" })
                            }
                            Ok(_) => {
                                warn!("Unexpected message type from client {}", client_id);
                                serde_json::json!({ "type": "error", "message": "Unexpected message type" })
                            }
                            Err(_) => {
                                warn!("Failed to parse message from client {}: {}", client_id, text);
                                serde_json::json!({ "type": "error", "message": "Invalid message format" })
                            }
                        };

                        let mut sender = ws_sender_for_receiver.lock().await;
                        if let Err(e) = sender.send(Message::Text(reply.to_string())).await {
                            warn!("Failed to reply to client {}: {}", client_id, e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("WebSocket connection closed: {}", client_id);
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            ws_server_for_receiver.disconnect(client_id).await;
        });

        let ws_server_for_broadcast = self.clone();
        tokio::spawn(async move {
            loop {
                let envelope = match rx.recv().await {
                    Ok(envelope) => envelope,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {} lagged, skipped {} messages", client_id, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if !ws_server_for_broadcast
                    .is_client_subscribed(client_id, &envelope.channel)
                    .await
                {
                    continue;
                }

                let json = match serde_json::to_string(&envelope.message) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };

                let mut sender = ws_sender.lock().await;
                if let Err(e) = sender.send(Message::Text(json)).await {
                    debug!("Stopped forwarding to client {}: {}", client_id, e);
                    break;
                }
            }
        });

        Ok(())
    }

    /// Notify both parties and match watchers of a status change
    pub async fn broadcast_match_status(&self, updated: &Match, previous: Option<&str>) {
        let status = updated.status_enum();
        let message = WsMessage::MatchStatusChanged {
            match_id: updated.id.to_string(),
            status: status.as_str().to_string(),
            previous_status: previous.map(str::to_string),
            label: status.label().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        self.broadcast_to_channel(&match_channel(updated.id), message.clone())
            .await;
        self.broadcast_to_channel(&user_channel(updated.sender_id), message.clone())
            .await;
        self.broadcast_to_channel(&user_channel(updated.traveler_id), message)
            .await;
    }

    pub async fn broadcast_escrow_updated(&self, escrow: &EscrowRecord) {
        let message = WsMessage::EscrowUpdated {
            match_id: escrow.match_id.to_string(),
            escrow_id: escrow.id.to_string(),
            status: escrow.status.clone(),
            amount: escrow.amount,
            timestamp: chrono::Utc::now().timestamp(),
        };

        self.broadcast_to_channel(&match_channel(escrow.match_id), message.clone())
            .await;
        self.broadcast_to_channel(&user_channel(escrow.sender_id), message.clone())
            .await;
        self.broadcast_to_channel(&user_channel(escrow.traveler_id), message)
            .await;
    }

    pub async fn broadcast_dispute_updated(&self, dispute: &Dispute, parties: [Uuid; 2]) {
        let message = WsMessage::DisputeUpdated {
            dispute_id: dispute.id.to_string(),
            match_id: dispute.match_id.to_string(),
            status: dispute.status.clone(),
            resolution: dispute.resolution.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        self.broadcast_to_channel(&match_channel(dispute.match_id), message.clone())
            .await;
        for party in parties {
            self.broadcast_to_channel(&user_channel(party), message.clone())
                .await;
        }
    }
}

impl Clone for WebSocketServer {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            subscriptions: Arc::clone(&self.subscriptions),
            client_channels: Arc::clone(&self.client_channels),
        }
    }
}

impl Default for WebSocketServer {
    fn default() -> Self {
        Self::new()
    }
}
