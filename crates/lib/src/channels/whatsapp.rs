//! WhatsApp session: JSON-frame WebSocket client to the protocol gateway
//! daemon.
//!
//! The gateway owns the actual mobile protocol stack (auth handshake,
//! encryption, keepalive); this connector authenticates with the account
//! credentials, pumps inbound frames, acknowledges every message and
//! receipt, and drains a bounded queue of outbound sends so the opposite
//! session never blocks on this socket beyond an enqueue.

use crate::channels::backoff::Backoff;
use crate::channels::inbound::{InboundEvent, MobileContent, MobileMessage};
use crate::channels::outbound::MobileOutbound;
use async_trait::async_trait;
use base64::Engine;
use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

/// Status line announced once per successful connect.
const STATUS_TEXT: &str = "- Connects WhatsApp and Slack -";

/// Outbound queue depth; sends beyond this apply backpressure to the
/// dispatcher instead of buffering without bound.
const SEND_QUEUE_DEPTH: usize = 64;

/// Errors from the gateway connection.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("whatsapp authentication failed: {0}")]
    Auth(String),
    #[error("whatsapp gateway connect failed: {0}")]
    Connect(String),
    #[error("whatsapp gateway socket error: {0}")]
    Socket(String),
    #[error("whatsapp gateway closed the connection")]
    Closed,
}

/// Frames sent to the gateway.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum GatewayCommand<'a> {
    Connect { number: &'a str, password: &'a str },
    Send { to: &'a str, body: &'a str },
    Ack { id: &'a str, read: bool },
    Status { text: &'a str },
}

/// Frames delivered by the gateway. Unknown types fold into `Other`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GatewayEvent {
    /// Authentication succeeded; the session is live.
    Success,
    /// Authentication or protocol failure; the gateway drops the session.
    Failure {
        #[serde(default)]
        reason: String,
    },
    Message {
        id: String,
        /// Conversation the message arrived in (group or contact JID).
        from: String,
        /// Sender within a group conversation; absent for 1:1 chats.
        #[serde(default)]
        author: Option<String>,
        /// "text", "media", or another protocol kind.
        kind: String,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        media_kind: Option<String>,
        /// Base64 media payload for media messages.
        #[serde(default)]
        data: Option<String>,
    },
    Receipt {
        id: String,
        from: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug)]
enum Outgoing {
    Text { to: String, body: String },
}

/// Cloneable send handle for the dispatcher. Queues onto the session's
/// bounded outbound queue.
#[derive(Clone)]
pub struct WhatsappHandle {
    tx: mpsc::Sender<Outgoing>,
}

#[async_trait]
impl MobileOutbound for WhatsappHandle {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), String> {
        self.tx
            .send(Outgoing::Text {
                to: to.to_string(),
                body: text.to_string(),
            })
            .await
            .map_err(|_| "whatsapp session not running".to_string())
    }
}

/// WhatsApp session connector: owns the gateway connection lifecycle and
/// reconnects forever with bounded backoff until shutdown.
pub struct WhatsappSession {
    gateway_url: String,
    number: String,
    password: String,
    inbound_tx: mpsc::Sender<InboundEvent>,
    outgoing_rx: mpsc::Receiver<Outgoing>,
    shutdown: watch::Receiver<bool>,
    backoff: Backoff,
}

impl WhatsappSession {
    /// Build the session and its send handle.
    pub fn new(
        gateway_url: String,
        number: String,
        password: String,
        inbound_tx: mpsc::Sender<InboundEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, WhatsappHandle) {
        let (tx, outgoing_rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        let session = Self {
            gateway_url,
            number,
            password,
            inbound_tx,
            outgoing_rx,
            shutdown,
            backoff: Backoff::new(),
        };
        (session, WhatsappHandle { tx })
    }

    pub async fn run(mut self) {
        log::info!("whatsapp session: starting");
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            match self.connect_and_pump().await {
                Ok(()) => break,
                Err(e @ GatewayError::Auth(_)) => log::warn!("{}", e),
                Err(e) => log::warn!("whatsapp session error: {}", e),
            }
            let delay = self.backoff.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => {}
            }
        }
        log::info!("whatsapp session: stopped");
    }

    /// One connected lifetime. Ok(()) means shutdown was requested.
    async fn connect_and_pump(&mut self) -> Result<(), GatewayError> {
        let (ws, _) = tokio_tungstenite::connect_async(&self.gateway_url)
            .await
            .map_err(|e| GatewayError::Connect(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        send_command(
            &mut sink,
            &GatewayCommand::Connect {
                number: &self.number,
                password: &self.password,
            },
        )
        .await?;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        return Ok(());
                    }
                }
                outgoing = self.outgoing_rx.recv() => {
                    match outgoing {
                        Some(Outgoing::Text { to, body }) => {
                            send_command(&mut sink, &GatewayCommand::Send { to: &to, body: &body }).await?;
                        }
                        // All handles dropped; the bridge is going away.
                        None => return Ok(()),
                    }
                }
                frame = stream.next() => {
                    let frame = match frame {
                        None => return Err(GatewayError::Closed),
                        Some(Err(e)) => return Err(GatewayError::Socket(e.to_string())),
                        Some(Ok(frame)) => frame,
                    };
                    let Message::Text(text) = frame else { continue };
                    if self.handle_frame(&mut sink, &text).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handle one gateway frame. Returns true when the dispatcher is gone
    /// and the session should stop.
    async fn handle_frame(
        &mut self,
        sink: &mut (impl Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
        text: &str,
    ) -> Result<bool, GatewayError> {
        let event: GatewayEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                log::debug!("whatsapp session: unreadable frame: {}", e);
                return Ok(false);
            }
        };
        match event {
            GatewayEvent::Success => {
                log::info!("whatsapp session: connected");
                self.backoff.reset();
                send_command(sink, &GatewayCommand::Status { text: STATUS_TEXT }).await?;
            }
            GatewayEvent::Failure { reason } => {
                return Err(GatewayError::Auth(if reason.is_empty() {
                    "gateway reported failure".to_string()
                } else {
                    reason
                }));
            }
            GatewayEvent::Message { id, from, author, kind, body, media_kind, data } => {
                // Ack unconditionally, and as read, before any translation
                // so the network never re-delivers.
                send_command(sink, &GatewayCommand::Ack { id: &id, read: false }).await?;
                send_command(sink, &GatewayCommand::Ack { id: &id, read: true }).await?;

                let author = author.unwrap_or_else(|| from.clone());
                log::debug!("received whatsapp message from {} in chat {}", author, from);

                let content = match kind.as_str() {
                    "text" => MobileContent::Text(body.unwrap_or_default()),
                    "media" => {
                        let data = data.unwrap_or_default();
                        match base64::engine::general_purpose::STANDARD.decode(&data) {
                            Ok(bytes) => MobileContent::Media {
                                kind: media_kind.unwrap_or_default(),
                                data: bytes,
                            },
                            Err(e) => {
                                log::warn!("whatsapp session: undecodable media payload: {}", e);
                                return Ok(false);
                            }
                        }
                    }
                    other => MobileContent::Other(other.to_string()),
                };
                let inbound = InboundEvent::Mobile(MobileMessage {
                    id,
                    conversation: from,
                    author,
                    content,
                });
                if self.inbound_tx.send(inbound).await.is_err() {
                    return Ok(true);
                }
            }
            GatewayEvent::Receipt { id, from } => {
                log::debug!("received whatsapp receipt from {}", from);
                send_command(sink, &GatewayCommand::Ack { id: &id, read: false }).await?;
            }
            GatewayEvent::Other => {}
        }
        Ok(false)
    }
}

async fn send_command(
    sink: &mut (impl Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    command: &GatewayCommand<'_>,
) -> Result<(), GatewayError> {
    let text = serde_json::to_string(command)
        .map_err(|e| GatewayError::Socket(format!("encoding frame: {e}")))?;
    sink.send(Message::Text(text))
        .await
        .map_err(|e| GatewayError::Socket(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_frame_parses() {
        let event: GatewayEvent = serde_json::from_str(
            r#"{"type":"message","id":"m1","from":"31612345678-group","author":"31611111111","kind":"text","body":"hi"}"#,
        )
        .expect("parse message");
        match event {
            GatewayEvent::Message { id, from, author, kind, body, .. } => {
                assert_eq!(id, "m1");
                assert_eq!(from, "31612345678-group");
                assert_eq!(author.as_deref(), Some("31611111111"));
                assert_eq!(kind, "text");
                assert_eq!(body.as_deref(), Some("hi"));
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn unknown_frame_types_fold_into_other() {
        let event: GatewayEvent =
            serde_json::from_str(r#"{"type":"presence","from":"31611111111"}"#).expect("parse");
        assert!(matches!(event, GatewayEvent::Other));
    }

    #[test]
    fn commands_encode_with_type_tags() {
        let frame = serde_json::to_string(&GatewayCommand::Ack { id: "m1", read: true })
            .expect("encode ack");
        assert_eq!(frame, r#"{"type":"ack","id":"m1","read":true}"#);
        let frame = serde_json::to_string(&GatewayCommand::Send { to: "wa-1", body: "hoi" })
            .expect("encode send");
        assert_eq!(frame, r#"{"type":"send","to":"wa-1","body":"hoi"}"#);
    }
}
