//! Slack session: Web API client plus the RTM event pump.
//!
//! Outbound calls go over HTTPS (`chat.postMessage`, `files.upload`,
//! `users.info`); inbound events come from the RTM WebSocket obtained via
//! `rtm.connect`. The pump forwards message events to the dispatch queue
//! and reconnects with bounded backoff on any failure.

use crate::channels::backoff::Backoff;
use crate::channels::inbound::{ChatMessage, InboundEvent};
use crate::channels::outbound::{ChatOutbound, UserProfile};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Errors from Slack operations.
#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("slack request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack api error: {0}")]
    Api(String),
    #[error("slack socket error: {0}")]
    Socket(String),
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RtmConnectResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersInfoResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<SlackUser>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: Option<SlackUserProfile>,
}

#[derive(Debug, Deserialize)]
struct SlackUserProfile {
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    image_48: Option<String>,
}

/// RTM event frame. Everything that is not a message folds into `Other`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum RtmEvent {
    #[serde(rename = "message")]
    Message {
        channel: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Slack Web API client. Cheap to clone; the reqwest client is shared.
#[derive(Clone)]
pub struct SlackApi {
    client: reqwest::Client,
    token: String,
    base: String,
}

impl SlackApi {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base: slack_api_base(),
        }
    }

    /// GET rtm.connect: returns the RTM WebSocket URL.
    pub async fn rtm_connect(&self) -> Result<String, SlackError> {
        let url = format!("{}/rtm.connect", self.base);
        let res = self.client.get(&url).bearer_auth(&self.token).send().await?;
        let data: RtmConnectResponse = res.json().await?;
        if !data.ok {
            return Err(SlackError::Api(
                data.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        data.url
            .ok_or_else(|| SlackError::Api("rtm.connect returned no url".to_string()))
    }

    /// POST chat.postMessage with an explicit username and optional avatar.
    pub async fn post_message(
        &self,
        channel: &str,
        username: &str,
        icon_url: Option<&str>,
        text: &str,
    ) -> Result<(), SlackError> {
        let url = format!("{}/chat.postMessage", self.base);
        let mut body = serde_json::json!({
            "channel": channel,
            "username": username,
            "text": text,
        });
        if let Some(icon) = icon_url {
            body["icon_url"] = serde_json::Value::String(icon.to_string());
        }
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let data: ApiResponse = res.json().await?;
        ensure_ok(data)
    }

    /// POST files.upload with raw file bytes.
    pub async fn upload_file(&self, channels: &str, bytes: Vec<u8>) -> Result<(), SlackError> {
        let url = format!("{}/files.upload", self.base);
        let part = reqwest::multipart::Part::bytes(bytes).file_name("upload");
        let form = reqwest::multipart::Form::new()
            .text("channels", channels.to_string())
            .part("file", part);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        let data: ApiResponse = res.json().await?;
        ensure_ok(data)
    }

    /// GET users.info: display name and avatar for a user id.
    pub async fn users_info(&self, user: &str) -> Result<UserProfile, SlackError> {
        let url = format!("{}/users.info", self.base);
        let res = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("user", user)])
            .send()
            .await?;
        let data: UsersInfoResponse = res.json().await?;
        if !data.ok {
            return Err(SlackError::Api(
                data.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        let user = data
            .user
            .ok_or_else(|| SlackError::Api("users.info returned no user".to_string()))?;
        let profile = user.profile.unwrap_or(SlackUserProfile {
            real_name: None,
            image_48: None,
        });
        Ok(UserProfile {
            display_name: profile.real_name.or(user.real_name).or(user.name),
            image_48: profile.image_48,
        })
    }
}

fn ensure_ok(resp: ApiResponse) -> Result<(), SlackError> {
    if resp.ok {
        Ok(())
    } else {
        Err(SlackError::Api(
            resp.error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

#[async_trait]
impl ChatOutbound for SlackApi {
    async fn post_message(
        &self,
        channel: &str,
        username: &str,
        icon_url: Option<&str>,
        text: &str,
    ) -> Result<(), String> {
        SlackApi::post_message(self, channel, username, icon_url, text)
            .await
            .map_err(|e| e.to_string())
    }

    async fn upload_file(&self, channel: &str, bytes: Vec<u8>) -> Result<(), String> {
        SlackApi::upload_file(self, channel, bytes)
            .await
            .map_err(|e| e.to_string())
    }

    async fn user_profile(&self, user: &str) -> Result<UserProfile, String> {
        SlackApi::users_info(self, user).await.map_err(|e| e.to_string())
    }
}

/// Slack session connector: connects RTM and pumps events to the dispatch
/// queue, reconnecting forever until shutdown.
pub struct SlackSession {
    api: SlackApi,
    inbound_tx: mpsc::Sender<InboundEvent>,
    shutdown: watch::Receiver<bool>,
    backoff: Backoff,
}

impl SlackSession {
    pub fn new(
        api: SlackApi,
        inbound_tx: mpsc::Sender<InboundEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            api,
            inbound_tx,
            shutdown,
            backoff: Backoff::new(),
        }
    }

    pub async fn run(mut self) {
        log::info!("slack session: starting");
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            match self.connect_and_pump().await {
                Ok(()) => break,
                Err(e) => log::warn!("slack session error: {}", e),
            }
            let delay = self.backoff.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => {}
            }
        }
        log::info!("slack session: stopped");
    }

    /// One connected lifetime. Ok(()) means shutdown was requested.
    async fn connect_and_pump(&mut self) -> Result<(), SlackError> {
        let ws_url = self.api.rtm_connect().await?;
        let (mut ws, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .map_err(|e| SlackError::Socket(e.to_string()))?;
        log::info!("slack session: connected");
        self.backoff.reset();

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        return Ok(());
                    }
                }
                frame = ws.next() => {
                    let frame = match frame {
                        None => return Err(SlackError::Socket("event stream closed".to_string())),
                        Some(Err(e)) => return Err(SlackError::Socket(e.to_string())),
                        Some(Ok(frame)) => frame,
                    };
                    let Message::Text(text) = frame else { continue };
                    if self.handle_frame(&text).await.is_err() {
                        // Dispatcher gone; nothing left to feed.
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, text: &str) -> Result<(), ()> {
        let event: RtmEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                log::debug!("slack session: unreadable frame: {}", e);
                return Ok(());
            }
        };
        let RtmEvent::Message { channel, user, subtype, text } = event else {
            return Ok(());
        };
        match &user {
            Some(user) => log::debug!("received slack message from {} in channel {}", user, channel),
            None => log::debug!("received slack message from unknown in channel {}", channel),
        }
        let inbound = InboundEvent::Chat(ChatMessage {
            channel,
            user,
            subtype,
            text,
        });
        self.inbound_tx.send(inbound).await.map_err(|_| ())
    }
}

/// Resolve the Slack API base URL (override for tests).
fn slack_api_base() -> String {
    std::env::var("SLACK_API_BASE").unwrap_or_else(|_| SLACK_API_BASE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_frame_parses() {
        let event: RtmEvent = serde_json::from_str(
            r#"{"type":"message","channel":"C123","user":"U1","text":"hoi"}"#,
        )
        .expect("parse message");
        match event {
            RtmEvent::Message { channel, user, subtype, text } => {
                assert_eq!(channel, "C123");
                assert_eq!(user.as_deref(), Some("U1"));
                assert!(subtype.is_none());
                assert_eq!(text, "hoi");
            }
            RtmEvent::Other => panic!("expected message"),
        }
    }

    #[test]
    fn subtype_frame_parses() {
        let event: RtmEvent = serde_json::from_str(
            r#"{"type":"message","channel":"C123","user":"U1","subtype":"file_share","text":""}"#,
        )
        .expect("parse message");
        match event {
            RtmEvent::Message { subtype, .. } => assert_eq!(subtype.as_deref(), Some("file_share")),
            RtmEvent::Other => panic!("expected message"),
        }
    }

    #[test]
    fn unknown_event_shapes_fold_into_other() {
        let event: RtmEvent =
            serde_json::from_str(r#"{"type":"presence_change","user":"U1"}"#).expect("parse");
        assert!(matches!(event, RtmEvent::Other));
    }
}
