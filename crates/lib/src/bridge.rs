//! The relay engine: dispatch worker, config refresh, and process
//! orchestration.
//!
//! Both session connectors feed one queue; the dispatch worker translates
//! each event, consults the active routing generation, and either emits
//! through the opposite network's outbound seam or answers unmapped
//! traffic through the spam limiter.

use crate::channels::{
    ChatOutbound, InboundEvent, MobileOutbound, SlackApi, SlackSession, WhatsappSession,
};
use crate::config::{self, Config};
use crate::routing::{RoutingTable, SharedRouting};
use crate::spam::SpamLimiter;
use crate::translate::{self, OutboundAction, RelayMessage, SenderDisplay, SourceNetwork};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Canned reply to senders the routing table does not know.
pub const SPAM_NOTICE: &str = "Are you tokking to me? Ik ken dit gesprek niet.. Bel Wouter even!";

/// Username the notice is posted under on the chat side.
const SPAM_NOTICE_USERNAME: &str = "whatsapp";

/// Interval between configuration refreshes.
const RELOAD_INTERVAL: Duration = Duration::from_secs(10);

/// Depth of the shared inbound queue.
const INBOUND_QUEUE_DEPTH: usize = 64;

/// Translation-and-dispatch worker. Holds the injected routing generation
/// and spam limiter plus the two outbound seams.
pub struct Bridge {
    routing: SharedRouting,
    spam: SpamLimiter,
    chat: Arc<dyn ChatOutbound>,
    mobile: Arc<dyn MobileOutbound>,
}

impl Bridge {
    pub fn new(
        routing: SharedRouting,
        chat: Arc<dyn ChatOutbound>,
        mobile: Arc<dyn MobileOutbound>,
    ) -> Self {
        Self {
            routing,
            spam: SpamLimiter::new(),
            chat,
            mobile,
        }
    }

    /// Consume inbound events until every session sender is gone.
    pub async fn run(self, mut inbound_rx: mpsc::Receiver<InboundEvent>) {
        log::info!("dispatch: starting");
        while let Some(event) = inbound_rx.recv().await {
            self.handle_event(event).await;
        }
        log::info!("dispatch: stopped");
    }

    async fn handle_event(&self, event: InboundEvent) {
        let msg = translate::translate_inbound(event);
        let table = self.routing.current().await;
        let destination = match msg.source {
            SourceNetwork::Mobile => table.resolve_chat_channel(&msg.conversation_id),
            SourceNetwork::Chat => table.resolve_mobile_conversation(&msg.conversation_id),
        };
        match destination {
            Some(destination) => {
                let display = self.sender_display(&table, &msg).await;
                let action = translate::render(&msg, destination, &display);
                self.deliver(action).await;
            }
            None => self.answer_unmapped(&msg).await,
        }
    }

    /// Resolve the sender's presentation: configured contact name first,
    /// network profile second, raw id last. Lookup failures degrade.
    async fn sender_display(&self, table: &RoutingTable, msg: &RelayMessage) -> SenderDisplay {
        match msg.source {
            SourceNetwork::Mobile => {
                let Some(contact) = table.contact_by_whatsapp(&msg.sender_id) else {
                    return SenderDisplay {
                        name: msg.sender_id.clone(),
                        icon_url: None,
                    };
                };
                let icon_url = match &contact.slack {
                    Some(slack_id) => match self.chat.user_profile(slack_id).await {
                        Ok(profile) => profile.image_48,
                        Err(e) => {
                            log::debug!("profile lookup for {} failed: {}", contact.name, e);
                            None
                        }
                    },
                    None => None,
                };
                SenderDisplay {
                    name: contact.name.clone(),
                    icon_url,
                }
            }
            SourceNetwork::Chat => {
                if msg.sender_id.is_empty() {
                    return SenderDisplay::default();
                }
                if let Some(contact) = table.contact_by_slack(&msg.sender_id) {
                    return SenderDisplay {
                        name: contact.name.clone(),
                        icon_url: None,
                    };
                }
                let name = match self.chat.user_profile(&msg.sender_id).await {
                    Ok(profile) => profile.display_name.unwrap_or_else(|| msg.sender_id.clone()),
                    Err(e) => {
                        log::debug!("profile lookup for {} failed: {}", msg.sender_id, e);
                        msg.sender_id.clone()
                    }
                };
                SenderDisplay { name, icon_url: None }
            }
        }
    }

    async fn deliver(&self, action: OutboundAction) {
        match action {
            OutboundAction::ChatPost { channel, username, icon_url, text } => {
                if let Err(e) = self
                    .chat
                    .post_message(&channel, &username, icon_url.as_deref(), &text)
                    .await
                {
                    log::warn!("dispatch: chat post to {} failed: {}", channel, e);
                }
            }
            OutboundAction::ChatUpload { channel, bytes } => {
                if let Err(e) = self.chat.upload_file(&channel, bytes).await {
                    log::warn!("dispatch: chat upload to {} failed: {}", channel, e);
                }
            }
            OutboundAction::MobileText { to, text } => {
                if let Err(e) = self.mobile.send_text(&to, &text).await {
                    log::warn!("dispatch: mobile send to {} failed: {}", to, e);
                }
            }
            OutboundAction::Drop { reason } => {
                log::info!("dispatch: dropping message: {}", reason);
            }
        }
    }

    /// Answer traffic from a conversation the routing table does not know,
    /// rate limited per conversation.
    async fn answer_unmapped(&self, msg: &RelayMessage) {
        if !self.spam.should_notify(&msg.conversation_id).await {
            return;
        }
        let result = match msg.source {
            SourceNetwork::Mobile => self.mobile.send_text(&msg.conversation_id, SPAM_NOTICE).await,
            SourceNetwork::Chat => {
                self.chat
                    .post_message(&msg.conversation_id, SPAM_NOTICE_USERNAME, None, SPAM_NOTICE)
                    .await
            }
        };
        if let Err(e) = result {
            log::warn!("dispatch: notice to {} failed: {}", msg.conversation_id, e);
        }
    }
}

/// Periodically re-read the configuration and swap in a fresh routing
/// generation. Parse failures keep the previous generation active.
pub async fn run_reload_loop(
    path: PathBuf,
    routing: SharedRouting,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(RELOAD_INTERVAL) => {
                match config::load_config(&path) {
                    Ok(config) => routing.swap(RoutingTable::from_config(&config)).await,
                    Err(e) => {
                        log::warn!("config refresh failed, keeping previous generation: {:#}", e)
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Run the bridge until Ctrl+C/SIGTERM: both session connectors, the
/// dispatch worker, and the config refresh task.
pub async fn run_bridge(config: Config, config_path: PathBuf) -> Result<()> {
    let routing = SharedRouting::new(RoutingTable::from_config(&config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);

    let slack_api = SlackApi::new(config.config.slack.key.clone());
    let (whatsapp_session, whatsapp_handle) = WhatsappSession::new(
        config.config.whatsapp.gateway.clone(),
        config.config.whatsapp.number.clone(),
        config.config.whatsapp.password.clone(),
        inbound_tx.clone(),
        shutdown_rx.clone(),
    );
    let slack_session = SlackSession::new(slack_api.clone(), inbound_tx, shutdown_rx.clone());

    let bridge = Bridge::new(
        routing.clone(),
        Arc::new(slack_api),
        Arc::new(whatsapp_handle),
    );

    let whatsapp_task = tokio::spawn(whatsapp_session.run());
    let slack_task = tokio::spawn(slack_session.run());
    let dispatch_task = tokio::spawn(bridge.run(inbound_rx));
    let reload_task = tokio::spawn(run_reload_loop(config_path, routing, shutdown_rx));

    shutdown_signal().await;
    log::info!("shutdown signal received, draining sessions");
    let _ = shutdown_tx.send(true);

    let _ = whatsapp_task.await;
    let _ = slack_task.await;
    let _ = reload_task.await;
    // Session senders are gone now; the dispatcher drains what is queued
    // and exits.
    let _ = dispatch_task.await;
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
