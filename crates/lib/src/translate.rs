//! Message translation: normalize inbound events from either network into
//! a [`RelayMessage`], and render a relay message into the opposite
//! network's send primitive.
//!
//! Translation is pure; acknowledgment of inbound events belongs to the
//! sessions, and identity/avatar lookups belong to the dispatcher, which
//! passes the resolved [`SenderDisplay`] in.

use crate::channels::{ChatMessage, InboundEvent, MobileContent, MobileMessage};
use crate::emoji;

/// Which network a relay message was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceNetwork {
    Mobile,
    Chat,
}

/// Normalized message kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    File,
    /// Carries the network's kind tag for the drop log line.
    Unsupported(String),
}

/// Network-agnostic form of one inbound chat event. Ephemeral: created per
/// event, rendered once, never persisted.
#[derive(Debug, Clone)]
pub struct RelayMessage {
    pub source: SourceNetwork,
    pub conversation_id: String,
    pub sender_id: String,
    pub kind: MessageKind,
    /// Populated for Text and File kinds.
    pub body: Option<String>,
    /// Populated for the Image kind.
    pub media: Option<Vec<u8>>,
}

/// Resolved sender presentation for outbound rendering.
#[derive(Debug, Clone, Default)]
pub struct SenderDisplay {
    pub name: String,
    pub icon_url: Option<String>,
}

/// What to emit on the destination network for one relay message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    ChatPost {
        channel: String,
        username: String,
        icon_url: Option<String>,
        text: String,
    },
    ChatUpload {
        channel: String,
        bytes: Vec<u8>,
    },
    MobileText {
        to: String,
        text: String,
    },
    /// Nothing to emit; the reason is logged and the message is skipped.
    Drop {
        reason: String,
    },
}

/// Normalize an inbound event into a relay message.
pub fn translate_inbound(event: InboundEvent) -> RelayMessage {
    match event {
        InboundEvent::Mobile(msg) => translate_mobile(msg),
        InboundEvent::Chat(msg) => translate_chat(msg),
    }
}

fn translate_mobile(msg: MobileMessage) -> RelayMessage {
    let (kind, body, media) = match msg.content {
        MobileContent::Text(text) => (MessageKind::Text, Some(text), None),
        MobileContent::Media { kind, data } if kind == "image" => {
            (MessageKind::Image, None, Some(data))
        }
        MobileContent::Media { kind, .. } => {
            (MessageKind::Unsupported(format!("media/{kind}")), None, None)
        }
        MobileContent::Other(kind) => (MessageKind::Unsupported(kind), None, None),
    };
    RelayMessage {
        source: SourceNetwork::Mobile,
        conversation_id: msg.conversation,
        sender_id: msg.author,
        kind,
        body,
        media,
    }
}

fn translate_chat(msg: ChatMessage) -> RelayMessage {
    let kind = match msg.subtype.as_deref() {
        None => MessageKind::Text,
        Some("file_share") => MessageKind::File,
        Some(subtype) => MessageKind::Unsupported(format!("subtype/{subtype}")),
    };
    let body = match kind {
        MessageKind::Text | MessageKind::File => Some(msg.text),
        _ => None,
    };
    RelayMessage {
        source: SourceNetwork::Chat,
        conversation_id: msg.channel,
        sender_id: msg.user.unwrap_or_default(),
        kind,
        body,
        media: None,
    }
}

/// Render a relay message for its already-resolved destination
/// conversation on the opposite network.
pub fn render(msg: &RelayMessage, destination: &str, display: &SenderDisplay) -> OutboundAction {
    match msg.source {
        SourceNetwork::Mobile => render_for_chat(msg, destination, display),
        SourceNetwork::Chat => render_for_mobile(msg, destination, display),
    }
}

fn render_for_chat(msg: &RelayMessage, channel: &str, display: &SenderDisplay) -> OutboundAction {
    match &msg.kind {
        MessageKind::Text => OutboundAction::ChatPost {
            channel: channel.to_string(),
            username: display.name.clone(),
            icon_url: display.icon_url.clone(),
            text: emoji::demojize(msg.body.as_deref().unwrap_or_default()),
        },
        MessageKind::Image => OutboundAction::ChatUpload {
            channel: channel.to_string(),
            bytes: msg.media.clone().unwrap_or_default(),
        },
        MessageKind::File => OutboundAction::Drop {
            reason: "file message from mobile side".to_string(),
        },
        MessageKind::Unsupported(kind) => OutboundAction::Drop {
            reason: format!("unsupported mobile message kind {kind}"),
        },
    }
}

fn render_for_mobile(msg: &RelayMessage, to: &str, display: &SenderDisplay) -> OutboundAction {
    if display.name.is_empty() {
        // Bot and system posts carry no user; relaying them would echo our
        // own bridged messages back.
        return OutboundAction::Drop {
            reason: "chat message without a sender".to_string(),
        };
    }
    match &msg.kind {
        MessageKind::Text => OutboundAction::MobileText {
            to: to.to_string(),
            text: format!(
                "{}: {}",
                display.name,
                emoji::emojize(msg.body.as_deref().unwrap_or_default())
            ),
        },
        MessageKind::File => OutboundAction::MobileText {
            to: to.to_string(),
            text: format!("{} shared a file on Slack.", display.name),
        },
        MessageKind::Image => OutboundAction::Drop {
            reason: "image message from chat side".to_string(),
        },
        MessageKind::Unsupported(kind) => OutboundAction::Drop {
            reason: format!("unsupported chat message kind {kind}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mobile_text(conversation: &str, author: &str, text: &str) -> InboundEvent {
        InboundEvent::Mobile(MobileMessage {
            id: "m1".to_string(),
            conversation: conversation.to_string(),
            author: author.to_string(),
            content: MobileContent::Text(text.to_string()),
        })
    }

    #[test]
    fn mobile_text_renders_as_chat_post() {
        let msg = translate_inbound(mobile_text("31612345678-group", "31611111111", "hi"));
        assert_eq!(msg.kind, MessageKind::Text);
        let display = SenderDisplay {
            name: "Wouter".to_string(),
            icon_url: None,
        };
        let action = render(&msg, "C123", &display);
        assert_eq!(
            action,
            OutboundAction::ChatPost {
                channel: "C123".to_string(),
                username: "Wouter".to_string(),
                icon_url: None,
                text: "hi".to_string(),
            }
        );
    }

    #[test]
    fn mobile_text_is_demojized_for_chat() {
        let msg = translate_inbound(mobile_text("wa-1", "wa-sender", "tot zo 😄"));
        let action = render(&msg, "C1", &SenderDisplay { name: "A".into(), icon_url: None });
        match action {
            OutboundAction::ChatPost { text, .. } => assert_eq!(text, "tot zo :smile:"),
            other => panic!("expected chat post, got {other:?}"),
        }
    }

    #[test]
    fn mobile_image_becomes_upload() {
        let msg = translate_inbound(InboundEvent::Mobile(MobileMessage {
            id: "m2".to_string(),
            conversation: "wa-1".to_string(),
            author: "wa-sender".to_string(),
            content: MobileContent::Media {
                kind: "image".to_string(),
                data: vec![0xff, 0xd8],
            },
        }));
        assert_eq!(msg.kind, MessageKind::Image);
        let action = render(&msg, "C1", &SenderDisplay::default());
        assert_eq!(
            action,
            OutboundAction::ChatUpload {
                channel: "C1".to_string(),
                bytes: vec![0xff, 0xd8],
            }
        );
    }

    #[test]
    fn non_image_media_is_dropped() {
        let msg = translate_inbound(InboundEvent::Mobile(MobileMessage {
            id: "m3".to_string(),
            conversation: "wa-1".to_string(),
            author: "wa-sender".to_string(),
            content: MobileContent::Media {
                kind: "audio".to_string(),
                data: vec![1, 2, 3],
            },
        }));
        assert!(matches!(msg.kind, MessageKind::Unsupported(_)));
        assert!(matches!(
            render(&msg, "C1", &SenderDisplay::default()),
            OutboundAction::Drop { .. }
        ));
    }

    #[test]
    fn chat_text_is_prefixed_and_emojized() {
        let msg = translate_inbound(InboundEvent::Chat(ChatMessage {
            channel: "C123".to_string(),
            user: Some("U03AKFFTR".to_string()),
            subtype: None,
            text: "tot zo :smile:".to_string(),
        }));
        let display = SenderDisplay { name: "Wouter".into(), icon_url: None };
        match render(&msg, "31612345678-group", &display) {
            OutboundAction::MobileText { to, text } => {
                assert_eq!(to, "31612345678-group");
                assert_eq!(text, "Wouter: tot zo 😄");
            }
            other => panic!("expected mobile text, got {other:?}"),
        }
    }

    #[test]
    fn file_share_becomes_notice() {
        let msg = translate_inbound(InboundEvent::Chat(ChatMessage {
            channel: "C123".to_string(),
            user: Some("U1".to_string()),
            subtype: Some("file_share".to_string()),
            text: "uploaded a file".to_string(),
        }));
        assert_eq!(msg.kind, MessageKind::File);
        let display = SenderDisplay { name: "Wouter".into(), icon_url: None };
        match render(&msg, "wa-1", &display) {
            OutboundAction::MobileText { text, .. } => {
                assert_eq!(text, "Wouter shared a file on Slack.");
            }
            other => panic!("expected mobile text, got {other:?}"),
        }
    }

    #[test]
    fn other_subtypes_are_dropped() {
        let msg = translate_inbound(InboundEvent::Chat(ChatMessage {
            channel: "C123".to_string(),
            user: Some("U1".to_string()),
            subtype: Some("channel_join".to_string()),
            text: String::new(),
        }));
        assert!(matches!(
            render(&msg, "wa-1", &SenderDisplay { name: "X".into(), icon_url: None }),
            OutboundAction::Drop { .. }
        ));
    }

    #[test]
    fn chat_message_without_sender_is_dropped() {
        let msg = translate_inbound(InboundEvent::Chat(ChatMessage {
            channel: "C123".to_string(),
            user: None,
            subtype: None,
            text: "bot chatter".to_string(),
        }));
        assert!(matches!(
            render(&msg, "wa-1", &SenderDisplay::default()),
            OutboundAction::Drop { .. }
        ));
    }

    #[test]
    fn round_trip_preserves_text_modulo_emoji() {
        let inbound = translate_inbound(mobile_text("wa-1", "wa-sender", "borrel 😄"));
        let display = SenderDisplay { name: "A".into(), icon_url: None };
        let OutboundAction::ChatPost { text, .. } = render(&inbound, "C1", &display) else {
            panic!("expected chat post");
        };
        // The chat side sees the canonical shortcode; crossing back
        // restores the original emoji.
        assert_eq!(text, "borrel :smile:");
        assert_eq!(crate::emoji::emojize(&text), "borrel 😄");
    }
}
