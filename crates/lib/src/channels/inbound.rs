//! Inbound events from both session connectors, delivered over one queue
//! to the dispatch worker.

/// An event observed on either network, already acknowledged by its
/// session where the source network requires it.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Mobile(MobileMessage),
    Chat(ChatMessage),
}

/// A message observed on the WhatsApp side.
#[derive(Debug, Clone)]
pub struct MobileMessage {
    /// Protocol message id; the session has already acknowledged it.
    pub id: String,
    /// Conversation the message arrived in (group or contact JID).
    pub conversation: String,
    /// Sender id. For group chats this differs from the conversation.
    pub author: String,
    pub content: MobileContent,
}

/// Payload shapes the WhatsApp gateway delivers.
#[derive(Debug, Clone)]
pub enum MobileContent {
    Text(String),
    Media { kind: String, data: Vec<u8> },
    /// Any other protocol message kind; never forwarded.
    Other(String),
}

/// A message event from the Slack RTM stream.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Slack channel id the message was posted in.
    pub channel: String,
    /// Posting user, absent for bot and system messages.
    pub user: Option<String>,
    /// Message subtype (e.g. "file_share"), absent for plain text.
    pub subtype: Option<String>,
    pub text: String,
}
