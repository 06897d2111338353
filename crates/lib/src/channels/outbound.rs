//! Outbound send seams for the dispatcher.
//!
//! The dispatch worker only sees these traits, so the relay logic can be
//! exercised against in-memory fakes in tests. [`crate::channels::SlackApi`]
//! and [`crate::channels::WhatsappHandle`] are the production impls.

use async_trait::async_trait;

/// Profile details from the team-chat network, used for display-name and
/// avatar enrichment.
#[derive(Debug, Clone, Default)]
pub struct UserProfile {
    pub display_name: Option<String>,
    pub image_48: Option<String>,
}

/// Sends into the team-chat network.
#[async_trait]
pub trait ChatOutbound: Send + Sync {
    /// Post a message under the given username (and optional avatar).
    async fn post_message(
        &self,
        channel: &str,
        username: &str,
        icon_url: Option<&str>,
        text: &str,
    ) -> Result<(), String>;

    /// Upload raw file bytes to a channel.
    async fn upload_file(&self, channel: &str, bytes: Vec<u8>) -> Result<(), String>;

    /// Fetch a user's profile for enrichment. Failures degrade, they never
    /// block relay.
    async fn user_profile(&self, user: &str) -> Result<UserProfile, String>;
}

/// Sends into the mobile network.
#[async_trait]
pub trait MobileOutbound: Send + Sync {
    /// Queue a text message to a conversation. Must be safe to call from
    /// the opposite session's context.
    async fn send_text(&self, to: &str, text: &str) -> Result<(), String>;
}
