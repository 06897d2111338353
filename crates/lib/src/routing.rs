//! Routing table: channel and contact mappings derived from one
//! configuration generation.
//!
//! Lookups are pure reads over an immutable snapshot. The periodic config
//! refresh builds a new table and swaps it in atomically through
//! [`SharedRouting`]; in-flight lookups keep the generation they started
//! with and never observe a partial merge.

use crate::config::{ChannelMapping, Config, Contact};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One immutable generation of the channel and contact mappings.
#[derive(Debug, Default)]
pub struct RoutingTable {
    channels: Vec<ChannelMapping>,
    contacts: Vec<Contact>,
}

impl RoutingTable {
    /// Build a table from a parsed configuration, keeping document order.
    pub fn from_config(config: &Config) -> Self {
        Self {
            channels: config.channels.values().cloned().collect(),
            contacts: config.contacts.values().cloned().collect(),
        }
    }

    /// Slack channel bridged to the given WhatsApp conversation.
    pub fn resolve_chat_channel(&self, whatsapp_conversation: &str) -> Option<&str> {
        self.channels
            .iter()
            .find(|m| m.whatsapp == whatsapp_conversation)
            .map(|m| m.slack.as_str())
    }

    /// WhatsApp conversation bridged to the given Slack channel.
    pub fn resolve_mobile_conversation(&self, slack_channel: &str) -> Option<&str> {
        self.channels
            .iter()
            .find(|m| m.slack == slack_channel)
            .map(|m| m.whatsapp.as_str())
    }

    /// Contact entry for a WhatsApp sender id, when configured.
    pub fn contact_by_whatsapp(&self, sender_id: &str) -> Option<&Contact> {
        self.contacts
            .iter()
            .find(|c| c.whatsapp.as_deref() == Some(sender_id))
    }

    /// Contact entry for a Slack user id, when configured.
    pub fn contact_by_slack(&self, user_id: &str) -> Option<&Contact> {
        self.contacts
            .iter()
            .find(|c| c.slack.as_deref() == Some(user_id))
    }
}

/// Shared handle to the active routing generation. Cloned into the
/// dispatcher and the config refresh task.
#[derive(Clone)]
pub struct SharedRouting {
    inner: Arc<RwLock<Arc<RoutingTable>>>,
}

impl SharedRouting {
    pub fn new(table: RoutingTable) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(table))),
        }
    }

    /// Snapshot of the active generation. The returned table stays valid
    /// across later swaps.
    pub async fn current(&self) -> Arc<RoutingTable> {
        self.inner.read().await.clone()
    }

    /// Replace the active generation atomically.
    pub async fn swap(&self, table: RoutingTable) {
        *self.inner.write().await = Arc::new(table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &str)], contacts: &[(&str, Option<&str>, Option<&str>)]) -> RoutingTable {
        RoutingTable {
            channels: entries
                .iter()
                .map(|(wa, slack)| ChannelMapping {
                    whatsapp: wa.to_string(),
                    slack: slack.to_string(),
                })
                .collect(),
            contacts: contacts
                .iter()
                .map(|(name, wa, slack)| Contact {
                    name: name.to_string(),
                    whatsapp: wa.map(str::to_string),
                    slack: slack.map(str::to_string),
                })
                .collect(),
        }
    }

    #[test]
    fn resolves_both_directions() {
        let t = table(&[("31612345678-group", "C123")], &[]);
        assert_eq!(t.resolve_chat_channel("31612345678-group"), Some("C123"));
        assert_eq!(t.resolve_mobile_conversation("C123"), Some("31612345678-group"));
        assert_eq!(t.resolve_chat_channel("31699999999"), None);
        assert_eq!(t.resolve_mobile_conversation("C999"), None);
    }

    #[test]
    fn first_match_wins() {
        let t = table(&[("wa-1", "C1"), ("wa-1", "C2")], &[]);
        assert_eq!(t.resolve_chat_channel("wa-1"), Some("C1"));
    }

    #[test]
    fn contact_lookup_by_either_identity() {
        let t = table(
            &[],
            &[
                ("Wouter", Some("31611111111"), Some("U03AKFFTR")),
                ("Anna", Some("31622222222"), None),
            ],
        );
        assert_eq!(t.contact_by_whatsapp("31611111111").map(|c| c.name.as_str()), Some("Wouter"));
        assert_eq!(t.contact_by_slack("U03AKFFTR").map(|c| c.name.as_str()), Some("Wouter"));
        assert_eq!(t.contact_by_whatsapp("31622222222").map(|c| c.name.as_str()), Some("Anna"));
        assert!(t.contact_by_slack("U_UNKNOWN").is_none());
    }

    #[tokio::test]
    async fn swap_does_not_disturb_held_generation() {
        let shared = SharedRouting::new(table(&[("wa-1", "C1")], &[]));
        let before = shared.current().await;
        shared.swap(table(&[("wa-1", "C2")], &[])).await;
        // The old snapshot still answers from its own generation.
        assert_eq!(before.resolve_chat_channel("wa-1"), Some("C1"));
        assert_eq!(shared.current().await.resolve_chat_channel("wa-1"), Some("C2"));
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_generation() {
        let shared = SharedRouting::new(table(&[("wa-1", "C1")], &[]));
        // A parse failure means swap() is simply never called.
        assert!(serde_yaml::from_str::<crate::config::Config>("channels: [").is_err());
        assert_eq!(shared.current().await.resolve_chat_channel("wa-1"), Some("C1"));
    }
}
