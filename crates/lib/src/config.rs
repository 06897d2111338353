//! Configuration types and loading.
//!
//! The bridge reads a YAML document (default `config.yaml`) holding the
//! WhatsApp and Slack credentials plus the channel and contact mappings.
//! The document is re-read periodically at runtime; a reload that fails to
//! parse never replaces the previously loaded configuration.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:8055/ws";

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Credentials for both networks (`config.whatsapp`, `config.slack`).
    pub config: Credentials,

    /// Channel mappings, in document order. First match wins on lookup.
    #[serde(default)]
    pub channels: IndexMap<String, ChannelMapping>,

    /// Contact identity mappings, in document order.
    #[serde(default)]
    pub contacts: IndexMap<String, Contact>,
}

/// Credentials for both networks. Never logged, never mutated after load.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub whatsapp: WhatsappCredentials,
    pub slack: SlackCredentials,
}

/// WhatsApp account credentials and the protocol gateway endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsappCredentials {
    /// Phone number in international format. Accepts a YAML integer or string.
    #[serde(deserialize_with = "string_or_number")]
    pub number: String,

    pub password: String,

    /// WebSocket endpoint of the WhatsApp protocol gateway daemon.
    #[serde(default = "default_gateway_url")]
    pub gateway: String,
}

/// Slack API credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackCredentials {
    /// Bot token used for the Web API and the RTM socket.
    pub key: String,
}

/// One bridged channel: a WhatsApp conversation bound to a Slack channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMapping {
    /// WhatsApp conversation id (group or contact JID).
    #[serde(deserialize_with = "string_or_number")]
    pub whatsapp: String,

    /// Slack channel id (e.g. "C024BE91L").
    pub slack: String,
}

/// A known person: display name plus optional per-network identities.
#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    /// Display name used when relaying this person's messages.
    pub name: String,

    /// WhatsApp sender id, when known.
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub whatsapp: Option<String>,

    /// Slack user id, when known. Enables avatar enrichment on relayed posts.
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub slack: Option<String>,
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

/// Accept a YAML integer or string and normalize to a string. Phone numbers
/// and numeric-looking ids are commonly written unquoted in the config.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    })
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    string_or_number(deserializer).map(Some)
}

/// Resolve config path from env or default (`config.yaml` in the working directory).
pub fn default_config_path() -> PathBuf {
    std::env::var("BRUG_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yaml"))
}

/// Load and parse the configuration document. Unlike the periodic refresh,
/// the initial load is strict: a missing or malformed file is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_yaml::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
config:
  whatsapp:
    number: 31600000000
    password: "secret"
  slack:
    key: "xoxb-token"
channels:
  huiskamer:
    whatsapp: "31612345678-group"
    slack: "C123"
contacts:
  wouter:
    name: "Wouter"
    whatsapp: 31611111111
    slack: "U03AKFFTR"
  anna:
    name: "Anna"
    whatsapp: "31622222222"
"#;

    #[test]
    fn parses_example_document() {
        let config: Config = serde_yaml::from_str(EXAMPLE).expect("parse example");
        assert_eq!(config.config.whatsapp.number, "31600000000");
        assert_eq!(config.config.whatsapp.gateway, DEFAULT_GATEWAY_URL);
        assert_eq!(config.config.slack.key, "xoxb-token");
        assert_eq!(config.channels.len(), 1);
        let mapping = &config.channels["huiskamer"];
        assert_eq!(mapping.whatsapp, "31612345678-group");
        assert_eq!(mapping.slack, "C123");
        let wouter = &config.contacts["wouter"];
        assert_eq!(wouter.name, "Wouter");
        assert_eq!(wouter.whatsapp.as_deref(), Some("31611111111"));
        assert_eq!(wouter.slack.as_deref(), Some("U03AKFFTR"));
        assert!(config.contacts["anna"].slack.is_none());
    }

    #[test]
    fn contacts_keep_document_order() {
        let config: Config = serde_yaml::from_str(EXAMPLE).expect("parse example");
        let names: Vec<&str> = config.contacts.values().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Wouter", "Anna"]);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let err = serde_yaml::from_str::<Config>("config: [not a mapping").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/brug.yaml")).is_err());
    }
}
