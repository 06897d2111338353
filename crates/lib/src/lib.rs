//! Brug core library: configuration, routing, spam limiting, message
//! translation, and the WhatsApp/Slack session connectors used by the
//! bridge binary.

pub mod bridge;
pub mod channels;
pub mod config;
pub mod emoji;
pub mod routing;
pub mod spam;
pub mod translate;
