//! Network session connectors (WhatsApp gateway, Slack RTM).
//!
//! Each connector owns its connection lifecycle and reconnect loop, feeds
//! inbound events into the shared dispatch queue, and exposes an outbound
//! seam the dispatcher sends through.

mod backoff;
mod inbound;
mod outbound;
mod slack;
mod whatsapp;

pub use inbound::{ChatMessage, InboundEvent, MobileContent, MobileMessage};
pub use outbound::{ChatOutbound, MobileOutbound, UserProfile};
pub use slack::{SlackApi, SlackError, SlackSession};
pub use whatsapp::{GatewayError, WhatsappHandle, WhatsappSession};
