//! Wire protocol for the live-updates channel
//!
//! Inbound frames are JSON envelopes tagged by `type`; the channel endpoint is
//! derived from the hosting page's URL.

pub mod endpoint;
pub mod messages;

pub use endpoint::{channel_url, parse_channel_url, EndpointError, DEFAULT_CHANNEL_PATH};
pub use messages::*;
