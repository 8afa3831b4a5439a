//! Connection protocol: WebSocket upgrade, control frames and outbound frames

mod handler;
mod message;

pub use handler::{ws_handler, WsQuery};
pub use message::{
    ClientMessage, FrameError, OutboundMessage, ServerMessage, SubscriptionStatus, SUBSCRIBE_FRAME,
};
