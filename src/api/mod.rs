//! API layer - HTTP endpoint handlers.

mod health;
mod messages;
mod metrics;
mod routes;

pub use health::{health, stats};
pub use messages::{message_history, send_message, HistoryQuery, SendMessageRequest};
pub use metrics::prometheus_metrics;
pub use routes::{api_routes, message_routes};
