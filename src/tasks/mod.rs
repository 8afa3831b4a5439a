//! Background tasks

mod delivery;
mod eviction;
mod heartbeat;

pub use delivery::DeliveryWorker;
pub use eviction::EvictionWorker;
pub use heartbeat::HeartbeatTask;
