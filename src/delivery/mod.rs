//! Live delivery of persisted messages
//!
//! - `DeliveryEngine`: resolves the target connections and pushes the frame
//! - `DeliveryQueue`: ordered, non-blocking hand-off from message-send requests
//! - `SendSequencer`: keeps persist-then-enqueue ordered per conversation
//! - `Evictor`: hands broken connections to the eviction worker

mod engine;
mod evictor;
mod queue;
mod sequencer;

pub use engine::{DeliveryEngine, DeliveryResult, DeliveryStats, DeliveryStatsSnapshot};
pub use evictor::{EvictionReceiver, Evictor};
pub use queue::{DeliveryQueue, DeliveryReceiver, PendingDelivery};
pub use sequencer::{ConversationKey, SendSequencer};
