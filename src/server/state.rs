use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::auth::JwtValidator;
use crate::config::Settings;
use crate::connection_manager::ConnectionManager;
use crate::delivery::{
    DeliveryEngine, DeliveryQueue, DeliveryReceiver, EvictionReceiver, Evictor, SendSequencer,
};
use crate::store::ChatStore;
use crate::tasks::{DeliveryWorker, EvictionWorker, HeartbeatTask};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Arc<JwtValidator>,
    pub connection_manager: Arc<ConnectionManager>,
    pub store: Arc<dyn ChatStore>,
    pub delivery_engine: Arc<DeliveryEngine>,
    pub delivery_queue: DeliveryQueue,
    pub sequencer: Arc<SendSequencer>,
    pub evictor: Evictor,
    pub start_time: Instant,
}

/// Receivers drained by the background workers
pub struct WorkerChannels {
    pub deliveries: DeliveryReceiver,
    pub evictions: EvictionReceiver,
}

impl AppState {
    pub fn new(settings: Settings, store: Arc<dyn ChatStore>) -> (Self, WorkerChannels) {
        let jwt_validator = Arc::new(JwtValidator::new(&settings.jwt));
        let connection_manager = Arc::new(ConnectionManager::new());

        let (evictor, eviction_rx) = Evictor::channel();
        let delivery_engine = Arc::new(DeliveryEngine::new(
            connection_manager.clone(),
            &settings.delivery,
            evictor.clone(),
        ));
        let (delivery_queue, delivery_rx) = DeliveryQueue::new(settings.delivery.queue_capacity);

        let state = Self {
            settings: Arc::new(settings),
            jwt_validator,
            connection_manager,
            store,
            delivery_engine,
            delivery_queue,
            sequencer: Arc::new(SendSequencer::new()),
            evictor,
            start_time: Instant::now(),
        };
        let channels = WorkerChannels {
            deliveries: delivery_rx,
            evictions: eviction_rx,
        };
        (state, channels)
    }

    /// Spawn the delivery, eviction and heartbeat loops
    pub fn spawn_workers(
        &self,
        channels: WorkerChannels,
        shutdown_tx: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        let delivery = DeliveryWorker::new(
            self.delivery_engine.clone(),
            channels.deliveries,
            shutdown_tx.subscribe(),
        );
        let eviction = EvictionWorker::new(
            self.connection_manager.clone(),
            channels.evictions,
            shutdown_tx.subscribe(),
        );
        let heartbeat = HeartbeatTask::new(
            self.settings.websocket.clone(),
            self.connection_manager.clone(),
            self.evictor.clone(),
            shutdown_tx.subscribe(),
        );

        vec![
            tokio::spawn(delivery.run()),
            tokio::spawn(eviction.run()),
            tokio::spawn(heartbeat.run()),
        ]
    }
}
