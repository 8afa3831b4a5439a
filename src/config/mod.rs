mod settings;

pub use settings::{
    DatabaseConfig, DeliveryConfig, JwtConfig, OtelConfig, ServerConfig, Settings,
    WebSocketConfig,
};
