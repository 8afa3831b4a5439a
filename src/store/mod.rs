//! Chat persistence collaborator.
//!
//! - `MemoryChatStore`: in-process storage for development and tests
//! - `PostgresChatStore`: `sqlx` pool against the chat database
//!
//! Use `create_chat_store()` to pick the backend from configuration.

mod backend;
mod memory_backend;
mod models;
mod postgres_backend;

use std::sync::Arc;

use crate::config::DatabaseConfig;

pub use backend::{ChatStore, StoreError, HISTORY_LIMIT};
pub use memory_backend::{MemoryChatStore, MemorySeed, SeedSpace, SeedUser};
pub use models::{MessageRecord, MessageTarget, NewMessage};
pub use postgres_backend::PostgresChatStore;

/// Create a chat store based on configuration.
///
/// - `"postgres"`: connects a `PostgresChatStore` using `database.url`
/// - `"memory"` (default): a `MemoryChatStore` loaded from `database.seed_path`
pub async fn create_chat_store(config: &DatabaseConfig) -> Result<Arc<dyn ChatStore>, StoreError> {
    match config.backend.as_str() {
        "postgres" => {
            let store = PostgresChatStore::connect(config).await?;
            tracing::info!(backend = "postgres", "Chat store ready");
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(memory_store(config).await?)),
        other => {
            tracing::warn!(backend = %other, "Unknown database backend, falling back to memory");
            Ok(Arc::new(memory_store(config).await?))
        }
    }
}

async fn memory_store(config: &DatabaseConfig) -> Result<MemoryChatStore, StoreError> {
    let Some(path) = config.seed_path.as_deref() else {
        tracing::warn!(
            backend = "memory",
            "Chat store starts EMPTY: no users or spaces exist, so every send and subscribe \
             will be rejected. Set database.seed_path or use the postgres backend"
        );
        return Ok(MemoryChatStore::new());
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StoreError::Unavailable(format!("cannot read seed file {}: {}", path, e)))?;
    let seed: MemorySeed = serde_json::from_str(&raw)
        .map_err(|e| StoreError::Unavailable(format!("invalid seed file {}: {}", path, e)))?;

    let store = MemoryChatStore::from_seed(seed);
    tracing::info!(
        backend = "memory",
        seed_path = %path,
        users = store.user_count(),
        spaces = store.space_count(),
        "Chat store ready (data is not persisted)"
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_factory_defaults_to_memory() {
        let store = create_chat_store(&DatabaseConfig::default()).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_memory_store_loads_seed_file() {
        let alice = uuid::Uuid::new_v4();
        let space = uuid::Uuid::new_v4();
        let path = std::env::temp_dir().join(format!("chat-seed-{}.json", uuid::Uuid::new_v4()));
        let seed = serde_json::json!({
            "users": [{ "id": alice, "username": "alice" }],
            "spaces": [{ "id": space, "members": [alice] }],
        });
        std::fs::write(&path, seed.to_string()).unwrap();

        let config = DatabaseConfig {
            seed_path: Some(path.to_string_lossy().into_owned()),
            ..Default::default()
        };
        let store = create_chat_store(&config).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(store.is_member(alice, space).await.unwrap());
        assert!(!store.is_member(uuid::Uuid::new_v4(), space).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_seed_is_an_error() {
        let config = DatabaseConfig {
            seed_path: Some("/nonexistent/chat-seed.json".to_string()),
            ..Default::default()
        };

        let result = create_chat_store(&config).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_postgres_requires_url() {
        let config = DatabaseConfig {
            backend: "postgres".to_string(),
            ..Default::default()
        };

        let result = create_chat_store(&config).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
