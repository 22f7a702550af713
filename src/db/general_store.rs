use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;

use super::StoreError;

/// String-keyed JSON values, last write wins.
#[derive(Clone)]
pub struct GeneralStore {
    pool: SqlitePool,
}

impl GeneralStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)
            .map_err(|e| StoreError::Serialization(key.to_string(), e))?;

        sqlx::query("INSERT OR REPLACE INTO general_store (id, value) VALUES (?, ?)")
            .bind(key)
            .bind(&json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM general_store WHERE id = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(json,)| {
            serde_json::from_str(&json).map_err(|e| StoreError::Serialization(key.to_string(), e))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::models::IdName;
    use tempfile::TempDir;

    async fn setup() -> (GeneralStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        (GeneralStore::new(pool), temp_dir)
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let (store, _temp) = setup().await;
        let value: Option<IdName> = store.get("user").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let (store, _temp) = setup().await;
        store.put("user", &IdName::new(1, "root")).await.unwrap();
        store.put("user", &IdName::new(2, "alice")).await.unwrap();

        let value: Option<IdName> = store.get("user").await.unwrap();
        assert_eq!(value, Some(IdName::new(2, "alice")));
    }

    #[tokio::test]
    async fn test_wrong_shape_is_an_error() {
        let (store, _temp) = setup().await;
        store.put("memogroups", &vec![1, 2, 3]).await.unwrap();

        let result: Result<Option<IdName>, _> = store.get("memogroups").await;
        assert!(matches!(result, Err(StoreError::Serialization(_, _))));
    }
}
