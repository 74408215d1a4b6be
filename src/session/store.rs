//! Durable storage for the thread identifier

use crate::db::{Database, DbError};
use async_trait::async_trait;

/// Key/value storage for the persisted thread id
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>, DbError>;

    /// Write a value, or remove the key when `value` is `None`
    async fn save(&self, key: &str, value: Option<&str>) -> Result<(), DbError>;
}

#[async_trait]
impl ThreadStore for Database {
    async fn load(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self.get_setting(key)?.map(|s| s.value))
    }

    async fn save(&self, key: &str, value: Option<&str>) -> Result<(), DbError> {
        match value {
            Some(value) => self.put_setting(key, value),
            None => self.delete_setting(key).map(|_| ()),
        }
    }
}
