//! Fake backends for outage and timeout scenarios

use crate::error::TwinError;
use crate::store::{KeyEntry, KvBackend};
use crate::Result;
use std::time::Duration;

/// Backend whose every call fails, as if the store were unreachable
pub struct FailingBackend;

#[async_trait::async_trait]
impl KvBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(TwinError::StoreError("connection refused".to_string()))
    }
    async fn set_with_ttl(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
        Err(TwinError::StoreError("connection refused".to_string()))
    }
    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(TwinError::StoreError("connection refused".to_string()))
    }
    async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<KeyEntry>> {
        Err(TwinError::StoreError("connection refused".to_string()))
    }
    async fn list_push_front(&self, _key: &str, _value: String) -> Result<()> {
        Err(TwinError::StoreError("connection refused".to_string()))
    }
    async fn list_trim(&self, _key: &str, _keep: usize) -> Result<()> {
        Err(TwinError::StoreError("connection refused".to_string()))
    }
    async fn list_range(&self, _key: &str, _count: usize) -> Result<Vec<String>> {
        Err(TwinError::StoreError("connection refused".to_string()))
    }
    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<()> {
        Err(TwinError::StoreError("connection refused".to_string()))
    }
}

/// Backend that never answers within any reasonable deadline
pub struct StallingBackend;

#[async_trait::async_trait]
impl KvBackend for StallingBackend {
    fn name(&self) -> &'static str {
        "stalling"
    }
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(None)
    }
    async fn set_with_ttl(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
    async fn delete(&self, _key: &str) -> Result<bool> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(false)
    }
    async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<KeyEntry>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
    async fn list_push_front(&self, _key: &str, _value: String) -> Result<()> {
        Ok(())
    }
    async fn list_trim(&self, _key: &str, _keep: usize) -> Result<()> {
        Ok(())
    }
    async fn list_range(&self, _key: &str, _count: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<()> {
        Ok(())
    }
}
