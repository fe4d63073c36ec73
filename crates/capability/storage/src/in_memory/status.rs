//! 设备状态内存实现

use crate::error::StorageError;
use crate::traits::StatusStore;
use domain::DeviceStatus;
use std::collections::HashMap;
use std::sync::RwLock;

/// 设备状态内存存储
pub struct InMemoryStatusStore {
    statuses: RwLock<HashMap<String, DeviceStatus>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn upsert_status(&self, status: &DeviceStatus) -> Result<(), StorageError> {
        let mut statuses = self
            .statuses
            .write()
            .map_err(|_| StorageError::LockPoisoned("status"))?;
        statuses.insert(status.device_id.clone(), status.clone());
        Ok(())
    }

    async fn get_status(&self, device_id: &str) -> Result<Option<DeviceStatus>, StorageError> {
        let statuses = self
            .statuses
            .read()
            .map_err(|_| StorageError::LockPoisoned("status"))?;
        Ok(statuses.get(device_id).cloned())
    }

    async fn list_statuses(&self) -> Result<Vec<DeviceStatus>, StorageError> {
        let statuses = self
            .statuses
            .read()
            .map_err(|_| StorageError::LockPoisoned("status"))?;
        let mut items: Vec<DeviceStatus> = statuses.values().cloned().collect();
        items.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(items)
    }

    async fn delete_status(&self, device_id: &str) -> Result<bool, StorageError> {
        let mut statuses = self
            .statuses
            .write()
            .map_err(|_| StorageError::LockPoisoned("status"))?;
        Ok(statuses.remove(device_id).is_some())
    }
}
