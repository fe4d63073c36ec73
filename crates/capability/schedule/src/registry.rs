//! 写时复制的调度组注册表。

use crate::error::ScheduleError;
use domain::{Device, ScheduleGroup, now_epoch_ms};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::info;

/// 注册表快照：分组 ID → 分组。
pub type GroupSnapshot = Arc<HashMap<String, ScheduleGroup>>;

/// 调度组注册表。
pub struct ScheduleRegistry {
    groups: RwLock<GroupSnapshot>,
    version: watch::Sender<u64>,
}

impl ScheduleRegistry {
    /// 空注册表。
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            groups: RwLock::new(Arc::new(HashMap::new())),
            version,
        }
    }

    /// 以给定分组初始化（逐个校验）。
    pub fn with_groups(groups: Vec<ScheduleGroup>) -> Result<Self, ScheduleError> {
        let mut map = HashMap::with_capacity(groups.len());
        for group in groups {
            group.validate()?;
            map.insert(group.id.clone(), group);
        }
        let (version, _) = watch::channel(0);
        Ok(Self {
            groups: RwLock::new(Arc::new(map)),
            version,
        })
    }

    /// 以内置分组初始化。
    pub fn with_defaults() -> Self {
        let now = now_epoch_ms();
        let map = ScheduleGroup::defaults()
            .into_iter()
            .map(|mut group| {
                group.created_at_ms = now;
                group.updated_at_ms = now;
                (group.id.clone(), group)
            })
            .collect();
        let (version, _) = watch::channel(0);
        Self {
            groups: RwLock::new(Arc::new(map)),
            version,
        }
    }

    /// 当前快照（读者持有 `Arc`，不阻塞写者）。
    pub fn snapshot(&self) -> GroupSnapshot {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 当前版本号（每次修改递增）。
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// 订阅版本变化。
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// 启用分组的轮询间隔；禁用或不存在时返回 `None`。
    pub fn lookup(&self, id: &str) -> Option<u64> {
        self.snapshot()
            .get(id)
            .filter(|group| group.enabled)
            .map(|group| group.polling_interval_ms)
    }

    pub fn get(&self, id: &str) -> Option<ScheduleGroup> {
        self.snapshot().get(id).cloned()
    }

    /// 所有分组（按间隔、ID 排序）。
    pub fn list(&self) -> Vec<ScheduleGroup> {
        let mut groups: Vec<ScheduleGroup> = self.snapshot().values().cloned().collect();
        groups.sort_by(|a, b| {
            a.polling_interval_ms
                .cmp(&b.polling_interval_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        groups
    }

    /// 新分配点位前的检查：只有启用的分组可被分配。
    pub fn check_assignable(&self, id: &str) -> Result<(), ScheduleError> {
        match self.snapshot().get(id) {
            Some(group) if group.enabled => Ok(()),
            Some(_) => Err(ScheduleError::Disabled(id.to_string())),
            None => Err(ScheduleError::NotFound(id.to_string())),
        }
    }

    /// 新增或更新分组。
    pub fn upsert(&self, mut group: ScheduleGroup) -> Result<ScheduleGroup, ScheduleError> {
        group.validate()?;
        let now = now_epoch_ms();
        let stored = self.modify(|groups| {
            group.created_at_ms = groups
                .get(&group.id)
                .map(|existing| existing.created_at_ms)
                .unwrap_or(now);
            group.updated_at_ms = now;
            groups.insert(group.id.clone(), group.clone());
            Ok(group)
        })?;
        info!(
            target: "ems.schedule",
            group_id = %stored.id,
            interval_ms = stored.polling_interval_ms,
            enabled = stored.enabled,
            "schedule_group_upserted"
        );
        Ok(stored)
    }

    /// 启用/禁用分组。
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<ScheduleGroup, ScheduleError> {
        let updated = self.modify(|groups| {
            let group = groups
                .get_mut(id)
                .ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;
            group.enabled = enabled;
            group.updated_at_ms = now_epoch_ms();
            Ok(group.clone())
        })?;
        info!(
            target: "ems.schedule",
            group_id = %id,
            enabled,
            "schedule_group_toggled"
        );
        Ok(updated)
    }

    /// 删除分组；仍被 `devices` 中任一点位引用时拒绝。
    pub fn remove(&self, id: &str, devices: &[Device]) -> Result<ScheduleGroup, ScheduleError> {
        for device in devices {
            if let Some(tag) = device
                .tags
                .iter()
                .find(|tag| tag.schedule_group_id.as_deref() == Some(id))
            {
                return Err(ScheduleError::InUse {
                    group_id: id.to_string(),
                    device_id: device.id.clone(),
                    tag: tag.name.clone(),
                });
            }
        }
        let removed = self.modify(|groups| {
            groups
                .remove(id)
                .ok_or_else(|| ScheduleError::NotFound(id.to_string()))
        })?;
        info!(target: "ems.schedule", group_id = %id, "schedule_group_removed");
        Ok(removed)
    }

    /// 复制当前表、修改、整体替换，成功后递增版本号。
    fn modify<T>(
        &self,
        apply: impl FnOnce(&mut HashMap<String, ScheduleGroup>) -> Result<T, ScheduleError>,
    ) -> Result<T, ScheduleError> {
        let result = {
            let mut guard = self.groups.write().unwrap_or_else(PoisonError::into_inner);
            let mut next = (**guard).clone();
            let result = apply(&mut next)?;
            *guard = Arc::new(next);
            result
        };
        self.version.send_modify(|version| *version += 1);
        Ok(result)
    }
}

impl Default for ScheduleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
