//! 轮询计划：将设备的启用点位按调度来源分组。

use domain::{Device, ScheduleGroup, Tag};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// 定时器来源。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKey {
    /// 设备级 polling_interval_ms
    Device,
    /// 命名调度组
    Group(String),
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => f.write_str("device"),
            Self::Group(id) => f.write_str(id),
        }
    }
}

/// 同一定时器下的点位。
#[derive(Debug, Clone, PartialEq)]
pub struct PollGroup {
    pub key: GroupKey,
    pub interval_ms: u64,
    pub tags: Vec<Tag>,
}

/// 设备轮询计划。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollPlan {
    /// 按 key 排序，设备级在前
    pub groups: Vec<PollGroup>,
    /// 所属分组被禁用的点位名
    pub paused: Vec<String>,
    /// 引用了未知分组、回退到设备间隔的点位名
    pub fallback: Vec<String>,
}

impl PollPlan {
    /// 按注册表快照构建计划。禁用的点位不参与。
    pub fn build(device: &Device, groups: &HashMap<String, ScheduleGroup>) -> Self {
        let mut buckets: BTreeMap<GroupKey, PollGroup> = BTreeMap::new();
        let mut paused = Vec::new();
        let mut fallback = Vec::new();

        for tag in device.enabled_tags() {
            let (key, interval_ms) = match tag.schedule_group_id.as_deref() {
                None => (GroupKey::Device, device.polling_interval_ms),
                Some(id) => match groups.get(id) {
                    Some(group) if group.enabled => {
                        (GroupKey::Group(id.to_string()), group.polling_interval_ms)
                    }
                    Some(_) => {
                        paused.push(tag.name.clone());
                        continue;
                    }
                    None => {
                        fallback.push(tag.name.clone());
                        (GroupKey::Device, device.polling_interval_ms)
                    }
                },
            };
            buckets
                .entry(key.clone())
                .or_insert_with(|| PollGroup {
                    key,
                    interval_ms,
                    tags: Vec::new(),
                })
                .tags
                .push(tag.clone());
        }

        Self {
            groups: buckets.into_values().collect(),
            paused,
            fallback,
        }
    }

    /// 参与轮询的点位数。
    pub fn active_tag_count(&self) -> usize {
        self.groups.iter().map(|group| group.tags.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group(&self, key: &GroupKey) -> Option<&PollGroup> {
        self.groups.iter().find(|group| &group.key == key)
    }

    /// 各定时器的 (key, 间隔)，用于判断计划变化时是否需要重建定时器。
    pub fn timers(&self) -> Vec<(GroupKey, u64)> {
        self.groups
            .iter()
            .map(|group| (group.key.clone(), group.interval_ms))
            .collect()
    }
}
