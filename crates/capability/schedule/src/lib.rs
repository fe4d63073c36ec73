//! # 调度组注册表
//!
//! 跨设备共享的命名轮询频率。
//!
//! ## 解析规则（每次构建轮询计划时计算一次）
//!
//! ```text
//! 分组存在且启用   → 使用分组间隔
//! 分组存在但禁用   → 点位暂停（保留，不轮询；重新启用后按分组间隔恢复）
//! 无分组或分组未知 → 使用设备级 polling_interval_ms
//! ```
//!
//! 注册表采用写时复制：读者拿到 `Arc` 快照，写者替换整张表并递增版本号，
//! 轮询器通过 `watch` 订阅版本变化后重建计划。

mod error;
mod plan;
mod registry;

pub use error::ScheduleError;
pub use plan::{GroupKey, PollGroup, PollPlan};
pub use registry::{GroupSnapshot, ScheduleRegistry};
