//! 驱动层模块
//!
//! 本模块提供龙门平台的节点级驱动功能，包括：
//! - 节点在线状态（PresenceTracker）
//! - 电机状态存储与粘滞合并（MotorStateStore）
//! - 电流配置与下发（CurrentConfigStore）
//! - 运动组构建与执行（MotionGroupBuilder / GroupExecutor）
//! - 固件更新比对、后台刷写与进度聚合
//!
//! # 使用场景
//!
//! 适用于需要直接操作运动组与节点的场景。
//! 大多数用户应该使用 `gantry-hal` 提供的后端接口。

pub mod current;
mod error;
pub mod firmware;
pub mod motion;
pub mod motor_state;
pub mod presence;
pub mod progress;
pub mod runner;
pub mod worker;

pub use current::{CurrentConfigStore, CurrentUpdate, send_currents, set_motor_enabled};
pub use error::{BusResultExt, DriverError};
pub use firmware::{
    FirmwareCatalog, FirmwareUpdater, StaticFirmwareCatalog, UpdateHandle, UpdateSettings,
    UpdateSink, plan_updates,
};
pub use motion::MotionGroupBuilder;
pub use motor_state::{MotorStateStore, axis_convert, merge_motor_status};
pub use presence::{CORE_NODES, PresenceTracker, expand_core_nodes, probe_nodes};
pub use progress::{UpdateProgress, UpdateReport};
pub use runner::{BusGroupRunner, GroupExecutor, SimulatedRunner};
