//! 后端层模块
//!
//! 本模块提供龙门平台的运动控制后端，包括：
//! - 统一的后端接口（[`MotionBackend`]）
//! - 硬件后端（[`HardwareBackend`]，经由总线驱动真实控制板）
//! - 仿真后端（[`SimulatedBackend`]，内存推算，行为与硬件后端一致）
//! - 回零序列、末端执行器动作、固件更新流程
//! - 工具识别、外部模块监听
//! - 配置文件（[`BackendConfig`]）
//!
//! # 使用场景
//!
//! 上层代码只依赖 [`MotionBackend`]，构造时选择具体后端。
//! 大多数用户应该通过 `gantry-sdk` 使用本 crate。

pub mod backend;
pub mod config;
mod state;
pub mod end_effector;
mod error;
pub mod firmware;
pub mod hardware;
pub mod home;
pub mod instruments;
pub mod simulated;
pub mod watch;

pub use backend::{CurrentScope, MotionBackend};
pub use config::{
    AxisBounds, BackendConfig, ByAxisKind, ByGantryLoad, CurrentSettings, FirmwareSettings,
    InstrumentSettings, MotionSettings, PartialByAxisKind, RequiredVersions,
};
pub use state::home_position;
pub use end_effector::{EndEffectorController, GripForceProfile};
pub use error::{BackendError, Result};
pub use firmware::FirmwareUpdateStream;
pub use hardware::HardwareBackend;
pub use home::{HomePhase, HomeSequencer, PlannedPhase};
pub use instruments::{
    AttachedGripper, AttachedInstrument, AttachedInstruments, AttachedPipette,
    ExpectedInstruments, InstrumentCatalog, PipetteVersion, SimulatedInstruments,
    SimulatedPipette,
};
pub use simulated::SimulatedBackend;
pub use watch::{
    ModuleEvent, ModuleEventKind, ModuleEventSource, ModuleRegistry, ModuleWatcher,
};
