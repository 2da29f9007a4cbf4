//! Gantry SDK - 多轴龙门运动控制 Rust SDK
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 轴、节点、运动段、状态等数据模型
//! - **总线层** (`bus`): 总线传输抽象与内存模拟总线
//! - **驱动层** (`driver`): 节点在线状态、电机状态、运动组构建与执行
//! - **后端层** (`hal`): 硬件/仿真两种可互换的运动控制后端
//!
//! # 快速开始
//!
//! ```rust
//! use gantry_sdk::prelude::*;
//!
//! # fn main() -> gantry_sdk::Result<()> {
//! gantry_sdk::init_logging();
//!
//! let mut backend = SimulatedBackend::new(
//!     BackendConfig::default(),
//!     SimulatedInstruments::default(),
//!     Vec::new(),
//!     false,
//! )?;
//! backend.probe_network()?;
//! let position = backend.home(&[Axis::X, Axis::Y])?;
//! assert_eq!(position[&Axis::X], 0.0);
//! # Ok(())
//! # }
//! ```

mod logging;
pub mod prelude;

pub use gantry_bus as bus;
pub use gantry_driver as driver;
pub use gantry_hal as hal;
pub use gantry_protocol as protocol;

pub use logging::init_logging;

// 后端层（推荐入口）
pub use gantry_hal::{
    BackendConfig, BackendError, CurrentScope, GripForceProfile, HardwareBackend, MotionBackend,
    Result, SimulatedBackend, SimulatedInstruments, SimulatedPipette,
};

// 各层错误类型
pub use gantry_bus::BusError;
pub use gantry_driver::DriverError;
pub use gantry_protocol::ProtocolError;
