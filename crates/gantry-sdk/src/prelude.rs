//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use gantry_sdk::prelude::*;
//! ```

// 后端层
pub use gantry_hal::{
    AttachedInstruments, BackendConfig, ExpectedInstruments, GripForceProfile, HardwareBackend,
    MotionBackend, SimulatedBackend, SimulatedInstruments, SimulatedPipette,
};

// 数据模型
pub use gantry_protocol::{
    Axis, AxisMap, Block, Coordinates, GantryLoad, Mount, Move, MoveStopCondition, Node,
    PipetteAction, PipetteName, SubSystem,
};

// 总线
pub use gantry_bus::BusTransport;

// 错误类型
pub use gantry_bus::BusError;
pub use gantry_driver::DriverError;
pub use gantry_hal::BackendError;
pub use gantry_protocol::ProtocolError;
