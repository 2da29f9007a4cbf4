//! # Gantry Protocol
//!
//! 多轴龙门平台的数据模型定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `axis`: 逻辑轴、轴类别、安装位（Mount）
//! - `node`: 总线节点地址、子系统
//! - `mapping`: 轴 ↔ 节点映射（AxisNodeMap）
//! - `motion`: Move/Block、MoveGroup 步骤与停止条件
//! - `status`: 电机状态、电流配置、固件更新状态
//! - `instrument`: 移液器/夹爪身份信息
//!
//! ## 映射约定
//!
//! 轴与节点之间的映射使用穷举 `match`，新增枚举值时由编译器保证映射完整。

pub mod axis;
pub mod instrument;
pub mod mapping;
pub mod motion;
pub mod node;
pub mod status;

// 重新导出常用类型
pub use axis::*;
pub use instrument::*;
pub use mapping::*;
pub use motion::*;
pub use node::*;
pub use status::*;

use thiserror::Error;

/// 协议层错误类型
///
/// `UnmappedAxis` / `UnmappedNode` 只会在原始 ID 转换时出现（编程错误），
/// 节点不在总线上不属于此类错误，由 PresenceTracker 处理。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unmapped axis id: {raw}")]
    UnmappedAxis { raw: u8 },

    #[error("Unmapped node id: 0x{raw:02X}")]
    UnmappedNode { raw: u8 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: String },
}

impl ProtocolError {
    pub fn invalid_value(field: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
        }
    }
}
