//! 错误类型体系
//!
//! 分层错误处理：驱动层错误经 `#[from]` 包装进入 [`BackendError`]，
//! 后端自身的门控与工具校验错误直接在此定义。
//!
//! # 示例
//!
//! ```rust
//! use gantry_hal::BackendError;
//!
//! fn handle_error(err: BackendError) {
//!     if err.is_fatal() {
//!         eprintln!("致命错误: {}", err);
//!     } else if err.is_retryable() {
//!         eprintln!("可重试错误: {}", err);
//!     } else {
//!         eprintln!("错误: {}", err);
//!     }
//! }
//! ```

use gantry_driver::DriverError;
use gantry_protocol::{Axis, Mount, PipetteName};
use thiserror::Error;

/// 后端错误类型
#[derive(Debug, Error)]
pub enum BackendError {
    // ==================== 门控 ====================
    /// 固件更新未完成，禁止运动/回零/电流设置
    #[error("Firmware update required before {operation}")]
    FirmwareUpdateRequired { operation: &'static str },

    /// 轴状态不可信，需要先回零
    #[error("Axes must be homed first: {axes:?}")]
    MustHome { axes: Vec<Axis> },

    // ==================== 工具 ====================
    /// 固件报告了无法识别的移液器名称
    #[error("Invalid pipette name {name_int} on mount {mount}")]
    InvalidInstrument { name_int: u16, mount: Mount },

    /// 移液器型号无法识别
    #[error("Invalid model {model} for pipette {name} on mount {mount}")]
    InvalidInstrumentModel {
        name: PipetteName,
        model: String,
        mount: Mount,
    },

    /// 检测到的工具与期望不符（严格模式）
    #[error("Mount {mount}: expected instrument {expected} but got {found}")]
    InstrumentMismatch {
        mount: Mount,
        expected: String,
        found: String,
    },

    /// 期望的工具不受支持
    #[error("Mount {mount} requested {requested}, which is not supported")]
    UnsupportedInstrument { mount: Mount, requested: String },

    // ==================== 配置 ====================
    /// 电流表尚未初始化
    #[error("Current settings not initialized; call update_to_default_current_settings first")]
    CurrentSettingsMissing,

    /// 需要固件更新但没有配置刷写驱动
    #[error("Firmware updates are required but no updater is configured")]
    UpdaterMissing,

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    // ==================== 底层 ====================
    /// 驱动层错误
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl BackendError {
    /// 是否为致命错误
    ///
    /// 总线链路不可用或工具身份错误，重试不会改变结果。
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidInstrument { .. }
            | Self::InvalidInstrumentModel { .. }
            | Self::UnsupportedInstrument { .. } => true,
            Self::Driver(DriverError::Protocol(_)) => true,
            Self::Driver(e) => e.bus_error().is_some_and(|b| b.is_fatal()),
            _ => false,
        }
    }

    /// 是否可重试
    ///
    /// 运动命令的总线超时不可重试（部分执行的运动需要重新规划）。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Driver(DriverError::CoreNodesMissing { .. } | DriverError::Probe(_))
        )
    }

    /// 是否需要调用方先回零
    pub fn is_must_home(&self) -> bool {
        matches!(
            self,
            Self::MustHome { .. } | Self::Driver(DriverError::MustHome { .. })
        )
    }

    /// 创建配置错误
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// 创建门控错误
    pub fn update_required(operation: &'static str) -> Self {
        Self::FirmwareUpdateRequired { operation }
    }

    /// 创建回零错误
    pub fn must_home(axes: Vec<Axis>) -> Self {
        Self::MustHome { axes }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_bus::{BusDeviceError, BusDeviceErrorKind, BusError};
    use gantry_protocol::Node;
    use std::collections::BTreeSet;

    #[test]
    fn test_error_display() {
        let err = BackendError::update_required("move");
        assert_eq!(err.to_string(), "Firmware update required before move");

        let err = BackendError::InvalidInstrument {
            name_int: 42,
            mount: Mount::Left,
        };
        assert!(err.to_string().contains("42") && err.to_string().contains("LEFT"));

        let err = BackendError::InvalidInstrumentModel {
            name: PipetteName::P50Single,
            model: "9.9".to_string(),
            mount: Mount::Right,
        };
        assert!(err.to_string().contains("p50_single"));
    }

    #[test]
    fn test_driver_error_transparent() {
        let err: BackendError =
            DriverError::bus(Node::GantryX, "execute_move_group", BusError::Timeout).into();
        assert!(err.to_string().contains("gantry_x"));
        assert!(!err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_classification() {
        let fatal: BackendError = DriverError::bus(
            Node::Head,
            "read_attached_tools",
            BusError::Device(BusDeviceError::new(BusDeviceErrorKind::NotFound, "unplugged")),
        )
        .into();
        assert!(fatal.is_fatal());

        let retry: BackendError = DriverError::CoreNodesMissing {
            missing: BTreeSet::from([Node::GantryY]),
        }
        .into();
        assert!(retry.is_retryable());

        assert!(BackendError::must_home(vec![Axis::X]).is_must_home());
        assert!(BackendError::from(DriverError::MustHome { axes: vec![Axis::Y] }).is_must_home());
        assert!(!BackendError::UpdaterMissing.is_fatal());
    }
}
