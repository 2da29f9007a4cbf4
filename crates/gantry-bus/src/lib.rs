//! # Gantry Bus Transport Layer
//!
//! 现场总线抽象层。本层不定义线协议帧格式，只要求：
//!
//! - 命令可以寻址到单个节点，应答可以解码为位置/状态/工具/固件信息
//! - 网络探测返回在超时内应答的节点集合（超时不是错误，只会得到更小的集合）
//!
//! `mock` feature 提供 [`MockBus`]，一个内存中的总线设备模型，用于测试。

use gantry_protocol::{
    DeviceInfo, MotorReport, MoveGroupStep, Node, NodeMap, SensorId, ToolSummary,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mock")]
pub use mock::MockBus;

/// 总线层统一错误类型
#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] BusDeviceError),
    #[error("Response timeout")]
    Timeout,
    #[error("Bus disconnected")]
    Disconnected,
    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: String,
    },
    #[error("Command rejected by {node}: {reason}")]
    Rejected { node: Node, reason: String },
}

impl BusError {
    pub fn unexpected(expected: &'static str, actual: &BusResponse) -> Self {
        Self::UnexpectedResponse {
            expected,
            actual: format!("{:?}", actual),
        }
    }

    /// 链路已不可用，重试没有意义
    pub fn is_fatal(&self) -> bool {
        match self {
            BusError::Disconnected => true,
            BusError::Device(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// 设备错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusDeviceErrorKind {
    Unknown,
    NotFound,
    AccessDenied,
    Busy,
    InvalidResponse,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct BusDeviceError {
    pub kind: BusDeviceErrorKind,
    pub message: String,
}

impl BusDeviceError {
    pub fn new(kind: BusDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            BusDeviceErrorKind::NotFound | BusDeviceErrorKind::AccessDenied
        )
    }
}

impl From<&str> for BusDeviceError {
    fn from(message: &str) -> Self {
        Self::new(BusDeviceErrorKind::Unknown, message)
    }
}

/// 发往单个节点的命令
#[derive(Debug, Clone, PartialEq)]
pub enum BusCommand {
    /// 装载该节点在下一个运动组中的步序列
    LoadMoveGroup { steps: Vec<MoveGroupStep> },
    /// 执行已装载的运动组，完成后应答 `Motor`
    ExecuteMoveGroup,
    /// 丢弃已装载但未执行的运动组
    ClearMoveGroups,
    ReadMotorPosition,
    /// 用编码器位置重新估计电机位置
    UpdateMotorEstimation,
    /// `tip_motor` 为真时使用取吸头电机的电流消息
    SetCurrents {
        hold: Option<f64>,
        run: Option<f64>,
        tip_motor: bool,
    },
    EnableMotor,
    DisableMotor,
    ReadLimitSwitch,
    /// 发往头部控制器，应答 `Tools`
    ReadAttachedTools,
    ReadDeviceInfo,
    /// 发往工具传感器节点，`mover` 为执行下探的节点
    LiquidProbe {
        mover: Node,
        max_z_distance: f64,
        mount_speed: f64,
        plunger_speed: f64,
        threshold_pascals: f64,
        sensor: SensorId,
    },
    CapacitiveProbe {
        mover: Node,
        distance_mm: f64,
        speed_mm_per_s: f64,
        threshold_pf: f64,
        sensor: SensorId,
    },
    CapacitivePass {
        mover: Node,
        distance_mm: f64,
        speed_mm_per_s: f64,
        sensor: SensorId,
    },
}

impl BusCommand {
    /// 用于日志与错误上下文的操作名
    pub const fn operation(&self) -> &'static str {
        match self {
            BusCommand::LoadMoveGroup { .. } => "load_move_group",
            BusCommand::ExecuteMoveGroup => "execute_move_group",
            BusCommand::ClearMoveGroups => "clear_move_groups",
            BusCommand::ReadMotorPosition => "read_motor_position",
            BusCommand::UpdateMotorEstimation => "update_motor_estimation",
            BusCommand::SetCurrents { .. } => "set_currents",
            BusCommand::EnableMotor => "enable_motor",
            BusCommand::DisableMotor => "disable_motor",
            BusCommand::ReadLimitSwitch => "read_limit_switch",
            BusCommand::ReadAttachedTools => "read_attached_tools",
            BusCommand::ReadDeviceInfo => "read_device_info",
            BusCommand::LiquidProbe { .. } => "liquid_probe",
            BusCommand::CapacitiveProbe { .. } => "capacitive_probe",
            BusCommand::CapacitivePass { .. } => "capacitive_pass",
        }
    }
}

/// 节点应答
#[derive(Debug, Clone, PartialEq)]
pub enum BusResponse {
    Ack,
    Motor(MotorReport),
    /// 多个节点的位置（探测类命令）
    Positions(NodeMap<MotorReport>),
    LimitSwitch(bool),
    Tools(ToolSummary),
    DeviceInfo(DeviceInfo),
    SensorData(Vec<f64>),
}

impl BusResponse {
    pub fn into_ack(self) -> Result<(), BusError> {
        match self {
            BusResponse::Ack => Ok(()),
            other => Err(BusError::unexpected("Ack", &other)),
        }
    }

    pub fn into_motor(self) -> Result<MotorReport, BusError> {
        match self {
            BusResponse::Motor(report) => Ok(report),
            other => Err(BusError::unexpected("Motor", &other)),
        }
    }

    pub fn into_positions(self) -> Result<NodeMap<MotorReport>, BusError> {
        match self {
            BusResponse::Positions(positions) => Ok(positions),
            other => Err(BusError::unexpected("Positions", &other)),
        }
    }

    pub fn into_limit_switch(self) -> Result<bool, BusError> {
        match self {
            BusResponse::LimitSwitch(triggered) => Ok(triggered),
            other => Err(BusError::unexpected("LimitSwitch", &other)),
        }
    }

    pub fn into_tools(self) -> Result<ToolSummary, BusError> {
        match self {
            BusResponse::Tools(tools) => Ok(tools),
            other => Err(BusError::unexpected("Tools", &other)),
        }
    }

    pub fn into_device_info(self) -> Result<DeviceInfo, BusError> {
        match self {
            BusResponse::DeviceInfo(info) => Ok(info),
            other => Err(BusError::unexpected("DeviceInfo", &other)),
        }
    }

    pub fn into_sensor_data(self) -> Result<Vec<f64>, BusError> {
        match self {
            BusResponse::SensorData(data) => Ok(data),
            other => Err(BusError::unexpected("SensorData", &other)),
        }
    }
}

/// 总线传输
///
/// 实现负责按节点串行化命令投递；调用方保证同一时刻只有一个运动类操作在进行。
pub trait BusTransport: Send + Sync {
    /// 发送命令并等待该节点的应答
    fn send(&self, node: Node, command: BusCommand) -> Result<BusResponse, BusError>;

    /// 探测网络，返回 `expected` 中在 `timeout` 内应答的节点
    fn probe(&self, expected: &BTreeSet<Node>, timeout: Duration)
    -> Result<BTreeSet<Node>, BusError>;
}

impl<T: BusTransport + ?Sized> BusTransport for Arc<T> {
    fn send(&self, node: Node, command: BusCommand) -> Result<BusResponse, BusError> {
        (**self).send(node, command)
    }

    fn probe(
        &self,
        expected: &BTreeSet<Node>,
        timeout: Duration,
    ) -> Result<BTreeSet<Node>, BusError> {
        (**self).probe(expected, timeout)
    }
}

impl<T: BusTransport + ?Sized> BusTransport for Box<T> {
    fn send(&self, node: Node, command: BusCommand) -> Result<BusResponse, BusError> {
        (**self).send(node, command)
    }

    fn probe(
        &self,
        expected: &BTreeSet<Node>,
        timeout: Duration,
    ) -> Result<BTreeSet<Node>, BusError> {
        (**self).probe(expected, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_error_display() {
        assert_eq!(BusError::Timeout.to_string(), "Response timeout");

        let err = BusError::Rejected {
            node: Node::GantryX,
            reason: "busy".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("gantry_x") && msg.contains("busy"), "{}", msg);

        let err = BusError::unexpected("Motor", &BusResponse::Ack);
        assert!(err.to_string().contains("Ack"));
    }

    #[test]
    fn test_device_error_fatal() {
        let err = BusError::Device(BusDeviceError::new(BusDeviceErrorKind::NotFound, "gone"));
        assert!(err.is_fatal());
        assert!(!BusError::Timeout.is_fatal());
        assert!(BusError::Disconnected.is_fatal());
        let err: BusDeviceError = "oops".into();
        assert_eq!(err.kind, BusDeviceErrorKind::Unknown);
    }

    #[test]
    fn test_response_conversion() {
        assert!(BusResponse::Ack.into_ack().is_ok());
        assert!(BusResponse::Ack.into_motor().is_err());
        assert!(BusResponse::LimitSwitch(true).into_limit_switch().unwrap());
        let report = MotorReport::new(1.0, 1.0, true, true);
        assert_eq!(BusResponse::Motor(report).into_motor().unwrap(), report);
    }

    #[test]
    fn test_command_operation_name() {
        assert_eq!(BusCommand::ExecuteMoveGroup.operation(), "execute_move_group");
        let cmd = BusCommand::SetCurrents {
            hold: Some(0.1),
            run: None,
            tip_motor: false,
        };
        assert_eq!(cmd.operation(), "set_currents");
    }
}
