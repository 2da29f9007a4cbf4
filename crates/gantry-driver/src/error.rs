//! 驱动层错误类型定义

use gantry_bus::BusError;
use gantry_protocol::{Axis, Node, ProtocolError, SubSystem};
use std::collections::BTreeSet;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 总线错误（附带出错节点与操作）
    #[error("Bus error on {node} during {operation}: {source}")]
    Bus {
        node: Node,
        operation: &'static str,
        #[source]
        source: BusError,
    },

    /// 网络探测失败（链路级错误，不是超时）
    #[error("Network probe failed: {0}")]
    Probe(#[source] BusError),

    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 轴的电机或编码器位置不可信，需要先回零
    #[error("Axes must be homed first: {axes:?}")]
    MustHome { axes: Vec<Axis> },

    /// 核心节点未全部应答
    #[error("Core nodes missing from network: {missing:?}")]
    CoreNodesMissing { missing: BTreeSet<Node> },

    /// 需要应答的操作没有得到任何节点应答
    #[error("No node answered {operation}")]
    EmptyResponse { operation: &'static str },

    /// 固件更新被消费端取消
    #[error("Firmware update cancelled")]
    UpdateCancelled,

    /// 固件更新失败
    #[error("Firmware update failed for {subsystem:?}: {reason}")]
    UpdateFailed {
        subsystem: Option<SubSystem>,
        reason: String,
    },
}

impl DriverError {
    pub fn bus(node: Node, operation: &'static str, source: BusError) -> Self {
        Self::Bus {
            node,
            operation,
            source,
        }
    }

    pub fn update_failed(subsystem: Option<SubSystem>, reason: impl Into<String>) -> Self {
        Self::UpdateFailed {
            subsystem,
            reason: reason.into(),
        }
    }

    /// 底层总线错误（如有）
    pub fn bus_error(&self) -> Option<&BusError> {
        match self {
            Self::Bus { source, .. } | Self::Probe(source) => Some(source),
            _ => None,
        }
    }
}

/// 给总线结果附加节点与操作上下文
pub trait BusResultExt<T> {
    fn on_node(self, node: Node, operation: &'static str) -> Result<T, DriverError>;
}

impl<T> BusResultExt<T> for Result<T, BusError> {
    fn on_node(self, node: Node, operation: &'static str) -> Result<T, DriverError> {
        self.map_err(|source| DriverError::bus(node, operation, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试 DriverError 的 Display 实现
    #[test]
    fn test_driver_error_display() {
        let err = DriverError::bus(Node::GantryY, "execute_move_group", BusError::Timeout);
        let msg = format!("{}", err);
        assert!(
            msg.contains("gantry_y") && msg.contains("execute_move_group"),
            "Bus error message: {}",
            msg
        );

        let err = DriverError::MustHome {
            axes: vec![Axis::X, Axis::ZL],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("X") && msg.contains("ZL"), "{}", msg);

        let err = DriverError::CoreNodesMissing {
            missing: BTreeSet::from([Node::GantryY]),
        };
        assert!(format!("{}", err).contains("GantryY"));

        assert_eq!(
            format!("{}", DriverError::UpdateCancelled),
            "Firmware update cancelled"
        );
    }

    /// 测试 From<ProtocolError> 转换
    #[test]
    fn test_from_protocol_error() {
        let err: DriverError = ProtocolError::UnmappedNode { raw: 0x99 }.into();
        match err {
            DriverError::Protocol(ProtocolError::UnmappedNode { raw }) => assert_eq!(raw, 0x99),
            _ => panic!("Expected Protocol variant"),
        }
    }

    #[test]
    fn test_bus_result_context() {
        let result: Result<(), BusError> = Err(BusError::Timeout);
        let err = result.on_node(Node::HeadL, "read_motor_position").unwrap_err();
        assert!(matches!(
            err,
            DriverError::Bus {
                node: Node::HeadL,
                operation: "read_motor_position",
                source: BusError::Timeout
            }
        ));
        assert!(matches!(err.bus_error(), Some(BusError::Timeout)));
    }
}
