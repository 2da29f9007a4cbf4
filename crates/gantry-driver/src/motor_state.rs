//! 电机状态存储（MotorStateStore）
//!
//! 按节点保存电机位置、编码器位置与 [`MotorStatus`]。
//! 每个返回位置上报的命令都通过 [`MotorStateStore::record`] 写入。

use gantry_protocol::{
    Axis, AxisMap, MotorReport, MotorStatus, Node, NodeMap, axis_to_node, node_to_axis,
};
use tracing::trace;

/// 合并一次上报与已有状态
///
/// `motor_ok` 一旦为真就保持为真（回零不会被单次上报抖动推翻），
/// 只有显式重新回零（[`MotorStateStore::clear_status`]）才能清除；
/// `encoder_ok` 直接取上报值。
pub fn merge_motor_status(previous: Option<MotorStatus>, report: MotorStatus) -> MotorStatus {
    MotorStatus {
        motor_ok: report.motor_ok || previous.is_some_and(|p| p.motor_ok),
        encoder_ok: report.encoder_ok,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotorStateStore {
    position: NodeMap<f64>,
    encoder_position: NodeMap<f64>,
    status: NodeMap<MotorStatus>,
}

impl MotorStateStore {
    /// 以给定的轴位置作为初始位置（电机与编码器相同）
    pub fn new(initial: &AxisMap<f64>) -> Self {
        let position: NodeMap<f64> = initial
            .iter()
            .map(|(axis, value)| (axis_to_node(*axis), *value))
            .collect();
        Self {
            encoder_position: position.clone(),
            position,
            status: NodeMap::new(),
        }
    }

    /// 写入位置上报
    pub fn record(&mut self, reports: &NodeMap<MotorReport>) {
        for (node, report) in reports {
            self.position.insert(*node, report.position);
            self.encoder_position.insert(*node, report.encoder_position);
            let merged = merge_motor_status(self.status.get(node).copied(), report.status());
            trace!("{}: {:?} -> {:?}", node, report, merged);
            self.status.insert(*node, merged);
        }
    }

    /// 只更新位置，不触碰状态（传感器类操作）
    pub fn record_positions(&mut self, positions: &NodeMap<f64>) {
        for (node, value) in positions {
            self.position.insert(*node, *value);
            self.encoder_position.insert(*node, *value);
        }
    }

    /// 位置偏移（电机与编码器同时）
    pub fn offset_position(&mut self, node: Node, delta: f64) {
        let next = self.position(node).unwrap_or(0.0) + delta;
        self.position.insert(node, next);
        self.encoder_position.insert(node, next);
    }

    /// 直接覆盖状态（不经过合并）
    pub fn set_status(&mut self, node: Node, status: MotorStatus) {
        self.status.insert(node, status);
    }

    /// 显式重新回零前清除状态
    pub fn clear_status(&mut self, nodes: impl IntoIterator<Item = Node>) {
        for node in nodes {
            self.status.remove(&node);
        }
    }

    pub fn position(&self, node: Node) -> Option<f64> {
        self.position.get(&node).copied()
    }

    pub fn encoder_position(&self, node: Node) -> Option<f64> {
        self.encoder_position.get(&node).copied()
    }

    pub fn status(&self, node: Node) -> Option<MotorStatus> {
        self.status.get(&node).copied()
    }

    pub fn positions(&self) -> &NodeMap<f64> {
        &self.position
    }

    pub fn statuses(&self) -> &NodeMap<MotorStatus> {
        &self.status
    }

    /// 当前节点状态组成的上报（模拟执行的起点）
    pub fn report(&self, node: Node) -> MotorReport {
        let status = self.status(node).unwrap_or_default();
        MotorReport::new(
            self.position(node).unwrap_or(0.0),
            self.encoder_position(node).unwrap_or(0.0),
            status.motor_ok,
            status.encoder_ok,
        )
    }

    /// 投影到轴空间，没有记录的轴使用 `default`
    pub fn snapshot(&self, default: f64) -> AxisMap<f64> {
        axis_convert(&self.position, default)
    }

    pub fn encoder_snapshot(&self, default: f64) -> AxisMap<f64> {
        axis_convert(&self.encoder_position, default)
    }

    /// 所有请求的轴都有状态且 `motor_ok` 为真
    pub fn ready_for_movement(&self, axes: &[Axis]) -> bool {
        axes.iter().all(|axis| {
            self.status(axis_to_node(*axis))
                .is_some_and(|status| status.motor_ok)
        })
    }

    /// 编码器位置不可信的轴
    pub fn axes_without_encoder(&self, axes: &[Axis]) -> Vec<Axis> {
        axes.iter()
            .copied()
            .filter(|axis| {
                !self
                    .status(axis_to_node(*axis))
                    .is_some_and(|status| status.encoder_ok)
            })
            .collect()
    }
}

/// 节点键位置转为完整的轴键位置
pub fn axis_convert(map: &NodeMap<f64>, default: f64) -> AxisMap<f64> {
    let mut converted: AxisMap<f64> = Axis::ALL.iter().map(|axis| (*axis, default)).collect();
    for (node, value) in map {
        if let Some(axis) = node_to_axis(*node) {
            converted.insert(axis, *value);
        }
    }
    converted
}
