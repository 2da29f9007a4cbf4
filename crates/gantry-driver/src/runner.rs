//! 运动组执行
//!
//! [`GroupExecutor`] 有两个实现：
//! - [`BusGroupRunner`]：装载到各节点并执行，收集每个节点完成时的位置上报
//! - [`SimulatedRunner`]：直接在当前状态上做算术，不经过总线
//!
//! 两者返回同样形状的上报，调用方用 [`MotorStateStore::record`] 写回。
//! 执行失败时不返回任何上报，状态存储保持不变。

use crate::error::{BusResultExt, DriverError};
use crate::motor_state::MotorStateStore;
use gantry_bus::{BusCommand, BusTransport};
use gantry_protocol::{
    MotorReport, MotorStatus, MoveGroup, MoveGroupStep, MoveStopCondition, Node, NodeMap,
    PipetteAction,
};
use smallvec::SmallVec;
use tracing::{debug, warn};

/// 单个节点在一个运动组中的步序列（通常只有几步）
type NodeSteps = SmallVec<[MoveGroupStep; 4]>;

/// 运动组执行器
pub trait GroupExecutor {
    /// 执行运动组，返回参与节点的最终上报
    fn execute(
        &mut self,
        group: &MoveGroup,
        state: &MotorStateStore,
    ) -> Result<NodeMap<MotorReport>, DriverError>;
}

fn steps_by_node(group: &MoveGroup) -> NodeMap<NodeSteps> {
    let mut by_node: NodeMap<NodeSteps> = NodeMap::new();
    for step in group {
        for (node, entry) in step {
            by_node.entry(*node).or_default().push(*entry);
        }
    }
    by_node
}

/// 总线执行器
pub struct BusGroupRunner<'a, B: BusTransport + ?Sized> {
    bus: &'a B,
}

impl<'a, B: BusTransport + ?Sized> BusGroupRunner<'a, B> {
    pub fn new(bus: &'a B) -> Self {
        Self { bus }
    }

    /// 装载失败时尽力清除已装载的节点
    fn clear_loaded(&self, loaded: &[Node]) {
        for node in loaded {
            if let Err(e) = self.bus.send(*node, BusCommand::ClearMoveGroups) {
                warn!("Failed to clear move group on {}: {}", node, e);
            }
        }
    }
}

impl<B: BusTransport + ?Sized> GroupExecutor for BusGroupRunner<'_, B> {
    fn execute(
        &mut self,
        group: &MoveGroup,
        _state: &MotorStateStore,
    ) -> Result<NodeMap<MotorReport>, DriverError> {
        let by_node = steps_by_node(group);
        if by_node.is_empty() {
            return Ok(NodeMap::new());
        }

        let mut loaded: Vec<Node> = Vec::with_capacity(by_node.len());
        for (node, steps) in &by_node {
            let command = BusCommand::LoadMoveGroup {
                steps: steps.to_vec(),
            };
            let result = self
                .bus
                .send(*node, command)
                .and_then(|response| response.into_ack())
                .on_node(*node, "load_move_group");
            if let Err(e) = result {
                self.clear_loaded(&loaded);
                return Err(e);
            }
            loaded.push(*node);
        }

        let mut reports = NodeMap::new();
        for node in by_node.keys() {
            let report = self
                .bus
                .send(*node, BusCommand::ExecuteMoveGroup)
                .and_then(|response| response.into_motor())
                .on_node(*node, "execute_move_group")?;
            reports.insert(*node, report);
        }
        debug!("Move group finished on {} nodes", reports.len());
        Ok(reports)
    }
}

/// 模拟执行器
///
/// 限位开关停止视为到达零点并完成回零，其余步直接累加位移。
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedRunner;

impl SimulatedRunner {
    pub fn new() -> Self {
        Self
    }
}

impl GroupExecutor for SimulatedRunner {
    fn execute(
        &mut self,
        group: &MoveGroup,
        state: &MotorStateStore,
    ) -> Result<NodeMap<MotorReport>, DriverError> {
        let mut reports = NodeMap::new();
        for (node, steps) in steps_by_node(group) {
            let mut report = state.report(node);
            for step in steps {
                if homes_node(&step) {
                    report.position = 0.0;
                    report.encoder_position = 0.0;
                    report.motor_ok = MotorStatus::HOMED.motor_ok;
                    report.encoder_ok = MotorStatus::HOMED.encoder_ok;
                } else {
                    report.position += step.distance_mm();
                    report.encoder_position += step.distance_mm();
                }
            }
            reports.insert(node, report);
        }
        Ok(reports)
    }
}

/// 该步是否以回零结束
fn homes_node(step: &MoveGroupStep) -> bool {
    match step {
        MoveGroupStep::Axis(s) => s.stop_condition == MoveStopCondition::LimitSwitch,
        MoveGroupStep::Brushed(s) => s.stop_condition == MoveStopCondition::LimitSwitch,
        MoveGroupStep::TipAction(s) => {
            s.action == PipetteAction::Home && s.stop_condition == MoveStopCondition::LimitSwitch
        },
    }
}
