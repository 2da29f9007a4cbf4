//! 内存总线设备模型
//!
//! 模拟一台龙门平台的总线侧行为：节点可达性、运动组执行后的位置、
//! 回零状态、工具检测、固件版本。用于在没有硬件的情况下测试上层逻辑。
//!
//! 可达性规则：
//! - 合成子节点（`head_l` 等）在其核心控制器可达时可达
//! - `pipette_left_tip` 仅在左移液器可达且为 96 通道时可达

use crate::{BusCommand, BusError, BusResponse, BusTransport};
use gantry_protocol::{
    DeviceInfo, GripperInformation, MotorReport, MotorStatus, MoveGroupStep, MoveStopCondition,
    Node, NodeMap, PipetteAction, PipetteInformation, PipetteSubType, SubSystem, ToolSummary,
};
use parking_lot::Mutex;
use semver::Version;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::trace;

/// 液面探测时模型认为液面位于最大行程前的距离（mm）
const LIQUID_SURFACE_MARGIN_MM: f64 = 2.0;

#[derive(Debug, Default)]
struct PlantState {
    responsive: BTreeSet<Node>,
    positions: NodeMap<f64>,
    encoder_positions: NodeMap<f64>,
    statuses: NodeMap<MotorStatus>,
    loaded: NodeMap<Vec<MoveGroupStep>>,
    timeouts: BTreeSet<Node>,
    tools: ToolSummary,
    versions: BTreeMap<SubSystem, Version>,
    currents: NodeMap<(Option<f64>, Option<f64>)>,
    enabled: BTreeSet<Node>,
    sent: Vec<(Node, BusCommand)>,
}

impl PlantState {
    fn reachable(&self, node: Node) -> bool {
        match node {
            Node::PipetteLeftTip => {
                self.responsive.contains(&Node::PipetteLeft)
                    && self
                        .tools
                        .left
                        .as_ref()
                        .and_then(|p| p.name.sub_type())
                        == Some(PipetteSubType::NinetySix)
            },
            other => self.responsive.contains(&other.subsystem().node()),
        }
    }

    fn report(&self, node: Node) -> MotorReport {
        let status = self.statuses.get(&node).copied().unwrap_or_default();
        MotorReport::new(
            self.positions.get(&node).copied().unwrap_or(0.0),
            self.encoder_positions.get(&node).copied().unwrap_or(0.0),
            status.motor_ok,
            status.encoder_ok,
        )
    }

    fn set_position(&mut self, node: Node, position: f64) {
        self.positions.insert(node, position);
        self.encoder_positions.insert(node, position);
    }

    fn offset_position(&mut self, node: Node, delta: f64) {
        let current = self.positions.get(&node).copied().unwrap_or(0.0);
        self.set_position(node, current + delta);
    }

    fn execute(&mut self, node: Node) -> MotorReport {
        let steps = self.loaded.remove(&node).unwrap_or_default();
        for step in steps {
            match step {
                MoveGroupStep::Axis(s) => {
                    if s.stop_condition == MoveStopCondition::LimitSwitch {
                        self.home(node);
                    } else {
                        self.offset_position(node, s.distance_mm);
                    }
                },
                MoveGroupStep::TipAction(s) => {
                    if s.action == PipetteAction::Home
                        && s.stop_condition == MoveStopCondition::LimitSwitch
                    {
                        self.home(node);
                    } else {
                        self.offset_position(node, s.velocity_mm_sec * s.duration_sec);
                    }
                },
                MoveGroupStep::Brushed(s) => {
                    if s.stop_condition == MoveStopCondition::LimitSwitch {
                        self.home(node);
                    }
                },
            }
        }
        self.report(node)
    }

    fn home(&mut self, node: Node) {
        self.set_position(node, 0.0);
        self.statuses.insert(node, MotorStatus::HOMED);
    }

    fn handle(&mut self, node: Node, command: BusCommand) -> Result<BusResponse, BusError> {
        match command {
            BusCommand::LoadMoveGroup { steps } => {
                self.loaded.insert(node, steps);
                Ok(BusResponse::Ack)
            },
            BusCommand::ExecuteMoveGroup => Ok(BusResponse::Motor(self.execute(node))),
            BusCommand::ClearMoveGroups => {
                self.loaded.remove(&node);
                Ok(BusResponse::Ack)
            },
            BusCommand::ReadMotorPosition => Ok(BusResponse::Motor(self.report(node))),
            BusCommand::UpdateMotorEstimation => {
                let encoder = self.encoder_positions.get(&node).copied().unwrap_or(0.0);
                self.positions.insert(node, encoder);
                Ok(BusResponse::Motor(self.report(node)))
            },
            BusCommand::SetCurrents { hold, run, .. } => {
                let entry = self.currents.entry(node).or_default();
                if hold.is_some() {
                    entry.0 = hold;
                }
                if run.is_some() {
                    entry.1 = run;
                }
                Ok(BusResponse::Ack)
            },
            BusCommand::EnableMotor => {
                self.enabled.insert(node);
                Ok(BusResponse::Ack)
            },
            BusCommand::DisableMotor => {
                self.enabled.remove(&node);
                Ok(BusResponse::Ack)
            },
            BusCommand::ReadLimitSwitch => {
                let at_home = self.positions.get(&node).copied().unwrap_or(0.0).abs() < 1e-9;
                let homed = self.statuses.get(&node).is_some_and(|s| s.motor_ok);
                Ok(BusResponse::LimitSwitch(at_home && homed))
            },
            BusCommand::ReadAttachedTools => Ok(BusResponse::Tools(self.tools.clone())),
            BusCommand::ReadDeviceInfo => {
                let subsystem = node.subsystem();
                let version = self
                    .versions
                    .get(&subsystem)
                    .cloned()
                    .unwrap_or_else(|| Version::new(1, 0, 0));
                Ok(BusResponse::DeviceInfo(DeviceInfo::new(subsystem, version)))
            },
            BusCommand::LiquidProbe {
                mover,
                max_z_distance,
                ..
            } => {
                self.set_position(mover, max_z_distance - LIQUID_SURFACE_MARGIN_MM);
                let mut positions = NodeMap::new();
                positions.insert(mover, self.report(mover));
                Ok(BusResponse::Positions(positions))
            },
            BusCommand::CapacitiveProbe {
                mover, distance_mm, ..
            } => {
                self.offset_position(mover, distance_mm);
                let mut positions = NodeMap::new();
                positions.insert(mover, self.report(mover));
                Ok(BusResponse::Positions(positions))
            },
            BusCommand::CapacitivePass {
                mover, distance_mm, ..
            } => {
                self.offset_position(mover, distance_mm);
                Ok(BusResponse::SensorData(Vec::new()))
            },
        }
    }
}

/// 内存总线
///
/// 所有方法只需要 `&self`，可通过 `Arc<MockBus>` 同时交给后端和测试代码。
#[derive(Debug, Default)]
pub struct MockBus {
    state: Mutex<PlantState>,
}

impl MockBus {
    /// 没有任何节点应答的空总线
    pub fn new() -> Self {
        Self::default()
    }

    /// 核心节点（龙门 X/Y、头部）全部在线
    pub fn with_core() -> Self {
        Self::new()
            .with_node(Node::GantryX)
            .with_node(Node::GantryY)
            .with_node(Node::Head)
    }

    pub fn with_node(self, node: Node) -> Self {
        self.set_responsive(node, true);
        self
    }

    pub fn with_left_pipette(self, info: PipetteInformation) -> Self {
        {
            let mut state = self.state.lock();
            state.tools.left = Some(info);
            state.responsive.insert(Node::PipetteLeft);
        }
        self
    }

    pub fn with_right_pipette(self, info: PipetteInformation) -> Self {
        {
            let mut state = self.state.lock();
            state.tools.right = Some(info);
            state.responsive.insert(Node::PipetteRight);
        }
        self
    }

    pub fn with_gripper(self, info: GripperInformation) -> Self {
        {
            let mut state = self.state.lock();
            state.tools.gripper = Some(info);
            state.responsive.insert(Node::Gripper);
        }
        self
    }

    pub fn with_firmware_version(self, subsystem: SubSystem, version: Version) -> Self {
        self.state.lock().versions.insert(subsystem, version);
        self
    }

    /// 设置节点（核心控制器地址）是否应答
    pub fn set_responsive(&self, node: Node, responsive: bool) {
        let mut state = self.state.lock();
        if responsive {
            state.responsive.insert(node);
        } else {
            state.responsive.remove(&node);
        }
    }

    /// 节点仍出现在探测结果中，但所有命令超时
    pub fn inject_timeout(&self, node: Node) {
        self.state.lock().timeouts.insert(node);
    }

    pub fn clear_faults(&self) {
        self.state.lock().timeouts.clear();
    }

    /// 直接设置设备侧报告的电机状态（模拟上电或失步）
    pub fn set_motor_status(&self, node: Node, status: MotorStatus) {
        self.state.lock().statuses.insert(node, status);
    }

    pub fn set_position(&self, node: Node, position: f64) {
        self.state.lock().set_position(node, position);
    }

    pub fn set_firmware_version(&self, subsystem: SubSystem, version: Version) {
        self.state.lock().versions.insert(subsystem, version);
    }

    pub fn position(&self, node: Node) -> f64 {
        self.state.lock().positions.get(&node).copied().unwrap_or(0.0)
    }

    /// 节点最近一次设置的 (hold, run) 电流
    pub fn currents(&self, node: Node) -> Option<(Option<f64>, Option<f64>)> {
        self.state.lock().currents.get(&node).copied()
    }

    pub fn enabled_nodes(&self) -> BTreeSet<Node> {
        self.state.lock().enabled.clone()
    }

    /// 已成功投递的命令（按顺序）
    pub fn sent_commands(&self) -> Vec<(Node, BusCommand)> {
        self.state.lock().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }
}

impl BusTransport for MockBus {
    fn send(&self, node: Node, command: BusCommand) -> Result<BusResponse, BusError> {
        let mut state = self.state.lock();
        if !state.reachable(node) || state.timeouts.contains(&node) {
            trace!("MockBus: {} timed out on {}", node, command.operation());
            return Err(BusError::Timeout);
        }
        state.sent.push((node, command.clone()));
        state.handle(node, command)
    }

    fn probe(
        &self,
        expected: &BTreeSet<Node>,
        _timeout: Duration,
    ) -> Result<BTreeSet<Node>, BusError> {
        let state = self.state.lock();
        Ok(expected
            .iter()
            .copied()
            .filter(|node| state.responsive.contains(node))
            .collect())
    }
}
