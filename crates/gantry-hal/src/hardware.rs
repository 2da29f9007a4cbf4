//! 硬件后端（HardwareBackend）
//!
//! 通过 [`BusTransport`] 与真实控制板通信。运动组由
//! [`BusGroupRunner`] 装载并执行，执行后的电机上报写回共享状态。
//!
//! 任何总线错误都会带上出错节点与操作向上返回，已记录的状态保持不变。

use crate::backend::MotionBackend;
use crate::config::BackendConfig;
use crate::end_effector::GripForceProfile;
use crate::error::{BackendError, Result};
use crate::firmware::FirmwareUpdateStream;
use crate::instruments::{AttachedInstruments, ExpectedInstruments, identify_tools};
use crate::state::BackendCore;
use crate::watch::{ModuleEvent, ModuleEventSource, ModuleRegistry, ModuleWatcher};
use crossbeam_channel::Receiver;
use gantry_bus::{BusCommand, BusTransport};
use gantry_driver::{
    BusGroupRunner, BusResultExt, CORE_NODES, CurrentConfigStore, DriverError, FirmwareUpdater,
    UpdateReport, probe_nodes, send_currents, set_motor_enabled,
};
use gantry_protocol::{
    Axis, AxisMap, Coordinates, GantryLoad, InstrumentProbeType, Mount, Move, MoveStopCondition,
    Node, NodeMap, PipetteAction, PipetteSubType, SensorId, SubSystem, ToolSummary, axis_to_node,
    node_to_axis,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct HardwareBackend<B: BusTransport> {
    pub(crate) bus: B,
    pub(crate) core: BackendCore,
    pub(crate) updater: Option<Arc<dyn FirmwareUpdater>>,
    module_source: Option<Box<dyn ModuleEventSource>>,
    watcher: Option<ModuleWatcher>,
    registry: Arc<ModuleRegistry>,
}

impl<B: BusTransport> HardwareBackend<B> {
    /// 创建后端（不访问总线）
    ///
    /// 创建后需要先调用 [`probe_network`](MotionBackend::probe_network)，
    /// 否则没有任何节点被视为在线。
    pub fn new(bus: B, config: BackendConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            bus,
            core: BackendCore::new(config),
            updater: None,
            module_source: None,
            watcher: None,
            registry: Arc::new(ModuleRegistry::new()),
        })
    }

    /// 设置固件刷写驱动
    pub fn with_updater(mut self, updater: Arc<dyn FirmwareUpdater>) -> Self {
        self.updater = Some(updater);
        self
    }

    /// 设置模块事件源（[`watch`](MotionBackend::watch) 时启动监听）
    pub fn with_module_source(mut self, source: impl ModuleEventSource) -> Self {
        self.module_source = Some(Box::new(source));
        self
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    // ==================== 网络 ====================

    /// 严格的核心探测：龙门与头部必须全部应答
    fn probe_core(&mut self) -> Result<()> {
        let expected: BTreeSet<Node> = CORE_NODES.into_iter().collect();
        let found = probe_nodes(&self.bus, &expected, self.core.config.probe_timeout())?;
        let missing: BTreeSet<Node> = expected.difference(&found).copied().collect();
        self.core.presence.refresh_core(found);
        if !missing.is_empty() {
            return Err(DriverError::CoreNodesMissing { missing }.into());
        }
        Ok(())
    }

    fn read_attached_tools(&self) -> Result<ToolSummary> {
        let summary = self
            .bus
            .send(Node::Head, BusCommand::ReadAttachedTools)
            .and_then(|response| response.into_tools())
            .on_node(Node::Head, "read_attached_tools")?;
        Ok(summary)
    }

    pub(crate) fn probe_network_inner(&mut self) -> Result<()> {
        let attached = match self.get_attached_instruments(&ExpectedInstruments::new()) {
            Ok(attached) => attached,
            Err(e) => {
                warn!("Tool detection failed, probing without tools: {}", e);
                AttachedInstruments::default()
            },
        };

        let mut expected: BTreeSet<Node> = CORE_NODES.into_iter().collect();
        for mount in attached.mounts() {
            expected.insert(SubSystem::from_mount(mount).node());
        }
        let found = probe_nodes(&self.bus, &expected, self.core.config.probe_timeout())?;
        self.core.presence.replace(found);

        let present_tools: Vec<Mount> = attached
            .mounts()
            .into_iter()
            .filter(|mount| {
                self.core
                    .presence
                    .is_axis_present(Axis::of_main_tool_actuator(*mount))
            })
            .collect();
        self.core
            .presence
            .refresh_tools(&present_tools, attached.left_sub_type());
        Ok(())
    }

    /// 所有在线节点的电流下发
    fn send_default_currents(&mut self) -> Result<()> {
        self.core.ensure_no_update_required("set_default_currents")?;
        let updates = self.core.default_current_updates()?;
        send_currents(&self.bus, &updates)?;
        Ok(())
    }

    fn present_nodes_for(&self, axes: &[Axis]) -> Vec<Node> {
        axes.iter()
            .map(|axis| axis_to_node(*axis))
            .filter(|node| self.core.presence.is_present(*node))
            .collect()
    }

    /// 传感器探测的执行节点与传感器节点
    fn probe_nodes_for(mount: Mount) -> (Node, Node) {
        (axis_to_node(Axis::by_mount(mount)), Node::sensor_for_mount(mount))
    }
}

impl<B: BusTransport> MotionBackend for HardwareBackend<B> {
    type UpdateStream<'a>
        = FirmwareUpdateStream<'a, B>
    where
        Self: 'a;

    fn config(&self) -> &BackendConfig {
        &self.core.config
    }

    fn probe_network(&mut self) -> Result<()> {
        self.probe_network_inner()
    }

    fn present_nodes(&self) -> BTreeSet<Node> {
        self.core.presence.nodes().clone()
    }

    fn is_axis_present(&self, axis: Axis) -> bool {
        self.core.presence.is_axis_present(axis)
    }

    fn get_attached_instruments(
        &mut self,
        _expected: &ExpectedInstruments,
    ) -> Result<AttachedInstruments> {
        self.probe_core()?;
        let summary = self.read_attached_tools()?;
        let attached = identify_tools(&summary, &self.core.config.instruments);
        self.core
            .presence
            .refresh_tools(&attached.mounts(), attached.left_sub_type());
        Ok(attached)
    }

    fn update_motor_status(&mut self) -> Result<()> {
        self.core.ensure_no_update_required("update_motor_status")?;
        let nodes: Vec<Node> = self.core.presence.nodes().iter().copied().collect();
        let mut reports = NodeMap::new();
        for node in nodes {
            let report = self
                .bus
                .send(node, BusCommand::ReadMotorPosition)
                .and_then(|response| response.into_motor())
                .on_node(node, "read_motor_position")?;
            reports.insert(node, report);
        }
        self.core.motors.record(&reports);
        Ok(())
    }

    fn update_motor_estimation(&mut self, axes: &[Axis]) -> Result<()> {
        self.core.ensure_encoders_ok(axes)?;
        let mut reports = NodeMap::new();
        for node in self.present_nodes_for(axes) {
            let report = self
                .bus
                .send(node, BusCommand::UpdateMotorEstimation)
                .and_then(|response| response.into_motor())
                .on_node(node, "update_motor_estimation")?;
            reports.insert(node, report);
        }
        self.core.motors.record(&reports);
        Ok(())
    }

    fn update_position(&self) -> AxisMap<f64> {
        self.core.position()
    }

    fn update_encoder_position(&self) -> AxisMap<f64> {
        self.core.motors.encoder_snapshot(0.0)
    }

    fn check_ready_for_movement(&self, axes: &[Axis]) -> bool {
        self.core.motors.ready_for_movement(axes)
    }

    fn ensure_ready_for_movement(&self, axes: &[Axis]) -> Result<()> {
        self.core.ensure_ready_for_movement(axes)
    }

    fn get_limit_switches(&mut self) -> Result<AxisMap<bool>> {
        self.core.ensure_no_update_required("get_limit_switches")?;
        let mut switches = AxisMap::new();
        for node in self.core.presence.nodes().iter().copied() {
            let Some(axis) = node_to_axis(node) else {
                continue;
            };
            let triggered = self
                .bus
                .send(node, BusCommand::ReadLimitSwitch)
                .and_then(|response| response.into_limit_switch())
                .on_node(node, "read_limit_switch")?;
            switches.insert(axis, triggered);
        }
        Ok(switches)
    }

    fn move_axes(
        &mut self,
        origin: &Coordinates,
        moves: &[Move],
        stop_condition: MoveStopCondition,
    ) -> Result<AxisMap<f64>> {
        let mut runner = BusGroupRunner::new(&self.bus);
        self.core
            .move_axes(&mut runner, origin, moves, stop_condition)
    }

    fn home(&mut self, axes: &[Axis]) -> Result<AxisMap<f64>> {
        let mut runner = BusGroupRunner::new(&self.bus);
        self.core.home(&mut runner, axes)
    }

    fn engage_axes(&mut self, axes: &[Axis]) -> Result<()> {
        set_motor_enabled(&self.bus, self.present_nodes_for(axes), true)?;
        self.core.set_engaged(axes, true);
        Ok(())
    }

    fn disengage_axes(&mut self, axes: &[Axis]) -> Result<()> {
        set_motor_enabled(&self.bus, self.present_nodes_for(axes), false)?;
        self.core.set_engaged(axes, false);
        Ok(())
    }

    fn engaged_axes(&self) -> AxisMap<bool> {
        self.core.engaged.clone()
    }

    fn update_to_default_current_settings(&mut self, load: GantryLoad) -> Result<()> {
        self.core.load_default_currents(load);
        self.send_default_currents()
    }

    fn set_default_currents(&mut self) -> Result<()> {
        self.send_default_currents()
    }

    fn set_active_current(&mut self, currents: &AxisMap<f64>) -> Result<()> {
        self.core.ensure_no_update_required("set_active_current")?;
        self.core.currents()?;
        let updates = self.core.run_current_updates(currents);
        send_currents(&self.bus, &updates)?;
        self.core.record_run_currents(currents)
    }

    fn set_hold_current(&mut self, currents: &AxisMap<f64>) -> Result<()> {
        self.core.ensure_no_update_required("set_hold_current")?;
        self.core.currents()?;
        let updates = self.core.hold_current_updates(currents);
        send_currents(&self.bus, &updates)?;
        self.core.record_hold_currents(currents)
    }

    fn motor_run_currents(&self) -> AxisMap<f64> {
        self.core
            .currents
            .as_ref()
            .map(CurrentConfigStore::run_currents)
            .unwrap_or_default()
    }

    fn motor_hold_currents(&self) -> AxisMap<f64> {
        self.core
            .currents
            .as_ref()
            .map(CurrentConfigStore::hold_currents)
            .unwrap_or_default()
    }

    fn snapshot_current_settings(&self) -> Result<CurrentConfigStore> {
        self.core.currents().cloned()
    }

    fn restore_current_settings(&mut self, saved: CurrentConfigStore) -> Result<()> {
        debug!("Restoring current settings");
        self.core.currents = Some(saved);
        self.send_default_currents()
    }

    fn gripper_grip_jaw(&mut self, duty_cycle: f64, stop_condition: MoveStopCondition) -> Result<()> {
        let mut runner = BusGroupRunner::new(&self.bus);
        self.core
            .gripper_grip_jaw(&mut runner, duty_cycle, stop_condition)
    }

    fn gripper_home_jaw(&mut self, duty_cycle: f64) -> Result<()> {
        let mut runner = BusGroupRunner::new(&self.bus);
        self.core.gripper_home_jaw(&mut runner, duty_cycle)
    }

    fn gripper_hold_jaw(&mut self, encoder_position_um: i32) -> Result<()> {
        let mut runner = BusGroupRunner::new(&self.bus);
        self.core.gripper_hold_jaw(&mut runner, encoder_position_um)
    }

    fn tip_action(
        &mut self,
        axes: &[Axis],
        distance: f64,
        speed: f64,
        action: PipetteAction,
    ) -> Result<()> {
        let mut runner = BusGroupRunner::new(&self.bus);
        self.core
            .tip_action(&mut runner, axes, distance, speed, action)
    }

    fn liquid_probe(
        &mut self,
        mount: Mount,
        max_z_distance: f64,
        mount_speed: f64,
        plunger_speed: f64,
        threshold_pascals: f64,
        sensor: SensorId,
    ) -> Result<AxisMap<f64>> {
        self.core.ensure_no_update_required("liquid_probe")?;
        let (mover, tool) = Self::probe_nodes_for(mount);
        let command = BusCommand::LiquidProbe {
            mover,
            max_z_distance,
            mount_speed,
            plunger_speed,
            threshold_pascals,
            sensor,
        };
        let reports = self
            .bus
            .send(tool, command)
            .and_then(|response| response.into_positions())
            .on_node(tool, "liquid_probe")?;
        let positions: NodeMap<f64> = reports
            .iter()
            .map(|(node, report)| (*node, report.position))
            .collect();
        self.core.motors.record_positions(&positions);
        Ok(self.core.position())
    }

    fn capacitive_probe(
        &mut self,
        mount: Mount,
        moving: Axis,
        distance_mm: f64,
        speed_mm_per_s: f64,
        threshold_pf: f64,
        probe: InstrumentProbeType,
    ) -> Result<()> {
        self.core.ensure_no_update_required("capacitive_probe")?;
        let mover = axis_to_node(moving);
        let tool = Node::sensor_for_mount(mount);
        let command = BusCommand::CapacitiveProbe {
            mover,
            distance_mm,
            speed_mm_per_s,
            threshold_pf,
            sensor: SensorId::from(probe),
        };
        let reports = self
            .bus
            .send(tool, command)
            .and_then(|response| response.into_positions())
            .on_node(tool, "capacitive_probe")?;
        if let Some(report) = reports.get(&mover) {
            self.core
                .motors
                .record_positions(&NodeMap::from([(mover, report.position)]));
        }
        Ok(())
    }

    fn capacitive_pass(
        &mut self,
        mount: Mount,
        moving: Axis,
        distance_mm: f64,
        speed_mm_per_s: f64,
        probe: InstrumentProbeType,
    ) -> Result<Vec<f64>> {
        self.core.ensure_no_update_required("capacitive_pass")?;
        let mover = axis_to_node(moving);
        let tool = Node::sensor_for_mount(mount);
        let command = BusCommand::CapacitivePass {
            mover,
            distance_mm,
            speed_mm_per_s,
            sensor: SensorId::from(probe),
        };
        let data = self
            .bus
            .send(tool, command)
            .and_then(|response| response.into_sensor_data())
            .on_node(tool, "capacitive_pass")?;
        self.core.motors.offset_position(mover, distance_mm);
        Ok(data)
    }

    fn update_required(&self) -> bool {
        self.core.update_required()
    }

    fn update_firmware(
        &mut self,
        attached_pipettes: &BTreeMap<Mount, PipetteSubType>,
        force: &BTreeSet<SubSystem>,
    ) -> Result<Self::UpdateStream<'_>> {
        FirmwareUpdateStream::start(self, attached_pipettes, force)
    }

    fn grip_force_profile(&self) -> Option<&GripForceProfile> {
        self.core.grip_force_profile.as_ref()
    }

    fn set_grip_force_profile(&mut self, profile: Option<GripForceProfile>) {
        self.core.grip_force_profile = profile;
    }

    fn get_update_progress(&self) -> UpdateReport {
        self.core.update_progress()
    }

    fn watch(&mut self) -> Result<Receiver<ModuleEvent>> {
        let Some(source) = self.module_source.take() else {
            warn!("No module event source configured, module events are unavailable");
            let (_tx, rx) = crossbeam_channel::unbounded();
            return Ok(rx);
        };
        let (watcher, rx) = ModuleWatcher::spawn(source, self.registry.clone())
            .map_err(|e| BackendError::config(format!("failed to start module watcher: {}", e)))?;
        info!("Watching for module events");
        self.watcher = Some(watcher);
        Ok(rx)
    }

    fn attached_modules(&self) -> Arc<BTreeSet<String>> {
        self.registry.modules()
    }

    fn clean_up(&mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
        Ok(())
    }
}
