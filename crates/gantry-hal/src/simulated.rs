//! 仿真后端（SimulatedBackend）
//!
//! 不访问任何总线。在线节点由构造时配置的工具决定，运动组由
//! [`SimulatedRunner`] 直接推算结果：限位开关停止视为回零完成，
//! 其余步累加位移。对外行为与 [`HardwareBackend`](crate::HardwareBackend)
//! 接 `MockBus` 时一致。

use crate::backend::MotionBackend;
use crate::config::BackendConfig;
use crate::end_effector::GripForceProfile;
use crate::error::Result;
use crate::instruments::{
    AttachedInstruments, ExpectedInstruments, SimulatedInstruments, resolve_simulated,
};
use crate::state::BackendCore;
use crate::watch::{ModuleEvent, ModuleEventKind, ModuleRegistry, simulated_module_port};
use crossbeam_channel::Receiver;
use gantry_driver::{CurrentConfigStore, SimulatedRunner, UpdateReport};
use gantry_protocol::{
    Axis, AxisMap, Coordinates, GantryLoad, InstrumentProbeType, Mount, Move, MoveStopCondition,
    MotorStatus, Node, NodeMap, PipetteAction, PipetteSubType, SensorId, SubSystem, axis_to_node,
    node_to_axis,
};
use std::collections::{BTreeMap, BTreeSet};
use std::iter;
use std::sync::Arc;
use tracing::{debug, info};

/// 仿真液面探测认为液面位于最大行程前的距离（mm）
const LIQUID_SURFACE_MARGIN_MM: f64 = 2.0;

pub struct SimulatedBackend {
    core: BackendCore,
    instruments: SimulatedInstruments,
    strict_attached: bool,
    stub_modules: Vec<String>,
    registry: Arc<ModuleRegistry>,
}

impl SimulatedBackend {
    /// 创建仿真后端
    ///
    /// - `instruments`: 各安装位上"装着"的工具，不受支持的型号直接报错
    /// - `stub_modules`: [`watch`](MotionBackend::watch) 时报告的外部模块名称
    /// - `strict_attached`: 工具检测时配置与期望不一致是否报错
    pub fn new(
        config: BackendConfig,
        instruments: SimulatedInstruments,
        stub_modules: Vec<String>,
        strict_attached: bool,
    ) -> Result<Self> {
        config.validate()?;
        instruments.validate(&config.instruments)?;
        Ok(Self {
            core: BackendCore::new(config),
            instruments,
            strict_attached,
            stub_modules,
            registry: Arc::new(ModuleRegistry::new()),
        })
    }

    pub fn instruments(&self) -> &SimulatedInstruments {
        &self.instruments
    }

    fn set_default_currents_inner(&mut self) -> Result<()> {
        self.core.ensure_no_update_required("set_default_currents")?;
        let updates = self.core.default_current_updates()?;
        debug!("Simulating current update on {} nodes", updates.len());
        Ok(())
    }

    fn left_is_high_throughput(&self) -> bool {
        self.instruments
            .left
            .as_ref()
            .and_then(|p| p.name.sub_type())
            == Some(PipetteSubType::NinetySix)
    }
}

impl MotionBackend for SimulatedBackend {
    type UpdateStream<'a> = iter::Once<Result<UpdateReport>>;

    fn config(&self) -> &BackendConfig {
        &self.core.config
    }

    fn probe_network(&mut self) -> Result<()> {
        let mut nodes = BTreeSet::from([Node::GantryX, Node::GantryY, Node::HeadL, Node::HeadR]);
        if self.instruments.left.is_some() {
            nodes.insert(Node::PipetteLeft);
        }
        if self.instruments.right.is_some() {
            nodes.insert(Node::PipetteRight);
        }
        if self.instruments.gripper.is_some() {
            nodes.insert(Node::Gripper);
        }
        if self.left_is_high_throughput() {
            nodes.insert(Node::PipetteLeftTip);
        }
        self.core.presence.replace(nodes);
        Ok(())
    }

    fn present_nodes(&self) -> BTreeSet<Node> {
        self.core.presence.nodes().clone()
    }

    fn is_axis_present(&self, axis: Axis) -> bool {
        self.core.presence.is_axis_present(axis)
    }

    fn get_attached_instruments(
        &mut self,
        expected: &ExpectedInstruments,
    ) -> Result<AttachedInstruments> {
        Ok(resolve_simulated(
            &self.instruments,
            expected,
            self.strict_attached,
        ))
    }

    fn update_motor_status(&mut self) -> Result<()> {
        self.core.ensure_no_update_required("update_motor_status")?;
        let nodes: Vec<Node> = self.core.presence.nodes().iter().copied().collect();
        for node in nodes {
            self.core
                .motors
                .set_status(node, MotorStatus::new(false, false));
        }
        Ok(())
    }

    fn update_motor_estimation(&mut self, axes: &[Axis]) -> Result<()> {
        self.core.ensure_encoders_ok(axes)
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

    /// 已回零且停在零点的轴视为触发限位开关
    fn get_limit_switches(&mut self) -> Result<AxisMap<bool>> {
        self.core.ensure_no_update_required("get_limit_switches")?;
        let motors = &self.core.motors;
        Ok(self
            .core
            .presence
            .nodes()
            .iter()
            .filter_map(|node| {
                let axis = node_to_axis(*node)?;
                let at_home = motors.position(*node).unwrap_or(0.0).abs() < 1e-9;
                let homed = motors.status(*node).is_some_and(|s| s.motor_ok);
                Some((axis, at_home && homed))
            })
            .collect())
    }

    fn move_axes(
        &mut self,
        origin: &Coordinates,
        moves: &[Move],
        stop_condition: MoveStopCondition,
    ) -> Result<AxisMap<f64>> {
        self.core
            .move_axes(&mut SimulatedRunner::new(), origin, moves, stop_condition)
    }

    fn home(&mut self, axes: &[Axis]) -> Result<AxisMap<f64>> {
        self.core.home(&mut SimulatedRunner::new(), axes)
    }

    fn engage_axes(&mut self, axes: &[Axis]) -> Result<()> {
        self.core.set_engaged(axes, true);
        Ok(())
    }

    fn disengage_axes(&mut self, axes: &[Axis]) -> Result<()> {
        self.core.set_engaged(axes, false);
        Ok(())
    }

    fn engaged_axes(&self) -> AxisMap<bool> {
        self.core.engaged.clone()
    }

    fn update_to_default_current_settings(&mut self, load: GantryLoad) -> Result<()> {
        self.core.load_default_currents(load);
        self.set_default_currents_inner()
    }

    fn set_default_currents(&mut self) -> Result<()> {
        self.set_default_currents_inner()
    }

    fn set_active_current(&mut self, currents: &AxisMap<f64>) -> Result<()> {
        self.core.ensure_no_update_required("set_active_current")?;
        self.core.record_run_currents(currents)
    }

    fn set_hold_current(&mut self, currents: &AxisMap<f64>) -> Result<()> {
        self.core.ensure_no_update_required("set_hold_current")?;
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
        self.core.currents = Some(saved);
        self.set_default_currents_inner()
    }

    fn gripper_grip_jaw(&mut self, duty_cycle: f64, stop_condition: MoveStopCondition) -> Result<()> {
        self.core
            .gripper_grip_jaw(&mut SimulatedRunner::new(), duty_cycle, stop_condition)
    }

    fn gripper_home_jaw(&mut self, duty_cycle: f64) -> Result<()> {
        self.core
            .gripper_home_jaw(&mut SimulatedRunner::new(), duty_cycle)
    }

    fn gripper_hold_jaw(&mut self, encoder_position_um: i32) -> Result<()> {
        self.core
            .gripper_hold_jaw(&mut SimulatedRunner::new(), encoder_position_um)
    }

    fn tip_action(
        &mut self,
        axes: &[Axis],
        distance: f64,
        speed: f64,
        action: PipetteAction,
    ) -> Result<()> {
        self.core
            .tip_action(&mut SimulatedRunner::new(), axes, distance, speed, action)
    }

    fn liquid_probe(
        &mut self,
        mount: Mount,
        max_z_distance: f64,
        _mount_speed: f64,
        _plunger_speed: f64,
        _threshold_pascals: f64,
        _sensor: SensorId,
    ) -> Result<AxisMap<f64>> {
        self.core.ensure_no_update_required("liquid_probe")?;
        let mover = axis_to_node(Axis::by_mount(mount));
        self.core.motors.record_positions(&NodeMap::from([(
            mover,
            max_z_distance - LIQUID_SURFACE_MARGIN_MM,
        )]));
        Ok(self.core.position())
    }

    fn capacitive_probe(
        &mut self,
        _mount: Mount,
        moving: Axis,
        distance_mm: f64,
        _speed_mm_per_s: f64,
        _threshold_pf: f64,
        _probe: InstrumentProbeType,
    ) -> Result<()> {
        self.core.ensure_no_update_required("capacitive_probe")?;
        self.core
            .motors
            .offset_position(axis_to_node(moving), distance_mm);
        Ok(())
    }

    fn capacitive_pass(
        &mut self,
        _mount: Mount,
        moving: Axis,
        distance_mm: f64,
        _speed_mm_per_s: f64,
        _probe: InstrumentProbeType,
    ) -> Result<Vec<f64>> {
        self.core.ensure_no_update_required("capacitive_pass")?;
        self.core
            .motors
            .offset_position(axis_to_node(moving), distance_mm);
        Ok(Vec::new())
    }

    fn update_required(&self) -> bool {
        self.core.update_required()
    }

    /// 仿真平台永远不需要刷写：返回一条空进度
    fn update_firmware(
        &mut self,
        _attached_pipettes: &BTreeMap<Mount, PipetteSubType>,
        _force: &BTreeSet<SubSystem>,
    ) -> Result<Self::UpdateStream<'_>> {
        self.core.set_update_required(false);
        Ok(iter::once(Ok(UpdateReport::default())))
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
        let (tx, rx) = crossbeam_channel::unbounded();
        for (index, name) in self.stub_modules.iter().enumerate() {
            let event = ModuleEvent::new(simulated_module_port(name, index), ModuleEventKind::Create);
            info!("Simulating module {}", event.name);
            self.registry.apply(&event);
            // 接收端就在本函数返回值里，发送不会失败
            let _ = tx.send(event);
        }
        Ok(rx)
    }

    fn attached_modules(&self) -> Arc<BTreeSet<String>> {
        self.registry.modules()
    }

    fn clean_up(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::instruments::{PipetteVersion, SimulatedPipette};
    use gantry_protocol::{Block, PipetteName};

    fn pipette(name: PipetteName) -> SimulatedPipette {
        SimulatedPipette {
            name,
            model: PipetteVersion { major: 3, minor: 4 },
            id: Some("P1KSV3420230101A01".to_string()),
        }
    }

    fn sim(instruments: SimulatedInstruments) -> SimulatedBackend {
        let mut backend =
            SimulatedBackend::new(BackendConfig::default(), instruments, Vec::new(), true).unwrap();
        backend.probe_network().unwrap();
        backend
    }

    #[test]
    fn test_probe_network_from_instruments() {
        let backend = sim(SimulatedInstruments {
            left: Some(pipette(PipetteName::P1000_96)),
            ..Default::default()
        });
        assert_eq!(
            backend.present_nodes(),
            BTreeSet::from([
                Node::GantryX,
                Node::GantryY,
                Node::HeadL,
                Node::HeadR,
                Node::PipetteLeft,
                Node::PipetteLeftTip,
            ])
        );
        assert!(backend.is_axis_present(Axis::Q));
        assert!(!backend.is_axis_present(Axis::G));
    }

    #[test]
    fn test_unsupported_model_rejected() {
        let mut p = pipette(PipetteName::P50Single);
        p.model = PipetteVersion { major: 9, minor: 9 };
        let result = SimulatedBackend::new(
            BackendConfig::default(),
            SimulatedInstruments {
                right: Some(p),
                ..Default::default()
            },
            Vec::new(),
            false,
        );
        assert!(matches!(
            result,
            Err(BackendError::UnsupportedInstrument {
                mount: Mount::Right,
                ..
            })
        ));
    }

    #[test]
    fn test_home_then_move() {
        let mut backend = sim(SimulatedInstruments::default());
        assert!(!backend.check_ready_for_movement(&[Axis::X]));
        backend.home(&[Axis::X, Axis::Y, Axis::ZL]).unwrap();
        assert!(backend.check_ready_for_movement(&[Axis::X, Axis::Y, Axis::ZL]));

        let position = backend
            .move_axes(
                &Coordinates::from([(Axis::X, 0.0), (Axis::Y, 0.0)]),
                &[Move::along(Axis::X, vec![Block::constant(100.0, 1.0)])],
                MoveStopCondition::None,
            )
            .unwrap();
        assert_eq!(position[&Axis::X], 100.0);

        let switches = backend.get_limit_switches().unwrap();
        assert!(!switches[&Axis::X]);
        assert!(switches[&Axis::Y]);
    }

    #[test]
    fn test_update_motor_status_invalidates() {
        let mut backend = sim(SimulatedInstruments::default());
        backend.home(&[Axis::X]).unwrap();
        backend.update_motor_status().unwrap();
        assert!(!backend.check_ready_for_movement(&[Axis::X]));
        assert!(backend.update_motor_estimation(&[Axis::X]).unwrap_err().is_must_home());
    }

    #[test]
    fn test_strict_attached_mismatch() {
        let mut backend = sim(SimulatedInstruments {
            left: Some(pipette(PipetteName::P1000Single)),
            ..Default::default()
        });
        let expected = ExpectedInstruments::from([(Mount::Left, PipetteName::P50Single)]);
        let attached = backend.get_attached_instruments(&expected).unwrap();
        assert!(matches!(
            attached.errors.get(&Mount::Left),
            Some(BackendError::InstrumentMismatch { .. })
        ));
    }

    #[test]
    fn test_sensor_operations() {
        let mut backend = sim(SimulatedInstruments {
            left: Some(pipette(PipetteName::P1000Single)),
            ..Default::default()
        });
        let position = backend
            .liquid_probe(Mount::Left, 30.0, 5.0, 10.0, 15.0, SensorId::S0)
            .unwrap();
        assert_eq!(position[&Axis::ZL], 28.0);

        backend
            .capacitive_probe(Mount::Left, Axis::X, 3.0, 1.0, 1.0, InstrumentProbeType::Primary)
            .unwrap();
        let data = backend
            .capacitive_pass(Mount::Left, Axis::X, 2.0, 1.0, InstrumentProbeType::Primary)
            .unwrap();
        assert!(data.is_empty());
        assert_eq!(backend.update_position()[&Axis::X], 5.0);
    }

    #[test]
    fn test_firmware_update_is_empty() {
        let mut backend = sim(SimulatedInstruments::default());
        let reports: Vec<UpdateReport> = backend
            .update_firmware(&BTreeMap::new(), &BTreeSet::new())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(reports, vec![UpdateReport::default()]);
        assert!(!backend.update_required());
    }

    #[test]
    fn test_watch_reports_stub_modules() {
        let mut backend = SimulatedBackend::new(
            BackendConfig::default(),
            SimulatedInstruments::default(),
            vec!["tempdeck".to_string(), "magdeck".to_string()],
            false,
        )
        .unwrap();
        let events: Vec<ModuleEvent> = backend.watch().unwrap().iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].name, "/dev/ot_module_sim_magdeck1");
        assert_eq!(backend.attached_modules().len(), 2);
    }

    #[test]
    fn test_current_scope_restores() {
        let mut backend = sim(SimulatedInstruments::default());
        backend
            .update_to_default_current_settings(GantryLoad::None)
            .unwrap();
        {
            let mut scope = backend.current_scope().unwrap();
            scope
                .set_active_current(&AxisMap::from([(Axis::X, 2.0)]))
                .unwrap();
            assert_eq!(scope.motor_run_currents()[&Axis::X], 2.0);
        }
        assert_eq!(backend.motor_run_currents()[&Axis::X], 1.25);
    }
}
