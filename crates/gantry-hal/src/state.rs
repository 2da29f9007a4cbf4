//! 后端共享状态
//!
//! 硬件后端与仿真后端持有同一份状态结构，并通过同一组流程
//! 构建运动组、执行、记录电机上报；两者的差别只在 [`GroupExecutor`]。

use crate::config::BackendConfig;
use crate::end_effector::{EndEffectorController, GripForceProfile};
use crate::error::{BackendError, Result};
use crate::home::HomeSequencer;
use gantry_driver::{
    CurrentConfigStore, CurrentUpdate, GroupExecutor, MotionGroupBuilder, MotorStateStore,
    PresenceTracker, UpdateProgress, UpdateReport,
};
use gantry_protocol::{
    Axis, AxisMap, Coordinates, GantryLoad, Move, MoveGroup, MoveStopCondition, NodeMap,
    PipetteAction, axis_to_node,
};
use tracing::{debug, info};

/// 预测位置与上报位置的容差（mm）
const POSITION_TOLERANCE: f64 = 1e-3;

pub(crate) struct BackendCore {
    pub config: BackendConfig,
    pub presence: PresenceTracker,
    pub motors: MotorStateStore,
    pub currents: Option<CurrentConfigStore>,
    pub engaged: AxisMap<bool>,
    pub update_tracker: Option<UpdateProgress>,
    pub grip_force_profile: Option<GripForceProfile>,
    update_required: bool,
}

impl BackendCore {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            presence: PresenceTracker::new(),
            motors: MotorStateStore::new(&home_position()),
            currents: None,
            engaged: AxisMap::new(),
            update_tracker: None,
            grip_force_profile: None,
            update_required: false,
        }
    }

    // ==================== 固件更新标志 ====================

    pub fn update_required(&self) -> bool {
        self.update_required
    }

    pub fn set_update_required(&mut self, value: bool) {
        if self.update_required != value {
            info!(
                "Firmware update flag set {} -> {}",
                self.update_required, value
            );
            self.update_required = value;
        }
    }

    /// 固件更新门控
    pub fn ensure_no_update_required(&self, operation: &'static str) -> Result<()> {
        if self.update_required {
            return Err(BackendError::update_required(operation));
        }
        Ok(())
    }

    pub fn update_progress(&self) -> UpdateReport {
        self.update_tracker
            .as_ref()
            .map(UpdateProgress::report)
            .unwrap_or_default()
    }

    // ==================== 运动 ====================

    pub fn ensure_ready_for_movement(&self, axes: &[Axis]) -> Result<()> {
        let not_ready: Vec<Axis> = axes
            .iter()
            .copied()
            .filter(|axis| !self.motors.ready_for_movement(&[*axis]))
            .collect();
        if not_ready.is_empty() {
            Ok(())
        } else {
            Err(BackendError::must_home(not_ready))
        }
    }

    pub fn position(&self) -> AxisMap<f64> {
        self.motors.snapshot(0.0)
    }

    /// 执行运动组并记录上报；空组不下发
    pub fn run_group<E: GroupExecutor>(
        &mut self,
        executor: &mut E,
        group: &MoveGroup,
    ) -> Result<()> {
        if group.is_empty() {
            return Ok(());
        }
        let reports = executor.execute(group, &self.motors)?;
        self.motors.record(&reports);
        Ok(())
    }

    pub fn move_axes<E: GroupExecutor>(
        &mut self,
        executor: &mut E,
        origin: &Coordinates,
        moves: &[Move],
        stop_condition: MoveStopCondition,
    ) -> Result<AxisMap<f64>> {
        self.ensure_no_update_required("move")?;
        let (group, predicted) =
            MotionGroupBuilder::new(&self.presence).build(origin, moves, stop_condition);
        if group.is_empty() {
            debug!("Move has no present nodes, nothing to send");
            return Ok(self.position());
        }
        let reports = executor.execute(&group, &self.motors)?;
        for (node, expected) in &predicted {
            if let Some(report) = reports.get(node)
                && (report.position - expected).abs() > POSITION_TOLERANCE
            {
                debug!(
                    "{} ended at {} but {} was predicted",
                    node, report.position, expected
                );
            }
        }
        self.motors.record(&reports);
        Ok(self.position())
    }

    pub fn home<E: GroupExecutor>(&mut self, executor: &mut E, axes: &[Axis]) -> Result<AxisMap<f64>> {
        self.ensure_no_update_required("home")?;
        let checked: Vec<Axis> = axes
            .iter()
            .copied()
            .filter(|axis| self.presence.is_axis_present(*axis))
            .collect();
        if checked.is_empty() {
            debug!("No requested axis is present, home is a no-op");
            return Ok(self.position());
        }
        self.motors
            .clear_status(checked.iter().map(|axis| axis_to_node(*axis)));

        let plan = HomeSequencer::new(&self.config, &self.presence).plan(&checked);
        for phase in plan {
            debug!("Homing phase {:?}", phase.phase);
            self.run_group(executor, &phase.group)?;
        }
        Ok(self.position())
    }

    // ==================== 末端执行器 ====================

    pub fn gripper_grip_jaw<E: GroupExecutor>(
        &mut self,
        executor: &mut E,
        duty_cycle: f64,
        stop_condition: MoveStopCondition,
    ) -> Result<()> {
        self.ensure_no_update_required("gripper_grip_jaw")?;
        let group = EndEffectorController::new(&self.presence).grip(duty_cycle, stop_condition)?;
        self.run_group(executor, &group)
    }

    pub fn gripper_home_jaw<E: GroupExecutor>(
        &mut self,
        executor: &mut E,
        duty_cycle: f64,
    ) -> Result<()> {
        self.ensure_no_update_required("gripper_home_jaw")?;
        let group = EndEffectorController::new(&self.presence).home_jaw(duty_cycle)?;
        self.run_group(executor, &group)
    }

    pub fn gripper_hold_jaw<E: GroupExecutor>(
        &mut self,
        executor: &mut E,
        encoder_position_um: i32,
    ) -> Result<()> {
        self.ensure_no_update_required("gripper_hold_jaw")?;
        let group = EndEffectorController::new(&self.presence).hold_jaw(encoder_position_um);
        self.run_group(executor, &group)
    }

    pub fn tip_action<E: GroupExecutor>(
        &mut self,
        executor: &mut E,
        axes: &[Axis],
        distance: f64,
        speed: f64,
        action: PipetteAction,
    ) -> Result<()> {
        self.ensure_no_update_required("tip_action")?;
        let group =
            EndEffectorController::new(&self.presence).tip_action(axes, distance, speed, action)?;
        self.run_group(executor, &group)
    }

    /// 重新估计电机位置前检查编码器状态
    pub fn ensure_encoders_ok(&self, axes: &[Axis]) -> Result<()> {
        self.ensure_no_update_required("update_motor_estimation")?;
        let invalid = self.motors.axes_without_encoder(axes);
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(BackendError::must_home(invalid))
        }
    }

    // ==================== 电流 ====================

    pub fn load_default_currents(&mut self, load: GantryLoad) {
        let settings = self.config.current_settings.for_load(load);
        debug!("Loading current settings for gantry load {:?}", load);
        self.currents = Some(CurrentConfigStore::new(settings));
    }

    pub fn currents(&self) -> Result<&CurrentConfigStore> {
        self.currents
            .as_ref()
            .ok_or(BackendError::CurrentSettingsMissing)
    }

    pub fn currents_mut(&mut self) -> Result<&mut CurrentConfigStore> {
        self.currents
            .as_mut()
            .ok_or(BackendError::CurrentSettingsMissing)
    }

    /// 当前电流表对应的节点级下发（只含在线节点）
    pub fn default_current_updates(&self) -> Result<NodeMap<CurrentUpdate>> {
        let updates = self.currents()?.as_updates();
        Ok(self.presence.filter_axis_map(&updates))
    }

    pub fn run_current_updates(&self, currents: &AxisMap<f64>) -> NodeMap<CurrentUpdate> {
        let updates: AxisMap<CurrentUpdate> = currents
            .iter()
            .map(|(axis, c)| (*axis, CurrentUpdate::run(*c)))
            .collect();
        self.presence.filter_axis_map(&updates)
    }

    pub fn hold_current_updates(&self, currents: &AxisMap<f64>) -> NodeMap<CurrentUpdate> {
        let updates: AxisMap<CurrentUpdate> = currents
            .iter()
            .map(|(axis, c)| (*axis, CurrentUpdate::hold(*c)))
            .collect();
        self.presence.filter_axis_map(&updates)
    }

    pub fn record_run_currents(&mut self, currents: &AxisMap<f64>) -> Result<()> {
        let store = self.currents_mut()?;
        for (axis, current) in currents {
            store.set_run_current(*axis, *current);
        }
        Ok(())
    }

    pub fn record_hold_currents(&mut self, currents: &AxisMap<f64>) -> Result<()> {
        let store = self.currents_mut()?;
        for (axis, current) in currents {
            store.set_hold_current(*axis, *current);
        }
        Ok(())
    }

    // ==================== 使能 ====================

    pub fn set_engaged(&mut self, axes: &[Axis], engaged: bool) {
        for axis in axes {
            self.engaged.insert(*axis, engaged);
        }
    }
}

/// 零点位置（所有轴为 0）
pub fn home_position() -> AxisMap<f64> {
    Axis::ALL.iter().map(|axis| (*axis, 0.0)).collect()
}
