//! 末端执行器：夹爪手指与取吸头动作
//!
//! 每个操作只产生一个单步运动组，执行由后端负责。

use gantry_driver::{DriverError, MotionGroupBuilder, PresenceTracker};
use gantry_protocol::{Axis, MoveGroup, MoveStopCondition, PipetteAction, ProtocolError};
use tracing::warn;

/// 可以执行取吸头动作的轴
const TIP_ACTION_AXES: [Axis; 3] = [Axis::PL, Axis::PR, Axis::Q];

/// 夹爪夹持力曲线
///
/// `polynomial` 为 `(次数, 系数)` 列表，把夹持力（N）换算为占空比（%）。
#[derive(Debug, Clone, PartialEq)]
pub struct GripForceProfile {
    pub polynomial: Vec<(i32, f64)>,
    pub default_grip_force: f64,
    pub default_home_force: f64,
    pub min_grip_force: f64,
    pub max_grip_force: f64,
}

impl GripForceProfile {
    /// 夹持力对应的占空比，结果限制在 `[0, 100]`
    pub fn duty_cycle(&self, force: f64) -> Result<f64, DriverError> {
        if !(self.min_grip_force..=self.max_grip_force).contains(&force) {
            return Err(ProtocolError::invalid_value("grip force", force).into());
        }
        let duty: f64 = self
            .polynomial
            .iter()
            .map(|(power, coefficient)| coefficient * force.powi(*power))
            .sum();
        Ok(duty.clamp(0.0, 100.0))
    }
}

pub struct EndEffectorController<'a> {
    builder: MotionGroupBuilder<'a>,
}

impl<'a> EndEffectorController<'a> {
    pub fn new(presence: &'a PresenceTracker) -> Self {
        Self {
            builder: MotionGroupBuilder::new(presence),
        }
    }

    /// 夹紧
    pub fn grip(
        &self,
        duty_cycle: f64,
        stop_condition: MoveStopCondition,
    ) -> Result<MoveGroup, DriverError> {
        check_duty_cycle(duty_cycle)?;
        Ok(self.builder.build_gripper_grip(duty_cycle, stop_condition))
    }

    /// 手指回零（限位开关停止）
    pub fn home_jaw(&self, duty_cycle: f64) -> Result<MoveGroup, DriverError> {
        check_duty_cycle(duty_cycle)?;
        Ok(self.builder.build_gripper_home(duty_cycle))
    }

    /// 保持在编码器位置（零占空比）
    pub fn hold_jaw(&self, encoder_position_um: i32) -> MoveGroup {
        self.builder.build_gripper_hold(encoder_position_um)
    }

    pub fn tip_action(
        &self,
        axes: &[Axis],
        distance: f64,
        speed: f64,
        action: PipetteAction,
    ) -> Result<MoveGroup, DriverError> {
        if speed <= 0.0 {
            return Err(ProtocolError::invalid_value("tip action speed", speed).into());
        }
        let axes: Vec<Axis> = axes
            .iter()
            .copied()
            .filter(|axis| {
                let ok = TIP_ACTION_AXES.contains(axis);
                if !ok {
                    warn!("Axis {} cannot perform tip actions", axis);
                }
                ok
            })
            .collect();
        Ok(self.builder.build_tip_action(&axes, distance, speed, action))
    }
}

fn check_duty_cycle(duty_cycle: f64) -> Result<(), ProtocolError> {
    if (0.0..=100.0).contains(&duty_cycle) {
        Ok(())
    } else {
        Err(ProtocolError::invalid_value("duty_cycle", duty_cycle))
    }
}
