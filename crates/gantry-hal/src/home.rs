//! 回零序列
//!
//! 回零按阶段执行，每个阶段是一个独立的运动组：
//!
//! 1. Z 组（`Z_L` / `Z_R` / `Z_G`）同时回零
//! 2. `X`，然后 `Y`（X 必须先于 Y，避免与后左角的设备发生碰撞）
//! 3. 移液器柱塞（`P_L` / `P_R`）
//! 4. 夹爪手指（`G`），占空比驱动
//! 5. 高通量取吸头轴（`Q`）
//!
//! 只有在线的轴参与；没有轴可回零时序列为空。

use crate::config::BackendConfig;
use gantry_driver::{MotionGroupBuilder, PresenceTracker};
use gantry_protocol::{Axis, AxisMap, MoveGroup, PipetteAction};
use tracing::debug;

/// 回零阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomePhase {
    Z,
    X,
    Y,
    Pipettes,
    GripperJaw,
    TipDrive,
}

impl HomePhase {
    pub const ORDER: [HomePhase; 6] = [
        HomePhase::Z,
        HomePhase::X,
        HomePhase::Y,
        HomePhase::Pipettes,
        HomePhase::GripperJaw,
        HomePhase::TipDrive,
    ];

    /// 该阶段负责的轴
    pub fn axes(self) -> &'static [Axis] {
        match self {
            HomePhase::Z => &[Axis::ZL, Axis::ZR, Axis::ZG],
            HomePhase::X => &[Axis::X],
            HomePhase::Y => &[Axis::Y],
            HomePhase::Pipettes => &[Axis::PL, Axis::PR],
            HomePhase::GripperJaw => &[Axis::G],
            HomePhase::TipDrive => &[Axis::Q],
        }
    }
}

/// 已规划的回零阶段
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPhase {
    pub phase: HomePhase,
    pub group: MoveGroup,
}

pub struct HomeSequencer<'a> {
    config: &'a BackendConfig,
    builder: MotionGroupBuilder<'a>,
}

impl<'a> HomeSequencer<'a> {
    pub fn new(config: &'a BackendConfig, presence: &'a PresenceTracker) -> Self {
        Self {
            config,
            builder: MotionGroupBuilder::new(presence),
        }
    }

    /// 回零距离：完整行程取反
    pub fn home_distance(&self, axis: Axis) -> Option<f64> {
        self.config.axis_bounds.travel(axis).map(|travel| -travel)
    }

    /// 规划请求的轴的回零阶段（空阶段被跳过）
    pub fn plan(&self, axes: &[Axis]) -> Vec<PlannedPhase> {
        HomePhase::ORDER
            .iter()
            .filter_map(|phase| {
                let requested: Vec<Axis> = phase
                    .axes()
                    .iter()
                    .copied()
                    .filter(|axis| axes.contains(axis))
                    .collect();
                if requested.is_empty() {
                    return None;
                }
                let group = self.build_phase(*phase, &requested);
                if group.is_empty() {
                    debug!("Home phase {:?} has nothing present to move", phase);
                    return None;
                }
                Some(PlannedPhase {
                    phase: *phase,
                    group,
                })
            })
            .collect()
    }

    fn build_phase(&self, phase: HomePhase, axes: &[Axis]) -> MoveGroup {
        match phase {
            HomePhase::GripperJaw => self
                .builder
                .build_gripper_home(self.config.grip_jaw_home_duty_cycle),
            HomePhase::TipDrive => {
                let travel = self.config.axis_bounds.travel(Axis::Q).unwrap_or(0.0);
                self.builder.build_tip_action(
                    axes,
                    travel,
                    self.config.motion_settings.tip_drive_speed,
                    PipetteAction::Home,
                )
            },
            HomePhase::Z | HomePhase::X | HomePhase::Y | HomePhase::Pipettes => {
                let mut distances = AxisMap::new();
                let mut velocities = AxisMap::new();
                for axis in axes {
                    if let Some(distance) = self.home_distance(*axis) {
                        distances.insert(*axis, distance);
                        velocities.insert(*axis, self.config.home_velocity(*axis));
                    }
                }
                self.builder.build_home(&distances, &velocities)
            },
        }
    }
}
