//! 电机状态、电流配置与固件更新状态

use crate::ProtocolError;
use crate::node::SubSystem;
use std::fmt;

/// 电机/编码器健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotorStatus {
    /// 电机位置可信（回零后为真）
    pub motor_ok: bool,
    /// 编码器位置可信
    pub encoder_ok: bool,
}

impl MotorStatus {
    pub const fn new(motor_ok: bool, encoder_ok: bool) -> Self {
        Self {
            motor_ok,
            encoder_ok,
        }
    }

    /// 回零完成后的状态
    pub const HOMED: MotorStatus = MotorStatus::new(true, true);
}

/// 单个节点的位置上报
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotorReport {
    /// 电机位置（mm）
    pub position: f64,
    /// 编码器位置（mm）
    pub encoder_position: f64,
    pub motor_ok: bool,
    pub encoder_ok: bool,
}

impl MotorReport {
    pub const fn new(position: f64, encoder_position: f64, motor_ok: bool, encoder_ok: bool) -> Self {
        Self {
            position,
            encoder_position,
            motor_ok,
            encoder_ok,
        }
    }

    pub const fn status(&self) -> MotorStatus {
        MotorStatus::new(self.motor_ok, self.encoder_ok)
    }
}

/// 单轴电流配置（A）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CurrentConfig {
    pub hold_current: f64,
    pub run_current: f64,
}

impl CurrentConfig {
    pub const fn new(hold_current: f64, run_current: f64) -> Self {
        Self {
            hold_current,
            run_current,
        }
    }

    pub const fn as_tuple(&self) -> (f64, f64) {
        (self.hold_current, self.run_current)
    }
}

/// 龙门负载类型（决定电流表）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum GantryLoad {
    #[default]
    None,
    LowThroughput,
    TwoLowThroughput,
    HighThroughput,
    Gripper,
}

/// 子系统固件更新阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum UpdateState {
    Queued,
    Updating,
    Done,
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateState::Queued => "queued",
            UpdateState::Updating => "updating",
            UpdateState::Done => "done",
        };
        f.write_str(name)
    }
}

/// 单个子系统的更新状态，`progress` 取值 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpdateStatus {
    pub subsystem: SubSystem,
    pub state: UpdateState,
    pub progress: u8,
}

impl UpdateStatus {
    pub const fn queued(subsystem: SubSystem) -> Self {
        Self {
            subsystem,
            state: UpdateState::Queued,
            progress: 0,
        }
    }
}

/// 更新驱动上报的原始事件，`progress` 取值 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpdateEvent {
    pub state: UpdateState,
    pub progress: f64,
}

impl UpdateEvent {
    pub fn new(state: UpdateState, progress: f64) -> Result<Self, ProtocolError> {
        if !(0.0..=1.0).contains(&progress) {
            return Err(ProtocolError::invalid_value("UpdateEvent.progress", progress));
        }
        Ok(Self { state, progress })
    }

    /// 换算为 0..=100 的整数百分比（截断）
    pub fn percent(&self) -> u8 {
        (self.progress * 100.0) as u8
    }
}

/// 节点设备信息（固件版本等）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub subsystem: SubSystem,
    pub version: semver::Version,
}

impl DeviceInfo {
    pub fn new(subsystem: SubSystem, version: semver::Version) -> Self {
        Self { subsystem, version }
    }
}
