//! 运动数据模型
//!
//! `Move` / `Block` 由上游轨迹规划器给出（已做加加速度限制），本层只负责把它们
//! 投影到各个节点上，组成 `MoveGroup`。

use crate::ProtocolError;
use crate::axis::Axis;
use crate::mapping::AxisMap;
use crate::node::Node;
use num_enum::IntoPrimitive;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// 轨迹中的一段匀加速片段
///
/// 所有量都是沿 `Move::unit_vector` 方向的标量。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    /// 行程（mm）
    pub distance: f64,
    /// 初速度（mm/s）
    pub initial_speed: f64,
    /// 加速度（mm/s²）
    pub acceleration: f64,
    /// 持续时间（s）
    pub time: f64,
}

impl Block {
    pub const fn new(distance: f64, initial_speed: f64, acceleration: f64, time: f64) -> Self {
        Self {
            distance,
            initial_speed,
            acceleration,
            time,
        }
    }

    /// 匀速片段
    pub fn constant(distance: f64, speed: f64) -> Self {
        let time = if speed == 0.0 {
            0.0
        } else {
            (distance / speed).abs()
        };
        Self::new(distance, speed, 0.0, time)
    }
}

/// 轨迹的一段
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Move {
    /// 各轴方向分量
    pub unit_vector: AxisMap<f64>,
    pub blocks: Vec<Block>,
}

impl Move {
    pub fn new(unit_vector: AxisMap<f64>, blocks: Vec<Block>) -> Self {
        Self {
            unit_vector,
            blocks,
        }
    }

    /// 沿单轴的直线运动
    pub fn along(axis: Axis, blocks: Vec<Block>) -> Self {
        Self::new(AxisMap::from([(axis, 1.0)]), blocks)
    }

    /// 整段总行程
    pub fn distance(&self) -> f64 {
        self.blocks.iter().map(|b| b.distance).sum()
    }
}

/// 运动停止条件
///
/// 原始值是位标志，组合条件在上层按需要拼装，此处只使用单一条件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum MoveStopCondition {
    /// 运行到指定行程为止
    #[default]
    None = 0x0,
    LimitSwitch = 0x1,
    SyncLine = 0x2,
    EncoderPosition = 0x4,
    GripperForce = 0x8,
}

impl MoveStopCondition {
    /// 解析单一条件；组合位或未知值返回错误
    pub fn from_raw(raw: u8) -> Result<Self, ProtocolError> {
        match raw {
            0x0 => Ok(Self::None),
            0x1 => Ok(Self::LimitSwitch),
            0x2 => Ok(Self::SyncLine),
            0x4 => Ok(Self::EncoderPosition),
            0x8 => Ok(Self::GripperForce),
            _ => Err(ProtocolError::invalid_value("MoveStopCondition", raw)),
        }
    }
}

/// 取吸头驱动动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PipetteAction {
    Clamp,
    Home,
}

impl PipetteAction {
    pub const fn name(self) -> &'static str {
        match self {
            PipetteAction::Clamp => "clamp",
            PipetteAction::Home => "home",
        }
    }
}

impl std::str::FromStr for PipetteAction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clamp" => Ok(PipetteAction::Clamp),
            "home" => Ok(PipetteAction::Home),
            other => Err(ProtocolError::invalid_value("PipetteAction", other)),
        }
    }
}

impl fmt::Display for PipetteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 步进电机单步
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SingleAxisStep {
    pub distance_mm: f64,
    pub velocity_mm_sec: f64,
    pub acceleration_mm_sec_sq: f64,
    pub duration_sec: f64,
    pub stop_condition: MoveStopCondition,
}

impl SingleAxisStep {
    /// 静止占位步（保持同组节点同步）
    pub fn hold(duration_sec: f64, stop_condition: MoveStopCondition) -> Self {
        Self {
            distance_mm: 0.0,
            velocity_mm_sec: 0.0,
            acceleration_mm_sec_sq: 0.0,
            duration_sec,
            stop_condition,
        }
    }
}

/// 夹爪有刷电机单步（占空比驱动）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BrushedStep {
    /// PWM 占空比（0..=100）
    pub duty_cycle: f64,
    /// 目标编码器位置（µm），仅 `EncoderPosition` 停止条件使用
    pub encoder_position_um: i32,
    pub duration_sec: f64,
    pub stop_condition: MoveStopCondition,
}

/// 取吸头电机单步
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TipActionStep {
    pub velocity_mm_sec: f64,
    pub duration_sec: f64,
    pub action: PipetteAction,
    pub stop_condition: MoveStopCondition,
}

/// MoveGroup 中单个节点的一步
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MoveGroupStep {
    Axis(SingleAxisStep),
    Brushed(BrushedStep),
    TipAction(TipActionStep),
}

impl MoveGroupStep {
    pub fn stop_condition(&self) -> MoveStopCondition {
        match self {
            MoveGroupStep::Axis(s) => s.stop_condition,
            MoveGroupStep::Brushed(s) => s.stop_condition,
            MoveGroupStep::TipAction(s) => s.stop_condition,
        }
    }

    pub fn duration_sec(&self) -> f64 {
        match self {
            MoveGroupStep::Axis(s) => s.duration_sec,
            MoveGroupStep::Brushed(s) => s.duration_sec,
            MoveGroupStep::TipAction(s) => s.duration_sec,
        }
    }

    /// 该步的位移（mm），有刷电机步没有位移语义
    pub fn distance_mm(&self) -> f64 {
        match self {
            MoveGroupStep::Axis(s) => s.distance_mm,
            MoveGroupStep::Brushed(_) => 0.0,
            MoveGroupStep::TipAction(s) => s.velocity_mm_sec * s.duration_sec,
        }
    }
}

/// 一个同步步：节点 → 该节点在本步的动作
pub type MoveGroupSingleStep = BTreeMap<Node, MoveGroupStep>;

/// 按顺序执行的同步步列表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveGroup {
    steps: Vec<MoveGroupSingleStep>,
}

impl MoveGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: MoveGroupSingleStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[MoveGroupSingleStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// 没有任何步，或所有步都不含节点
    pub fn is_empty(&self) -> bool {
        self.steps.iter().all(|s| s.is_empty())
    }

    /// 组中出现的所有节点
    pub fn nodes(&self) -> BTreeSet<Node> {
        self.steps
            .iter()
            .flat_map(|s| s.keys().copied())
            .collect()
    }

    /// 节点在整组中的累计位移
    pub fn total_distance(&self, node: Node) -> f64 {
        self.steps
            .iter()
            .filter_map(|s| s.get(&node))
            .map(MoveGroupStep::distance_mm)
            .sum()
    }
}

impl From<Vec<MoveGroupSingleStep>> for MoveGroup {
    fn from(steps: Vec<MoveGroupSingleStep>) -> Self {
        Self { steps }
    }
}

impl<'a> IntoIterator for &'a MoveGroup {
    type Item = &'a MoveGroupSingleStep;
    type IntoIter = std::slice::Iter<'a, MoveGroupSingleStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
