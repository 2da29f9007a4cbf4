//! 总线节点定义
//!
//! 节点 ID 即总线地址。`Head` / `Gripper` 为核心控制器节点，
//! 网络探测只会看到它们；实际下发命令使用拆分后的合成子节点。

use crate::ProtocolError;
use crate::axis::Mount;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// 总线节点
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive, IntoPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum Node {
    /// 夹爪核心控制器（探测时出现）
    Gripper = 0x20,
    /// 夹爪 Z（合成）
    GripperZ = 0x21,
    /// 夹爪夹持（合成）
    GripperG = 0x22,
    GantryX = 0x30,
    GantryY = 0x40,
    /// 头部核心控制器（探测时出现）
    Head = 0x50,
    /// 头部左 Z（合成）
    HeadL = 0x51,
    /// 头部右 Z（合成）
    HeadR = 0x52,
    PipetteLeft = 0x60,
    /// 左移液器板上的取吸头电机（合成，仅 96 通道移液器）
    PipetteLeftTip = 0x61,
    PipetteRight = 0x70,
}

impl Node {
    pub const ALL: [Node; 11] = [
        Node::Gripper,
        Node::GripperZ,
        Node::GripperG,
        Node::GantryX,
        Node::GantryY,
        Node::Head,
        Node::HeadL,
        Node::HeadR,
        Node::PipetteLeft,
        Node::PipetteLeftTip,
        Node::PipetteRight,
    ];

    /// 从总线地址转换
    pub fn from_raw(raw: u8) -> Result<Self, ProtocolError> {
        Node::try_from(raw).map_err(|_| ProtocolError::UnmappedNode { raw })
    }

    /// 原始总线地址
    pub fn raw(self) -> u8 {
        self.into()
    }

    /// 是否为需要拆分的核心控制器节点
    pub fn is_core(self) -> bool {
        matches!(self, Node::Head | Node::Gripper)
    }

    /// 核心控制器拆分出的合成子节点
    pub fn split(self) -> Option<[Node; 2]> {
        match self {
            Node::Head => Some([Node::HeadL, Node::HeadR]),
            Node::Gripper => Some([Node::GripperZ, Node::GripperG]),
            _ => None,
        }
    }

    /// 节点所在的物理控制板（固件更新单位）
    pub fn subsystem(self) -> SubSystem {
        match self {
            Node::GantryX => SubSystem::GantryX,
            Node::GantryY => SubSystem::GantryY,
            Node::Head | Node::HeadL | Node::HeadR => SubSystem::Head,
            Node::PipetteLeft | Node::PipetteLeftTip => SubSystem::PipetteLeft,
            Node::PipetteRight => SubSystem::PipetteRight,
            Node::Gripper | Node::GripperZ | Node::GripperG => SubSystem::Gripper,
        }
    }

    /// 安装位上的传感器节点
    pub const fn sensor_for_mount(mount: Mount) -> Node {
        match mount {
            Mount::Left => Node::PipetteLeft,
            Mount::Right => Node::PipetteRight,
            Mount::Gripper => Node::Gripper,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Node::Gripper => "gripper",
            Node::GripperZ => "gripper_z",
            Node::GripperG => "gripper_g",
            Node::GantryX => "gantry_x",
            Node::GantryY => "gantry_y",
            Node::Head => "head",
            Node::HeadL => "head_l",
            Node::HeadR => "head_r",
            Node::PipetteLeft => "pipette_left",
            Node::PipetteLeftTip => "pipette_left_tip",
            Node::PipetteRight => "pipette_right",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 子系统（独立刷写固件的控制板）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SubSystem {
    GantryX,
    GantryY,
    Head,
    PipetteLeft,
    PipetteRight,
    Gripper,
}

impl SubSystem {
    pub const ALL: [SubSystem; 6] = [
        SubSystem::GantryX,
        SubSystem::GantryY,
        SubSystem::Head,
        SubSystem::PipetteLeft,
        SubSystem::PipetteRight,
        SubSystem::Gripper,
    ];

    /// 子系统在总线上的地址（核心节点）
    pub const fn node(self) -> Node {
        match self {
            SubSystem::GantryX => Node::GantryX,
            SubSystem::GantryY => Node::GantryY,
            SubSystem::Head => Node::Head,
            SubSystem::PipetteLeft => Node::PipetteLeft,
            SubSystem::PipetteRight => Node::PipetteRight,
            SubSystem::Gripper => Node::Gripper,
        }
    }

    pub const fn from_mount(mount: Mount) -> SubSystem {
        match mount {
            Mount::Left => SubSystem::PipetteLeft,
            Mount::Right => SubSystem::PipetteRight,
            Mount::Gripper => SubSystem::Gripper,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SubSystem::GantryX => "gantry_x",
            SubSystem::GantryY => "gantry_y",
            SubSystem::Head => "head",
            SubSystem::PipetteLeft => "pipette_left",
            SubSystem::PipetteRight => "pipette_right",
            SubSystem::Gripper => "gripper",
        }
    }
}

impl fmt::Display for SubSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
