//! 逻辑轴定义
//!
//! 平台上的逻辑自由度是固定集合，运行期不会创建或销毁。

use crate::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// 逻辑轴
///
/// 使用 `#[repr(u8)]` 保持与上层 API 的原始编号一致。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive, IntoPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Axis {
    /// 龙门 X
    X = 0,
    /// 龙门 Y
    Y = 1,
    /// 左安装位 Z
    ZL = 2,
    /// 右安装位 Z
    ZR = 3,
    /// 夹爪安装位 Z
    ZG = 4,
    /// 左移液器柱塞
    PL = 5,
    /// 右移液器柱塞
    PR = 6,
    /// 高通量移液器取吸头驱动
    Q = 7,
    /// 夹爪夹持
    G = 8,
}

impl Axis {
    /// 所有轴
    pub const ALL: [Axis; 9] = [
        Axis::X,
        Axis::Y,
        Axis::ZL,
        Axis::ZR,
        Axis::ZG,
        Axis::PL,
        Axis::PR,
        Axis::Q,
        Axis::G,
    ];

    /// 从原始编号转换
    pub fn from_raw(raw: u8) -> Result<Self, ProtocolError> {
        Axis::try_from(raw).map_err(|_| ProtocolError::UnmappedAxis { raw })
    }

    /// 柱塞轴
    pub const fn pipette_axes() -> [Axis; 2] {
        [Axis::PL, Axis::PR]
    }

    /// 安装位升降轴
    pub const fn mount_axes() -> [Axis; 3] {
        [Axis::ZL, Axis::ZR, Axis::ZG]
    }

    /// 与龙门相连的轴（需要甲板标定变换）
    pub const fn gantry_axes() -> [Axis; 5] {
        [Axis::X, Axis::Y, Axis::ZL, Axis::ZR, Axis::ZG]
    }

    pub fn is_pipette_axis(self) -> bool {
        matches!(self, Axis::PL | Axis::PR)
    }

    pub fn is_mount_axis(self) -> bool {
        matches!(self, Axis::ZL | Axis::ZR | Axis::ZG)
    }

    /// 龙门平移轴（X/Y，不含升降轴）
    pub fn is_gantry_planar(self) -> bool {
        matches!(self, Axis::X | Axis::Y)
    }

    /// 安装位对应的升降轴
    pub const fn by_mount(mount: Mount) -> Axis {
        match mount {
            Mount::Left => Axis::ZL,
            Mount::Right => Axis::ZR,
            Mount::Gripper => Axis::ZG,
        }
    }

    /// 安装位上工具的主执行轴
    pub const fn of_main_tool_actuator(mount: Mount) -> Axis {
        match mount {
            Mount::Left => Axis::PL,
            Mount::Right => Axis::PR,
            Mount::Gripper => Axis::G,
        }
    }

    /// 轴所属安装位（龙门 X/Y 与 Q 无安装位）
    pub const fn mount(self) -> Option<Mount> {
        match self {
            Axis::ZL | Axis::PL => Some(Mount::Left),
            Axis::ZR | Axis::PR => Some(Mount::Right),
            Axis::ZG | Axis::G => Some(Mount::Gripper),
            Axis::X | Axis::Y | Axis::Q => None,
        }
    }

    pub const fn kind(self) -> AxisKind {
        match self {
            Axis::X => AxisKind::X,
            Axis::Y => AxisKind::Y,
            Axis::ZL | Axis::ZR => AxisKind::Z,
            Axis::ZG => AxisKind::ZG,
            Axis::PL | Axis::PR => AxisKind::P,
            Axis::Q => AxisKind::Q,
            Axis::G => AxisKind::G,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::ZL => "Z_L",
            Axis::ZR => "Z_R",
            Axis::ZG => "Z_G",
            Axis::PL => "P_L",
            Axis::PR => "P_R",
            Axis::Q => "Q",
            Axis::G => "G",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 轴类别
///
/// 速度、电流等配置按类别而不是按具体轴给出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AxisKind {
    X,
    Y,
    /// 左右安装位升降
    Z,
    /// 柱塞
    P,
    /// 夹爪升降
    ZG,
    /// 高通量取吸头驱动
    Q,
    /// 夹爪夹持
    G,
}

impl AxisKind {
    pub const ALL: [AxisKind; 7] = [
        AxisKind::X,
        AxisKind::Y,
        AxisKind::Z,
        AxisKind::P,
        AxisKind::ZG,
        AxisKind::Q,
        AxisKind::G,
    ];

    /// 该类别包含的轴
    pub fn axes(self) -> &'static [Axis] {
        match self {
            AxisKind::X => &[Axis::X],
            AxisKind::Y => &[Axis::Y],
            AxisKind::Z => &[Axis::ZL, Axis::ZR],
            AxisKind::P => &[Axis::PL, Axis::PR],
            AxisKind::ZG => &[Axis::ZG],
            AxisKind::Q => &[Axis::Q],
            AxisKind::G => &[Axis::G],
        }
    }

    pub fn is_z_axis(self) -> bool {
        matches!(self, AxisKind::Z | AxisKind::ZG)
    }
}

/// 工具安装位
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Mount {
    Left,
    Right,
    Gripper,
}

impl Mount {
    pub const ALL: [Mount; 3] = [Mount::Left, Mount::Right, Mount::Gripper];

    pub const fn name(self) -> &'static str {
        match self {
            Mount::Left => "LEFT",
            Mount::Right => "RIGHT",
            Mount::Gripper => "GRIPPER",
        }
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_from_raw() {
        assert_eq!(Axis::from_raw(0).unwrap(), Axis::X);
        assert_eq!(Axis::from_raw(7).unwrap(), Axis::Q);
        assert_eq!(
            Axis::from_raw(9),
            Err(ProtocolError::UnmappedAxis { raw: 9 })
        );
    }

    #[test]
    fn test_axis_kind_covers_all_axes() {
        for axis in Axis::ALL {
            assert!(axis.kind().axes().contains(&axis), "{axis} not in its kind");
        }
    }

    #[test]
    fn test_mount_axes() {
        for mount in Mount::ALL {
            assert_eq!(Axis::by_mount(mount).mount(), Some(mount));
            assert_eq!(Axis::of_main_tool_actuator(mount).mount(), Some(mount));
        }
        assert_eq!(Axis::Q.mount(), None);
    }

    #[test]
    fn test_axis_display() {
        assert_eq!(Axis::ZG.to_string(), "Z_G");
        assert_eq!(Mount::Gripper.to_string(), "GRIPPER");
    }
}
