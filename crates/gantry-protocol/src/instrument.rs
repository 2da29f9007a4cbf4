//! 工具（移液器/夹爪）身份信息
//!
//! 总线上的工具检测只报告原始名称编号、型号字符串与序列号，
//! 序列号拼接与型号校验在上层完成。

use crate::ProtocolError;
use std::fmt;

/// 固件上报的移液器名称
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PipetteName {
    P1000Single,
    P1000Multi,
    P50Single,
    P50Multi,
    P1000_96,
    P50_96,
    /// 固件报告了无法识别的名称编号
    Unknown,
}

impl PipetteName {
    /// 从固件名称编号转换，未知编号映射为 `Unknown`
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => PipetteName::P1000Single,
            1 => PipetteName::P1000Multi,
            2 => PipetteName::P50Single,
            3 => PipetteName::P50Multi,
            4 => PipetteName::P1000_96,
            5 => PipetteName::P50_96,
            _ => PipetteName::Unknown,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            PipetteName::P1000Single => "p1000_single",
            PipetteName::P1000Multi => "p1000_multi",
            PipetteName::P50Single => "p50_single",
            PipetteName::P50Multi => "p50_multi",
            PipetteName::P1000_96 => "p1000_96",
            PipetteName::P50_96 => "p50_96",
            PipetteName::Unknown => "unknown",
        }
    }

    /// 移液器通道类型，`Unknown` 没有类型
    pub const fn sub_type(self) -> Option<PipetteSubType> {
        match self {
            PipetteName::P1000Single | PipetteName::P50Single => Some(PipetteSubType::Single),
            PipetteName::P1000Multi | PipetteName::P50Multi => Some(PipetteSubType::Multi),
            PipetteName::P1000_96 | PipetteName::P50_96 => Some(PipetteSubType::NinetySix),
            PipetteName::Unknown => None,
        }
    }
}

impl fmt::Display for PipetteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for PipetteName {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p1000_single" => Ok(PipetteName::P1000Single),
            "p1000_multi" => Ok(PipetteName::P1000Multi),
            "p50_single" => Ok(PipetteName::P50Single),
            "p50_multi" => Ok(PipetteName::P50Multi),
            "p1000_96" => Ok(PipetteName::P1000_96),
            "p50_96" => Ok(PipetteName::P50_96),
            other => Err(ProtocolError::invalid_value("PipetteName", other)),
        }
    }
}

/// 移液器通道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PipetteSubType {
    Single,
    Multi,
    NinetySix,
}

/// 移液器检测结果
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipetteInformation {
    pub name: PipetteName,
    /// 固件上报的原始名称编号
    pub name_int: u16,
    /// 型号版本，形如 "3.3"
    pub model: String,
    pub serial: String,
}

impl PipetteInformation {
    pub fn new(name_int: u16, model: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            name: PipetteName::from_raw(name_int),
            name_int,
            model: model.into(),
            serial: serial.into(),
        }
    }
}

/// 夹爪检测结果
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GripperInformation {
    /// 型号版本，形如 "1.0"
    pub model: String,
    pub serial: String,
}

impl GripperInformation {
    pub fn new(model: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            serial: serial.into(),
        }
    }
}

/// 一次工具检测的汇总
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ToolSummary {
    pub left: Option<PipetteInformation>,
    pub right: Option<PipetteInformation>,
    pub gripper: Option<GripperInformation>,
}

/// 工具上的探针选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum InstrumentProbeType {
    #[default]
    Primary,
    Secondary,
}

/// 工具板上的传感器编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SensorId {
    #[default]
    S0,
    S1,
}

impl From<InstrumentProbeType> for SensorId {
    fn from(probe: InstrumentProbeType) -> Self {
        match probe {
            InstrumentProbeType::Primary => SensorId::S0,
            InstrumentProbeType::Secondary => SensorId::S1,
        }
    }
}
