//! 后端配置
//!
//! 提供电流表、回零速度、轴行程、固件版本需求等配置，
//! 可从 TOML 文件加载。

use crate::error::BackendError;
use gantry_driver::{StaticFirmwareCatalog, UpdateSettings};
use gantry_protocol::{Axis, AxisKind, AxisMap, CurrentConfig, GantryLoad, SubSystem};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 按轴类型取值的表
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ByAxisKind<T> {
    pub x: T,
    pub y: T,
    pub z: T,
    pub p: T,
    pub z_g: T,
    pub q: T,
    pub g: T,
}

impl<T: Copy> ByAxisKind<T> {
    pub fn get(&self, kind: AxisKind) -> T {
        match kind {
            AxisKind::X => self.x,
            AxisKind::Y => self.y,
            AxisKind::Z => self.z,
            AxisKind::P => self.p,
            AxisKind::ZG => self.z_g,
            AxisKind::Q => self.q,
            AxisKind::G => self.g,
        }
    }

    /// 用部分表覆盖
    pub fn merged(&self, overrides: &PartialByAxisKind<T>) -> Self {
        Self {
            x: overrides.x.unwrap_or(self.x),
            y: overrides.y.unwrap_or(self.y),
            z: overrides.z.unwrap_or(self.z),
            p: overrides.p.unwrap_or(self.p),
            z_g: overrides.z_g.unwrap_or(self.z_g),
            q: overrides.q.unwrap_or(self.q),
            g: overrides.g.unwrap_or(self.g),
        }
    }
}

/// 部分覆盖表（缺省字段沿用基准值）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialByAxisKind<T> {
    pub x: Option<T>,
    pub y: Option<T>,
    pub z: Option<T>,
    pub p: Option<T>,
    pub z_g: Option<T>,
    pub q: Option<T>,
    pub g: Option<T>,
}

impl<T> Default for PartialByAxisKind<T> {
    fn default() -> Self {
        Self {
            x: None,
            y: None,
            z: None,
            p: None,
            z_g: None,
            q: None,
            g: None,
        }
    }
}

/// 按龙门负载取值的表
///
/// `none` 为空载基准，其它负载只写与基准不同的轴类型。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ByGantryLoad<T> {
    pub none: ByAxisKind<T>,
    #[serde(default)]
    pub low_throughput: PartialByAxisKind<T>,
    #[serde(default)]
    pub two_low_throughput: PartialByAxisKind<T>,
    #[serde(default)]
    pub high_throughput: PartialByAxisKind<T>,
    #[serde(default)]
    pub gripper: PartialByAxisKind<T>,
}

impl<T: Copy> ByGantryLoad<T> {
    pub fn for_load(&self, load: GantryLoad) -> ByAxisKind<T> {
        match load {
            GantryLoad::None => self.none,
            GantryLoad::LowThroughput => self.none.merged(&self.low_throughput),
            GantryLoad::TwoLowThroughput => self.none.merged(&self.two_low_throughput),
            GantryLoad::HighThroughput => self.none.merged(&self.high_throughput),
            GantryLoad::Gripper => self.none.merged(&self.gripper),
        }
    }
}

/// 电流表（A）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentSettings {
    pub hold_current: ByGantryLoad<f64>,
    pub run_current: ByGantryLoad<f64>,
}

impl CurrentSettings {
    /// 某个负载下每个轴的电流配置
    pub fn for_load(&self, load: GantryLoad) -> AxisMap<CurrentConfig> {
        let hold = self.hold_current.for_load(load);
        let run = self.run_current.for_load(load);
        Axis::ALL
            .iter()
            .map(|axis| {
                let kind = axis.kind();
                (*axis, CurrentConfig::new(hold.get(kind), run.get(kind)))
            })
            .collect()
    }
}

impl Default for CurrentSettings {
    fn default() -> Self {
        Self {
            hold_current: ByGantryLoad {
                none: ByAxisKind {
                    x: 0.5,
                    y: 0.5,
                    z: 0.1,
                    p: 0.3,
                    z_g: 0.2,
                    q: 0.3,
                    g: 0.0,
                },
                low_throughput: PartialByAxisKind::default(),
                two_low_throughput: PartialByAxisKind::default(),
                // 96 通道移液器更重
                high_throughput: PartialByAxisKind {
                    z: Some(0.8),
                    ..PartialByAxisKind::default()
                },
                gripper: PartialByAxisKind::default(),
            },
            run_current: ByGantryLoad {
                none: ByAxisKind {
                    x: 1.25,
                    y: 1.25,
                    z: 1.0,
                    p: 1.0,
                    z_g: 0.67,
                    q: 1.5,
                    g: 0.7,
                },
                low_throughput: PartialByAxisKind::default(),
                two_low_throughput: PartialByAxisKind::default(),
                high_throughput: PartialByAxisKind {
                    x: Some(1.4),
                    y: Some(1.4),
                    z: Some(1.5),
                    p: Some(2.0),
                    ..PartialByAxisKind::default()
                },
                gripper: PartialByAxisKind::default(),
            },
        }
    }
}

/// 运动参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSettings {
    /// 回零速度（mm/s，正值，回零时取反）
    pub max_speed_discontinuity: ByAxisKind<f64>,

    /// 高通量移液器的取吸头电机速度（mm/s）
    pub tip_drive_speed: f64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            max_speed_discontinuity: ByAxisKind {
                x: 40.0,
                y: 40.0,
                z: 10.0,
                p: 10.0,
                z_g: 10.0,
                q: 5.5,
                g: 50.0,
            },
            tip_drive_speed: 5.5,
        }
    }
}

/// 各轴行程 `(min, max)`（mm）
///
/// 夹爪手指（G）不是位置控制轴，没有行程。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisBounds {
    pub x: (f64, f64),
    pub y: (f64, f64),
    pub z_l: (f64, f64),
    pub z_r: (f64, f64),
    pub z_g: (f64, f64),
    pub p_l: (f64, f64),
    pub p_r: (f64, f64),
    pub q: (f64, f64),
}

impl AxisBounds {
    pub fn get(&self, axis: Axis) -> Option<(f64, f64)> {
        match axis {
            Axis::X => Some(self.x),
            Axis::Y => Some(self.y),
            Axis::ZL => Some(self.z_l),
            Axis::ZR => Some(self.z_r),
            Axis::ZG => Some(self.z_g),
            Axis::PL => Some(self.p_l),
            Axis::PR => Some(self.p_r),
            Axis::Q => Some(self.q),
            Axis::G => None,
        }
    }

    /// 轴键形式
    pub fn to_map(&self) -> AxisMap<(f64, f64)> {
        Axis::ALL
            .iter()
            .filter_map(|axis| self.get(*axis).map(|b| (*axis, b)))
            .collect()
    }

    /// 行程长度 `max - min`
    pub fn travel(&self, axis: Axis) -> Option<f64> {
        self.get(axis).map(|(min, max)| max - min)
    }
}

impl Default for AxisBounds {
    fn default() -> Self {
        let bounds = (0.0, 10000.0);
        Self {
            x: bounds,
            y: bounds,
            z_l: bounds,
            z_r: bounds,
            z_g: bounds,
            p_l: bounds,
            p_r: bounds,
            q: bounds,
        }
    }
}

/// 各子系统要求的固件版本（未填写的子系统不参与比对）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequiredVersions {
    pub gantry_x: Option<String>,
    pub gantry_y: Option<String>,
    pub head: Option<String>,
    pub pipette_left: Option<String>,
    pub pipette_right: Option<String>,
    pub gripper: Option<String>,
}

impl RequiredVersions {
    fn get(&self, subsystem: SubSystem) -> Option<&str> {
        match subsystem {
            SubSystem::GantryX => self.gantry_x.as_deref(),
            SubSystem::GantryY => self.gantry_y.as_deref(),
            SubSystem::Head => self.head.as_deref(),
            SubSystem::PipetteLeft => self.pipette_left.as_deref(),
            SubSystem::PipetteRight => self.pipette_right.as_deref(),
            SubSystem::Gripper => self.gripper.as_deref(),
        }
    }
}

/// 固件更新配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareSettings {
    /// 单个子系统刷写失败后的重试次数
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// 单个子系统刷写超时（秒）
    #[serde(default = "default_update_timeout")]
    pub timeout_seconds: u64,

    /// 刷写前是否擦除
    #[serde(default = "default_erase")]
    pub erase: bool,

    #[serde(default)]
    pub required_versions: RequiredVersions,
}

fn default_retry_count() -> u32 {
    3
}

fn default_update_timeout() -> u64 {
    20
}

fn default_erase() -> bool {
    true
}

impl Default for FirmwareSettings {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            timeout_seconds: default_update_timeout(),
            erase: default_erase(),
            required_versions: RequiredVersions::default(),
        }
    }
}

impl FirmwareSettings {
    pub fn update_settings(&self) -> UpdateSettings {
        UpdateSettings {
            retry_count: self.retry_count,
            timeout: Duration::from_secs(self.timeout_seconds),
            erase: self.erase,
        }
    }

    /// 由版本表构造固件目录
    pub fn catalog(&self) -> Result<StaticFirmwareCatalog, BackendError> {
        let mut catalog = StaticFirmwareCatalog::default();
        for subsystem in SubSystem::ALL {
            if let Some(raw) = self.required_versions.get(subsystem) {
                let version = Version::parse(raw).map_err(|e| {
                    BackendError::config(format!(
                        "invalid firmware version {:?} for {}: {}",
                        raw, subsystem, e
                    ))
                })?;
                catalog = catalog.with_version(subsystem, version);
            }
        }
        Ok(catalog)
    }
}

/// 工具识别配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSettings {
    /// 支持的移液器型号版本（`major.minor`）
    pub supported_pipette_models: Vec<String>,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            supported_pipette_models: ["1.0", "3.0", "3.3", "3.4", "3.5"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// 后端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub current_settings: CurrentSettings,
    pub motion_settings: MotionSettings,

    /// 夹爪手指回零占空比（%）
    pub grip_jaw_home_duty_cycle: f64,

    /// 网络探测超时（毫秒）
    pub probe_timeout_ms: u64,

    pub axis_bounds: AxisBounds,
    pub firmware: FirmwareSettings,
    pub instruments: InstrumentSettings,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            current_settings: CurrentSettings::default(),
            motion_settings: MotionSettings::default(),
            grip_jaw_home_duty_cycle: 25.0,
            probe_timeout_ms: 5000,
            axis_bounds: AxisBounds::default(),
            firmware: FirmwareSettings::default(),
            instruments: InstrumentSettings::default(),
        }
    }
}

impl BackendConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, BackendError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BackendError::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, BackendError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackendError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, BackendError> {
        toml::to_string_pretty(self)
            .map_err(|e| BackendError::config(format!("failed to serialize config: {}", e)))
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), BackendError> {
        if !(0.0..=100.0).contains(&self.grip_jaw_home_duty_cycle) {
            return Err(BackendError::config(format!(
                "grip_jaw_home_duty_cycle {} outside 0..=100",
                self.grip_jaw_home_duty_cycle
            )));
        }
        for kind in AxisKind::ALL {
            let speed = self.motion_settings.max_speed_discontinuity.get(kind);
            if speed <= 0.0 {
                return Err(BackendError::config(format!(
                    "homing speed for {:?} must be positive, got {}",
                    kind, speed
                )));
            }
        }
        for (axis, (min, max)) in self.axis_bounds.to_map() {
            if min >= max {
                return Err(BackendError::config(format!(
                    "axis {} bounds ({}, {}) are empty",
                    axis, min, max
                )));
            }
        }
        self.firmware.catalog()?;
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// 回零速度（已取反）
    pub fn home_velocity(&self, axis: Axis) -> f64 {
        -self.motion_settings.max_speed_discontinuity.get(axis.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = BackendConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.firmware.update_settings(), UpdateSettings::default());
    }

    #[test]
    fn test_axis_bounds_default() {
        let bounds = AxisBounds::default();
        assert_eq!(bounds.get(Axis::X), Some((0.0, 10000.0)));
        assert_eq!(bounds.get(Axis::G), None);
        assert_eq!(bounds.to_map().len(), 8);
        assert_eq!(bounds.travel(Axis::Q), Some(10000.0));
    }

    #[test]
    fn test_current_settings_for_load() {
        let settings = CurrentSettings::default();
        let none = settings.for_load(GantryLoad::None);
        let high = settings.for_load(GantryLoad::HighThroughput);
        assert_eq!(none.len(), Axis::ALL.len());
        assert_eq!(none[&Axis::ZL], CurrentConfig::new(0.1, 1.0));
        assert_eq!(high[&Axis::ZL], CurrentConfig::new(0.8, 1.5));
        // 未覆盖的轴类型沿用空载值
        assert_eq!(high[&Axis::ZG], none[&Axis::ZG]);
    }

    #[test]
    fn test_home_velocity_is_negated() {
        let config = BackendConfig::default();
        assert_eq!(config.home_velocity(Axis::X), -40.0);
        assert_eq!(config.home_velocity(Axis::PL), -10.0);
    }

    #[test]
    fn test_from_toml_partial() {
        let toml_str = r#"
            probe_timeout_ms = 250
            grip_jaw_home_duty_cycle = 40.0

            [firmware]
            retry_count = 1

            [firmware.required_versions]
            gantry_x = "2.1.0"
        "#;
        let config = BackendConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.probe_timeout_ms, 250);
        assert_eq!(config.firmware.retry_count, 1);
        assert_eq!(config.firmware.timeout_seconds, 20);
        assert!(config.firmware.erase);
        let catalog = config.firmware.catalog().unwrap();
        assert_eq!(
            catalog,
            StaticFirmwareCatalog::default().with_version(SubSystem::GantryX, Version::new(2, 1, 0))
        );
        assert_eq!(config.motion_settings, MotionSettings::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BackendConfig::default();
        config.grip_jaw_home_duty_cycle = 120.0;
        assert!(matches!(config.validate(), Err(BackendError::Config(_))));

        let mut config = BackendConfig::default();
        config.axis_bounds.y = (5.0, 5.0);
        assert!(config.validate().is_err());

        let mut config = BackendConfig::default();
        config.firmware.required_versions.head = Some("not-a-version".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let content = BackendConfig::default().to_toml_string().unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let loaded = BackendConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded, BackendConfig::default());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = BackendConfig::load_from_file(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(BackendError::Config(_))));
    }
}
