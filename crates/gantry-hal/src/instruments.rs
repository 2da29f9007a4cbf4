//! 工具识别
//!
//! 把头部控制器上报的工具信息（[`ToolSummary`]）转换为带序列号的
//! 已安装工具描述。每个安装位独立识别，一个安装位失败不影响其它安装位。

use crate::config::InstrumentSettings;
use crate::error::{BackendError, Result};
use gantry_protocol::{
    GripperInformation, Mount, PipetteInformation, PipetteName, PipetteSubType, ToolSummary,
};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// 移液器型号版本（`major.minor`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PipetteVersion {
    pub major: u8,
    pub minor: u8,
}

impl PipetteVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl FromStr for PipetteVersion {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (major, minor) = s.trim().split_once('.').ok_or(())?;
        Ok(Self {
            major: major.parse().map_err(|_| ())?,
            minor: minor.parse().map_err(|_| ())?,
        })
    }
}

impl fmt::Display for PipetteVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// 工具型号目录
pub trait InstrumentCatalog {
    fn supports_pipette(&self, name: PipetteName, version: PipetteVersion) -> bool;
}

impl InstrumentCatalog for InstrumentSettings {
    fn supports_pipette(&self, name: PipetteName, version: PipetteVersion) -> bool {
        name != PipetteName::Unknown
            && self
                .supported_pipette_models
                .iter()
                .filter_map(|m| m.parse::<PipetteVersion>().ok())
                .any(|v| v == version)
    }
}

/// 已安装的移液器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedPipette {
    pub name: PipetteName,
    /// 只按名称加载（未检测到实物）时为 `None`
    pub model: Option<PipetteVersion>,
    pub id: Option<String>,
}

impl AttachedPipette {
    pub fn sub_type(&self) -> Option<PipetteSubType> {
        self.name.sub_type()
    }
}

/// 已安装的夹爪
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedGripper {
    pub model: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachedInstrument {
    Pipette(AttachedPipette),
    Gripper(AttachedGripper),
}

impl AttachedInstrument {
    pub fn id(&self) -> Option<&str> {
        match self {
            AttachedInstrument::Pipette(p) => p.id.as_deref(),
            AttachedInstrument::Gripper(g) => g.id.as_deref(),
        }
    }

    pub fn as_pipette(&self) -> Option<&AttachedPipette> {
        match self {
            AttachedInstrument::Pipette(p) => Some(p),
            AttachedInstrument::Gripper(_) => None,
        }
    }
}

/// 工具检测结果
///
/// `errors` 中的安装位识别失败，但不影响 `instruments` 中其它安装位的结果。
#[derive(Debug, Default)]
pub struct AttachedInstruments {
    pub instruments: BTreeMap<Mount, AttachedInstrument>,
    pub errors: BTreeMap<Mount, BackendError>,
}

impl AttachedInstruments {
    pub fn get(&self, mount: Mount) -> Option<&AttachedInstrument> {
        self.instruments.get(&mount)
    }

    pub fn mounts(&self) -> Vec<Mount> {
        self.instruments.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// 左安装位移液器类型（决定 Q 轴是否存在）
    pub fn left_sub_type(&self) -> Option<PipetteSubType> {
        self.get(Mount::Left)
            .and_then(AttachedInstrument::as_pipette)
            .and_then(AttachedPipette::sub_type)
    }

    /// 各移液器安装位的类型（固件更新比对用）
    pub fn pipette_sub_types(&self) -> BTreeMap<Mount, PipetteSubType> {
        self.instruments
            .iter()
            .filter_map(|(mount, instr)| {
                instr
                    .as_pipette()
                    .and_then(AttachedPipette::sub_type)
                    .map(|t| (*mount, t))
            })
            .collect()
    }

    fn insert_result(&mut self, mount: Mount, result: Result<AttachedInstrument>) {
        match result {
            Ok(instr) => {
                self.instruments.insert(mount, instr);
            },
            Err(e) => {
                warn!("Failed to identify instrument on {}: {}", mount, e);
                self.errors.insert(mount, e);
            },
        }
    }
}

/// 期望的移液器（仿真后端用于严格匹配）
pub type ExpectedInstruments = BTreeMap<Mount, PipetteName>;

/// 序列号前缀
pub fn serial_key(name: PipetteName) -> Option<&'static str> {
    match name {
        PipetteName::P1000Single => Some("P1KS"),
        PipetteName::P1000Multi => Some("P1KM"),
        PipetteName::P50Single => Some("P50S"),
        PipetteName::P50Multi => Some("P50M"),
        PipetteName::P1000_96 => Some("P1KH"),
        PipetteName::P50_96 => Some("P50H"),
        PipetteName::Unknown => None,
    }
}

/// `{key}V{major}{minor}{serial}`
pub fn combine_serial_number(name: PipetteName, version: PipetteVersion, serial: &str) -> Option<String> {
    serial_key(name).map(|key| format!("{}V{}{}{}", key, version.major, version.minor, serial))
}

/// 识别一个移液器
pub fn build_attached_pipette<C: InstrumentCatalog + ?Sized>(
    info: &PipetteInformation,
    mount: Mount,
    catalog: &C,
) -> Result<AttachedPipette> {
    if info.name == PipetteName::Unknown {
        return Err(BackendError::InvalidInstrument {
            name_int: info.name_int,
            mount,
        });
    }
    let invalid_model = || BackendError::InvalidInstrumentModel {
        name: info.name,
        model: info.model.clone(),
        mount,
    };
    let version: PipetteVersion = info.model.parse().map_err(|_| invalid_model())?;
    if !catalog.supports_pipette(info.name, version) {
        return Err(invalid_model());
    }
    Ok(AttachedPipette {
        name: info.name,
        model: Some(version),
        id: combine_serial_number(info.name, version, &info.serial),
    })
}

pub fn build_attached_gripper(info: &GripperInformation) -> AttachedGripper {
    AttachedGripper {
        model: info.model.clone(),
        id: Some(format!("GRPV{}{}", info.model.replace('.', ""), info.serial)),
    }
}

/// 识别工具检测结果中的所有工具
pub fn identify_tools<C: InstrumentCatalog + ?Sized>(
    summary: &ToolSummary,
    catalog: &C,
) -> AttachedInstruments {
    let mut attached = AttachedInstruments::default();
    for (mount, info) in [(Mount::Left, &summary.left), (Mount::Right, &summary.right)] {
        if let Some(info) = info {
            let result = build_attached_pipette(info, mount, catalog).map(AttachedInstrument::Pipette);
            attached.insert_result(mount, result);
        }
    }
    if let Some(info) = &summary.gripper {
        attached.instruments.insert(
            Mount::Gripper,
            AttachedInstrument::Gripper(build_attached_gripper(info)),
        );
    }
    attached
}

/// 仿真后端配置的移液器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedPipette {
    pub name: PipetteName,
    pub model: PipetteVersion,
    pub id: Option<String>,
}

/// 仿真后端配置的工具
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedInstruments {
    pub left: Option<SimulatedPipette>,
    pub right: Option<SimulatedPipette>,
    pub gripper: Option<AttachedGripper>,
}

impl SimulatedInstruments {
    pub fn pipette(&self, mount: Mount) -> Option<&SimulatedPipette> {
        match mount {
            Mount::Left => self.left.as_ref(),
            Mount::Right => self.right.as_ref(),
            Mount::Gripper => None,
        }
    }

    /// 构造时检查配置的移液器是否受支持
    pub fn validate<C: InstrumentCatalog + ?Sized>(&self, catalog: &C) -> Result<()> {
        for mount in [Mount::Left, Mount::Right] {
            if let Some(p) = self.pipette(mount)
                && !catalog.supports_pipette(p.name, p.model)
            {
                return Err(BackendError::UnsupportedInstrument {
                    mount,
                    requested: format!("{}_v{}", p.name, p.model),
                });
            }
        }
        Ok(())
    }
}

/// 仿真后端：按期望与配置解析一个移液器安装位
///
/// - 期望的名称不受支持：`UnsupportedInstrument`
/// - 配置与期望不一致：严格模式报 `InstrumentMismatch`，否则按期望名称返回（无序列号）
/// - 只有期望：按期望名称返回（无序列号）
pub fn resolve_simulated_pipette(
    mount: Mount,
    configured: Option<&SimulatedPipette>,
    expected: Option<PipetteName>,
    strict: bool,
) -> Result<Option<AttachedPipette>> {
    if let Some(expected) = expected
        && expected == PipetteName::Unknown
    {
        return Err(BackendError::UnsupportedInstrument {
            mount,
            requested: expected.to_string(),
        });
    }
    let by_name = |name: PipetteName| AttachedPipette {
        name,
        model: None,
        id: None,
    };
    match (configured, expected) {
        (Some(found), Some(expected)) if found.name != expected => {
            if strict {
                Err(BackendError::InstrumentMismatch {
                    mount,
                    expected: expected.to_string(),
                    found: found.name.to_string(),
                })
            } else {
                Ok(Some(by_name(expected)))
            }
        },
        (Some(found), _) => Ok(Some(AttachedPipette {
            name: found.name,
            model: Some(found.model),
            id: found.id.clone(),
        })),
        (None, Some(expected)) => Ok(Some(by_name(expected))),
        (None, None) => Ok(None),
    }
}

/// 仿真后端的完整工具检测
pub fn resolve_simulated(
    configured: &SimulatedInstruments,
    expected: &ExpectedInstruments,
    strict: bool,
) -> AttachedInstruments {
    let mut attached = AttachedInstruments::default();
    for mount in [Mount::Left, Mount::Right] {
        match resolve_simulated_pipette(
            mount,
            configured.pipette(mount),
            expected.get(&mount).copied(),
            strict,
        ) {
            Ok(Some(p)) => attached.insert_result(mount, Ok(AttachedInstrument::Pipette(p))),
            Ok(None) => {},
            Err(e) => attached.insert_result(mount, Err(e)),
        }
    }
    if let Some(gripper) = &configured.gripper {
        attached
            .instruments
            .insert(Mount::Gripper, AttachedInstrument::Gripper(gripper.clone()));
    }
    attached
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> InstrumentSettings {
        InstrumentSettings::default()
    }

    #[test]
    fn test_pipette_version_parse() {
        assert_eq!("3.3".parse::<PipetteVersion>(), Ok(PipetteVersion::new(3, 3)));
        assert!("33".parse::<PipetteVersion>().is_err());
        assert!("a.b".parse::<PipetteVersion>().is_err());
        assert_eq!(PipetteVersion::new(1, 0).to_string(), "1.0");
    }

    #[test]
    fn test_combine_serial_number() {
        assert_eq!(
            combine_serial_number(PipetteName::P1000Single, PipetteVersion::new(3, 3), "20230101A01"),
            Some("P1KSV3320230101A01".to_string())
        );
        assert_eq!(
            combine_serial_number(PipetteName::P50_96, PipetteVersion::new(1, 0), "X"),
            Some("P50HV10X".to_string())
        );
        assert_eq!(
            combine_serial_number(PipetteName::Unknown, PipetteVersion::new(1, 0), "X"),
            None
        );
    }

    #[test]
    fn test_build_attached_pipette_errors() {
        let unknown = PipetteInformation::new(42, "3.3", "S1");
        assert!(matches!(
            build_attached_pipette(&unknown, Mount::Left, &catalog()),
            Err(BackendError::InvalidInstrument { name_int: 42, mount: Mount::Left })
        ));

        let bad_model = PipetteInformation::new(0, "9.9", "S1");
        assert!(matches!(
            build_attached_pipette(&bad_model, Mount::Right, &catalog()),
            Err(BackendError::InvalidInstrumentModel { mount: Mount::Right, .. })
        ));

        let garbage = PipetteInformation::new(0, "v3", "S1");
        assert!(build_attached_pipette(&garbage, Mount::Right, &catalog()).is_err());
    }

    #[test]
    fn test_gripper_id() {
        let gripper = build_attached_gripper(&GripperInformation::new("1.0", "20230301B02"));
        assert_eq!(gripper.id.as_deref(), Some("GRPV1020230301B02"));
    }

    #[test]
    fn test_identify_tools_isolates_mounts() {
        let summary = ToolSummary {
            left: Some(PipetteInformation::new(99, "3.3", "L")),
            right: Some(PipetteInformation::new(1, "3.3", "R")),
            gripper: Some(GripperInformation::new("1.0", "G")),
        };
        let attached = identify_tools(&summary, &catalog());
        assert!(attached.errors.contains_key(&Mount::Left));
        assert_eq!(attached.mounts(), vec![Mount::Right, Mount::Gripper]);
        let right = attached.get(Mount::Right).and_then(AttachedInstrument::as_pipette).unwrap();
        assert_eq!(right.name, PipetteName::P1000Multi);
        assert_eq!(right.id.as_deref(), Some("P1KMV33R"));
        assert_eq!(attached.left_sub_type(), None);
    }

    #[test]
    fn test_pipette_sub_types() {
        let summary = ToolSummary {
            left: Some(PipetteInformation::new(4, "1.0", "L")),
            right: None,
            gripper: None,
        };
        let attached = identify_tools(&summary, &catalog());
        assert_eq!(attached.left_sub_type(), Some(PipetteSubType::NinetySix));
        assert_eq!(
            attached.pipette_sub_types(),
            BTreeMap::from([(Mount::Left, PipetteSubType::NinetySix)])
        );
    }

    fn sim_pipette(name: PipetteName) -> SimulatedPipette {
        SimulatedPipette {
            name,
            model: PipetteVersion::new(3, 3),
            id: Some("SIM1".into()),
        }
    }

    #[test]
    fn test_resolve_simulated_pipette() {
        let found = sim_pipette(PipetteName::P50Single);

        // 一致：返回配置（带序列号）
        let p = resolve_simulated_pipette(Mount::Left, Some(&found), Some(PipetteName::P50Single), true)
            .unwrap()
            .unwrap();
        assert_eq!(p.id.as_deref(), Some("SIM1"));

        // 不一致 + 严格
        assert!(matches!(
            resolve_simulated_pipette(Mount::Left, Some(&found), Some(PipetteName::P1000Single), true),
            Err(BackendError::InstrumentMismatch { .. })
        ));

        // 不一致 + 非严格：按期望返回
        let p = resolve_simulated_pipette(Mount::Left, Some(&found), Some(PipetteName::P1000Single), false)
            .unwrap()
            .unwrap();
        assert_eq!(p.name, PipetteName::P1000Single);
        assert_eq!(p.id, None);

        // 只有期望
        let p = resolve_simulated_pipette(Mount::Right, None, Some(PipetteName::P50Multi), true)
            .unwrap()
            .unwrap();
        assert_eq!((p.name, p.model), (PipetteName::P50Multi, None));

        assert!(resolve_simulated_pipette(Mount::Right, None, None, true).unwrap().is_none());
        assert!(matches!(
            resolve_simulated_pipette(Mount::Right, None, Some(PipetteName::Unknown), false),
            Err(BackendError::UnsupportedInstrument { .. })
        ));
    }

    #[test]
    fn test_simulated_instruments_validate() {
        let mut configured = SimulatedInstruments {
            left: Some(sim_pipette(PipetteName::P1000_96)),
            ..Default::default()
        };
        assert!(configured.validate(&catalog()).is_ok());
        configured.right = Some(SimulatedPipette {
            name: PipetteName::P50Single,
            model: PipetteVersion::new(7, 7),
            id: None,
        });
        assert!(matches!(
            configured.validate(&catalog()),
            Err(BackendError::UnsupportedInstrument { mount: Mount::Right, .. })
        ));
    }
}
