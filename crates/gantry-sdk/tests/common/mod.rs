//! 集成测试公共工具

#![allow(dead_code)]

use gantry_bus::MockBus;
use gantry_sdk::prelude::*;
use gantry_sdk::hal::PipetteVersion;
use gantry_sdk::protocol::PipetteInformation;
use std::sync::Arc;

pub type MockBackend = HardwareBackend<Arc<MockBus>>;

/// 型号 3.4 的单通道 P1000
pub fn p1000_single_info() -> PipetteInformation {
    PipetteInformation::new(0, "3.4", "20230101A01")
}

pub fn p1000_single_sim() -> SimulatedPipette {
    SimulatedPipette {
        name: PipetteName::P1000Single,
        model: PipetteVersion { major: 3, minor: 4 },
        id: Some("P1KSV3420230101A01".to_string()),
    }
}

pub fn hardware(bus: MockBus) -> (MockBackend, Arc<MockBus>) {
    hardware_with_config(bus, BackendConfig::default())
}

pub fn hardware_with_config(bus: MockBus, config: BackendConfig) -> (MockBackend, Arc<MockBus>) {
    let bus = Arc::new(bus);
    let backend = HardwareBackend::new(bus.clone(), config).expect("valid config");
    (backend, bus)
}

pub fn simulated(instruments: SimulatedInstruments) -> SimulatedBackend {
    SimulatedBackend::new(BackendConfig::default(), instruments, Vec::new(), false)
        .expect("valid config")
}

/// 浮点容差比较两个位置表
pub fn assert_positions_eq(left: &AxisMap<f64>, right: &AxisMap<f64>) {
    assert_eq!(
        left.keys().collect::<Vec<_>>(),
        right.keys().collect::<Vec<_>>()
    );
    for (axis, value) in left {
        assert!(
            (value - right[axis]).abs() < 1e-6,
            "{} differs: {} vs {}",
            axis,
            value,
            right[axis]
        );
    }
}
