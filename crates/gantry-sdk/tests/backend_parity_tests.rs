//! 硬件后端（MockBus）与仿真后端的行为一致性测试
//!
//! 同样的初始在线节点与同样的调用序列，两种后端必须返回相同的位置与相同的错误类型。

mod common;

use common::*;
use gantry_bus::MockBus;
use gantry_sdk::prelude::*;
use gantry_sdk::protocol::{InstrumentProbeType, SensorId};

/// 回零后执行一段两轴运动，返回每一步的位置
fn home_then_move<B: MotionBackend>(backend: &mut B) -> Vec<AxisMap<f64>> {
    backend.probe_network().unwrap();
    let homed = backend.home(&[Axis::X, Axis::Y]).unwrap();
    let origin = Coordinates::from([(Axis::X, 0.0), (Axis::Y, 0.0)]);
    let moved = backend
        .move_axes(
            &origin,
            &[
                Move::along(Axis::X, vec![Block::constant(120.0, 2.0)]),
                Move::along(Axis::Y, vec![Block::constant(-15.5, 1.0)]),
            ],
            MoveStopCondition::None,
        )
        .unwrap();
    vec![homed, moved, backend.update_position()]
}

#[test]
fn test_home_then_move_parity() {
    let (mut hw, _bus) = hardware(MockBus::with_core());
    let mut sim = simulated(SimulatedInstruments::default());

    let hw_positions = home_then_move(&mut hw);
    let sim_positions = home_then_move(&mut sim);
    assert_eq!(hw.present_nodes(), sim.present_nodes());
    for (h, s) in hw_positions.iter().zip(&sim_positions) {
        assert_positions_eq(h, s);
    }
    assert_eq!(hw_positions[1][&Axis::X], 120.0);
    assert_eq!(hw_positions[1][&Axis::Y], -15.5);
    assert_eq!(
        hw.check_ready_for_movement(&[Axis::X, Axis::Y]),
        sim.check_ready_for_movement(&[Axis::X, Axis::Y])
    );
}

#[test]
fn test_limit_switch_parity() {
    let (mut hw, _bus) = hardware(MockBus::with_core());
    let mut sim = simulated(SimulatedInstruments::default());
    home_then_move(&mut hw);
    home_then_move(&mut sim);
    assert_eq!(hw.get_limit_switches().unwrap(), sim.get_limit_switches().unwrap());
}

#[test]
fn test_tool_presence_parity() {
    let (mut hw, _bus) = hardware(MockBus::with_core().with_left_pipette(p1000_single_info()));
    let mut sim = simulated(SimulatedInstruments {
        left: Some(p1000_single_sim()),
        ..Default::default()
    });
    hw.probe_network().unwrap();
    sim.probe_network().unwrap();
    assert_eq!(hw.present_nodes(), sim.present_nodes());
    assert!(hw.is_axis_present(Axis::PL));
}

#[test]
fn test_sensor_parity() {
    let (mut hw, _bus) = hardware(MockBus::with_core().with_left_pipette(p1000_single_info()));
    let mut sim = simulated(SimulatedInstruments {
        left: Some(p1000_single_sim()),
        ..Default::default()
    });
    hw.probe_network().unwrap();
    sim.probe_network().unwrap();
    let hw_probe = hw
        .liquid_probe(Mount::Left, 50.0, 5.0, 10.0, 20.0, SensorId::S0)
        .unwrap();
    let sim_probe = sim
        .liquid_probe(Mount::Left, 50.0, 5.0, 10.0, 20.0, SensorId::S0)
        .unwrap();
    assert_positions_eq(&hw_probe, &sim_probe);

    hw.capacitive_probe(Mount::Left, Axis::X, 4.0, 1.0, 0.5, InstrumentProbeType::Primary)
        .unwrap();
    sim.capacitive_probe(Mount::Left, Axis::X, 4.0, 1.0, 0.5, InstrumentProbeType::Primary)
        .unwrap();
    let hw_pass = hw
        .capacitive_pass(Mount::Left, Axis::X, 2.0, 1.0, InstrumentProbeType::Primary)
        .unwrap();
    let sim_pass = sim
        .capacitive_pass(Mount::Left, Axis::X, 2.0, 1.0, InstrumentProbeType::Primary)
        .unwrap();
    assert_eq!(hw_pass, sim_pass);
    assert_positions_eq(&hw.update_position(), &sim.update_position());
}

fn invalid_duty_cycle<B: MotionBackend>(backend: &mut B) -> BackendError {
    backend.probe_network().unwrap();
    backend
        .gripper_grip_jaw(150.0, MoveStopCondition::None)
        .unwrap_err()
}

#[test]
fn test_invalid_input_error_parity() {
    let (mut hw, _bus) = hardware(MockBus::with_core());
    let mut sim = simulated(SimulatedInstruments::default());

    let hw_err = invalid_duty_cycle(&mut hw);
    let sim_err = invalid_duty_cycle(&mut sim);
    assert!(matches!(hw_err, BackendError::Driver(DriverError::Protocol(_))));
    assert!(matches!(sim_err, BackendError::Driver(DriverError::Protocol(_))));

    let hw_err = hw
        .tip_action(&[Axis::PL], 10.0, 0.0, PipetteAction::Clamp)
        .unwrap_err();
    let sim_err = sim
        .tip_action(&[Axis::PL], 10.0, 0.0, PipetteAction::Clamp)
        .unwrap_err();
    assert_eq!(
        std::mem::discriminant(&hw_err),
        std::mem::discriminant(&sim_err)
    );

    // 没有加载电流表
    assert!(matches!(
        hw.set_active_current(&AxisMap::from([(Axis::X, 1.0)])),
        Err(BackendError::CurrentSettingsMissing)
    ));
    assert!(matches!(
        sim.set_active_current(&AxisMap::from([(Axis::X, 1.0)])),
        Err(BackendError::CurrentSettingsMissing)
    ));

    // 未回零的轴
    let hw_err = hw.ensure_ready_for_movement(&[Axis::X]).unwrap_err();
    let sim_err = sim.ensure_ready_for_movement(&[Axis::X]).unwrap_err();
    assert!(hw_err.is_must_home() && sim_err.is_must_home());
}

#[test]
fn test_restore_current_parity() {
    let (mut hw, bus) = hardware(MockBus::with_core());
    let mut sim = simulated(SimulatedInstruments::default());
    hw.probe_network().unwrap();
    sim.probe_network().unwrap();
    hw.update_to_default_current_settings(GantryLoad::None).unwrap();
    sim.update_to_default_current_settings(GantryLoad::None).unwrap();

    let boost = AxisMap::from([(Axis::X, 1.8), (Axis::Y, 1.6)]);
    let hw_err = hw
        .restore_current(|b| -> gantry_sdk::Result<()> {
            b.set_active_current(&boost)?;
            Err(BackendError::config("aborted"))
        })
        .unwrap_err();
    sim.restore_current(|b| b.set_active_current(&boost)).unwrap();

    assert!(matches!(hw_err, BackendError::Config(_)));
    assert_eq!(hw.motor_run_currents(), sim.motor_run_currents());
    assert_eq!(hw.motor_run_currents()[&Axis::X], 1.25);
    assert_eq!(bus.currents(Node::GantryX), Some((Some(0.5), Some(1.25))));
}

/// 分别用 `home` 与 `fast_home` 回零，返回两次的位置
fn home_and_fast_home<B: MotionBackend>(
    mut homed: B,
    mut fast: B,
) -> (AxisMap<f64>, AxisMap<f64>, B) {
    homed.probe_network().unwrap();
    fast.probe_network().unwrap();
    let home_result = homed.home(&[Axis::X, Axis::Y]).unwrap();
    let fast_result = fast.fast_home(&[Axis::X, Axis::Y], 5.0).unwrap();
    (home_result, fast_result, fast)
}

#[test]
fn test_fast_home_matches_home() {
    let (hw_home, hw_fast, mut hw) = home_and_fast_home(
        hardware(MockBus::with_core()).0,
        hardware(MockBus::with_core()).0,
    );
    let (sim_home, sim_fast, mut sim) = home_and_fast_home(
        simulated(SimulatedInstruments::default()),
        simulated(SimulatedInstruments::default()),
    );

    assert_positions_eq(&hw_fast, &hw_home);
    assert_positions_eq(&sim_fast, &sim_home);
    assert_positions_eq(&hw_fast, &sim_fast);

    // 快速回零后电机与编码器状态均为已回零
    assert!(hw.check_ready_for_movement(&[Axis::X, Axis::Y]));
    assert!(sim.check_ready_for_movement(&[Axis::X, Axis::Y]));
    hw.update_motor_estimation(&[Axis::X, Axis::Y]).unwrap();
    sim.update_motor_estimation(&[Axis::X, Axis::Y]).unwrap();
}

fn accessory_state<B: MotionBackend>(backend: &mut B) {
    assert!(backend.grip_force_profile().is_none());
    let profile = GripForceProfile {
        polynomial: vec![(0, 3.0), (1, 2.0)],
        default_grip_force: 15.0,
        default_home_force: 12.0,
        min_grip_force: 5.0,
        max_grip_force: 60.0,
    };
    backend.set_grip_force_profile(Some(profile.clone()));
    assert_eq!(backend.grip_force_profile(), Some(&profile));
    backend.set_grip_force_profile(None);
    assert!(backend.grip_force_profile().is_none());

    backend.set_lights(Some(true), Some(false));
    assert!(backend.get_lights().is_empty());
    assert_eq!(backend.fw_version(), None);
}

#[test]
fn test_accessory_state_parity() {
    let (mut hw, _bus) = hardware(MockBus::with_core());
    let mut sim = simulated(SimulatedInstruments::default());
    accessory_state(&mut hw);
    accessory_state(&mut sim);
}
