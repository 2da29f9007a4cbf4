//! 运动控制数据模型与后端的属性测试
//!
//! 使用 proptest 验证不变量。

mod common;

use common::*;
use gantry_bus::{BusCommand, MockBus};
use gantry_sdk::driver::{MotorStateStore, PresenceTracker};
use gantry_sdk::hal::HomeSequencer;
use gantry_sdk::prelude::*;
use gantry_sdk::protocol::{
    MotorReport, MoveGroupStep, NodeMap, axis_to_node, node_to_axis,
};
use proptest::prelude::*;

const MOVABLE: [Axis; 5] = [Axis::X, Axis::Y, Axis::ZL, Axis::ZR, Axis::PL];
const CORE: [Node; 3] = [Node::GantryX, Node::GantryY, Node::Head];

proptest! {
    /// 轴与节点一一对应
    #[test]
    fn axis_node_roundtrip(index in 0..Axis::ALL.len()) {
        let axis = Axis::ALL[index];
        prop_assert_eq!(node_to_axis(axis_to_node(axis)), Some(axis));
    }

    /// 任何运动命令都只发往在线节点
    #[test]
    fn no_phantom_nodes(
        responsive in proptest::collection::vec(any::<bool>(), CORE.len()),
        moving in proptest::collection::vec(any::<bool>(), MOVABLE.len()),
        distance in -50.0..50.0f64,
    ) {
        let mut bus = MockBus::new();
        for (node, on) in CORE.iter().zip(&responsive) {
            if *on {
                bus = bus.with_node(*node);
            }
        }
        let (mut backend, bus) = hardware(bus);
        backend.probe_network().unwrap();

        let axes: Vec<Axis> = MOVABLE
            .iter()
            .zip(&moving)
            .filter(|(_, m)| **m)
            .map(|(a, _)| *a)
            .collect();
        let origin: Coordinates = axes.iter().map(|a| (*a, 0.0)).collect();
        let moves: Vec<Move> = axes
            .iter()
            .map(|a| Move::along(*a, vec![Block::constant(distance, 1.0)]))
            .collect();
        backend.move_axes(&origin, &moves, MoveStopCondition::None).unwrap();
        backend.home(&MOVABLE).unwrap();

        let present = backend.present_nodes();
        prop_assert!(!present.contains(&Node::Head));
        for (node, command) in bus.sent_commands() {
            if matches!(command, BusCommand::LoadMoveGroup { .. } | BusCommand::ExecuteMoveGroup) {
                prop_assert!(present.contains(&node), "{} is not present", node);
            }
        }
    }

    /// motor_ok 一旦为真，直到显式清除前保持为真
    #[test]
    fn motor_ok_is_sticky(
        reports in proptest::collection::vec((any::<bool>(), any::<bool>()), 1..20),
    ) {
        let mut store = MotorStateStore::default();
        let mut seen_ok = false;
        for (motor_ok, encoder_ok) in reports {
            store.record(&NodeMap::from([(
                Node::GantryX,
                MotorReport::new(1.0, 1.0, motor_ok, encoder_ok),
            )]));
            seen_ok |= motor_ok;
            let status = store.status(Node::GantryX).unwrap();
            prop_assert_eq!(status.motor_ok, seen_ok);
            prop_assert_eq!(status.encoder_ok, encoder_ok);
        }
        store.clear_status([Node::GantryX]);
        prop_assert!(!store.ready_for_movement(&[Axis::X]));
    }

    /// restore_current 结束后电流表与进入前完全一致
    #[test]
    fn restore_current_is_invariant(
        run in proptest::collection::vec(0.1..2.5f64, MOVABLE.len()),
        hold in proptest::collection::vec(0.0..1.0f64, MOVABLE.len()),
        fail in any::<bool>(),
    ) {
        let mut backend = simulated(SimulatedInstruments {
            left: Some(p1000_single_sim()),
            ..Default::default()
        });
        backend.probe_network().unwrap();
        backend.update_to_default_current_settings(GantryLoad::None).unwrap();
        let run_before = backend.motor_run_currents();
        let hold_before = backend.motor_hold_currents();

        let run: AxisMap<f64> = MOVABLE.iter().copied().zip(run).collect();
        let hold: AxisMap<f64> = MOVABLE.iter().copied().zip(hold).collect();
        let result = backend.restore_current(|b| {
            b.set_active_current(&run)?;
            b.set_hold_current(&hold)?;
            if fail {
                return Err(BackendError::config("interrupted"));
            }
            Ok(())
        });
        prop_assert_eq!(result.is_err(), fail);
        prop_assert_eq!(backend.motor_run_currents(), run_before);
        prop_assert_eq!(backend.motor_hold_currents(), hold_before);
    }

    /// 回零距离为完整行程取反，速度为回零速度取反
    #[test]
    fn home_distance_is_negated_travel(min in -100.0..100.0f64, travel in 1.0..1000.0f64) {
        let mut config = BackendConfig::default();
        config.axis_bounds.x = (min, min + travel);
        let presence = PresenceTracker::from_nodes([Node::GantryX, Node::GantryY]);
        let plan = HomeSequencer::new(&config, &presence).plan(&[Axis::X, Axis::Y]);
        prop_assert_eq!(plan.len(), 2);
        let MoveGroupStep::Axis(step) = plan[0].group.steps()[0][&Node::GantryX] else {
            panic!("expected axis step");
        };
        prop_assert!((step.distance_mm + travel).abs() < 1e-9);
        prop_assert_eq!(step.velocity_mm_sec, -config.motion_settings.max_speed_discontinuity.x);
    }
}
