//! 运动组构建（MotionGroupBuilder）
//!
//! 把起点坐标与上游给出的 `Move` 序列投影到各节点，生成 `MoveGroup`。
//!
//! # 在线过滤
//!
//! 每一步只包含构建时在线的节点。不在线的节点直接丢弃（不补零），
//! 预测位置也不会推进。在线但不参与运动的节点得到零位移步，
//! 以保证同组节点一起开始、一起结束。

use crate::presence::PresenceTracker;
use gantry_protocol::{
    Axis, AxisMap, BrushedStep, Coordinates, Move, MoveGroup, MoveGroupSingleStep,
    MoveGroupStep, MoveStopCondition, Node, NodeMap, PipetteAction, SingleAxisStep,
    TipActionStep, axis_to_node, node_to_axis,
};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// 夹爪夹持步持续时间（s）
pub const GRIP_DURATION_SEC: f64 = 1.0;

/// 夹爪保持步持续时间（s）
pub const HOLD_DURATION_SEC: f64 = 1.0;

/// 夹爪回零步持续时间，0 表示运行直到停止条件满足
pub const JAW_HOME_DURATION_SEC: f64 = 0.0;

/// 运动组构建器
///
/// 只借用在线集合，构建过程不修改任何状态。
#[derive(Debug, Clone, Copy)]
pub struct MotionGroupBuilder<'a> {
    presence: &'a PresenceTracker,
}

impl<'a> MotionGroupBuilder<'a> {
    pub fn new(presence: &'a PresenceTracker) -> Self {
        Self { presence }
    }

    /// 由起点与 `Move` 序列构建运动组
    ///
    /// # 返回
    ///
    /// `(运动组, 预测终点)`；预测终点只包含在线节点。
    pub fn build(
        &self,
        origin: &Coordinates,
        moves: &[Move],
        stop_condition: MoveStopCondition,
    ) -> (MoveGroup, NodeMap<f64>) {
        let mut involved: BTreeSet<Axis> = origin.keys().copied().collect();
        for mv in moves {
            involved.extend(mv.unit_vector.keys().copied());
        }

        let nodes: Vec<Node> = involved
            .iter()
            .map(|axis| axis_to_node(*axis))
            .filter(|node| {
                let present = self.presence.is_present(*node);
                if !present {
                    debug!("Dropping absent node {} from move group", node);
                }
                present
            })
            .collect();

        let mut position: NodeMap<f64> = nodes
            .iter()
            .map(|node| {
                let start = node_to_axis(*node)
                    .and_then(|axis| origin.get(&axis).copied())
                    .unwrap_or(0.0);
                (*node, start)
            })
            .collect();

        let mut group = MoveGroup::new();
        if nodes.is_empty() {
            return (group, position);
        }

        for mv in moves {
            for block in &mv.blocks {
                let mut step = MoveGroupSingleStep::new();
                for node in &nodes {
                    let component = node_to_axis(*node)
                        .and_then(|axis| mv.unit_vector.get(&axis).copied())
                        .unwrap_or(0.0);
                    let distance = component * block.distance;
                    step.insert(
                        *node,
                        MoveGroupStep::Axis(SingleAxisStep {
                            distance_mm: distance,
                            velocity_mm_sec: component * block.initial_speed,
                            acceleration_mm_sec_sq: component * block.acceleration,
                            duration_sec: block.time,
                            stop_condition,
                        }),
                    );
                    if let Some(p) = position.get_mut(node) {
                        *p += distance;
                    }
                }
                group.push(step);
            }
        }

        (group, position)
    }

    /// 回零运动组：单步，限位开关停止
    ///
    /// 缺少速度的轴会被忽略。
    pub fn build_home(&self, distances: &AxisMap<f64>, velocities: &AxisMap<f64>) -> MoveGroup {
        let mut step = MoveGroupSingleStep::new();
        for (node, distance) in self.presence.filter_axis_map(distances) {
            let Some(axis) = node_to_axis(node) else {
                continue;
            };
            let Some(velocity) = velocities.get(&axis).copied().filter(|v| *v != 0.0) else {
                warn!("No homing velocity for {}, skipping", axis);
                continue;
            };
            step.insert(
                node,
                MoveGroupStep::Axis(SingleAxisStep {
                    distance_mm: distance,
                    velocity_mm_sec: velocity,
                    acceleration_mm_sec_sq: 0.0,
                    duration_sec: (distance / velocity).abs(),
                    stop_condition: MoveStopCondition::LimitSwitch,
                }),
            );
        }
        single_step_group(step)
    }

    /// 夹爪夹持
    pub fn build_gripper_grip(
        &self,
        duty_cycle: f64,
        stop_condition: MoveStopCondition,
    ) -> MoveGroup {
        self.gripper_group(BrushedStep {
            duty_cycle,
            encoder_position_um: 0,
            duration_sec: GRIP_DURATION_SEC,
            stop_condition,
        })
    }

    /// 夹爪张开回零
    pub fn build_gripper_home(&self, duty_cycle: f64) -> MoveGroup {
        self.gripper_group(BrushedStep {
            duty_cycle,
            encoder_position_um: 0,
            duration_sec: JAW_HOME_DURATION_SEC,
            stop_condition: MoveStopCondition::LimitSwitch,
        })
    }

    /// 夹爪保持在编码器位置（零占空比的被动步）
    pub fn build_gripper_hold(&self, encoder_position_um: i32) -> MoveGroup {
        self.gripper_group(BrushedStep {
            duty_cycle: 0.0,
            encoder_position_um,
            duration_sec: HOLD_DURATION_SEC,
            stop_condition: MoveStopCondition::EncoderPosition,
        })
    }

    /// 取吸头驱动动作
    ///
    /// `Home` 动作反转速度方向并以限位开关停止。
    pub fn build_tip_action(
        &self,
        axes: &[Axis],
        distance: f64,
        speed: f64,
        action: PipetteAction,
    ) -> MoveGroup {
        let (velocity, stop_condition) = match action {
            PipetteAction::Home => (-speed, MoveStopCondition::LimitSwitch),
            PipetteAction::Clamp => (speed, MoveStopCondition::None),
        };
        let duration_sec = if speed == 0.0 {
            0.0
        } else {
            (distance / speed).abs()
        };
        let step: MoveGroupSingleStep = axes
            .iter()
            .map(|axis| axis_to_node(*axis))
            .filter(|node| self.presence.is_present(*node))
            .map(|node| {
                (
                    node,
                    MoveGroupStep::TipAction(TipActionStep {
                        velocity_mm_sec: velocity,
                        duration_sec,
                        action,
                        stop_condition,
                    }),
                )
            })
            .collect();
        single_step_group(step)
    }

    fn gripper_group(&self, brushed: BrushedStep) -> MoveGroup {
        let node = axis_to_node(Axis::G);
        if !self.presence.is_present(node) {
            debug!("Gripper jaw not present, nothing to do");
            return MoveGroup::new();
        }
        single_step_group(MoveGroupSingleStep::from([(node, MoveGroupStep::Brushed(brushed))]))
    }
}

fn single_step_group(step: MoveGroupSingleStep) -> MoveGroup {
    if step.is_empty() {
        MoveGroup::new()
    } else {
        MoveGroup::from(vec![step])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_protocol::Block;

    fn presence(nodes: &[Node]) -> PresenceTracker {
        PresenceTracker::from_nodes(nodes.iter().copied())
    }

    #[test]
    fn test_build_projects_unit_vector() {
        let presence = presence(&[Node::GantryX, Node::GantryY]);
        let builder = MotionGroupBuilder::new(&presence);
        let origin = Coordinates::from([(Axis::X, 10.0), (Axis::Y, 20.0)]);
        let mv = Move::new(
            AxisMap::from([(Axis::X, 0.6), (Axis::Y, 0.8)]),
            vec![Block::new(10.0, 0.0, 100.0, 0.5), Block::new(5.0, 50.0, 0.0, 0.1)],
        );
        let (group, predicted) = builder.build(&origin, &[mv], MoveStopCondition::None);

        assert_eq!(group.len(), 2);
        let MoveGroupStep::Axis(x) = group.steps()[0][&Node::GantryX] else {
            panic!("expected axis step");
        };
        assert!((x.distance_mm - 6.0).abs() < 1e-9);
        assert!((x.acceleration_mm_sec_sq - 60.0).abs() < 1e-9);
        assert_eq!(x.duration_sec, 0.5);
        assert!((predicted[&Node::GantryX] - 19.0).abs() < 1e-9);
        assert!((predicted[&Node::GantryY] - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_build_drops_absent_nodes() {
        let presence = presence(&[Node::GantryX]);
        let builder = MotionGroupBuilder::new(&presence);
        let origin = Coordinates::from([(Axis::X, 0.0), (Axis::Y, 0.0)]);
        let mv = Move::new(
            AxisMap::from([(Axis::X, 0.6), (Axis::Y, 0.8)]),
            vec![Block::constant(10.0, 10.0)],
        );
        let (group, predicted) = builder.build(&origin, &[mv], MoveStopCondition::None);
        assert_eq!(group.nodes(), BTreeSet::from([Node::GantryX]));
        assert!(!predicted.contains_key(&Node::GantryY));
    }

    #[test]
    fn test_build_keeps_idle_present_nodes_in_sync() {
        let presence = presence(&[Node::GantryX, Node::Head]);
        let builder = MotionGroupBuilder::new(&presence);
        let origin = Coordinates::from([(Axis::X, 0.0), (Axis::ZL, 3.0)]);
        let (group, predicted) = builder.build(
            &origin,
            &[Move::along(Axis::X, vec![Block::constant(4.0, 2.0)])],
            MoveStopCondition::None,
        );
        let step = &group.steps()[0];
        assert_eq!(step[&Node::HeadL].distance_mm(), 0.0);
        assert_eq!(step[&Node::HeadL].duration_sec(), 2.0);
        assert_eq!(predicted[&Node::HeadL], 3.0);
    }

    #[test]
    fn test_build_with_nothing_present() {
        let presence = PresenceTracker::new();
        let builder = MotionGroupBuilder::new(&presence);
        let (group, predicted) = builder.build(
            &Coordinates::from([(Axis::X, 0.0)]),
            &[Move::along(Axis::X, vec![Block::constant(4.0, 2.0)])],
            MoveStopCondition::None,
        );
        assert!(group.is_empty());
        assert!(predicted.is_empty());
    }

    #[test]
    fn test_build_home() {
        let presence = presence(&[Node::GantryX, Node::GantryY]);
        let builder = MotionGroupBuilder::new(&presence);
        let distances = AxisMap::from([(Axis::X, -500.0), (Axis::ZL, -200.0)]);
        let velocities = AxisMap::from([(Axis::X, -50.0), (Axis::ZL, -10.0)]);
        let group = builder.build_home(&distances, &velocities);
        assert_eq!(group.len(), 1);
        let MoveGroupStep::Axis(x) = group.steps()[0][&Node::GantryX] else {
            panic!("expected axis step");
        };
        assert_eq!(x.stop_condition, MoveStopCondition::LimitSwitch);
        assert_eq!(x.duration_sec, 10.0);
        assert_eq!(group.nodes(), BTreeSet::from([Node::GantryX]));
    }

    #[test]
    fn test_gripper_groups() {
        let presence = presence(&[Node::Gripper]);
        let builder = MotionGroupBuilder::new(&presence);

        let grip = builder.build_gripper_grip(50.0, MoveStopCondition::GripperForce);
        assert_eq!(
            grip.steps()[0][&Node::GripperG].stop_condition(),
            MoveStopCondition::GripperForce
        );

        let home = builder.build_gripper_home(30.0);
        assert_eq!(
            home.steps()[0][&Node::GripperG].stop_condition(),
            MoveStopCondition::LimitSwitch
        );

        let hold = builder.build_gripper_hold(1200);
        let MoveGroupStep::Brushed(step) = hold.steps()[0][&Node::GripperG] else {
            panic!("expected brushed step");
        };
        assert_eq!(step.duty_cycle, 0.0);
        assert_eq!(step.encoder_position_um, 1200);
        assert_eq!(step.stop_condition, MoveStopCondition::EncoderPosition);

        let absent = PresenceTracker::new();
        assert!(MotionGroupBuilder::new(&absent).build_gripper_grip(50.0, MoveStopCondition::None).is_empty());
    }

    #[test]
    fn test_tip_action_home_negates_speed() {
        let presence = presence(&[Node::PipetteLeftTip]);
        let builder = MotionGroupBuilder::new(&presence);
        let home = builder.build_tip_action(&[Axis::Q], 33.0, 5.5, PipetteAction::Home);
        let MoveGroupStep::TipAction(step) = home.steps()[0][&Node::PipetteLeftTip] else {
            panic!("expected tip action step");
        };
        assert_eq!(step.velocity_mm_sec, -5.5);
        assert_eq!(step.stop_condition, MoveStopCondition::LimitSwitch);
        assert!((step.duration_sec - 6.0).abs() < 1e-9);

        let clamp = builder.build_tip_action(&[Axis::Q], 33.0, 5.5, PipetteAction::Clamp);
        assert_eq!(clamp.steps()[0][&Node::PipetteLeftTip].stop_condition(), MoveStopCondition::None);
        assert!((clamp.total_distance(Node::PipetteLeftTip) - 33.0).abs() < 1e-9);
    }
}
