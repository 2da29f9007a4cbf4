//! 轴 ↔ 节点映射（AxisNodeMap）
//!
//! 纯查表，无状态。核心控制器节点（`head` / `gripper`）不直接对应任何轴，
//! 返回 `None`。

use crate::axis::Axis;
use crate::node::Node;
use std::collections::{BTreeMap, BTreeSet};

/// 以轴为键的映射
pub type AxisMap<T> = BTreeMap<Axis, T>;

/// 以节点为键的映射
pub type NodeMap<T> = BTreeMap<Node, T>;

/// 轴坐标（单位 mm）
pub type Coordinates = AxisMap<f64>;

/// 轴对应的总线节点
pub const fn axis_to_node(axis: Axis) -> Node {
    match axis {
        Axis::X => Node::GantryX,
        Axis::Y => Node::GantryY,
        Axis::ZL => Node::HeadL,
        Axis::ZR => Node::HeadR,
        Axis::ZG => Node::GripperZ,
        Axis::PL => Node::PipetteLeft,
        Axis::PR => Node::PipetteRight,
        Axis::Q => Node::PipetteLeftTip,
        Axis::G => Node::GripperG,
    }
}

/// 节点对应的轴（核心控制器节点没有轴）
pub const fn node_to_axis(node: Node) -> Option<Axis> {
    match node {
        Node::GantryX => Some(Axis::X),
        Node::GantryY => Some(Axis::Y),
        Node::HeadL => Some(Axis::ZL),
        Node::HeadR => Some(Axis::ZR),
        Node::GripperZ => Some(Axis::ZG),
        Node::PipetteLeft => Some(Axis::PL),
        Node::PipetteRight => Some(Axis::PR),
        Node::PipetteLeftTip => Some(Axis::Q),
        Node::GripperG => Some(Axis::G),
        Node::Head | Node::Gripper => None,
    }
}

/// 轴键映射转节点键映射
pub fn axis_map_to_nodes<T: Clone>(map: &AxisMap<T>) -> NodeMap<T> {
    map.iter()
        .map(|(axis, value)| (axis_to_node(*axis), value.clone()))
        .collect()
}

/// 节点键映射转轴键映射，丢弃没有轴的节点
pub fn node_map_to_axes<T: Clone>(map: &NodeMap<T>) -> AxisMap<T> {
    map.iter()
        .filter_map(|(node, value)| node_to_axis(*node).map(|axis| (axis, value.clone())))
        .collect()
}

/// 一组轴对应的节点集合
pub fn axes_to_nodes<'a>(axes: impl IntoIterator<Item = &'a Axis>) -> BTreeSet<Node> {
    axes.into_iter().map(|axis| axis_to_node(*axis)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_node_roundtrip() {
        for axis in Axis::ALL {
            assert_eq!(node_to_axis(axis_to_node(axis)), Some(axis));
        }
    }

    #[test]
    fn test_core_nodes_have_no_axis() {
        assert_eq!(node_to_axis(Node::Head), None);
        assert_eq!(node_to_axis(Node::Gripper), None);
    }

    #[test]
    fn test_mapping_is_bijective() {
        let nodes: BTreeSet<Node> = Axis::ALL.iter().map(|a| axis_to_node(*a)).collect();
        assert_eq!(nodes.len(), Axis::ALL.len());
        assert!(nodes.iter().all(|n| !n.is_core()));
    }

    #[test]
    fn test_map_conversion_drops_core_nodes() {
        let mut nodes = NodeMap::new();
        nodes.insert(Node::GantryX, 1.0);
        nodes.insert(Node::Head, 2.0);
        let axes = node_map_to_axes(&nodes);
        assert_eq!(axes.len(), 1);
        assert_eq!(axes[&Axis::X], 1.0);
        assert_eq!(axis_map_to_nodes(&axes)[&Node::GantryX], 1.0);
    }
}
