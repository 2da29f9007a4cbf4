//! 节点在线状态（PresenceTracker）
//!
//! 记录在网络探测中应答过的节点，是其它所有组件访问节点前的唯一判据。
//!
//! 不变量：集合中永远不出现 `head` / `gripper` 核心控制器地址，
//! 只出现它们拆分后的合成子节点。所有写入路径都经过 [`expand_core_nodes`]。

use crate::error::DriverError;
use gantry_bus::BusTransport;
use gantry_protocol::{
    Axis, AxisMap, Mount, Node, NodeMap, PipetteSubType, axis_to_node, node_to_axis,
};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 核心探测期望的节点（整机运行必需）
pub const CORE_NODES: [Node; 3] = [Node::GantryX, Node::GantryY, Node::Head];

/// 每次核心探测都会整体刷新的节点
const CORE_REFRESHED: [Node; 4] = [Node::GantryX, Node::GantryY, Node::HeadL, Node::HeadR];

/// 把核心控制器地址替换为其合成子节点
pub fn expand_core_nodes(nodes: BTreeSet<Node>) -> BTreeSet<Node> {
    nodes
        .into_iter()
        .flat_map(|node| match node.split() {
            Some(parts) => parts.to_vec(),
            None => vec![node],
        })
        .collect()
}

/// 委托总线探测；超时的节点只是不出现在结果里
pub fn probe_nodes<B: BusTransport + ?Sized>(
    bus: &B,
    expected: &BTreeSet<Node>,
    timeout: Duration,
) -> Result<BTreeSet<Node>, DriverError> {
    let found = bus.probe(expected, timeout).map_err(DriverError::Probe)?;
    let found: BTreeSet<Node> = found.intersection(expected).copied().collect();
    let missing: Vec<Node> = expected.difference(&found).copied().collect();
    if !missing.is_empty() {
        warn!("Probe timed out waiting for {:?} after {:?}", missing, timeout);
    }
    Ok(found)
}

/// 在线节点集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceTracker {
    present: BTreeSet<Node>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用给定节点构造（核心地址会被展开）
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        Self {
            present: expand_core_nodes(nodes.into_iter().collect()),
        }
    }

    pub fn is_present(&self, node: Node) -> bool {
        self.present.contains(&node)
    }

    pub fn is_axis_present(&self, axis: Axis) -> bool {
        self.is_present(axis_to_node(axis))
    }

    pub fn nodes(&self) -> &BTreeSet<Node> {
        &self.present
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }

    /// 在线节点对应的轴
    pub fn present_axes(&self) -> Vec<Axis> {
        self.present.iter().filter_map(|n| node_to_axis(*n)).collect()
    }

    /// 在线节点对应的子系统核心地址（每块控制板一个）
    pub fn present_boards(&self) -> BTreeSet<Node> {
        self.present.iter().map(|n| n.subsystem().node()).collect()
    }

    /// 轴键映射转节点键映射，只保留在线节点
    pub fn filter_axis_map<T: Clone>(&self, map: &AxisMap<T>) -> NodeMap<T> {
        map.iter()
            .map(|(axis, value)| (axis_to_node(*axis), value))
            .filter(|(node, _)| {
                let present = self.is_present(*node);
                if !present {
                    debug!("Dropping absent node {}", node);
                }
                present
            })
            .map(|(node, value)| (node, value.clone()))
            .collect()
    }

    /// 核心探测结果：整体刷新龙门与头部，保留其它节点
    pub fn refresh_core(&mut self, probed: BTreeSet<Node>) {
        let mut next = self.present.clone();
        for node in CORE_REFRESHED {
            next.remove(&node);
        }
        next.extend(expand_core_nodes(probed));
        self.set(next);
    }

    /// 完整探测结果：整体替换
    pub fn replace(&mut self, probed: BTreeSet<Node>) {
        self.set(expand_core_nodes(probed));
    }

    /// 根据工具检测结果刷新工具执行节点（P_L / P_R / G，以及高通量 Q）
    pub fn refresh_tools(&mut self, attached: &[Mount], left_sub_type: Option<PipetteSubType>) {
        let mut next = self.present.clone();
        for mount in Mount::ALL {
            next.remove(&axis_to_node(Axis::of_main_tool_actuator(mount)));
        }
        next.remove(&axis_to_node(Axis::Q));
        for mount in attached {
            next.insert(axis_to_node(Axis::of_main_tool_actuator(*mount)));
        }
        if attached.contains(&Mount::Left) && left_sub_type == Some(PipetteSubType::NinetySix) {
            next.insert(axis_to_node(Axis::Q));
        }
        self.set(next);
    }

    fn set(&mut self, next: BTreeSet<Node>) {
        if next != self.present {
            info!("The present nodes are now {:?}", next);
        }
        self.present = next;
    }
}
