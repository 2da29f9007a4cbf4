//! 电机电流配置（CurrentConfigStore）与电流命令下发

use crate::error::{BusResultExt, DriverError};
use gantry_bus::{BusCommand, BusTransport};
use gantry_protocol::{Axis, AxisMap, CurrentConfig, Node, NodeMap, axis_to_node};
use tracing::debug;

/// 按轴保存的保持/运行电流
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentConfigStore {
    settings: AxisMap<CurrentConfig>,
}

impl CurrentConfigStore {
    pub fn new(settings: AxisMap<CurrentConfig>) -> Self {
        Self { settings }
    }

    pub fn get(&self, axis: Axis) -> Option<CurrentConfig> {
        self.settings.get(&axis).copied()
    }

    pub fn settings(&self) -> &AxisMap<CurrentConfig> {
        &self.settings
    }

    pub fn set_run_current(&mut self, axis: Axis, current: f64) {
        self.settings.entry(axis).or_default().run_current = current;
    }

    pub fn set_hold_current(&mut self, axis: Axis, current: f64) {
        self.settings.entry(axis).or_default().hold_current = current;
    }

    pub fn run_currents(&self) -> AxisMap<f64> {
        self.settings
            .iter()
            .map(|(axis, c)| (*axis, c.run_current))
            .collect()
    }

    pub fn hold_currents(&self) -> AxisMap<f64> {
        self.settings
            .iter()
            .map(|(axis, c)| (*axis, c.hold_current))
            .collect()
    }

    /// 完整的电流命令（保持 + 运行）
    pub fn as_updates(&self) -> AxisMap<CurrentUpdate> {
        self.settings
            .iter()
            .map(|(axis, c)| (*axis, CurrentUpdate::both(c.hold_current, c.run_current)))
            .collect()
    }
}

/// 单个节点的电流修改，`None` 表示不修改
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CurrentUpdate {
    pub hold: Option<f64>,
    pub run: Option<f64>,
}

impl CurrentUpdate {
    pub const fn both(hold: f64, run: f64) -> Self {
        Self {
            hold: Some(hold),
            run: Some(run),
        }
    }

    pub const fn run(run: f64) -> Self {
        Self {
            hold: None,
            run: Some(run),
        }
    }

    pub const fn hold(hold: f64) -> Self {
        Self {
            hold: Some(hold),
            run: None,
        }
    }
}

/// 向节点下发电流
///
/// 取吸头驱动节点（Q 轴）使用独立的电流消息。
pub fn send_currents<B: BusTransport + ?Sized>(
    bus: &B,
    updates: &NodeMap<CurrentUpdate>,
) -> Result<(), DriverError> {
    let tip_node = axis_to_node(Axis::Q);
    for (node, update) in updates {
        let command = BusCommand::SetCurrents {
            hold: update.hold,
            run: update.run,
            tip_motor: *node == tip_node,
        };
        debug!("Setting currents on {}: {:?}", node, update);
        bus.send(*node, command)
            .on_node(*node, "set_currents")?
            .into_ack()
            .on_node(*node, "set_currents")?;
    }
    Ok(())
}

/// 批量使能/失能电机
pub fn set_motor_enabled<B: BusTransport + ?Sized>(
    bus: &B,
    nodes: impl IntoIterator<Item = Node>,
    enabled: bool,
) -> Result<(), DriverError> {
    let (command, operation) = if enabled {
        (BusCommand::EnableMotor, "enable_motor")
    } else {
        (BusCommand::DisableMotor, "disable_motor")
    };
    for node in nodes {
        bus.send(node, command.clone())
            .on_node(node, operation)?
            .into_ack()
            .on_node(node, operation)?;
    }
    Ok(())
}
