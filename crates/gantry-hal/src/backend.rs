//! 后端接口（MotionBackend）
//!
//! 硬件后端（[`HardwareBackend`](crate::HardwareBackend)）与仿真后端
//! （[`SimulatedBackend`](crate::SimulatedBackend)）实现同一接口，上层代码只依赖本 trait。
//!
//! 所有操作都是阻塞调用，需要 `&mut self`，因此同一个后端上不会有两个
//! 运动类操作同时进行。
//!
//! # 示例
//!
//! ```rust,no_run
//! use gantry_hal::{BackendConfig, MotionBackend, SimulatedBackend, SimulatedInstruments};
//! use gantry_protocol::{Axis, GantryLoad};
//!
//! # fn main() -> gantry_hal::Result<()> {
//! let mut backend = SimulatedBackend::new(
//!     BackendConfig::default(),
//!     SimulatedInstruments::default(),
//!     Vec::new(),
//!     true,
//! )?;
//! backend.probe_network()?;
//! backend.update_to_default_current_settings(GantryLoad::None)?;
//! let position = backend.home(&[Axis::X, Axis::Y])?;
//!
//! // 临时提高 X 轴电流，作用域结束时恢复
//! backend.restore_current(|b| {
//!     b.set_active_current(&[(Axis::X, 1.8)].into())?;
//!     Ok(())
//! })?;
//! # let _ = position;
//! # Ok(())
//! # }
//! ```

use crate::config::BackendConfig;
use crate::end_effector::GripForceProfile;
use crate::error::Result;
use crate::instruments::{AttachedInstruments, ExpectedInstruments};
use crate::state::home_position;
use crate::watch::ModuleEvent;
use crossbeam_channel::Receiver;
use gantry_driver::{CurrentConfigStore, UpdateReport};
use gantry_protocol::{
    Axis, AxisMap, Coordinates, GantryLoad, InstrumentProbeType, Mount, Move, MoveStopCondition,
    Node, PipetteAction, PipetteSubType, SensorId, SubSystem,
};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::error;

/// 运动控制后端
pub trait MotionBackend {
    /// 固件更新进度流
    type UpdateStream<'a>: Iterator<Item = Result<UpdateReport>>
    where
        Self: 'a;

    fn config(&self) -> &BackendConfig;

    // ==================== 网络与工具 ====================

    /// 探测整个网络（尽力而为，超时的节点只是不在线）
    fn probe_network(&mut self) -> Result<()>;

    /// 当前在线节点
    fn present_nodes(&self) -> BTreeSet<Node>;

    fn is_axis_present(&self, axis: Axis) -> bool;

    /// 检测各安装位上的工具，并刷新工具执行节点
    fn get_attached_instruments(
        &mut self,
        expected: &ExpectedInstruments,
    ) -> Result<AttachedInstruments>;

    // ==================== 电机状态 ====================

    /// 读取所有在线节点的位置与状态
    fn update_motor_status(&mut self) -> Result<()>;

    /// 用编码器位置重新估计电机位置；编码器状态不可信时返回 `MustHome`
    fn update_motor_estimation(&mut self, axes: &[Axis]) -> Result<()>;

    fn update_position(&self) -> AxisMap<f64>;

    fn update_encoder_position(&self) -> AxisMap<f64>;

    fn check_ready_for_movement(&self, axes: &[Axis]) -> bool;

    /// 与 [`check_ready_for_movement`](Self::check_ready_for_movement) 相同，
    /// 不满足时返回 `MustHome`
    fn ensure_ready_for_movement(&self, axes: &[Axis]) -> Result<()>;

    fn get_limit_switches(&mut self) -> Result<AxisMap<bool>>;

    // ==================== 运动 ====================

    /// 执行一段已规划的运动，返回执行后的位置
    fn move_axes(
        &mut self,
        origin: &Coordinates,
        moves: &[Move],
        stop_condition: MoveStopCondition,
    ) -> Result<AxisMap<f64>>;

    /// 回零，返回回零后的位置
    fn home(&mut self, axes: &[Axis]) -> Result<AxisMap<f64>>;

    /// 快速回零
    ///
    /// 目前与 [`home`](Self::home) 相同，`margin` 保留给短行程回零。
    fn fast_home(&mut self, axes: &[Axis], _margin: f64) -> Result<AxisMap<f64>> {
        self.home(axes)
    }

    fn engage_axes(&mut self, axes: &[Axis]) -> Result<()>;

    fn disengage_axes(&mut self, axes: &[Axis]) -> Result<()>;

    fn engaged_axes(&self) -> AxisMap<bool>;

    // ==================== 电流 ====================

    /// 按龙门负载加载默认电流表并下发
    fn update_to_default_current_settings(&mut self, load: GantryLoad) -> Result<()>;

    /// 下发当前电流表
    fn set_default_currents(&mut self) -> Result<()>;

    fn set_active_current(&mut self, currents: &AxisMap<f64>) -> Result<()>;

    fn set_hold_current(&mut self, currents: &AxisMap<f64>) -> Result<()>;

    fn motor_run_currents(&self) -> AxisMap<f64>;

    fn motor_hold_currents(&self) -> AxisMap<f64>;

    /// 当前电流表的副本
    fn snapshot_current_settings(&self) -> Result<CurrentConfigStore>;

    /// 恢复电流表并下发
    fn restore_current_settings(&mut self, saved: CurrentConfigStore) -> Result<()>;

    /// 保存电流表，返回在析构时恢复的作用域守卫
    fn current_scope(&mut self) -> Result<CurrentScope<'_, Self>>
    where
        Self: Sized,
    {
        let saved = self.snapshot_current_settings()?;
        Ok(CurrentScope {
            backend: self,
            saved: Some(saved),
        })
    }

    /// 在 `f` 执行期间修改的电流在返回时恢复（成功、提前返回、出错均恢复）
    ///
    /// `f` 的错误优先于恢复时的错误返回。
    fn restore_current<T, F>(&mut self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let mut scope = self.current_scope()?;
        let result = f(&mut *scope);
        let restored = scope.finish();
        let value = result?;
        restored?;
        Ok(value)
    }

    // ==================== 末端执行器 ====================

    fn gripper_grip_jaw(&mut self, duty_cycle: f64, stop_condition: MoveStopCondition) -> Result<()>;

    fn gripper_home_jaw(&mut self, duty_cycle: f64) -> Result<()>;

    fn gripper_hold_jaw(&mut self, encoder_position_um: i32) -> Result<()>;

    /// 当前夹爪的夹持力曲线（夹爪识别后由上层设置）
    fn grip_force_profile(&self) -> Option<&GripForceProfile>;

    fn set_grip_force_profile(&mut self, profile: Option<GripForceProfile>);

    fn tip_action(
        &mut self,
        axes: &[Axis],
        distance: f64,
        speed: f64,
        action: PipetteAction,
    ) -> Result<()>;

    // ==================== 传感器 ====================

    /// 液面探测，返回探测后的位置
    fn liquid_probe(
        &mut self,
        mount: Mount,
        max_z_distance: f64,
        mount_speed: f64,
        plunger_speed: f64,
        threshold_pascals: f64,
        sensor: SensorId,
    ) -> Result<AxisMap<f64>>;

    fn capacitive_probe(
        &mut self,
        mount: Mount,
        moving: Axis,
        distance_mm: f64,
        speed_mm_per_s: f64,
        threshold_pf: f64,
        probe: InstrumentProbeType,
    ) -> Result<()>;

    /// 电容扫描，返回传感器读数
    fn capacitive_pass(
        &mut self,
        mount: Mount,
        moving: Axis,
        distance_mm: f64,
        speed_mm_per_s: f64,
        probe: InstrumentProbeType,
    ) -> Result<Vec<f64>>;

    // ==================== 固件 ====================

    fn update_required(&self) -> bool;

    /// 开始固件更新
    ///
    /// 没有需要更新的子系统时清除更新标志；否则置位标志并返回进度流，
    /// 流结束（并完成网络重新探测）后标志被清除。没有刷写器时返回
    /// `UpdaterMissing`，标志不变。
    fn update_firmware(
        &mut self,
        attached_pipettes: &BTreeMap<Mount, PipetteSubType>,
        force: &BTreeSet<SubSystem>,
    ) -> Result<Self::UpdateStream<'_>>;

    fn get_update_progress(&self) -> UpdateReport;

    // ==================== 模块 ====================

    /// 开始监听外部模块事件
    fn watch(&mut self) -> Result<Receiver<ModuleEvent>>;

    fn attached_modules(&self) -> Arc<BTreeSet<String>>;

    // ==================== 其它 ====================

    /// 各轴行程 `(min, max)`
    fn axis_bounds(&self) -> AxisMap<(f64, f64)> {
        self.config().axis_bounds.to_map()
    }

    fn home_position(&self) -> AxisMap<f64> {
        home_position()
    }

    /// 本后端不控制灯光
    fn set_lights(&mut self, _button: Option<bool>, _rails: Option<bool>) {}

    fn get_lights(&self) -> BTreeMap<String, bool> {
        BTreeMap::new()
    }

    /// 主控固件版本；各控制板版本见固件更新流程
    fn fw_version(&self) -> Option<String> {
        None
    }

    fn pause(&mut self) {}

    fn resume(&mut self) {}

    fn halt(&mut self) -> Result<()> {
        Ok(())
    }

    fn hard_halt(&mut self) -> Result<()> {
        Ok(())
    }

    /// 释放后台资源（停止模块监听）
    fn clean_up(&mut self) -> Result<()>;
}

/// 电流作用域守卫
///
/// 析构时恢复进入作用域前的电流表；恢复失败只记录日志，需要处理恢复错误时
/// 使用 [`finish`](Self::finish)。
pub struct CurrentScope<'a, B: MotionBackend> {
    backend: &'a mut B,
    saved: Option<CurrentConfigStore>,
}

impl<B: MotionBackend> CurrentScope<'_, B> {
    /// 立即恢复并返回恢复结果
    pub fn finish(mut self) -> Result<()> {
        match self.saved.take() {
            Some(saved) => self.backend.restore_current_settings(saved),
            None => Ok(()),
        }
    }
}

impl<B: MotionBackend> Deref for CurrentScope<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: MotionBackend> DerefMut for CurrentScope<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.backend
    }
}

impl<B: MotionBackend> Drop for CurrentScope<'_, B> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take()
            && let Err(e) = self.backend.restore_current_settings(saved)
        {
            error!("Failed to restore current settings: {}", e);
        }
    }
}
