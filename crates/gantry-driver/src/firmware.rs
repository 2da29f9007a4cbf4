//! 固件更新：版本比对与后台刷写
//!
//! 版本需求来自外部固件目录（[`FirmwareCatalog`]），实际刷写由外部
//! [`FirmwareUpdater`] 完成。刷写在独立线程中进行，进度事件通过 channel
//! 传给消费端；消费端放弃（drop [`UpdateHandle`]）时置位取消标志，
//! 生产端在下一次上报前停止。

use crate::error::DriverError;
use crate::worker::JoinTimeout;
use crossbeam_channel::{Receiver, Sender};
use gantry_protocol::{DeviceInfo, Mount, PipetteSubType, SubSystem, UpdateEvent};
use semver::Version;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// 固件目录：给出每个子系统应当运行的版本
pub trait FirmwareCatalog: Send + Sync {
    /// `pipette` 为该安装位上移液器的类型（仅移液器子系统有值）
    fn required_version(
        &self,
        subsystem: SubSystem,
        pipette: Option<PipetteSubType>,
    ) -> Option<Version>;
}

/// 固定版本表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticFirmwareCatalog {
    versions: BTreeMap<SubSystem, Version>,
}

impl StaticFirmwareCatalog {
    pub fn new(versions: BTreeMap<SubSystem, Version>) -> Self {
        Self { versions }
    }

    pub fn with_version(mut self, subsystem: SubSystem, version: Version) -> Self {
        self.versions.insert(subsystem, version);
        self
    }
}

impl FirmwareCatalog for StaticFirmwareCatalog {
    fn required_version(
        &self,
        subsystem: SubSystem,
        _pipette: Option<PipetteSubType>,
    ) -> Option<Version> {
        self.versions.get(&subsystem).cloned()
    }
}

/// 计算需要更新的子系统
///
/// - 已安装版本与目录版本不同的子系统需要更新
/// - 移液器子系统只有在 `attached` 中登记了对应安装位时才参与比对
/// - `force` 中的子系统只要在线就会更新
pub fn plan_updates<C: FirmwareCatalog + ?Sized>(
    installed: &[DeviceInfo],
    attached: &BTreeMap<Mount, PipetteSubType>,
    catalog: &C,
    force: &BTreeSet<SubSystem>,
) -> BTreeSet<SubSystem> {
    let mut updates = BTreeSet::new();
    for info in installed {
        let pipette = match info.subsystem {
            SubSystem::PipetteLeft => attached.get(&Mount::Left).copied(),
            SubSystem::PipetteRight => attached.get(&Mount::Right).copied(),
            _ => None,
        };
        if force.contains(&info.subsystem) {
            debug!("Forcing firmware update for {}", info.subsystem);
            updates.insert(info.subsystem);
            continue;
        }
        let is_pipette = matches!(
            info.subsystem,
            SubSystem::PipetteLeft | SubSystem::PipetteRight
        );
        if is_pipette && pipette.is_none() {
            continue;
        }
        if let Some(required) = catalog.required_version(info.subsystem, pipette)
            && required != info.version
        {
            debug!(
                "{} runs {} but {} is required",
                info.subsystem, info.version, required
            );
            updates.insert(info.subsystem);
        }
    }
    updates
}

/// 刷写参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateSettings {
    pub retry_count: u32,
    pub timeout: Duration,
    pub erase: bool,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            retry_count: 3,
            timeout: Duration::from_secs(20),
            erase: true,
        }
    }
}

/// 进度事件发送端（交给 [`FirmwareUpdater`]）
pub struct UpdateSink {
    tx: Sender<(SubSystem, UpdateEvent)>,
    cancel: Arc<AtomicBool>,
}

impl UpdateSink {
    /// 上报一条进度
    ///
    /// # 错误
    ///
    /// 消费端已放弃时返回 `UpdateCancelled`，刷写方应立即停止后续总线写入。
    pub fn emit(&self, subsystem: SubSystem, event: UpdateEvent) -> Result<(), DriverError> {
        if self.is_cancelled() {
            return Err(DriverError::UpdateCancelled);
        }
        self.tx.send((subsystem, event)).map_err(|_| {
            self.cancel.store(true, Ordering::Release);
            DriverError::UpdateCancelled
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

/// 外部刷写驱动
pub trait FirmwareUpdater: Send + Sync {
    /// 刷写 `updates` 中的所有子系统，期间通过 `sink` 上报进度
    fn run_updates(
        &self,
        updates: &BTreeSet<SubSystem>,
        settings: &UpdateSettings,
        sink: &UpdateSink,
    ) -> Result<(), DriverError>;
}

/// 后台刷写句柄
pub struct UpdateHandle {
    rx: Receiver<(SubSystem, UpdateEvent)>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), DriverError>>>,
}

impl UpdateHandle {
    /// 启动刷写线程
    pub fn spawn(
        updater: Arc<dyn FirmwareUpdater>,
        updates: BTreeSet<SubSystem>,
        settings: UpdateSettings,
    ) -> Result<Self, DriverError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        let sink = UpdateSink {
            tx,
            cancel: cancel.clone(),
        };
        info!("Starting firmware update for {:?}", updates);
        let thread = thread::Builder::new()
            .name("gantry-firmware-update".into())
            .spawn(move || updater.run_updates(&updates, &settings, &sink))
            .map_err(|e| DriverError::update_failed(None, format!("spawn failed: {}", e)))?;
        Ok(Self {
            rx,
            cancel,
            thread: Some(thread),
        })
    }

    /// 阻塞等待下一条进度；刷写线程结束后返回 `None`
    pub fn recv(&self) -> Option<(SubSystem, UpdateEvent)> {
        self.rx.recv().ok()
    }

    /// 通知刷写线程停止
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// 等待刷写线程结束并取得其结果
    pub fn finish(mut self) -> Result<(), DriverError> {
        match self.thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| DriverError::update_failed(None, "update thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for UpdateHandle {
    fn drop(&mut self) {
        self.cancel();
        let join_timeout = Duration::from_secs(2);
        if let Some(handle) = self.thread.take()
            && handle.join_timeout(join_timeout).is_none()
        {
            error!(
                "Firmware update thread failed to stop within {:?}",
                join_timeout
            );
        }
    }
}
