//! 固件更新流程
//!
//! 读取各控制板的固件版本，与配置中的版本比对得到待更新子系统，
//! 在后台线程中刷写，并把每条进度事件聚合成 [`UpdateReport`] 交给调用方迭代。
//!
//! 更新期间后端的更新标志保持置位，所有运动类操作返回
//! `FirmwareUpdateRequired`。进度流正常结束后重新探测网络并清除标志；
//! 提前丢弃进度流会取消刷写，标志保持置位。

use crate::error::{BackendError, Result};
use crate::hardware::HardwareBackend;
use gantry_bus::{BusCommand, BusTransport};
use gantry_driver::{BusResultExt, UpdateHandle, UpdateProgress, UpdateReport, plan_updates};
use gantry_protocol::{DeviceInfo, Mount, PipetteSubType, SubSystem};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// 硬件后端的固件更新进度流
pub struct FirmwareUpdateStream<'a, B: BusTransport> {
    backend: &'a mut HardwareBackend<B>,
    handle: Option<UpdateHandle>,
}

impl<'a, B: BusTransport> FirmwareUpdateStream<'a, B> {
    /// 规划并启动更新
    ///
    /// 没有需要更新的子系统时清除更新标志并返回空流；
    /// 没有刷写器时返回 `UpdaterMissing`，更新标志不变。
    pub(crate) fn start(
        backend: &'a mut HardwareBackend<B>,
        attached_pipettes: &BTreeMap<Mount, PipetteSubType>,
        force: &BTreeSet<SubSystem>,
    ) -> Result<Self> {
        let installed = read_device_info(backend);
        let catalog = backend.core.config.firmware.catalog()?;
        let updates = plan_updates(&installed, attached_pipettes, &catalog, force);

        if updates.is_empty() {
            info!("No firmware updates required");
            backend.core.set_update_required(false);
            return Ok(Self {
                backend,
                handle: None,
            });
        }

        info!("Firmware updates required for {:?}", updates);
        let Some(updater) = backend.updater.clone() else {
            warn!("No firmware updater configured, skipping {:?}", updates);
            return Err(BackendError::UpdaterMissing);
        };
        backend.core.set_update_required(true);
        backend.core.update_tracker = Some(UpdateProgress::new(updates.iter().copied()));
        let settings = backend.core.config.firmware.update_settings();
        let handle = UpdateHandle::spawn(updater, updates, settings)?;
        Ok(Self {
            backend,
            handle: Some(handle),
        })
    }

    /// 刷写线程结束后的收尾：重新探测网络并清除更新标志
    fn complete(&mut self, handle: UpdateHandle) -> Result<()> {
        handle.finish()?;
        self.backend.probe_network_inner()?;
        self.backend.core.update_tracker = None;
        self.backend.core.set_update_required(false);
        info!("Firmware update finished");
        Ok(())
    }
}

impl<B: BusTransport> Iterator for FirmwareUpdateStream<'_, B> {
    type Item = Result<UpdateReport>;

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.handle.as_ref()?;
        if let Some((subsystem, event)) = handle.recv() {
            let tracker = self
                .backend
                .core
                .update_tracker
                .get_or_insert_with(UpdateProgress::default);
            tracker.update(subsystem, event);
            let report = tracker.report();
            debug!("Firmware update progress {}%", report.progress);
            return Some(Ok(report));
        }

        let handle = self.handle.take()?;
        match self.complete(handle) {
            Ok(()) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// 读取所有在线控制板的固件版本；读取失败的板只记录日志
fn read_device_info<B: BusTransport>(backend: &HardwareBackend<B>) -> Vec<DeviceInfo> {
    backend
        .core
        .presence
        .present_boards()
        .into_iter()
        .filter_map(|board| {
            let result = backend
                .bus
                .send(board, BusCommand::ReadDeviceInfo)
                .and_then(|response| response.into_device_info())
                .on_node(board, "read_device_info");
            match result {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!("Could not read firmware version: {}", e);
                    None
                },
            }
        })
        .collect()
}
