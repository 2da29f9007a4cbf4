//! 固件更新进度聚合（UpdateProgress）

use gantry_protocol::{SubSystem, UpdateEvent, UpdateState, UpdateStatus};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// 一次进度快照：各子系统状态 + 总进度（0..=100）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateReport {
    pub statuses: BTreeSet<UpdateStatus>,
    pub progress: u8,
}

/// 进度追踪器
///
/// 构造时为每个待更新子系统放入一个 `Queued` 状态；总进度为各子系统进度的
/// 算术平均（截断为整数）。
#[derive(Debug, Clone, Default)]
pub struct UpdateProgress {
    statuses: BTreeMap<SubSystem, UpdateStatus>,
}

impl UpdateProgress {
    pub fn new(subsystems: impl IntoIterator<Item = SubSystem>) -> Self {
        Self {
            statuses: subsystems
                .into_iter()
                .map(|s| (s, UpdateStatus::queued(s)))
                .collect(),
        }
    }

    /// 应用一条事件，未追踪的子系统会被忽略
    pub fn update(&mut self, subsystem: SubSystem, event: UpdateEvent) -> Option<UpdateStatus> {
        let Some(status) = self.statuses.get_mut(&subsystem) else {
            warn!("Progress event for untracked subsystem {}", subsystem);
            return None;
        };
        status.state = event.state;
        status.progress = event.percent();
        Some(*status)
    }

    pub fn statuses(&self) -> BTreeSet<UpdateStatus> {
        self.statuses.values().copied().collect()
    }

    pub fn total_progress(&self) -> u8 {
        if self.statuses.is_empty() {
            return 0;
        }
        let sum: u32 = self.statuses.values().map(|s| u32::from(s.progress)).sum();
        (sum / self.statuses.len() as u32) as u8
    }

    pub fn is_done(&self) -> bool {
        self.statuses.values().all(|s| s.state == UpdateState::Done)
    }

    pub fn report(&self) -> UpdateReport {
        UpdateReport {
            statuses: self.statuses(),
            progress: self.total_progress(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(state: UpdateState, progress: f64) -> UpdateEvent {
        UpdateEvent::new(state, progress).unwrap()
    }

    #[test]
    fn test_seeded_queued() {
        let progress = UpdateProgress::new([SubSystem::GantryX, SubSystem::Head]);
        assert_eq!(progress.total_progress(), 0);
        assert!(progress.statuses().iter().all(|s| s.state == UpdateState::Queued));
        assert!(!progress.is_done());
    }

    #[test]
    fn test_single_subsystem_progress() {
        let mut progress = UpdateProgress::new([SubSystem::GantryX]);
        for _ in 0..3 {
            progress.update(SubSystem::GantryX, event(UpdateState::Updating, 0.5));
        }
        assert_eq!(progress.total_progress(), 50);
        progress.update(SubSystem::GantryX, event(UpdateState::Done, 1.0));
        assert_eq!(progress.total_progress(), 100);
        assert!(progress.is_done());
    }

    #[test]
    fn test_mean_is_truncated() {
        let mut progress = UpdateProgress::new([SubSystem::GantryX, SubSystem::GantryY, SubSystem::Head]);
        progress.update(SubSystem::GantryX, event(UpdateState::Done, 1.0));
        progress.update(SubSystem::GantryY, event(UpdateState::Updating, 0.5));
        // (100 + 50 + 0) / 3 = 50
        assert_eq!(progress.total_progress(), 50);
        progress.update(SubSystem::Head, event(UpdateState::Updating, 0.01));
        // (100 + 50 + 1) / 3 = 50.33
        assert_eq!(progress.report().progress, 50);
    }

    #[test]
    fn test_untracked_subsystem_ignored() {
        let mut progress = UpdateProgress::new([SubSystem::GantryX]);
        assert!(progress.update(SubSystem::Gripper, event(UpdateState::Done, 1.0)).is_none());
        assert_eq!(progress.statuses().len(), 1);
    }

    #[test]
    fn test_empty_progress() {
        let progress = UpdateProgress::default();
        assert_eq!(progress.report(), UpdateReport::default());
    }
}
