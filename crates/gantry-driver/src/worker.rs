//! 后台线程辅助

use std::thread::{JoinHandle, spawn};
use std::time::Duration;

/// 带超时的线程 join
pub trait JoinTimeout<T> {
    /// 超时返回 `None`（目标线程继续运行，由守护线程负责回收）
    fn join_timeout(self, timeout: Duration) -> Option<std::thread::Result<T>>;
}

impl<T: Send + 'static> JoinTimeout<T> for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Option<std::thread::Result<T>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        spawn(move || {
            let _ = tx.send(self.join());
        });
        rx.recv_timeout(timeout).ok()
    }
}
