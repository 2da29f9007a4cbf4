//! 外部模块热插拔监听
//!
//! 后台线程从 [`ModuleEventSource`] 拉取 `/dev` 下的设备事件，只保留名称中
//! 包含 `ot_module` 的事件，转发给消费端并更新已注册模块表。
//! 监听线程可以通过 [`ModuleWatcher::stop`] 独立停止，不触碰运动状态。

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender};
use gantry_driver::worker::JoinTimeout;
use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// 模块设备名中的标识
pub const MODULE_MARKER: &str = "ot_module";

/// 拉取事件的轮询间隔（也是停止请求的最大响应延迟）
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleEventKind {
    Create,
    Delete,
}

impl fmt::Display for ModuleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleEventKind::Create => f.write_str("CREATE"),
            ModuleEventKind::Delete => f.write_str("DELETE"),
        }
    }
}

/// 设备节点出现/消失事件
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleEvent {
    /// 设备路径或名称，如 `/dev/ot_module_thermocycler0`
    pub name: String,
    pub kind: ModuleEventKind,
}

impl ModuleEvent {
    pub fn new(name: impl Into<String>, kind: ModuleEventKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_module(&self) -> bool {
        self.name.contains(MODULE_MARKER)
    }
}

/// 外部事件源（如 inotify）
pub trait ModuleEventSource: Send + 'static {
    /// 最多等待 `timeout`；没有事件时返回 `Ok(None)`，源关闭时返回错误
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<ModuleEvent>>;
}

impl<S: ModuleEventSource + ?Sized> ModuleEventSource for Box<S> {
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<ModuleEvent>> {
        (**self).next_event(timeout)
    }
}

/// 已注册模块表（无锁读取）
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: ArcSwap<BTreeSet<String>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: &ModuleEvent) {
        self.modules.rcu(|current| {
            let mut next = BTreeSet::clone(current);
            match event.kind {
                ModuleEventKind::Create => {
                    next.insert(event.name.clone());
                },
                ModuleEventKind::Delete => {
                    next.remove(&event.name);
                },
            }
            next
        });
    }

    /// 当前已注册的模块
    pub fn modules(&self) -> Arc<BTreeSet<String>> {
        self.modules.load_full()
    }
}

/// 模块监听线程句柄
pub struct ModuleWatcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ModuleWatcher {
    /// 启动监听线程，返回句柄与事件接收端
    pub fn spawn<S: ModuleEventSource>(
        mut source: S,
        registry: Arc<ModuleRegistry>,
    ) -> io::Result<(Self, Receiver<ModuleEvent>)> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let thread = thread::Builder::new()
            .name("gantry-module-watch".into())
            .spawn(move || watch_loop(&mut source, &registry, &tx, &stop_flag))?;
        Ok((
            Self {
                stop,
                thread: Some(thread),
            },
            rx,
        ))
    }

    /// 请求停止（不等待）
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ModuleWatcher {
    fn drop(&mut self) {
        self.stop();
        let join_timeout = Duration::from_secs(1);
        if let Some(handle) = self.thread.take()
            && handle.join_timeout(join_timeout).is_none()
        {
            error!("Module watcher failed to stop within {:?}", join_timeout);
        }
    }
}

fn watch_loop<S: ModuleEventSource>(
    source: &mut S,
    registry: &ModuleRegistry,
    tx: &Sender<ModuleEvent>,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Acquire) {
        match source.next_event(POLL_INTERVAL) {
            Ok(Some(event)) if event.is_module() => {
                debug!("Module event: {} {}", event.kind, event.name);
                registry.apply(&event);
                if tx.send(event).is_err() {
                    debug!("Module event receiver dropped, stopping watcher");
                    break;
                }
            },
            Ok(Some(event)) => {
                debug!("Ignoring non-module device event {}", event.name);
            },
            Ok(None) => {},
            Err(e) => {
                warn!("Module event source closed: {}", e);
                break;
            },
        }
    }
}

/// 仿真模块的设备路径
pub fn simulated_module_port(name: &str, index: usize) -> String {
    format!("/dev/{}_sim_{}{}", MODULE_MARKER, name, index)
}
