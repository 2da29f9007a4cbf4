//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 订阅者（过滤规则读取 `RUST_LOG`），
//! 并把 `log` crate 的记录桥接到 `tracing`。

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// 初始化日志（可重复调用，只有第一次生效）
///
/// 已经安装了其它全局订阅者时保持原样。
pub fn init_logging() {
    INIT.call_once(|| {
        if let Err(e) = tracing_log::LogTracer::init() {
            eprintln!("log bridge already installed: {}", e);
        }
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            log::debug!("Logging initialized");
        }
    });
}
