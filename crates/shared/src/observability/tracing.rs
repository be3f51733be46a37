//! 日志初始化
//!
//! 基于 tracing-subscriber 组装 EnvFilter 和 fmt 层，
//! 支持 JSON（结构化）和 pretty（人类可读）两种输出格式。

use anyhow::Result;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::ObservabilityConfig;

/// Tracing 资源守卫
///
/// 全局 subscriber 安装后无法卸载，守卫只记录初始化时的配置。
#[derive(Debug)]
pub struct TracingGuard {
    pub log_level: String,
    pub json_logs: bool,
}

/// 构建环境过滤器：RUST_LOG 优先于配置的级别
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 初始化 tracing
///
/// 重复初始化返回错误而不是 panic。
pub fn init(config: &ObservabilityConfig) -> Result<TracingGuard> {
    let fmt_layer = if config.json_logs() {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt_layer)
        .try_init()?;

    Ok(TracingGuard {
        log_level: config.log_level.clone(),
        json_logs: config.json_logs(),
    })
}
