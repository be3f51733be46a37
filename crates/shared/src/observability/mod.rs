//! 统一可观测性模块
//!
//! 提供日志初始化和指标描述注册。指标通过 metrics 门面记录，
//! 导出器由宿主应用自行安装。

pub mod tracing;

use ::tracing::info;
use anyhow::Result;

use crate::config::ObservabilityConfig;

/// 可观测性资源守卫
pub struct ObservabilityGuard {
    tracing_guard: Option<tracing::TracingGuard>,
}

impl ObservabilityGuard {
    /// 创建一个空的 Guard（用于测试或禁用可观测性时）
    pub fn empty() -> Self {
        Self {
            tracing_guard: None,
        }
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if self.tracing_guard.is_some() {
            info!("Shutting down observability...");
        }
    }
}

/// 统一初始化可观测性
///
/// # Example
///
/// ```ignore
/// use validation_shared::config::AppConfig;
/// use validation_shared::observability;
///
/// let config = AppConfig::load("signup-form")?;
/// let _guard = observability::init(&config.observability)?;
/// ```
pub fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    let tracing_guard = tracing::init(config)?;
    describe_metrics();

    info!(
        log_level = %config.log_level,
        log_format = %config.log_format,
        "Observability initialized"
    );

    Ok(ObservabilityGuard {
        tracing_guard: Some(tracing_guard),
    })
}

/// 注册校验引擎的指标描述
///
/// 这些描述会出现在导出器的 HELP 注释中。
pub fn describe_metrics() {
    metrics::describe_counter!(
        "field_validations_total",
        "Total number of field validations, labelled by outcome"
    );
    metrics::describe_counter!(
        "remote_checks_total",
        "Remote uniqueness check events (issued, cancelled, discarded, available, taken, transport_error)"
    );
    metrics::describe_counter!(
        "form_submissions_total",
        "Total number of form submissions, labelled by decision"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error() {
        let config = ObservabilityConfig::default();
        let first = init(&config);
        let second = init(&config);

        // 其他测试可能已安装全局 subscriber，第二次一定失败
        assert!(second.is_err());
        drop(first);
    }

    #[test]
    fn test_describe_metrics_without_recorder() {
        describe_metrics();
    }
}
