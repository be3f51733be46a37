//! 校验引擎错误类型
//!
//! 校验结果（FAIL / PENDING）是正常的领域结果，不走错误通道。
//! 这里只定义集成方配置错误与远程传输故障。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("未注册的校验规则: {0}")]
    UnknownRule(String),

    #[error("规则链格式错误: '{chain}' - {reason}")]
    MalformedChain { chain: String, reason: String },

    #[error("规则参数无效: {rule} - {reason}")]
    InvalidParams { rule: String, reason: String },

    #[error("远程校验不可用: {0}")]
    RemoteUnavailable(String),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

impl ValidationError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownRule(_) => "UNKNOWN_RULE",
            Self::MalformedChain { .. } => "MALFORMED_CHAIN",
            Self::InvalidParams { .. } => "INVALID_PARAMS",
            Self::RemoteUnavailable(_) => "REMOTE_CHECK_UNAVAILABLE",
        }
    }

    /// 是否为集成配置错误（规则名、规则链语法、参数个数）
    ///
    /// 这类错误是配置缺陷而非用户输入问题，调用方应立即暴露，不能吞掉。
    pub fn is_config_fault(&self) -> bool {
        matches!(
            self,
            Self::UnknownRule(_) | Self::MalformedChain { .. } | Self::InvalidParams { .. }
        )
    }

    pub(crate) fn malformed(chain: &str, reason: impl Into<String>) -> Self {
        Self::MalformedChain {
            chain: chain.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_params(rule: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for ValidationError {
    fn from(err: reqwest::Error) -> Self {
        Self::RemoteUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            ValidationError::UnknownRule("nope".to_string()).code(),
            "UNKNOWN_RULE"
        );
        assert_eq!(
            ValidationError::RemoteUnavailable("timeout".to_string()).code(),
            "REMOTE_CHECK_UNAVAILABLE"
        );
    }

    #[test]
    fn test_config_fault_classification() {
        assert!(ValidationError::malformed("a||b", "空规则段").is_config_fault());
        assert!(ValidationError::invalid_params("min", "需要 1 个参数").is_config_fault());
        assert!(!ValidationError::RemoteUnavailable("502".to_string()).is_config_fault());
    }

    #[test]
    fn test_error_message() {
        let err = ValidationError::malformed("required||min:3", "存在空规则段");
        assert!(err.to_string().contains("required||min:3"));
        assert!(err.to_string().contains("存在空规则段"));
    }
}
