//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 远程唯一性校验配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteCheckConfig {
    pub base_url: String,
    /// 查询路径模板，`{resource}` 和 `{field}` 在请求时替换
    pub check_path: String,
    pub timeout_seconds: u64,
}

impl Default for RemoteCheckConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            check_path: "/ajax/{resource}/check/{field}".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl RemoteCheckConfig {
    /// 按资源和字段名展开查询地址
    pub fn endpoint(&self, resource: &str, field: &str) -> String {
        let path = self
            .check_path
            .replace("{resource}", resource)
            .replace("{field}", field);
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// 校验行为配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// 提交时仍在等待远程结果的字段是否计为失败
    pub block_on_pending: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            block_on_pending: true,
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub remote: RemoteCheckConfig,
    pub validation: ValidationConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（FORMCHECK 前缀，如 FORMCHECK__REMOTE__BASE_URL -> remote.base_url）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("FORMCHECK_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(Path::new(&config_dir), service_name, &env)
    }

    /// 从指定目录加载配置
    pub fn load_from(config_dir: &Path, service_name: &str, env: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            // 字段名本身含下划线（base_url），层级分隔符用双下划线
            .add_source(
                Environment::with_prefix("FORMCHECK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
