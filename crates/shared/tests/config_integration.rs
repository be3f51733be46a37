//! 配置加载集成测试
//!
//! 覆盖配置文件分层和环境变量覆盖。

use std::fs;
use std::path::PathBuf;
use validation_shared::config::AppConfig;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("formcheck-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_service_file_overrides_environment_file() {
    let dir = scratch_dir("service");
    fs::write(
        dir.join("development.toml"),
        "[observability]\nlog_level = \"debug\"\nlog_format = \"json\"\n",
    )
    .unwrap();
    fs::write(
        dir.join("signup-form.toml"),
        "[observability]\nlog_level = \"warn\"\n",
    )
    .unwrap();

    let config = AppConfig::load_from(&dir, "signup-form", "development").unwrap();

    assert_eq!(config.observability.log_level, "warn");
    assert!(config.observability.json_logs());
    assert!(!config.is_production());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_environment_variables_override_files() {
    let dir = scratch_dir("env");
    fs::write(
        dir.join("default.toml"),
        "[remote]\nbase_url = \"https://file.example\"\n",
    )
    .unwrap();

    // SAFETY: 该变量只在本测试中使用
    unsafe {
        std::env::set_var("FORMCHECK__REMOTE__TIMEOUT_SECONDS", "42");
    }

    let config = AppConfig::load_from(&dir, "signup-form", "production").unwrap();

    unsafe {
        std::env::remove_var("FORMCHECK__REMOTE__TIMEOUT_SECONDS");
    }

    assert_eq!(config.remote.base_url, "https://file.example");
    assert_eq!(config.remote.timeout_seconds, 42);
    assert!(config.is_production());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_malformed_file_is_reported() {
    let dir = scratch_dir("malformed");
    fs::write(dir.join("default.toml"), "[remote\nbase_url = ").unwrap();

    assert!(AppConfig::load_from(&dir, "signup-form", "development").is_err());

    fs::remove_dir_all(&dir).unwrap();
}
