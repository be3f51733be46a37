//! 共享库
//!
//! 表单校验引擎的各个使用方共用的配置加载和可观测性初始化代码。

pub mod config;
pub mod observability;
