//! 规则注册表
//!
//! 规则名到规则定义的映射，使用 DashMap 提供可共享的注册表，
//! 集成方可以在首次使用前按名称注册自定义规则。

use crate::error::{Result, ValidationError};
use crate::models::{FieldContext, RuleChain};
use crate::rules::{self, PredicateRule, Rule};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 内置规则名
pub const BUILTIN_RULES: &[&str] = &[
    "required",
    "accepted",
    "in",
    "not_in",
    "between",
    "max",
    "min",
    "alpha_num",
    "time",
    "email",
    "date",
    "valid_cc",
    "unique",
];

/// 规则注册表
#[derive(Clone)]
pub struct RuleRegistry {
    rules: Arc<DashMap<String, Arc<dyn Rule>>>,
}

impl RuleRegistry {
    /// 创建空注册表
    pub fn empty() -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
        }
    }

    /// 创建带全部内置规则的注册表
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        let builtins: [(&str, Arc<dyn Rule>); 13] = [
            ("required", Arc::new(rules::Required)),
            ("accepted", Arc::new(rules::Accepted)),
            ("in", Arc::new(rules::In)),
            ("not_in", Arc::new(rules::NotIn)),
            ("between", Arc::new(rules::Between)),
            ("max", Arc::new(rules::Max)),
            ("min", Arc::new(rules::Min)),
            ("alpha_num", Arc::new(rules::AlphaNum)),
            ("time", Arc::new(rules::Time)),
            ("email", Arc::new(rules::Email)),
            ("date", Arc::new(rules::Date)),
            ("valid_cc", Arc::new(rules::ValidCc)),
            ("unique", Arc::new(rules::Unique)),
        ];

        for (name, rule) in builtins {
            registry.rules.insert(name.to_string(), rule);
        }

        registry
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 注册规则，同名规则会被替换
    #[instrument(skip(self, rule))]
    pub fn register(&self, name: &str, rule: Arc<dyn Rule>) {
        if self.rules.insert(name.to_string(), rule).is_some() {
            warn!("规则已被替换: {}", name);
        } else {
            info!("规则已注册: {}", name);
        }
    }

    /// 以 "何时失败" 判定注册规则
    pub fn register_fn<F>(&self, name: &str, fails_when: F)
    where
        F: Fn(&Value, &[String], &FieldContext) -> bool + Send + Sync + 'static,
    {
        self.register(name, Arc::new(PredicateRule::new(fails_when)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Rule>> {
        self.rules.get(name).map(|r| r.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// 所有规则名（已排序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rules.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// 按规则链顺序解析出规则定义，并检查参数
    ///
    /// 未注册的规则名和参数错误都在这里暴露，早于任何状态修改。
    pub fn resolve(&self, chain: &RuleChain) -> Result<Vec<Arc<dyn Rule>>> {
        chain
            .iter()
            .map(|invocation| {
                let rule = self
                    .get(&invocation.name)
                    .ok_or_else(|| ValidationError::UnknownRule(invocation.name.clone()))?;
                rule.check_params(&invocation.name, &invocation.params)?;
                Ok(rule)
            })
            .collect()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
