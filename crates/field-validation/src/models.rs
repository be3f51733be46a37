//! 校验引擎领域模型

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// 规则 / 字段的三态结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Pass,
    Fail,
    /// 等待远程校验结果，既未通过也未失败
    Pending,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Pending => "pending",
        }
    }

    /// 在给定的 PENDING 策略下是否阻止提交
    pub fn is_blocking(&self, policy: PendingPolicy) -> bool {
        match self {
            Self::Pass => false,
            Self::Fail => true,
            Self::Pending => policy == PendingPolicy::Block,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// 提交时如何看待仍处于 PENDING 的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingPolicy {
    /// PENDING 视为失败，阻止提交
    #[default]
    Block,
    /// PENDING 视为通过
    Allow,
}

impl PendingPolicy {
    pub fn from_block_flag(block_on_pending: bool) -> Self {
        if block_on_pending {
            Self::Block
        } else {
            Self::Allow
        }
    }
}

/// 规则调用：规则名 + 原始字符串参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInvocation {
    pub name: String,
    pub params: Vec<String>,
}

impl RuleInvocation {
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl fmt::Display for RuleInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.params.join(","))
        }
    }
}

/// 一个字段的有序规则链
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleChain {
    /// 原始规则链字符串
    pub source: String,
    pub invocations: Vec<RuleInvocation>,
}

impl RuleChain {
    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuleInvocation> {
        self.invocations.iter()
    }
}

/// 提供给规则的字段上下文
#[derive(Debug, Clone, Default)]
pub struct FieldContext {
    pub field_id: String,
    /// 字段名（数组字段带 `[]` 后缀），远程校验的端点由它生成
    pub field_name: String,
    /// 支付组件是否已报告 "complete"
    pub widget_complete: bool,
}

impl FieldContext {
    pub fn new(field_id: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            field_name: field_name.into(),
            widget_complete: false,
        }
    }

    pub fn with_widget_complete(mut self, complete: bool) -> Self {
        self.widget_complete = complete;
        self
    }
}

/// 整条规则链全部通过时触发的回调，参数为字段 ID
pub type AllPassedCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// 单次字段校验的选项
#[derive(Clone)]
pub struct ValidateOptions {
    /// 快速检查：已有非失败结果时直接返回缓存
    pub check_only: bool,
    /// 是否输出字段级错误样式效果
    pub emit_class_effects: bool,
    pub on_all_passed: Option<AllPassedCallback>,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            check_only: false,
            emit_class_effects: true,
            on_all_passed: None,
        }
    }
}

impl ValidateOptions {
    pub fn check_only() -> Self {
        Self {
            check_only: true,
            ..Default::default()
        }
    }

    pub fn without_class_effects(mut self) -> Self {
        self.emit_class_effects = false;
        self
    }

    pub fn on_all_passed(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_all_passed = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for ValidateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidateOptions")
            .field("check_only", &self.check_only)
            .field("emit_class_effects", &self.emit_class_effects)
            .field("on_all_passed", &self.on_all_passed.is_some())
            .finish()
    }
}

/// 字段校验状态
///
/// 首次校验时懒创建，由协调器的字段表持有，生命周期跟随调用方的字段。
#[derive(Clone, Default)]
pub struct FieldState {
    pub field_id: String,
    pub current_value: Value,
    /// 上一次完整校验时的值，从未校验过为 None
    pub last_value: Option<Value>,
    /// 上一次完整校验的结果
    pub outcome: Option<Outcome>,
    /// 当前规则链中已通过的规则数
    pub passed: usize,
    /// 当前规则链长度
    pub total: usize,
    /// 每次完整校验递增，用于丢弃过期的远程结果
    pub generation: u64,
    /// 本轮仍在等待的远程校验数
    pub awaiting_remote: usize,
    /// 最近一次远程传输故障
    pub remote_error: Option<String>,
    pub(crate) on_all_passed: Option<AllPassedCallback>,
}

impl FieldState {
    pub fn new(field_id: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            current_value: Value::Null,
            ..Default::default()
        }
    }

    /// 当前结果；从未校验过的字段视为 PENDING
    pub fn current_outcome(&self) -> Outcome {
        self.outcome.unwrap_or(Outcome::Pending)
    }

    pub fn has_failed(&self) -> bool {
        self.outcome == Some(Outcome::Fail)
    }

    /// 规则链是否已全部通过
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.passed >= self.total
    }

    /// 是否可以直接返回缓存结果
    pub(crate) fn is_cache_valid(&self) -> bool {
        match self.outcome {
            Some(Outcome::Pass) => true,
            Some(Outcome::Pending) => self.awaiting_remote > 0,
            _ => false,
        }
    }
}

impl fmt::Debug for FieldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldState")
            .field("field_id", &self.field_id)
            .field("current_value", &self.current_value)
            .field("last_value", &self.last_value)
            .field("outcome", &self.outcome)
            .field("passed", &self.passed)
            .field("total", &self.total)
            .field("generation", &self.generation)
            .field("awaiting_remote", &self.awaiting_remote)
            .field("remote_error", &self.remote_error)
            .finish()
    }
}

/// 提交的表单字段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    /// 字段唯一标识（同名数组字段的每个元素各不相同）
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub value: Value,
    /// 声明式规则链，如 `required|min:3`
    pub rules: String,
    /// 外部已标记为有效的字段在提交时跳过
    #[serde(default)]
    pub marked_valid: bool,
    #[serde(default)]
    pub widget_complete: bool,
}

/// 数组字段名后缀
pub const GROUP_SUFFIX: &str = "[]";

impl FormField {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<Value>,
        rules: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value: value.into(),
            rules: rules.into(),
            marked_valid: false,
            widget_complete: false,
        }
    }

    pub fn marked_valid(mut self) -> Self {
        self.marked_valid = true;
        self
    }

    pub fn with_widget_complete(mut self, complete: bool) -> Self {
        self.widget_complete = complete;
        self
    }

    /// 是否为数组字段（名称以 `[]` 结尾）
    pub fn is_group(&self) -> bool {
        self.name.ends_with(GROUP_SUFFIX)
    }

    /// 去掉 `[]` 后缀的字段名
    pub fn base_name(&self) -> &str {
        self.name.strip_suffix(GROUP_SUFFIX).unwrap_or(&self.name)
    }

    pub fn context(&self) -> FieldContext {
        FieldContext::new(self.id.clone(), self.name.clone())
            .with_widget_complete(self.widget_complete)
    }
}

/// 值的文本形式：字符串原样返回，数字和布尔取显示形式，null 为空串
pub fn value_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Null => Cow::Borrowed(""),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        other => Cow::Owned(other.to_string()),
    }
}

/// 值是否为 "假值"：null、空串、false、数字 0、空数组、空对象
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_none_or(|f| f == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(arr) => arr.is_empty(),
        Value::Object(obj) => obj.is_empty(),
    }
}
