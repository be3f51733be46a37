//! 内置校验规则
//!
//! 每条规则定义为一个 "何时失败" 的判定。规则本身不产生副作用：
//! 需要改变界面的规则通过 [`RuleResult::Fail`] 携带效果返回，
//! 需要远程查询的规则返回 [`RuleResult::Remote`] 交给远程校验管理器。

use crate::error::{Result, ValidationError};
use crate::models::{FieldContext, is_falsy, value_text};
use crate::presenter::Effect;
use crate::remote::LookupRequest;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// 单条规则的评估结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleResult {
    Pass,
    Fail { effects: Vec<Effect> },
    /// 需要远程查询，规则结果为 PENDING
    Remote(LookupRequest),
}

impl RuleResult {
    pub fn fail() -> Self {
        Self::Fail {
            effects: Vec::new(),
        }
    }

    /// 由 "是否失败" 构造结果
    pub fn from_failed(failed: bool) -> Self {
        if failed { Self::fail() } else { Self::Pass }
    }
}

/// 校验规则
pub trait Rule: Send + Sync {
    /// 检查规则参数，参数个数或格式不对属于配置错误
    fn check_params(&self, _name: &str, _params: &[String]) -> Result<()> {
        Ok(())
    }

    fn evaluate(&self, value: &Value, params: &[String], ctx: &FieldContext) -> RuleResult;

    /// 失败时是否给字段容器加错误样式
    fn marks_field_error(&self) -> bool {
        true
    }
}

/// 闭包形式的 "何时失败" 判定规则
pub struct PredicateRule<F> {
    fails_when: F,
}

impl<F> PredicateRule<F>
where
    F: Fn(&Value, &[String], &FieldContext) -> bool + Send + Sync,
{
    pub fn new(fails_when: F) -> Self {
        Self { fails_when }
    }
}

impl<F> Rule for PredicateRule<F>
where
    F: Fn(&Value, &[String], &FieldContext) -> bool + Send + Sync,
{
    fn evaluate(&self, value: &Value, params: &[String], ctx: &FieldContext) -> RuleResult {
        RuleResult::from_failed((self.fails_when)(value, params, ctx))
    }
}

// ---------------------------------------------------------------------------
// 参数检查
// ---------------------------------------------------------------------------

fn expect_count(name: &str, params: &[String], count: usize) -> Result<()> {
    if params.len() != count {
        return Err(ValidationError::invalid_params(
            name,
            format!("需要 {} 个参数，当前有 {} 个", count, params.len()),
        ));
    }
    Ok(())
}

fn expect_at_least(name: &str, params: &[String], count: usize) -> Result<()> {
    if params.len() < count {
        return Err(ValidationError::invalid_params(
            name,
            format!("至少需要 {} 个参数，当前有 {} 个", count, params.len()),
        ));
    }
    Ok(())
}

fn parse_number(name: &str, param: &str) -> Result<f64> {
    param.trim().parse().map_err(|_| {
        ValidationError::invalid_params(name, format!("参数 '{}' 不是数字", param))
    })
}

fn parse_length(name: &str, param: &str) -> Result<usize> {
    param.trim().parse().map_err(|_| {
        ValidationError::invalid_params(name, format!("参数 '{}' 不是非负整数", param))
    })
}

/// 参数已通过 check_params 校验，这里解析失败时按失败处理
fn as_f64(text: &str) -> Option<f64> {
    text.trim().parse().ok()
}

// ---------------------------------------------------------------------------
// 内置规则
// ---------------------------------------------------------------------------

/// 值必须存在
pub struct Required;

impl Rule for Required {
    fn evaluate(&self, value: &Value, _params: &[String], _ctx: &FieldContext) -> RuleResult {
        RuleResult::from_failed(is_falsy(value))
    }
}

static ACCEPTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:1|t(?:rue)?|y(?:es)?|ok(?:ay)?)$").expect("accepted 正则有效")
});

/// 值必须是 1 / true / t / yes / y / okay / ok（忽略大小写）
pub struct Accepted;

impl Rule for Accepted {
    fn evaluate(&self, value: &Value, _params: &[String], _ctx: &FieldContext) -> RuleResult {
        RuleResult::from_failed(!ACCEPTED_RE.is_match(&value_text(value)))
    }
}

/// 值在参数列表中的位置，None 表示不存在
fn position_in(value: &Value, params: &[String]) -> Option<usize> {
    let text = value_text(value);
    params.iter().position(|p| p.as_str() == text)
}

/// 值必须在参数列表中
pub struct In;

impl Rule for In {
    fn check_params(&self, name: &str, params: &[String]) -> Result<()> {
        expect_at_least(name, params, 1)
    }

    fn evaluate(&self, value: &Value, params: &[String], _ctx: &FieldContext) -> RuleResult {
        RuleResult::from_failed(position_in(value, params).is_none())
    }
}

/// 值不能在参数列表中
pub struct NotIn;

impl Rule for NotIn {
    fn check_params(&self, name: &str, params: &[String]) -> Result<()> {
        expect_at_least(name, params, 1)
    }

    fn evaluate(&self, value: &Value, params: &[String], _ctx: &FieldContext) -> RuleResult {
        RuleResult::from_failed(position_in(value, params).is_some())
    }
}

/// 数值必须在 [min, max] 闭区间内
pub struct Between;

impl Rule for Between {
    fn check_params(&self, name: &str, params: &[String]) -> Result<()> {
        expect_count(name, params, 2)?;
        let min = parse_number(name, &params[0])?;
        let max = parse_number(name, &params[1])?;
        if min > max {
            return Err(ValidationError::invalid_params(
                name,
                format!("最小值 {} 大于最大值 {}", min, max),
            ));
        }
        Ok(())
    }

    fn evaluate(&self, value: &Value, params: &[String], _ctx: &FieldContext) -> RuleResult {
        let in_range = match (
            as_f64(&value_text(value)),
            params.first().and_then(|p| as_f64(p)),
            params.get(1).and_then(|p| as_f64(p)),
        ) {
            (Some(v), Some(min), Some(max)) => v >= min && v <= max,
            _ => false,
        };
        RuleResult::from_failed(!in_range)
    }
}

fn text_length(value: &Value) -> usize {
    match value {
        Value::Array(arr) => arr.len(),
        other => value_text(other).chars().count(),
    }
}

/// 缺失或无法解析的长度参数按失败处理
fn parse_limit(params: &[String]) -> Option<usize> {
    params.first().and_then(|p| p.trim().parse::<usize>().ok())
}

/// 长度不能超过 n
pub struct Max;

impl Rule for Max {
    fn check_params(&self, name: &str, params: &[String]) -> Result<()> {
        expect_count(name, params, 1)?;
        parse_length(name, &params[0]).map(|_| ())
    }

    fn evaluate(&self, value: &Value, params: &[String], _ctx: &FieldContext) -> RuleResult {
        match parse_limit(params) {
            Some(max) => RuleResult::from_failed(text_length(value) > max),
            None => RuleResult::fail(),
        }
    }
}

/// 长度不能少于 n
pub struct Min;

impl Rule for Min {
    fn check_params(&self, name: &str, params: &[String]) -> Result<()> {
        expect_count(name, params, 1)?;
        parse_length(name, &params[0]).map(|_| ())
    }

    fn evaluate(&self, value: &Value, params: &[String], _ctx: &FieldContext) -> RuleResult {
        match parse_limit(params) {
            Some(min) => RuleResult::from_failed(text_length(value) < min),
            None => RuleResult::fail(),
        }
    }
}

/// 只能包含字母和数字
pub struct AlphaNum;

impl Rule for AlphaNum {
    fn evaluate(&self, value: &Value, _params: &[String], _ctx: &FieldContext) -> RuleResult {
        let text = value_text(value);
        RuleResult::from_failed(text.chars().any(|c| !c.is_ascii_alphanumeric()))
    }
}

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(2[0-3]|[01]?[0-9]):([0-5]?[0-9]):([0-5]?[0-9])$").expect("time 正则有效")
});

/// HH:MM:SS（24 小时制，各段可为一位或两位）
pub struct Time;

impl Rule for Time {
    fn evaluate(&self, value: &Value, _params: &[String], _ctx: &FieldContext) -> RuleResult {
        RuleResult::from_failed(!TIME_RE.is_match(&value_text(value)))
    }
}

/// U+00A0..U+FFEF 中允许出现在邮箱里的字符范围
const EMAIL_UCS: &str = r"\x{00A0}-\x{D7FF}\x{F900}-\x{FDCF}\x{FDF0}-\x{FFEF}";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    let u = EMAIL_UCS;
    let atom = format!(r"[a-zA-Z\d!#$%&'*+\-/=?^_`{{|}}~{u}]");
    let dot_atom = format!(r"{atom}+(?:\.{atom}+)*");
    let qtext = format!(r"[\x01-\x08\x0b\x0c\x0e-\x1f\x7f\x21\x23-\x5b\x5d-\x7e{u}]");
    let quoted_pair = format!(r"\\[\x01-\x09\x0b\x0c\x0d-\x7f{u}]");
    let fws = r"(?:(?:[\x20\x09]*\x0d\x0a)?[\x20\x09]+)?";
    let quoted = format!(r#""(?:{fws}(?:{qtext}|{quoted_pair}))*{fws}""#);
    let label_end = format!(r"[a-zA-Z\d{u}]");
    let label_mid = format!(r"[a-zA-Z\d\-._~{u}]");
    let tld_end = format!(r"[a-zA-Z{u}]");
    let label = format!(r"(?:{label_end}|{label_end}{label_mid}*{label_end})");
    let tld = format!(r"(?:{tld_end}|{tld_end}{label_mid}*{tld_end})");
    let pattern = format!(r"^(?:{dot_atom}|{quoted})@(?:{label}\.)+{tld}$");
    Regex::new(&pattern).expect("email 正则有效")
});

/// 邮箱地址
pub struct Email;

impl Rule for Email {
    fn evaluate(&self, value: &Value, _params: &[String], _ctx: &FieldContext) -> RuleResult {
        RuleResult::from_failed(!EMAIL_RE.is_match(&value_text(value)))
    }
}

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[0-9]{2})?[0-9]{2}[/-](?:1[0-2]|0?[1-9])[/-](?:3[01]|[12][0-9]|0?[1-9])$")
        .expect("date 正则有效")
});

/// YYYY[-/]MM[-/]DD，年份也可以是两位
pub struct Date;

impl Rule for Date {
    fn evaluate(&self, value: &Value, _params: &[String], _ctx: &FieldContext) -> RuleResult {
        RuleResult::from_failed(!DATE_RE.is_match(&value_text(value)))
    }
}

/// 支付组件必须已报告 complete，否则失败并把组件标记为无效
pub struct ValidCc;

impl Rule for ValidCc {
    fn evaluate(&self, _value: &Value, _params: &[String], ctx: &FieldContext) -> RuleResult {
        if ctx.widget_complete {
            return RuleResult::Pass;
        }

        RuleResult::Fail {
            effects: vec![Effect::MarkWidgetInvalid {
                field_id: ctx.field_id.clone(),
            }],
        }
    }

    fn marks_field_error(&self) -> bool {
        false
    }
}

/// 远程唯一性校验：`unique:资源名[,排除的记录 ID]`
pub struct Unique;

impl Rule for Unique {
    fn check_params(&self, name: &str, params: &[String]) -> Result<()> {
        expect_at_least(name, params, 1)?;
        if params.len() > 2 {
            return Err(ValidationError::invalid_params(
                name,
                format!("最多 2 个参数，当前有 {} 个", params.len()),
            ));
        }
        if params[0].is_empty() {
            return Err(ValidationError::invalid_params(name, "资源名不能为空"));
        }
        Ok(())
    }

    fn evaluate(&self, value: &Value, params: &[String], ctx: &FieldContext) -> RuleResult {
        RuleResult::Remote(LookupRequest {
            resource: params[0].clone(),
            field_id: ctx.field_id.clone(),
            field_name: ctx.field_name.clone(),
            value: value_text(value).into_owned(),
            exclude_id: params.get(1).filter(|id| !id.is_empty()).cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> FieldContext {
        FieldContext::new("field", "field")
    }

    fn params(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn fails(rule: &dyn Rule, value: Value, p: &[&str]) -> bool {
        matches!(
            rule.evaluate(&value, &params(p), &ctx()),
            RuleResult::Fail { .. }
        )
    }

    #[test]
    fn test_required() {
        assert!(fails(&Required, json!(""), &[]));
        assert!(fails(&Required, json!(null), &[]));
        assert!(!fails(&Required, json!("x"), &[]));
    }

    #[test]
    fn test_accepted() {
        for v in ["1", "true", "T", "yes", "Y", "ok", "OKAY"] {
            assert!(!fails(&Accepted, json!(v), &[]), "{} 应通过", v);
        }
        for v in ["0", "no", "", "truthy"] {
            assert!(fails(&Accepted, json!(v), &[]), "{} 应失败", v);
        }
    }

    #[test]
    fn test_in_and_not_in() {
        assert!(!fails(&In, json!("red"), &["red", "green"]));
        assert!(fails(&In, json!("blue"), &["red", "green"]));
        // 第一个位置（下标 0）也要算作存在
        assert!(fails(&NotIn, json!("red"), &["red", "green"]));
        assert!(!fails(&NotIn, json!("blue"), &["red", "green"]));
    }

    #[test]
    fn test_between() {
        assert!(!fails(&Between, json!("5"), &["1", "10"]));
        assert!(!fails(&Between, json!("1"), &["1", "10"]));
        assert!(!fails(&Between, json!(10), &["1", "10"]));
        assert!(fails(&Between, json!("11"), &["1", "10"]));
        assert!(fails(&Between, json!("abc"), &["1", "10"]));
    }

    #[test]
    fn test_min_max_length() {
        assert!(fails(&Min, json!("ab"), &["3"]));
        assert!(!fails(&Min, json!("abc"), &["3"]));
        assert!(fails(&Max, json!("abcdef"), &["5"]));
        assert!(!fails(&Max, json!("abcde"), &["5"]));
        // 按字符计数
        assert!(!fails(&Max, json!("徽章系统"), &["4"]));
    }

    #[test]
    fn test_missing_bound_params_fail() {
        assert!(fails(&Max, json!("abc"), &[]));
        assert!(fails(&Min, json!("abc"), &[]));
        assert!(fails(&Between, json!("5"), &[]));
        assert!(fails(&Between, json!("5"), &["1"]));
        assert!(fails(&Max, json!("abc"), &["many"]));
    }

    #[test]
    fn test_alpha_num() {
        assert!(!fails(&AlphaNum, json!("abc123"), &[]));
        assert!(fails(&AlphaNum, json!("abc 123"), &[]));
        assert!(fails(&AlphaNum, json!("a-b"), &[]));
    }

    #[test]
    fn test_time_fails_on_non_match() {
        assert!(!fails(&Time, json!("23:59:59"), &[]));
        assert!(!fails(&Time, json!("9:5:7"), &[]));
        assert!(fails(&Time, json!("24:00:00"), &[]));
        assert!(fails(&Time, json!("12:00"), &[]));
    }

    #[test]
    fn test_email() {
        assert!(!fails(&Email, json!("a@b.com"), &[]));
        assert!(!fails(&Email, json!("First.Last+tag@sub.example.org"), &[]));
        assert!(!fails(&Email, json!("\"john doe\"@example.com"), &[]));
        assert!(fails(&Email, json!("foo"), &[]));
        assert!(fails(&Email, json!("a@b"), &[]));
        assert!(fails(&Email, json!("a..b@example.com"), &[]));
    }

    #[test]
    fn test_date() {
        assert!(!fails(&Date, json!("2024-01-15"), &[]));
        assert!(!fails(&Date, json!("2024/1/5"), &[]));
        assert!(!fails(&Date, json!("24-12-31"), &[]));
        assert!(fails(&Date, json!("2024-13-01"), &[]));
        assert!(fails(&Date, json!("15.01.2024"), &[]));
    }

    #[test]
    fn test_valid_cc_returns_effect() {
        let result = ValidCc.evaluate(&json!(""), &[], &ctx());
        assert_eq!(
            result,
            RuleResult::Fail {
                effects: vec![Effect::MarkWidgetInvalid {
                    field_id: "field".to_string()
                }]
            }
        );
        assert!(!ValidCc.marks_field_error());

        let complete = ctx().with_widget_complete(true);
        assert_eq!(ValidCc.evaluate(&json!(""), &[], &complete), RuleResult::Pass);
    }

    #[test]
    fn test_unique_builds_lookup_request() {
        let result = Unique.evaluate(&json!("alice"), &params(&["users", "42"]), &ctx());
        match result {
            RuleResult::Remote(request) => {
                assert_eq!(request.resource, "users");
                assert_eq!(request.value, "alice");
                assert_eq!(request.exclude_id.as_deref(), Some("42"));
            }
            other => panic!("应返回远程请求: {:?}", other),
        }
    }

    #[test]
    fn test_param_checks() {
        assert!(Between.check_params("between", &params(&["1"])).is_err());
        assert!(Between.check_params("between", &params(&["a", "2"])).is_err());
        assert!(Between.check_params("between", &params(&["1", "2"])).is_ok());
        assert!(Min.check_params("min", &params(&[])).is_err());
        assert!(Max.check_params("max", &params(&["-1"])).is_err());
        assert!(In.check_params("in", &params(&[])).is_err());
        assert!(Unique.check_params("unique", &params(&[])).is_err());
        assert!(Unique.check_params("unique", &params(&["users", "1", "x"])).is_err());
    }

    #[test]
    fn test_predicate_rule() {
        let even = PredicateRule::new(|value: &Value, _: &[String], _: &FieldContext| {
            value.as_i64().is_none_or(|n| n % 2 != 0)
        });
        assert!(!fails(&even, json!(4), &[]));
        assert!(fails(&even, json!(3), &[]));
    }
}
