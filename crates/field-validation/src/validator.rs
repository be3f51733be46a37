//! 字段校验器
//!
//! 按声明顺序执行字段的规则链：遇到第一个同步失败立即短路；
//! 远程规则返回 PENDING 但不阻塞后续规则，它的结果稍后由协调器回填。

use crate::error::Result;
use crate::models::{FieldContext, FieldState, Outcome, RuleChain, ValidateOptions};
use crate::presenter::Effect;
use crate::registry::RuleRegistry;
use crate::remote::RemoteCheckManager;
use crate::rules::RuleResult;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// 单次字段校验的结果
#[derive(Debug, Clone, Serialize)]
pub struct FieldOutcome {
    pub field_id: String,
    /// 同步执行结束时规则链的状态
    pub outcome: Outcome,
    /// 第一个失败的规则
    pub failed_rule: Option<String>,
    /// 需要展示层执行的效果，按产生顺序排列
    pub effects: Vec<Effect>,
    pub passed: usize,
    pub total: usize,
    /// 是否命中缓存（未执行任何规则）
    pub cached: bool,
    /// 实际执行过的规则名，按执行顺序
    pub evaluated: Vec<String>,
    pub evaluation_time_us: u64,
}

impl FieldOutcome {
    fn cached(state: &FieldState) -> Self {
        Self {
            field_id: state.field_id.clone(),
            outcome: state.current_outcome(),
            failed_rule: None,
            effects: Vec::new(),
            passed: state.passed,
            total: state.total,
            cached: true,
            evaluated: Vec::new(),
            evaluation_time_us: 0,
        }
    }
}

/// 字段校验器
#[derive(Clone)]
pub struct FieldValidator {
    registry: RuleRegistry,
}

impl FieldValidator {
    pub fn new(registry: RuleRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// 校验字段
    ///
    /// 规则名或参数错误在修改任何状态之前返回。
    #[instrument(skip_all, fields(field_id = %ctx.field_id, chain = %chain.source))]
    pub fn validate(
        &self,
        state: &mut FieldState,
        value: Value,
        chain: &RuleChain,
        ctx: &FieldContext,
        options: &ValidateOptions,
        remote: &mut RemoteCheckManager,
    ) -> Result<FieldOutcome> {
        let rules = self.registry.resolve(chain)?;

        state.current_value = value;

        // 快速路径：值没变（或只做检查）且没有记录过失败
        let unchanged = state.last_value.as_ref() == Some(&state.current_value);
        if (options.check_only || unchanged) && state.is_cache_valid() {
            debug!(outcome = %state.current_outcome(), "命中缓存，跳过规则执行");
            return Ok(FieldOutcome::cached(state));
        }

        let start = Instant::now();
        let field_id = ctx.field_id.as_str();

        state.generation += 1;
        state.passed = 0;
        state.total = chain.len();
        state.awaiting_remote = 0;
        state.remote_error = None;
        state.last_value = Some(state.current_value.clone());
        state.on_all_passed = options.on_all_passed.clone();

        let mut effects = Vec::with_capacity(chain.len() + 2);
        if options.emit_class_effects {
            effects.push(Effect::field_error(field_id, false));
        }
        effects.extend(chain.iter().map(|inv| Effect::hide(field_id, &inv.name)));

        let mut evaluated = Vec::with_capacity(chain.len());
        let mut failed_rule = None;

        for (slot, (invocation, rule)) in chain.iter().zip(rules.iter()).enumerate() {
            evaluated.push(invocation.name.clone());

            match rule.evaluate(&state.current_value, &invocation.params, ctx) {
                RuleResult::Pass => {
                    state.passed += 1;
                }
                RuleResult::Fail {
                    effects: rule_effects,
                } => {
                    effects.push(Effect::show(field_id, &invocation.name));
                    effects.extend(rule_effects);
                    if options.emit_class_effects && rule.marks_field_error() {
                        effects.push(Effect::field_error(field_id, true));
                    }
                    debug!(rule = %invocation.name, "规则失败，短路");
                    failed_rule = Some(invocation.name.clone());
                    break;
                }
                RuleResult::Remote(request) => {
                    match remote.check(&invocation.name, request, slot, state.generation) {
                        Ok(_) => state.awaiting_remote += 1,
                        Err(err) => {
                            // 无法发起查询：规则保持 PENDING，重新校验时会再次尝试
                            warn!(rule = %invocation.name, error = %err, "远程校验无法发起");
                            state.remote_error = Some(err.to_string());
                        }
                    }
                }
            }
        }

        let outcome = if failed_rule.is_some() {
            Outcome::Fail
        } else if state.all_passed() {
            Outcome::Pass
        } else {
            Outcome::Pending
        };
        state.outcome = Some(outcome);

        if outcome == Outcome::Pass {
            if let Some(callback) = &state.on_all_passed {
                callback(field_id);
            }
        }

        metrics::counter!("field_validations_total", "outcome" => outcome.as_str()).increment(1);
        debug!(
            outcome = %outcome,
            passed = state.passed,
            total = state.total,
            "字段校验完成"
        );

        Ok(FieldOutcome {
            field_id: field_id.to_string(),
            outcome,
            failed_rule,
            effects,
            passed: state.passed,
            total: state.total,
            cached: false,
            evaluated,
            evaluation_time_us: start.elapsed().as_micros() as u64,
        })
    }
}
