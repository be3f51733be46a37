//! 表单校验协调器
//!
//! 顶层编排：按字段名把提交的字段分为普通字段和数组字段，逐个校验，
//! 汇总失败数得出接受 / 拒绝结论，并只向展示层发出一条汇总通知。
//!
//! 协调器独占字段状态表和远程校验管理器。远程查询结果通过通道回送，
//! 调用方用 [`FormValidationCoordinator::next_resolution`] 订阅，
//! 或用 [`FormValidationCoordinator::settle`] 等待全部在途查询结束。

use crate::error::Result;
use crate::group::{GroupAggregator, GroupResult};
use crate::models::{FieldState, FormField, Outcome, PendingPolicy, ValidateOptions};
use crate::parser::RuleChainParser;
use crate::presenter::{Effect, Presenter};
use crate::registry::RuleRegistry;
use crate::remote::{HttpUniquenessClient, RemoteCheckManager, RemoteResolution, UniquenessLookup};
use crate::rules::Rule;
use crate::validator::{FieldOutcome, FieldValidator};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use validation_shared::config::AppConfig;

/// 表单提交结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum SubmissionDecision {
    Accept,
    /// `failures` 为失败的校验单元数（普通字段或整组），
    /// `pending` 为其中因等待远程结果而失败的单元数
    Reject { failures: usize, pending: usize },
}

impl SubmissionDecision {
    /// 为 false 时调用方必须拦截提交动作
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }

    pub fn failures(&self) -> usize {
        match self {
            Self::Accept => 0,
            Self::Reject { failures, .. } => *failures,
        }
    }
}

/// 远程查询结果回填后的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionEvent {
    /// 值可用，规则计为通过；`outcome` 为回填后字段的结果
    Available { field_id: String, outcome: Outcome },
    /// 值已被占用，字段保持 PENDING
    Taken { field_id: String, message: String },
    /// 传输故障（远程校验不可用），字段保持 PENDING
    TransportFailed { field_id: String, error: String },
    /// 已被取消或已过期的结果
    Discarded { field_id: String },
}

/// 校验单元：普通字段或数组字段组
enum Unit<'a> {
    Single(&'a FormField),
    Group {
        name: String,
        members: Vec<&'a FormField>,
    },
}

/// 表单校验协调器
pub struct FormValidationCoordinator {
    registry: RuleRegistry,
    parser: RuleChainParser,
    validator: FieldValidator,
    remote: RemoteCheckManager,
    resolutions: mpsc::UnboundedReceiver<RemoteResolution>,
    fields: HashMap<String, FieldState>,
    presenter: Arc<dyn Presenter>,
    policy: PendingPolicy,
}

impl FormValidationCoordinator {
    pub fn new(
        registry: RuleRegistry,
        lookup: Arc<dyn UniquenessLookup>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        let (remote, resolutions) = RemoteCheckManager::new(lookup);
        Self {
            validator: FieldValidator::new(registry.clone()),
            registry,
            parser: RuleChainParser::new(),
            remote,
            resolutions,
            fields: HashMap::new(),
            presenter,
            policy: PendingPolicy::default(),
        }
    }

    /// 按配置创建：内置规则 + HTTP 唯一性查询
    pub fn from_config(config: &AppConfig, presenter: Arc<dyn Presenter>) -> Result<Self> {
        let lookup = HttpUniquenessClient::new(&config.remote)?;
        let policy = PendingPolicy::from_block_flag(config.validation.block_on_pending);

        info!(
            service = %config.service_name,
            pending_policy = ?policy,
            "表单校验协调器已初始化"
        );

        Ok(Self::new(RuleRegistry::with_builtins(), Arc::new(lookup), presenter).with_policy(policy))
    }

    pub fn with_policy(mut self, policy: PendingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> PendingPolicy {
        self.policy
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn register_rule(&self, name: &str, rule: Arc<dyn Rule>) {
        self.registry.register(name, rule);
    }

    pub fn field_state(&self, field_id: &str) -> Option<&FieldState> {
        self.fields.get(field_id)
    }

    /// 字段从宿主中移除时调用：丢弃状态并中止它的在途查询
    pub fn forget_field(&mut self, field_id: &str) -> Option<FieldState> {
        let cancelled = self.remote.cancel_field(field_id);
        if cancelled > 0 {
            debug!(field_id, cancelled, "已中止被移除字段的远程校验");
        }
        self.fields.remove(field_id)
    }

    /// 在途远程查询数
    pub fn in_flight(&self) -> usize {
        self.remote.in_flight()
    }

    /// 校验单个字段，返回同步执行结束时的结果
    pub fn validate_field(&mut self, field: &FormField, options: ValidateOptions) -> Result<Outcome> {
        self.validate_field_detailed(field, options)
            .map(|outcome| outcome.outcome)
    }

    /// 校验单个字段，返回完整的执行信息
    pub fn validate_field_detailed(
        &mut self,
        field: &FormField,
        options: ValidateOptions,
    ) -> Result<FieldOutcome> {
        let chain = self.parser.parse(&field.rules)?;

        let state = self
            .fields
            .entry(field.id.clone())
            .or_insert_with(|| FieldState::new(field.id.clone()));

        let outcome = self.validator.validate(
            state,
            field.value.clone(),
            &chain,
            &field.context(),
            &options,
            &mut self.remote,
        )?;

        self.present(&outcome.effects);
        Ok(outcome)
    }

    /// 校验整个表单（提交），立即给出结论
    ///
    /// 仍在等待远程结果的字段按 PENDING 策略计入失败。
    #[instrument(skip_all, fields(fields = fields.len()))]
    pub fn submit(&mut self, fields: &[FormField]) -> Result<SubmissionDecision> {
        let units = partition(fields);
        self.validate_units(&units)?;
        Ok(self.decide(&units))
    }

    /// 校验整个表单，等待所有远程查询结束后再给出结论
    #[instrument(skip_all, fields(fields = fields.len()))]
    pub async fn submit_settled(&mut self, fields: &[FormField]) -> Result<SubmissionDecision> {
        let units = partition(fields);
        self.validate_units(&units)?;

        let events = self.settle().await;
        debug!(events = events.len(), "远程校验已全部结束");

        Ok(self.decide(&units))
    }

    /// 等待下一个远程查询结果并回填；没有在途查询时返回 None
    pub async fn next_resolution(&mut self) -> Option<ResolutionEvent> {
        if let Ok(resolution) = self.resolutions.try_recv() {
            return Some(self.apply_resolution(resolution));
        }

        if self.remote.in_flight() == 0 {
            return None;
        }

        let resolution = self.resolutions.recv().await?;
        Some(self.apply_resolution(resolution))
    }

    /// 回填所有已到达的结果，不等待
    pub fn drain_resolutions(&mut self) -> Vec<ResolutionEvent> {
        let mut events = Vec::new();
        while let Ok(resolution) = self.resolutions.try_recv() {
            events.push(self.apply_resolution(resolution));
        }
        events
    }

    /// 等待全部在途查询结束
    pub async fn settle(&mut self) -> Vec<ResolutionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_resolution().await {
            events.push(event);
        }
        events
    }

    // -----------------------------------------------------------------------
    // 内部实现
    // -----------------------------------------------------------------------

    /// 先检查所有规则链，配置错误在任何字段被校验之前返回
    fn prepare(&self, units: &[Unit<'_>]) -> Result<()> {
        for unit in units {
            let members: Vec<&FormField> = match unit {
                Unit::Single(field) => vec![*field],
                Unit::Group { members, .. } => members.clone(),
            };
            for field in members {
                let chain = self.parser.parse(&field.rules)?;
                self.registry.resolve(&chain)?;
            }
        }
        Ok(())
    }

    fn validate_units(&mut self, units: &[Unit<'_>]) -> Result<()> {
        self.prepare(units)?;

        for unit in units {
            match unit {
                Unit::Single(field) => {
                    if field.marked_valid {
                        debug!(field_id = %field.id, "字段已被外部标记为有效，跳过");
                        continue;
                    }
                    self.validate_field(field, ValidateOptions::default())?;
                }
                Unit::Group { members, .. } => {
                    for field in members {
                        self.validate_field(field, ValidateOptions::default().without_class_effects())?;
                    }
                }
            }
        }

        Ok(())
    }

    fn outcome_of(&self, field_id: &str) -> Outcome {
        self.fields
            .get(field_id)
            .map(FieldState::current_outcome)
            .unwrap_or(Outcome::Pending)
    }

    fn aggregate(&self, name: &str, members: &[&FormField]) -> GroupResult {
        let elements = members
            .iter()
            .map(|field| (field.id.clone(), self.outcome_of(&field.id)))
            .collect();
        GroupAggregator::aggregate(name, elements, self.policy)
    }

    /// 根据字段状态得出结论，并发出数组字段标记和一条汇总通知
    fn decide(&self, units: &[Unit<'_>]) -> SubmissionDecision {
        let mut failures = 0;
        let mut pending = 0;

        for unit in units {
            match unit {
                Unit::Single(field) => {
                    if field.marked_valid {
                        continue;
                    }
                    let outcome = self.outcome_of(&field.id);
                    if outcome.is_blocking(self.policy) {
                        failures += 1;
                        if outcome == Outcome::Pending {
                            pending += 1;
                        }
                    }
                }
                Unit::Group { name, members } => {
                    let group = self.aggregate(name, members);
                    self.presenter.mark_group_error(&group.group, group.is_failed());
                    if group.is_failed() {
                        failures += 1;
                        if group.elements.iter().any(|(_, o)| *o == Outcome::Pending) {
                            pending += 1;
                        }
                    }
                }
            }
        }

        let decision = if failures == 0 {
            SubmissionDecision::Accept
        } else {
            SubmissionDecision::Reject { failures, pending }
        };

        match decision {
            SubmissionDecision::Accept => {
                self.presenter.notify_form_success();
                metrics::counter!("form_submissions_total", "decision" => "accept").increment(1);
                info!(units = units.len(), "表单校验通过");
            }
            SubmissionDecision::Reject { failures, pending } => {
                self.presenter.notify_form_failure(failures);
                metrics::counter!("form_submissions_total", "decision" => "reject").increment(1);
                info!(units = units.len(), failures, pending, "表单校验未通过，拦截提交");
            }
        }

        decision
    }

    fn apply_resolution(&mut self, resolution: RemoteResolution) -> ResolutionEvent {
        let field_id = resolution.field_id.clone();

        if !self.remote.accept(&resolution) {
            return ResolutionEvent::Discarded { field_id };
        }

        let Some(state) = self.fields.get_mut(&field_id) else {
            debug!(field_id = %field_id, "字段已不存在，丢弃远程结果");
            return ResolutionEvent::Discarded { field_id };
        };

        if state.generation != resolution.generation {
            debug!(
                field_id = %field_id,
                current = state.generation,
                resolved = resolution.generation,
                "字段已重新校验，丢弃旧轮次的远程结果"
            );
            return ResolutionEvent::Discarded { field_id };
        }

        state.awaiting_remote = state.awaiting_remote.saturating_sub(1);

        match resolution.result {
            Ok(response) if response.is_available() => {
                state.passed += 1;
                self.presenter
                    .show_remote_status(&field_id, &resolution.rule, true, &response.message);

                if state.outcome == Some(Outcome::Pending) && state.all_passed() {
                    state.outcome = Some(Outcome::Pass);
                    if let Some(callback) = state.on_all_passed.clone() {
                        callback(&field_id);
                    }
                }

                metrics::counter!("remote_checks_total", "event" => "available").increment(1);
                debug!(field_id = %field_id, passed = state.passed, total = state.total, "远程校验通过");

                ResolutionEvent::Available {
                    outcome: state.current_outcome(),
                    field_id,
                }
            }
            Ok(response) => {
                self.presenter
                    .show_remote_status(&field_id, &resolution.rule, false, &response.message);

                metrics::counter!("remote_checks_total", "event" => "taken").increment(1);
                debug!(field_id = %field_id, status = %response.status, "值已被占用");

                ResolutionEvent::Taken {
                    field_id,
                    message: response.message,
                }
            }
            Err(err) => {
                let error = err.to_string();
                state.remote_error = Some(error.clone());

                metrics::counter!("remote_checks_total", "event" => "transport_error").increment(1);
                warn!(field_id = %field_id, error = %error, "远程校验不可用，字段保持 PENDING");

                ResolutionEvent::TransportFailed { field_id, error }
            }
        }
    }

    fn present(&self, effects: &[Effect]) {
        for effect in effects {
            effect.apply_to(self.presenter.as_ref());
        }
    }
}

/// 按字段名分组，保持首次出现的顺序；普通字段重名时保留最后一个
fn partition(fields: &[FormField]) -> Vec<Unit<'_>> {
    let mut units: Vec<Unit<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for field in fields {
        match index.get(field.name.as_str()) {
            Some(&i) => match &mut units[i] {
                Unit::Group { members, .. } => members.push(field),
                Unit::Single(existing) => *existing = field,
            },
            None => {
                index.insert(field.name.as_str(), units.len());
                if field.is_group() {
                    units.push(Unit::Group {
                        name: field.base_name().to_string(),
                        members: vec![field],
                    });
                } else {
                    units.push(Unit::Single(field));
                }
            }
        }
    }

    units
}
