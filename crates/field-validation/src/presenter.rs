//! 展示层协作接口
//!
//! 引擎不直接操作界面，而是产出描述界面变化的 [`Effect`]，
//! 由实现了 [`Presenter`] 的展示层执行。

use parking_lot::Mutex;
use serde::Serialize;

/// 展示效果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    ShowRuleMessage { field_id: String, rule: String },
    HideRuleMessage { field_id: String, rule: String },
    MarkFieldError { field_id: String, error: bool },
    MarkGroupError { group: String, error: bool },
    /// 支付组件标记为无效
    MarkWidgetInvalid { field_id: String },
    /// 远程校验返回后展示服务端消息
    RemoteStatus {
        field_id: String,
        rule: String,
        available: bool,
        message: String,
    },
    FormFailure { count: usize },
    FormSuccess,
}

impl Effect {
    pub fn show(field_id: &str, rule: &str) -> Self {
        Self::ShowRuleMessage {
            field_id: field_id.to_string(),
            rule: rule.to_string(),
        }
    }

    pub fn hide(field_id: &str, rule: &str) -> Self {
        Self::HideRuleMessage {
            field_id: field_id.to_string(),
            rule: rule.to_string(),
        }
    }

    pub fn field_error(field_id: &str, error: bool) -> Self {
        Self::MarkFieldError {
            field_id: field_id.to_string(),
            error,
        }
    }

    /// 交给展示层执行
    pub fn apply_to(&self, presenter: &dyn Presenter) {
        match self {
            Self::ShowRuleMessage { field_id, rule } => presenter.show_rule_message(field_id, rule),
            Self::HideRuleMessage { field_id, rule } => presenter.hide_rule_message(field_id, rule),
            Self::MarkFieldError { field_id, error } => presenter.mark_field_error(field_id, *error),
            Self::MarkGroupError { group, error } => presenter.mark_group_error(group, *error),
            Self::MarkWidgetInvalid { field_id } => presenter.mark_widget_invalid(field_id),
            Self::RemoteStatus {
                field_id,
                rule,
                available,
                message,
            } => presenter.show_remote_status(field_id, rule, *available, message),
            Self::FormFailure { count } => presenter.notify_form_failure(*count),
            Self::FormSuccess => presenter.notify_form_success(),
        }
    }
}

/// 展示层接口（由宿主实现）
#[cfg_attr(test, mockall::automock)]
pub trait Presenter: Send + Sync {
    fn show_rule_message(&self, field_id: &str, rule: &str);
    fn hide_rule_message(&self, field_id: &str, rule: &str);
    fn mark_field_error(&self, field_id: &str, error: bool);
    fn mark_group_error(&self, group: &str, error: bool);
    fn mark_widget_invalid(&self, field_id: &str);
    fn show_remote_status(&self, field_id: &str, rule: &str, available: bool, message: &str);
    /// 表单被拒绝时的单条汇总通知
    fn notify_form_failure(&self, count: usize);
    fn notify_form_success(&self);
}

/// 什么都不做的展示层
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPresenter;

impl Presenter for NoopPresenter {
    fn show_rule_message(&self, _field_id: &str, _rule: &str) {}
    fn hide_rule_message(&self, _field_id: &str, _rule: &str) {}
    fn mark_field_error(&self, _field_id: &str, _error: bool) {}
    fn mark_group_error(&self, _group: &str, _error: bool) {}
    fn mark_widget_invalid(&self, _field_id: &str) {}
    fn show_remote_status(&self, _field_id: &str, _rule: &str, _available: bool, _message: &str) {}
    fn notify_form_failure(&self, _count: usize) {}
    fn notify_form_success(&self) {}
}

/// 记录所有效果的展示层，供测试与无界面宿主使用
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    effects: Mutex<Vec<Effect>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effects(&self) -> Vec<Effect> {
        self.effects.lock().clone()
    }

    /// 取出并清空已记录的效果
    pub fn take(&self) -> Vec<Effect> {
        std::mem::take(&mut *self.effects.lock())
    }

    pub fn contains(&self, effect: &Effect) -> bool {
        self.effects.lock().contains(effect)
    }

    /// 当前正在显示的规则消息（按显示/隐藏顺序重放）
    pub fn visible_messages(&self, field_id: &str) -> Vec<String> {
        let mut visible: Vec<String> = Vec::new();
        for effect in self.effects.lock().iter() {
            match effect {
                Effect::ShowRuleMessage { field_id: id, rule } if id == field_id => {
                    if !visible.contains(rule) {
                        visible.push(rule.clone());
                    }
                }
                Effect::HideRuleMessage { field_id: id, rule } if id == field_id => {
                    visible.retain(|r| r != rule);
                }
                _ => {}
            }
        }
        visible
    }

    fn record(&self, effect: Effect) {
        self.effects.lock().push(effect);
    }
}

impl Presenter for RecordingPresenter {
    fn show_rule_message(&self, field_id: &str, rule: &str) {
        self.record(Effect::show(field_id, rule));
    }

    fn hide_rule_message(&self, field_id: &str, rule: &str) {
        self.record(Effect::hide(field_id, rule));
    }

    fn mark_field_error(&self, field_id: &str, error: bool) {
        self.record(Effect::field_error(field_id, error));
    }

    fn mark_group_error(&self, group: &str, error: bool) {
        self.record(Effect::MarkGroupError {
            group: group.to_string(),
            error,
        });
    }

    fn mark_widget_invalid(&self, field_id: &str) {
        self.record(Effect::MarkWidgetInvalid {
            field_id: field_id.to_string(),
        });
    }

    fn show_remote_status(&self, field_id: &str, rule: &str, available: bool, message: &str) {
        self.record(Effect::RemoteStatus {
            field_id: field_id.to_string(),
            rule: rule.to_string(),
            available,
            message: message.to_string(),
        });
    }

    fn notify_form_failure(&self, count: usize) {
        self.record(Effect::FormFailure { count });
    }

    fn notify_form_success(&self) {
        self.record(Effect::FormSuccess);
    }
}
