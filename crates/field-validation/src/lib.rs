//! 声明式表单字段校验引擎
//!
//! 字段通过规则链字符串声明校验规则（如 `required|min:3|unique:users`），支持：
//! - 规则链解析和缓存
//! - 可扩展的规则注册表
//! - 短路求值执行，同步失败立即停止
//! - 异步唯一性校验，同一字段的新请求会取消旧请求
//! - 数组字段（`name[]`）部分通过语义
//! - 提交时只发出一条汇总通知

pub mod coordinator;
pub mod error;
pub mod group;
pub mod models;
pub mod parser;
pub mod presenter;
pub mod registry;
pub mod remote;
pub mod rules;
pub mod testing;
pub mod validator;

pub use coordinator::{FormValidationCoordinator, ResolutionEvent, SubmissionDecision};
pub use error::{Result, ValidationError};
pub use group::{GroupAggregator, GroupResult};
pub use models::{
    FieldContext, FieldState, FormField, Outcome, PendingPolicy, RuleChain, RuleInvocation,
    ValidateOptions,
};
pub use parser::{RuleChainParser, parse_chain};
pub use presenter::{Effect, NoopPresenter, Presenter, RecordingPresenter};
pub use registry::{BUILTIN_RULES, RuleRegistry};
pub use remote::{
    HttpUniquenessClient, LookupRequest, LookupResponse, RemoteCheckManager, RemoteResolution,
    UniquenessLookup,
};
pub use rules::{Rule, RuleResult};
pub use validator::{FieldOutcome, FieldValidator};
