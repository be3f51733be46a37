//! 数组字段聚合
//!
//! 同名数组字段（`tags[]`）的每个元素独立校验，只要有一个元素通过，
//! 整组就算通过；只有全部元素失败时整组才失败。

use crate::models::{Outcome, PendingPolicy};
use serde::Serialize;

/// 数组字段的聚合结果
#[derive(Debug, Clone, Serialize)]
pub struct GroupResult {
    /// 去掉 `[]` 后缀的字段名
    pub group: String,
    /// (字段 ID, 元素结果)
    pub elements: Vec<(String, Outcome)>,
    /// 计为失败的元素数
    pub failures: usize,
    pub outcome: Outcome,
}

impl GroupResult {
    pub fn is_failed(&self) -> bool {
        self.outcome == Outcome::Fail
    }
}

/// 数组字段聚合器
pub struct GroupAggregator;

impl GroupAggregator {
    /// 聚合元素结果
    ///
    /// 元素为 FAIL，或在阻塞策略下为 PENDING 时计为失败。
    /// 失败数等于元素数时整组失败；空组视为通过。
    pub fn aggregate(
        group: impl Into<String>,
        elements: Vec<(String, Outcome)>,
        policy: PendingPolicy,
    ) -> GroupResult {
        let failures = elements
            .iter()
            .filter(|(_, outcome)| outcome.is_blocking(policy))
            .count();

        let outcome = if !elements.is_empty() && failures >= elements.len() {
            Outcome::Fail
        } else {
            Outcome::Pass
        };

        GroupResult {
            group: group.into(),
            elements,
            failures,
            outcome,
        }
    }
}
