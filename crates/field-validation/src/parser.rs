//! 规则链解析器
//!
//! 将声明式规则链 `rule1|rule2:p1,p2|rule3` 解析为有序的规则调用列表。
//! 解析是纯函数，结果按规则链字符串缓存。

use crate::error::{Result, ValidationError};
use crate::models::{RuleChain, RuleInvocation};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

const RULE_SEPARATOR: char = '|';
const PARAMS_SEPARATOR: char = ':';
const PARAM_SEPARATOR: char = ',';

/// 解析规则链字符串（不缓存）
///
/// 先按 `|` 切分规则，再按第一个 `:` 区分规则名与参数块，最后按 `,` 切分参数。
/// 没有 `:` 或参数块为空时参数为空列表。
pub fn parse_chain(source: &str) -> Result<RuleChain> {
    if source.is_empty() {
        return Err(ValidationError::malformed(source, "规则链不能为空"));
    }

    let mut invocations = Vec::new();

    for (i, segment) in source.split(RULE_SEPARATOR).enumerate() {
        if segment.is_empty() {
            return Err(ValidationError::malformed(
                source,
                format!("第 {} 个规则段为空", i + 1),
            ));
        }

        let (name, params) = match segment.split_once(PARAMS_SEPARATOR) {
            Some((name, block)) => (name, parse_params(block)),
            None => (segment, Vec::new()),
        };

        if name.is_empty() {
            return Err(ValidationError::malformed(
                source,
                format!("第 {} 个规则段缺少规则名", i + 1),
            ));
        }

        invocations.push(RuleInvocation::new(name, params));
    }

    Ok(RuleChain {
        source: source.to_string(),
        invocations,
    })
}

fn parse_params(block: &str) -> Vec<String> {
    if block.is_empty() {
        return Vec::new();
    }

    block.split(PARAM_SEPARATOR).map(str::to_string).collect()
}

/// 带缓存的规则链解析器
#[derive(Clone, Default)]
pub struct RuleChainParser {
    cache: Arc<DashMap<String, Arc<RuleChain>>>,
}

impl RuleChainParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析规则链，同一字符串只解析一次
    pub fn parse(&self, source: &str) -> Result<Arc<RuleChain>> {
        if let Some(chain) = self.cache.get(source) {
            return Ok(chain.clone());
        }

        let chain = Arc::new(parse_chain(source)?);
        self.cache.insert(source.to_string(), chain.clone());

        debug!(chain = %source, rules = chain.len(), "规则链已解析并缓存");
        Ok(chain)
    }

    /// 已缓存的规则链数量
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}
