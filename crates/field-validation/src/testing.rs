//! 测试工具
//!
//! 提供可编排的唯一性查询实现，供单元测试、集成测试和本地调试使用。

use crate::error::{Result, ValidationError};
use crate::remote::{LookupRequest, LookupResponse, UniquenessLookup};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::oneshot;

/// 可编排的唯一性查询
///
/// - 通过 [`ScriptedLookup::gate`] 为某个值挂起查询，直到测试手动放行
/// - 通过 [`ScriptedLookup::mark_taken`] 声明某个值已被占用
/// - 其他值立即返回 "available"
#[derive(Default)]
pub struct ScriptedLookup {
    gates: Mutex<HashMap<String, oneshot::Receiver<Result<LookupResponse>>>>,
    taken: Mutex<HashSet<String>>,
    requests: Mutex<Vec<LookupRequest>>,
}

impl ScriptedLookup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 为某个值挂起查询，返回放行用的发送端
    pub fn gate(&self, value: &str) -> oneshot::Sender<Result<LookupResponse>> {
        let (sender, receiver) = oneshot::channel();
        self.gates.lock().insert(value.to_string(), receiver);
        sender
    }

    pub fn mark_taken(&self, value: &str) {
        self.taken.lock().insert(value.to_string());
    }

    /// 已收到的查询次数
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<LookupRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl UniquenessLookup for ScriptedLookup {
    async fn lookup(&self, request: &LookupRequest) -> Result<LookupResponse> {
        self.requests.lock().push(request.clone());

        let gate = self.gates.lock().remove(&request.value);
        if let Some(receiver) = gate {
            return receiver.await.unwrap_or_else(|_| {
                Err(ValidationError::RemoteUnavailable("查询被放弃".to_string()))
            });
        }

        if self.taken.lock().contains(&request.value) {
            Ok(LookupResponse::taken(format!("{} 已被占用", request.value)))
        } else {
            Ok(LookupResponse::available(format!("{} 可以使用", request.value)))
        }
    }
}
