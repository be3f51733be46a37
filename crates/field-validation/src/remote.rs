//! 远程唯一性校验
//!
//! `unique` 规则不在本地判定，而是发起网络查询。管理器保证同一个键
//! （资源名 + 字段）同时最多只有一个在途请求：发起新请求前先中止旧请求，
//! 旧请求即使返回也会因票据不匹配而被丢弃。
//!
//! 查询结果通过 mpsc 通道回送给协调器，协调器订阅通道而不是轮询。

use crate::error::{Result, ValidationError};
use crate::models::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};
use validation_shared::config::RemoteCheckConfig;

/// 服务端表示 "可用" 的状态值
pub const STATUS_AVAILABLE: &str = "available";

/// 唯一性查询请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupRequest {
    /// 远程资源名，如 `users`
    pub resource: String,
    pub field_id: String,
    /// 字段名，用于拼接查询端点
    pub field_name: String,
    pub value: String,
    /// 需要排除的记录 ID（如正在编辑的记录）
    pub exclude_id: Option<String>,
}

impl LookupRequest {
    /// 在途请求表的键：资源名 + 字段 ID + 规则在链中的位置
    ///
    /// 同一条链里可以出现多个针对同一资源的 `unique`，位置保证它们互不取消。
    pub fn key(&self, slot: usize) -> String {
        format!("{}:{}:{}", self.resource, self.field_id, slot)
    }
}

/// 唯一性查询响应：`{status: "available" | ..., message: string}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl LookupResponse {
    pub fn available(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_AVAILABLE.to_string(),
            message: message.into(),
        }
    }

    pub fn taken(message: impl Into<String>) -> Self {
        Self {
            status: "taken".to_string(),
            message: message.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == STATUS_AVAILABLE
    }
}

/// 唯一性查询传输层
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UniquenessLookup: Send + Sync {
    async fn lookup(&self, request: &LookupRequest) -> Result<LookupResponse>;
}

// ---------------------------------------------------------------------------
// HTTP 实现
// ---------------------------------------------------------------------------

/// 基于 reqwest 的唯一性查询客户端
///
/// `GET {base_url}{check_path}?value=..&id=..`，`check_path` 中的
/// `{resource}` 和 `{field}` 会被替换。超时属于传输层，由配置决定。
pub struct HttpUniquenessClient {
    client: reqwest::Client,
    config: RemoteCheckConfig,
}

impl HttpUniquenessClient {
    pub fn new(config: &RemoteCheckConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ValidationError::RemoteUnavailable(format!("创建 HTTP 客户端失败: {e}")))?;

        info!(
            base_url = %config.base_url,
            check_path = %config.check_path,
            timeout_seconds = config.timeout_seconds,
            "唯一性查询客户端已初始化"
        );

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// 拼接查询端点
    pub fn endpoint(&self, request: &LookupRequest) -> String {
        self.config.endpoint(&request.resource, &request.field_name)
    }
}

#[async_trait]
impl UniquenessLookup for HttpUniquenessClient {
    async fn lookup(&self, request: &LookupRequest) -> Result<LookupResponse> {
        let url = self.endpoint(request);

        let mut query = vec![("value", request.value.as_str())];
        if let Some(id) = &request.exclude_id {
            query.push(("id", id.as_str()));
        }

        debug!(url = %url, "发起唯一性查询");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<LookupResponse>().await?)
    }
}

// ---------------------------------------------------------------------------
// 在途请求管理
// ---------------------------------------------------------------------------

/// 在途请求的取消句柄
#[derive(Debug)]
pub struct PendingRequest {
    pub ticket: u64,
    pub field_id: String,
    pub generation: u64,
    handle: AbortHandle,
}

/// 远程查询完成后回送给协调器的消息
#[derive(Debug)]
pub struct RemoteResolution {
    pub key: String,
    pub ticket: u64,
    pub field_id: String,
    /// 发起查询的规则名，用于展示消息
    pub rule: String,
    /// 发起查询时字段的校验轮次
    pub generation: u64,
    pub result: Result<LookupResponse>,
}

/// 远程校验管理器
///
/// 在途请求表由管理器独占，所有修改都经过 `&mut self`，
/// 因此 "中止旧请求 + 登记新请求" 不会与其他操作交错。
/// 管理器被 drop 时中止所有在途请求。
pub struct RemoteCheckManager {
    lookup: Arc<dyn UniquenessLookup>,
    in_flight: HashMap<String, PendingRequest>,
    next_ticket: u64,
    sender: mpsc::UnboundedSender<RemoteResolution>,
}

impl RemoteCheckManager {
    /// 创建管理器，返回接收查询结果的通道
    pub fn new(
        lookup: Arc<dyn UniquenessLookup>,
    ) -> (Self, mpsc::UnboundedReceiver<RemoteResolution>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let manager = Self {
            lookup,
            in_flight: HashMap::new(),
            next_ticket: 0,
            sender,
        };
        (manager, receiver)
    }

    /// 发起远程校验，立即返回 PENDING
    ///
    /// `slot` 为规则在链中的位置。查询任务需要 Tokio 运行时，
    /// 当前线程没有运行时返回 [`ValidationError::RemoteUnavailable`]，不登记任何请求。
    #[instrument(skip(self, request), fields(field_id = %request.field_id))]
    pub fn check(
        &mut self,
        rule: &str,
        request: LookupRequest,
        slot: usize,
        generation: u64,
    ) -> Result<Outcome> {
        let runtime = Handle::try_current().map_err(|e| {
            ValidationError::RemoteUnavailable(format!("没有可用的 Tokio 运行时: {e}"))
        })?;

        let key = request.key(slot);
        if self.cancel(&key) {
            debug!(key = %key, "已中止同键的旧请求");
        }

        self.next_ticket += 1;
        let ticket = self.next_ticket;

        let lookup = self.lookup.clone();
        let field_id = request.field_id.clone();
        let query = runtime.spawn(async move { lookup.lookup(&request).await });
        let handle = query.abort_handle();

        // 监督查询任务：正常结束或 panic 都回送结果，保证在途表会被清理；
        // 被中止时不回送，取消方已经移除了登记
        let sender = self.sender.clone();
        let resolution_key = key.clone();
        let resolution_field = field_id.clone();
        let rule = rule.to_string();
        runtime.spawn(async move {
            let result = match query.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => return,
                Err(e) => Err(ValidationError::RemoteUnavailable(format!("查询任务异常退出: {e}"))),
            };
            let resolution = RemoteResolution {
                key: resolution_key,
                ticket,
                field_id: resolution_field,
                rule,
                generation,
                result,
            };
            // 接收端已关闭说明协调器已不存在，结果无人关心
            let _ = sender.send(resolution);
        });

        self.in_flight.insert(
            key.clone(),
            PendingRequest {
                ticket,
                field_id,
                generation,
                handle,
            },
        );

        metrics::counter!("remote_checks_total", "event" => "issued").increment(1);
        debug!(key = %key, ticket, "远程校验已发起");

        Ok(Outcome::Pending)
    }

    /// 判断查询结果是否仍然有效，有效时从在途表中移除
    ///
    /// 被中止或被新请求取代的结果返回 false，调用方应直接丢弃。
    pub fn accept(&mut self, resolution: &RemoteResolution) -> bool {
        match self.in_flight.get(&resolution.key) {
            Some(pending) if pending.ticket == resolution.ticket => {
                self.in_flight.remove(&resolution.key);
                true
            }
            _ => {
                metrics::counter!("remote_checks_total", "event" => "discarded").increment(1);
                debug!(
                    key = %resolution.key,
                    ticket = resolution.ticket,
                    "丢弃过期的远程校验结果"
                );
                false
            }
        }
    }

    /// 中止某个键的在途请求
    pub fn cancel(&mut self, key: &str) -> bool {
        match self.in_flight.remove(key) {
            Some(pending) => {
                pending.handle.abort();
                metrics::counter!("remote_checks_total", "event" => "cancelled").increment(1);
                true
            }
            None => false,
        }
    }

    /// 中止某个字段的所有在途请求，返回中止数量
    pub fn cancel_field(&mut self, field_id: &str) -> usize {
        let keys: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, p)| p.field_id == field_id)
            .map(|(k, _)| k.clone())
            .collect();

        keys.iter().filter(|key| self.cancel(key)).count()
    }

    /// 中止全部在途请求
    pub fn cancel_all(&mut self) {
        let count = self.in_flight.len();
        for (_, pending) in self.in_flight.drain() {
            pending.handle.abort();
        }
        if count > 0 {
            warn!(count, "已中止全部在途远程校验");
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn pending(&self, key: &str) -> Option<&PendingRequest> {
        self.in_flight.get(key)
    }
}

impl Drop for RemoteCheckManager {
    fn drop(&mut self) {
        for (_, pending) in self.in_flight.drain() {
            pending.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLookup;

    fn request(field_id: &str, value: &str) -> LookupRequest {
        LookupRequest {
            resource: "users".to_string(),
            field_id: field_id.to_string(),
            field_name: field_id.to_string(),
            value: value.to_string(),
            exclude_id: None,
        }
    }

    #[test]
    fn test_lookup_key() {
        let req = request("email", "a@b.com");
        assert_eq!(req.key(0), "users:email:0");
        assert_ne!(req.key(0), req.key(1));
    }

    #[test]
    fn test_lookup_response() {
        let response: LookupResponse =
            serde_json::from_str(r#"{"status": "available", "message": "可以使用"}"#).unwrap();
        assert!(response.is_available());

        let response: LookupResponse = serde_json::from_str(r#"{"status": "taken"}"#).unwrap();
        assert!(!response.is_available());
        assert_eq!(response.message, "");
    }

    #[test]
    fn test_http_endpoint() {
        let config = RemoteCheckConfig {
            base_url: "https://example.com/".to_string(),
            ..Default::default()
        };
        let client = HttpUniquenessClient::new(&config).unwrap();

        assert_eq!(
            client.endpoint(&request("email", "a@b.com")),
            "https://example.com/ajax/users/check/email"
        );
    }

    #[tokio::test]
    async fn test_check_returns_pending_and_resolves() {
        let mut lookup = MockUniquenessLookup::new();
        lookup
            .expect_lookup()
            .times(1)
            .returning(|_| Ok(LookupResponse::available("可以使用")));

        let (mut manager, mut receiver) = RemoteCheckManager::new(Arc::new(lookup));

        let outcome = manager
            .check("unique", request("email", "a@b.com"), 0, 1)
            .unwrap();
        assert_eq!(outcome, Outcome::Pending);
        assert!(manager.is_in_flight("users:email:0"));

        let resolution = receiver.recv().await.unwrap();
        assert_eq!(resolution.field_id, "email");
        assert_eq!(resolution.generation, 1);
        assert!(resolution.result.as_ref().unwrap().is_available());

        assert!(manager.accept(&resolution));
        assert_eq!(manager.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_is_delivered() {
        let mut lookup = MockUniquenessLookup::new();
        lookup
            .expect_lookup()
            .returning(|_| Err(ValidationError::RemoteUnavailable("502".to_string())));

        let (mut manager, mut receiver) = RemoteCheckManager::new(Arc::new(lookup));
        manager
            .check("unique", request("email", "a@b.com"), 0, 1)
            .unwrap();

        let resolution = receiver.recv().await.unwrap();
        assert!(matches!(
            resolution.result,
            Err(ValidationError::RemoteUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_new_check_cancels_previous_for_same_key() {
        let lookup = ScriptedLookup::new();
        let first_gate = lookup.gate("old@b.com");
        let second_gate = lookup.gate("new@b.com");

        let (mut manager, mut receiver) = RemoteCheckManager::new(lookup.clone());

        manager
            .check("unique", request("email", "old@b.com"), 0, 1)
            .unwrap();
        let first_ticket = manager.pending("users:email:0").unwrap().ticket;

        manager
            .check("unique", request("email", "new@b.com"), 0, 2)
            .unwrap();
        assert_eq!(manager.in_flight(), 1);
        assert_ne!(manager.pending("users:email:0").unwrap().ticket, first_ticket);

        let _ = first_gate.send(Ok(LookupResponse::available("")));
        let _ = second_gate.send(Ok(LookupResponse::available("")));

        let resolution = receiver.recv().await.unwrap();
        assert_eq!(resolution.generation, 2);
        assert!(manager.accept(&resolution));

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_resolution_is_discarded() {
        let lookup = ScriptedLookup::new();
        let (mut manager, _receiver) = RemoteCheckManager::new(lookup);

        manager
            .check("unique", request("email", "a@b.com"), 0, 1)
            .unwrap();
        let current = manager.pending("users:email:0").unwrap().ticket;

        let stale = RemoteResolution {
            key: "users:email:0".to_string(),
            ticket: current + 100,
            field_id: "email".to_string(),
            rule: "unique".to_string(),
            generation: 1,
            result: Ok(LookupResponse::available("")),
        };

        assert!(!manager.accept(&stale));
        assert!(manager.is_in_flight("users:email:0"));
    }

    #[tokio::test]
    async fn test_different_fields_do_not_cancel_each_other() {
        let lookup = ScriptedLookup::new();
        let _gate_a = lookup.gate("a");
        let _gate_b = lookup.gate("b");
        let (mut manager, _receiver) = RemoteCheckManager::new(lookup);

        manager.check("unique", request("tags-0", "a"), 0, 1).unwrap();
        manager.check("unique", request("tags-1", "b"), 0, 1).unwrap();

        assert_eq!(manager.in_flight(), 2);
        assert_eq!(manager.cancel_field("tags-0"), 1);
        assert_eq!(manager.in_flight(), 1);

        manager.cancel_all();
        assert_eq!(manager.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_same_resource_in_one_chain_uses_separate_slots() {
        let lookup = ScriptedLookup::new();
        let _gate = lookup.gate("alice");
        let (mut manager, _receiver) = RemoteCheckManager::new(lookup);

        manager.check("unique", request("user", "alice"), 0, 1).unwrap();
        manager.check("unique", request("user", "alice"), 1, 1).unwrap();

        assert_eq!(manager.in_flight(), 2);
    }

    #[test]
    fn test_check_without_runtime_is_unavailable() {
        let (mut manager, _receiver) = RemoteCheckManager::new(ScriptedLookup::new());

        let err = manager
            .check("unique", request("email", "a@b.com"), 0, 1)
            .unwrap_err();

        assert_eq!(err.code(), "REMOTE_CHECK_UNAVAILABLE");
        assert_eq!(manager.in_flight(), 0);
    }

    struct PanickingLookup;

    #[async_trait]
    impl UniquenessLookup for PanickingLookup {
        async fn lookup(&self, _request: &LookupRequest) -> Result<LookupResponse> {
            panic!("lookup backend crashed");
        }
    }

    #[tokio::test]
    async fn test_panicking_lookup_still_resolves() {
        let (mut manager, mut receiver) = RemoteCheckManager::new(Arc::new(PanickingLookup));
        manager
            .check("unique", request("email", "a@b.com"), 0, 1)
            .unwrap();

        let resolution = receiver.recv().await.unwrap();

        assert!(matches!(
            resolution.result,
            Err(ValidationError::RemoteUnavailable(_))
        ));
        assert!(manager.accept(&resolution));
        assert_eq!(manager.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_lookup_sends_nothing() {
        let lookup = ScriptedLookup::new();
        let _gate = lookup.gate("a@b.com");
        let (mut manager, mut receiver) = RemoteCheckManager::new(lookup);

        manager
            .check("unique", request("email", "a@b.com"), 0, 1)
            .unwrap();
        tokio::task::yield_now().await;
        assert!(manager.cancel("users:email:0"));

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(receiver.try_recv().is_err());
    }
}
