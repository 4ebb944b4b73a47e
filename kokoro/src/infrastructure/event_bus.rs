// Event Bus - 事件总线
//
// 进程内发布/订阅中枢：类型化事件、有界历史记录、订阅者故障隔离。
// 同步阻塞型订阅者通过有界工作池执行，不会阻塞协作式调度器。

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, Semaphore};

use crate::shared::{AppError, AppResult};

/// 事件历史记录上限，超出时淘汰最旧条目
pub const MAX_HISTORY: usize = 1000;

/// 阻塞型订阅者工作池容量，饱和时后续调用排队等待
const WORKER_POOL_SIZE: usize = 8;

/// 事件类型
///
/// 封闭集合：字符串到枚举的转换只发生在 API 边界（`FromStr`），
/// 未注册的字符串在构造时即被拒绝，而不是在分发内部失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "ai.response_start")]
    ResponseStart,
    #[serde(rename = "ai.text_chunk")]
    TextChunk,
    #[serde(rename = "ai.response_end")]
    ResponseEnd,
    #[serde(rename = "emotion.detected")]
    EmotionDetected,
    #[serde(rename = "emotion.triggered")]
    EmotionTriggered,
    #[serde(rename = "lip_sync.started")]
    LipSyncStarted,
    #[serde(rename = "lip_sync.stopped")]
    LipSyncStopped,
    #[serde(rename = "model.loaded")]
    ModelLoaded,
    #[serde(rename = "config.updated")]
    ConfigUpdated,
    #[serde(rename = "tts.completed")]
    TtsCompleted,
    #[serde(rename = "asr.completed")]
    AsrCompleted,
}

impl EventKind {
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::ResponseStart,
            EventKind::TextChunk,
            EventKind::ResponseEnd,
            EventKind::EmotionDetected,
            EventKind::EmotionTriggered,
            EventKind::LipSyncStarted,
            EventKind::LipSyncStopped,
            EventKind::ModelLoaded,
            EventKind::ConfigUpdated,
            EventKind::TtsCompleted,
            EventKind::AsrCompleted,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ResponseStart => "ai.response_start",
            EventKind::TextChunk => "ai.text_chunk",
            EventKind::ResponseEnd => "ai.response_end",
            EventKind::EmotionDetected => "emotion.detected",
            EventKind::EmotionTriggered => "emotion.triggered",
            EventKind::LipSyncStarted => "lip_sync.started",
            EventKind::LipSyncStopped => "lip_sync.stopped",
            EventKind::ModelLoaded => "model.loaded",
            EventKind::ConfigUpdated => "config.updated",
            EventKind::TtsCompleted => "tts.completed",
            EventKind::AsrCompleted => "asr.completed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::all()
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| AppError::InvalidEventKind(s.to_string()))
    }
}

/// 事件
///
/// 一经创建不可变；payload 为 JSON 对象
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, payload: Value, session_id: Option<String>) -> Self {
        Self {
            kind,
            payload,
            timestamp: Utc::now(),
            session_id,
        }
    }
}

type AsyncHandlerFn = Arc<dyn Fn(Event) -> BoxFuture<'static, AppResult<()>> + Send + Sync>;
type BlockingHandlerFn = Arc<dyn Fn(Event) -> AppResult<()> + Send + Sync>;

/// 订阅者回调
///
/// `Async` 在共享调度器上执行；`Blocking` 转移到有界工作池，
/// 避免同步代码阻塞事件循环。克隆共享同一份闭包，
/// `unsubscribe` 按指针相等匹配。
#[derive(Clone)]
pub enum Handler {
    Async(AsyncHandlerFn),
    Blocking(BlockingHandlerFn),
}

impl Handler {
    /// 包装异步回调
    pub fn async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = AppResult<()>> + Send + 'static,
    {
        Handler::Async(Arc::new(move |event| Box::pin(f(event))))
    }

    /// 包装同步（可能阻塞的）回调
    pub fn blocking_fn<F>(f: F) -> Self
    where
        F: Fn(Event) -> AppResult<()> + Send + Sync + 'static,
    {
        Handler::Blocking(Arc::new(f))
    }

    fn ptr_eq(&self, other: &Handler) -> bool {
        match (self, other) {
            (Handler::Async(a), Handler::Async(b)) => Arc::ptr_eq(a, b),
            (Handler::Blocking(a), Handler::Blocking(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Async(_) => write!(f, "Handler::Async"),
            Handler::Blocking(_) => write!(f, "Handler::Blocking"),
        }
    }
}

/// 事件总线
///
/// 订阅者列表按注册顺序保存；`publish` 按该顺序发起调用，
/// 各回调并发执行，完成顺序不做保证。回调失败只记录日志，
/// 既不会传播给 `publish` 的调用者，也不会阻止其他回调执行。
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<Handler>>>,
    history: Mutex<VecDeque<Event>>,
    worker_pool: Arc<Semaphore>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(MAX_HISTORY)),
            worker_pool: Arc::new(Semaphore::new(WORKER_POOL_SIZE)),
        }
    }

    /// 订阅事件
    ///
    /// 重复注册会追加第二个条目（回调将被调用两次），
    /// 幂等性由调用方负责。
    pub async fn subscribe(&self, kind: EventKind, handler: Handler) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.entry(kind).or_default().push(handler);
        tracing::debug!("[EventBus] Subscribed to {}", kind);
    }

    /// 取消订阅
    ///
    /// 移除第一个指针相等的回调；不存在时静默返回。
    pub async fn unsubscribe(&self, kind: EventKind, handler: &Handler) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(handlers) = subscribers.get_mut(&kind) {
            if let Some(pos) = handlers.iter().position(|h| h.ptr_eq(handler)) {
                handlers.remove(pos);
                tracing::debug!("[EventBus] Unsubscribed from {}", kind);
            }
        }
    }

    /// 发布事件
    ///
    /// 先追加历史（满则淘汰最旧），再并发调用当前注册的所有回调，
    /// 全部完成（或失败）后返回。等待期间协作式让出，
    /// 不阻塞事件循环上的其他活动。
    pub async fn publish(&self, kind: EventKind, payload: Value, session_id: Option<String>) {
        let event = Event::new(kind, payload, session_id);
        tracing::debug!("[EventBus] Publishing event: {}", kind);

        {
            let mut history = self.history.lock().await;
            if history.len() >= MAX_HISTORY {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        let handlers: Vec<Handler> = {
            let subscribers = self.subscribers.read().await;
            subscribers.get(&kind).cloned().unwrap_or_default()
        };

        if handlers.is_empty() {
            return;
        }

        let mut tasks = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let event = event.clone();
            match handler {
                Handler::Async(f) => {
                    tasks.push(tokio::spawn(async move { f(event).await }));
                }
                Handler::Blocking(f) => {
                    // 排队等待工作池空位，保持注册顺序的调用时序
                    let permit = self
                        .worker_pool
                        .clone()
                        .acquire_owned()
                        .await
                        .expect("worker pool semaphore closed");
                    tasks.push(tokio::spawn(async move {
                        let _permit = permit;
                        tokio::task::spawn_blocking(move || f(event))
                            .await
                            .unwrap_or_else(|e| {
                                Err(AppError::Unknown(format!("blocking handler: {}", e)))
                            })
                    }));
                }
            }
        }

        for task in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!("[EventBus] Handler for {} failed: {}", kind, e);
                }
                Err(e) if e.is_panic() => {
                    tracing::warn!("[EventBus] Handler for {} panicked", kind);
                }
                Err(e) => {
                    tracing::warn!("[EventBus] Handler task for {} aborted: {}", kind, e);
                }
            }
        }
    }

    /// 获取事件历史
    ///
    /// 返回最近 `limit` 条，可按类型过滤，最新的在末尾。
    pub async fn get_history(&self, kind: Option<EventKind>, limit: usize) -> Vec<Event> {
        let history = self.history.lock().await;
        let filtered: Vec<Event> = history
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .cloned()
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).collect()
    }

    /// 清空事件历史
    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
        tracing::info!("[EventBus] History cleared");
    }

    /// 某事件类型当前的订阅者数量
    pub async fn subscriber_count(&self, kind: EventKind) -> usize {
        let subscribers = self.subscribers.read().await;
        subscribers.get(&kind).map_or(0, |h| h.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_kind_round_trip() {
        for kind in EventKind::all() {
            let parsed: EventKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, *kind);
        }
    }

    #[test]
    fn test_unknown_event_kind_rejected() {
        let err = "live2d_frob".parse::<EventKind>().unwrap_err();
        assert!(matches!(err, AppError::InvalidEventKind(s) if s == "live2d_frob"));
    }

    #[tokio::test]
    async fn test_history_bounded() {
        let bus = EventBus::new();
        for i in 0..(MAX_HISTORY + 5) {
            bus.publish(EventKind::TextChunk, json!({ "seq": i }), None)
                .await;
        }
        let history = bus.get_history(None, MAX_HISTORY + 100).await;
        assert_eq!(history.len(), MAX_HISTORY);
        // 最旧的 5 条已被淘汰
        assert_eq!(history[0].payload["seq"], 5);
        assert_eq!(history.last().unwrap().payload["seq"], MAX_HISTORY + 4);
    }

    #[tokio::test]
    async fn test_history_filter_and_limit() {
        let bus = EventBus::new();
        bus.publish(EventKind::TextChunk, json!({"n": 1}), None).await;
        bus.publish(EventKind::ModelLoaded, json!({"n": 2}), None).await;
        bus.publish(EventKind::TextChunk, json!({"n": 3}), None).await;

        let chunks = bus.get_history(Some(EventKind::TextChunk), 10).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].payload["n"], 1);
        assert_eq!(chunks[1].payload["n"], 3);

        let latest = bus.get_history(None, 1).await;
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].payload["n"], 3);
    }

    #[tokio::test]
    async fn test_duplicate_subscription_fires_twice() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handler = Handler::async_fn(move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        bus.subscribe(EventKind::ModelLoaded, handler.clone()).await;
        bus.subscribe(EventKind::ModelLoaded, handler.clone()).await;
        assert_eq!(bus.subscriber_count(EventKind::ModelLoaded).await, 2);

        bus.publish(EventKind::ModelLoaded, json!({}), None).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_single_entry() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handler = Handler::async_fn(move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        bus.subscribe(EventKind::ConfigUpdated, handler.clone()).await;
        bus.subscribe(EventKind::ConfigUpdated, handler.clone()).await;
        bus.unsubscribe(EventKind::ConfigUpdated, &handler).await;
        assert_eq!(bus.subscriber_count(EventKind::ConfigUpdated).await, 1);

        // 不存在的回调：静默无操作
        let other = Handler::async_fn(|_| async { Ok(()) });
        bus.unsubscribe(EventKind::ConfigUpdated, &other).await;
        assert_eq!(bus.subscriber_count(EventKind::ConfigUpdated).await, 1);

        bus.publish(EventKind::ConfigUpdated, json!({}), None).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_handler_is_isolated() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.subscribe(
            EventKind::EmotionDetected,
            Handler::async_fn(|_| async { Err(AppError::Unknown("boom".into())) }),
        )
        .await;
        let c = count.clone();
        bus.subscribe(
            EventKind::EmotionDetected,
            Handler::async_fn(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .await;

        bus.publish(EventKind::EmotionDetected, json!({}), None).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.subscribe(
            EventKind::TtsCompleted,
            Handler::async_fn(|event| async move {
                // 故意 panic：对不存在的字段 unwrap
                let _ = event.payload["missing"].as_str().unwrap();
                Ok(())
            }),
        )
        .await;
        let c = count.clone();
        bus.subscribe(
            EventKind::TtsCompleted,
            Handler::async_fn(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .await;

        bus.publish(EventKind::TtsCompleted, json!({}), None).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blocking_handler_runs_on_worker_pool() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe(
            EventKind::AsrCompleted,
            Handler::blocking_fn(move |event| {
                std::thread::sleep(std::time::Duration::from_millis(5));
                assert_eq!(event.kind, EventKind::AsrCompleted);
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .await;

        bus.publish(EventKind::AsrCompleted, json!({"text": "你好"}), None)
            .await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_id_carried_on_event() {
        let bus = EventBus::new();
        bus.publish(
            EventKind::TextChunk,
            json!({"text": "嗯"}),
            Some("sess-1".to_string()),
        )
        .await;
        let history = bus.get_history(Some(EventKind::TextChunk), 1).await;
        assert_eq!(history[0].session_id.as_deref(), Some("sess-1"));
    }
}
