// Emotion Session - 情绪会话
//
// 包装分类器的有状态服务：跟踪当前情绪、应用衰减定时器、
// 在情绪变化时通过事件总线发布 `emotion.detected`。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::super::domain::{classify, EmotionTag, KeywordTable};
use crate::infrastructure::{EventBus, EventKind};

/// 情绪历史记录上限
pub const MAX_EMOTION_HISTORY: usize = 50;

/// 一次情绪检测的记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionRecord {
    pub emotion: EmotionTag,
    pub intensity: f32,
    pub source_text: String,
    pub timestamp: DateTime<Utc>,
}

/// 单个情绪的统计
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionTagStats {
    pub count: usize,
    pub avg_intensity: f32,
    pub percentage: f32,
}

/// 情绪历史统计
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionStatistics {
    pub total: usize,
    pub emotions: HashMap<EmotionTag, EmotionTagStats>,
}

struct SessionState {
    emotion: EmotionTag,
    intensity: f32,
    history: VecDeque<EmotionRecord>,
}

impl SessionState {
    fn reset(&mut self) {
        self.emotion = EmotionTag::Neutral;
        self.intensity = 1.0;
    }
}

/// 情绪会话状态机
///
/// 状态只被 `on_text_chunk` 与衰减定时器修改；一次响应内
/// 首个检测到的非中性情绪保持有效，直到出现不同的情绪。
pub struct EmotionSession {
    bus: Arc<EventBus>,
    table: RwLock<KeywordTable>,
    state: Arc<RwLock<SessionState>>,
    enabled: AtomicBool,
    pending_decay: Mutex<Option<JoinHandle<()>>>,
}

impl EmotionSession {
    pub fn new(bus: Arc<EventBus>, table: KeywordTable) -> Self {
        Self {
            bus,
            table: RwLock::new(table),
            state: Arc::new(RwLock::new(SessionState {
                emotion: EmotionTag::Neutral,
                intensity: 1.0,
                history: VecDeque::new(),
            })),
            enabled: AtomicBool::new(true),
            pending_decay: Mutex::new(None),
        }
    }

    /// 响应开始：取消未完成的衰减并强制回到中性（不发布事件）
    pub async fn on_response_start(&self) {
        self.cancel_pending_decay().await;
        self.state.write().await.reset();
    }

    /// 响应文本块：实时情绪分析
    ///
    /// 获胜情绪与当前不同且非中性时转移状态、记录历史并发布
    /// `emotion.detected`；相同或中性时不做任何事。
    pub async fn on_text_chunk(&self, text: &str, session_id: Option<String>) {
        if !self.enabled.load(Ordering::SeqCst) || text.trim().is_empty() {
            return;
        }

        let classification = {
            let table = self.table.read().await;
            classify(text, &table)
        };
        if classification.tag == EmotionTag::Neutral {
            return;
        }

        let changed = {
            let mut state = self.state.write().await;
            if classification.tag == state.emotion {
                false
            } else {
                state.emotion = classification.tag;
                state.intensity = classification.intensity;
                if state.history.len() >= MAX_EMOTION_HISTORY {
                    state.history.pop_front();
                }
                state.history.push_back(EmotionRecord {
                    emotion: classification.tag,
                    intensity: classification.intensity,
                    source_text: text.to_string(),
                    timestamp: Utc::now(),
                });
                true
            }
        };

        if changed {
            tracing::debug!(
                "[EmotionSession] Detected {} (intensity {:.3})",
                classification.tag,
                classification.intensity
            );
            self.bus
                .publish(
                    EventKind::EmotionDetected,
                    json!({
                        "emotion": classification.tag.to_string(),
                        "intensity": classification.intensity,
                        "text": text,
                    }),
                    session_id,
                )
                .await;
        }
    }

    /// 响应结束：非阻塞衰减
    ///
    /// 经过当前情绪配置的保持时长后回到中性。定时器在后台任务中
    /// 运行，不挂起调用方；新的定时器替换旧的。
    pub async fn on_response_end(&self) {
        let hold = {
            let state = self.state.read().await;
            let table = self.table.read().await;
            table.hold_duration(state.emotion)
        };

        let state = self.state.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            state.write().await.reset();
        });

        let mut pending = self.pending_decay.lock().await;
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
    }

    async fn cancel_pending_decay(&self) {
        if let Some(handle) = self.pending_decay.lock().await.take() {
            handle.abort();
        }
    }

    /// 启用/禁用情绪分析；禁用时 `on_text_chunk` 为空操作
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        tracing::info!("[EmotionSession] Analysis {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// 当前情绪与强度
    pub async fn current_emotion(&self) -> (EmotionTag, f32) {
        let state = self.state.read().await;
        (state.emotion, state.intensity)
    }

    /// 最近 `count` 条情绪记录，最新的在末尾
    pub async fn recent_records(&self, count: usize) -> Vec<EmotionRecord> {
        let state = self.state.read().await;
        let skip = state.history.len().saturating_sub(count);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// 情绪历史统计
    pub async fn statistics(&self) -> EmotionStatistics {
        let state = self.state.read().await;
        let total = state.history.len();
        let mut counts: HashMap<EmotionTag, (usize, f32)> = HashMap::new();
        for record in &state.history {
            let slot = counts.entry(record.emotion).or_insert((0, 0.0));
            slot.0 += 1;
            slot.1 += record.intensity;
        }
        let emotions = counts
            .into_iter()
            .map(|(tag, (count, sum))| {
                (
                    tag,
                    EmotionTagStats {
                        count,
                        avg_intensity: sum / count as f32,
                        percentage: count as f32 / total as f32 * 100.0,
                    },
                )
            })
            .collect();
        EmotionStatistics { total, emotions }
    }

    /// 清空情绪历史
    pub async fn clear_history(&self) {
        self.state.write().await.history.clear();
        tracing::info!("[EmotionSession] History cleared");
    }

    /// 追加情绪关键词
    pub async fn add_keywords(&self, tag: EmotionTag, keywords: Vec<String>) {
        self.table.write().await.add_keywords(tag, keywords);
    }

    /// 设置情绪权重
    pub async fn set_weight(&self, tag: EmotionTag, weight: f32) {
        self.table.write().await.set_weight(tag, weight);
    }

    /// 设置情绪保持时长（秒）
    pub async fn set_hold_duration(&self, tag: EmotionTag, hold_secs: f32) {
        self.table.write().await.set_hold_duration(tag, hold_secs);
    }
}
