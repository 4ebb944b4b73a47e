// Orchestrator - 编排层
//
// 薄接线层：持有总线、把会话引擎的流式事件接到情绪会话、
// 把音频与形象操作暴露给外部 API 层。不包含业务逻辑。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::infrastructure::{probe, Capabilities, EventBus, Event, EventKind, Handler};
use crate::modules::audio::{AudioClient, CacheInfo};
use crate::modules::avatar::{AvatarDriver, AvatarPort, AvatarStatus, NullAvatarAdapter};
use crate::modules::config::{AppConfig, PartialAppConfig};
use crate::modules::emotion::{
    EmotionRecord, EmotionSession, EmotionStatistics, EmotionTag, KeywordTable,
};
use crate::shared::{AppError, AppResult};

/// 编排层聚合状态（供状态查询接口返回）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorStatus {
    pub current_emotion: String,
    pub emotion_intensity: f32,
    pub emotion_analysis_enabled: bool,
    pub avatar: AvatarStatus,
    pub cache: CacheInfo,
    pub capabilities: Capabilities,
}

pub struct Orchestrator {
    bus: Arc<EventBus>,
    config: RwLock<AppConfig>,
    capabilities: Capabilities,
    session: Arc<EmotionSession>,
    audio: Arc<AudioClient>,
    driver: Arc<AvatarDriver>,
}

impl Orchestrator {
    /// 构建编排层：探测能力、校验配置、完成组件接线
    ///
    /// 总线由编排层显式构造并注入各组件，生命周期随编排层。
    /// 未注入渲染端时使用空适配器，情绪与音频链路照常运转。
    pub async fn new(
        mut config: AppConfig,
        avatar: Option<Arc<dyn AvatarPort>>,
    ) -> AppResult<Arc<Self>> {
        config.normalize();

        let renderer_attached = avatar.is_some();
        let capabilities = probe(&config, renderer_attached);
        config
            .validate(&capabilities)
            .map_err(|errors| AppError::ConfigError(errors.join("; ")))?;

        if config.audio.enable_cache && !capabilities.cache_dir_writable {
            tracing::warn!("[Orchestrator] Cache dir not writable, falling back to no-cache");
            config.audio.enable_cache = false;
        }

        let bus = Arc::new(EventBus::new());

        let mut table = KeywordTable::default();
        config.emotion.apply_to(&mut table);
        let session = Arc::new(EmotionSession::new(bus.clone(), table));
        session.set_enabled(config.emotion.enabled);

        let audio = Arc::new(AudioClient::new(config.audio.clone(), bus.clone())?);

        let port: Arc<dyn AvatarPort> =
            avatar.unwrap_or_else(|| Arc::new(NullAvatarAdapter::new()));
        let driver = Arc::new(AvatarDriver::new(bus.clone(), port));
        driver.attach().await;

        let orchestrator = Arc::new(Self {
            bus,
            config: RwLock::new(config),
            capabilities,
            session,
            audio,
            driver,
        });
        orchestrator.wire_conversation_events().await;

        tracing::info!("[Orchestrator] Ready");
        Ok(orchestrator)
    }

    /// 把会话引擎发布的流式事件接到情绪会话
    async fn wire_conversation_events(&self) {
        let session = self.session.clone();
        self.bus
            .subscribe(
                EventKind::ResponseStart,
                Handler::async_fn(move |_| {
                    let session = session.clone();
                    async move {
                        session.on_response_start().await;
                        Ok(())
                    }
                }),
            )
            .await;

        let session = self.session.clone();
        self.bus
            .subscribe(
                EventKind::TextChunk,
                Handler::async_fn(move |event| {
                    let session = session.clone();
                    async move {
                        if let Some(text) = event.payload["text"].as_str() {
                            session.on_text_chunk(text, event.session_id.clone()).await;
                        }
                        Ok(())
                    }
                }),
            )
            .await;

        let session = self.session.clone();
        self.bus
            .subscribe(
                EventKind::ResponseEnd,
                Handler::async_fn(move |_| {
                    let session = session.clone();
                    async move {
                        session.on_response_end().await;
                        Ok(())
                    }
                }),
            )
            .await;
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    // ---- 会话引擎直连入口（绕过总线的等价调用） ----

    pub async fn on_response_start(&self) {
        self.session.on_response_start().await;
    }

    pub async fn on_text_chunk(&self, text: &str, session_id: Option<String>) {
        self.session.on_text_chunk(text, session_id).await;
    }

    pub async fn on_response_end(&self) {
        self.session.on_response_end().await;
    }

    // ---- 音频操作 ----

    /// 文本合成语音
    pub async fn speak(&self, text: &str, output_path: Option<PathBuf>) -> AppResult<PathBuf> {
        Ok(self.audio.text_to_speech(text, output_path).await?)
    }

    /// 语音转写文本
    pub async fn transcribe(&self, audio_path: &Path) -> AppResult<String> {
        Ok(self.audio.speech_to_text(audio_path).await?)
    }

    pub async fn clear_audio_cache(&self) -> AppResult<()> {
        Ok(self.audio.clear_cache().await?)
    }

    pub async fn audio_cache_info(&self) -> CacheInfo {
        self.audio.get_cache_info().await
    }

    // ---- 形象操作 ----

    pub async fn trigger_emotion(&self, emotion: EmotionTag, intensity: f32) -> AppResult<()> {
        self.driver.trigger_emotion(emotion, intensity).await
    }

    pub async fn start_lip_sync(&self, audio_path: &Path, intensity: f32) -> AppResult<()> {
        self.driver.start_lip_sync(audio_path, intensity).await
    }

    pub async fn stop_lip_sync(&self) -> AppResult<()> {
        self.driver.stop_lip_sync().await
    }

    pub async fn load_model(&self, model_path: &Path) -> AppResult<()> {
        self.driver.load_model(model_path).await
    }

    // ---- 查询与配置 ----

    pub async fn emotion_statistics(&self) -> EmotionStatistics {
        self.session.statistics().await
    }

    pub async fn recent_emotions(&self, count: usize) -> Vec<EmotionRecord> {
        self.session.recent_records(count).await
    }

    pub async fn event_history(&self, kind: Option<EventKind>, limit: usize) -> Vec<Event> {
        self.bus.get_history(kind, limit).await
    }

    /// 应用部分配置更新并发布 `config.updated`
    ///
    /// 情绪相关项立即生效；音频端点等项写入配置，
    /// 在下次构建客户端时生效。
    pub async fn update_config(&self, partial: PartialAppConfig) -> AppResult<()> {
        let snapshot = {
            let mut config = self.config.write().await;
            config.merge(partial);

            for (tag, weight) in &config.emotion.weights {
                self.session.set_weight(*tag, *weight).await;
            }
            for (tag, hold) in &config.emotion.hold_duration {
                self.session.set_hold_duration(*tag, *hold).await;
            }
            self.session.set_enabled(config.emotion.enabled);

            serde_json::to_value(&*config)
                .map_err(|e| AppError::SerializationError(e.to_string()))?
        };

        self.bus
            .publish(EventKind::ConfigUpdated, snapshot, None)
            .await;
        Ok(())
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let (emotion, intensity) = self.session.current_emotion().await;
        OrchestratorStatus {
            current_emotion: emotion.to_string(),
            emotion_intensity: intensity,
            emotion_analysis_enabled: self.session.is_enabled(),
            avatar: self.driver.status().await,
            cache: self.audio.get_cache_info().await,
            capabilities: self.capabilities,
        }
    }
}
