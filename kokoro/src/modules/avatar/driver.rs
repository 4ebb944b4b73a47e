// Avatar Driver - 形象驱动
//
// 把总线事件翻译成端口触发调用：`emotion.detected` 驱动表情、
// `tts.completed` 驱动口型，并把已执行的触发以事件回发到总线，
// 供日志与外部 API 推送消费。

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use super::ports::{AvatarPort, AvatarStatus};
use crate::infrastructure::{EventBus, EventKind, Handler};
use crate::modules::emotion::EmotionTag;
use crate::shared::{AppError, AppResult};

pub struct AvatarDriver {
    bus: Arc<EventBus>,
    port: Arc<dyn AvatarPort>,
}

impl AvatarDriver {
    pub fn new(bus: Arc<EventBus>, port: Arc<dyn AvatarPort>) -> Self {
        Self { bus, port }
    }

    /// 注册事件订阅
    pub async fn attach(&self) {
        let bus = self.bus.clone();
        let port = self.port.clone();
        let on_emotion = Handler::async_fn(move |event| {
            let bus = bus.clone();
            let port = port.clone();
            async move {
                let emotion: EmotionTag = event
                    .payload["emotion"]
                    .as_str()
                    .ok_or_else(|| {
                        AppError::Unknown("emotion.detected payload missing emotion".to_string())
                    })?
                    .parse()
                    .map_err(AppError::Unknown)?;
                let intensity = event.payload["intensity"].as_f64().unwrap_or(1.0) as f32;

                port.set_emotion(emotion, intensity).await?;
                bus.publish(
                    EventKind::EmotionTriggered,
                    json!({
                        "emotion": emotion.to_string(),
                        "intensity": intensity,
                        "expression": emotion.to_expression_name(),
                    }),
                    event.session_id.clone(),
                )
                .await;
                Ok(())
            }
        });
        self.bus.subscribe(EventKind::EmotionDetected, on_emotion).await;

        let bus = self.bus.clone();
        let port = self.port.clone();
        let on_tts = Handler::async_fn(move |event| {
            let bus = bus.clone();
            let port = port.clone();
            async move {
                let audio_path = event
                    .payload["audioPath"]
                    .as_str()
                    .ok_or_else(|| {
                        AppError::Unknown("tts.completed payload missing audioPath".to_string())
                    })?
                    .to_string();

                port.start_lip_sync(Path::new(&audio_path), 1.0).await?;
                bus.publish(
                    EventKind::LipSyncStarted,
                    json!({
                        "audioPath": audio_path,
                        "duration": event.payload["duration"],
                    }),
                    event.session_id.clone(),
                )
                .await;
                Ok(())
            }
        });
        self.bus.subscribe(EventKind::TtsCompleted, on_tts).await;

        tracing::info!("[AvatarDriver] Attached to event bus");
    }

    /// 直接触发表情（外部 API 入口）
    pub async fn trigger_emotion(&self, emotion: EmotionTag, intensity: f32) -> AppResult<()> {
        self.port.set_emotion(emotion, intensity).await?;
        self.bus
            .publish(
                EventKind::EmotionTriggered,
                json!({
                    "emotion": emotion.to_string(),
                    "intensity": intensity,
                    "expression": emotion.to_expression_name(),
                }),
                None,
            )
            .await;
        Ok(())
    }

    /// 直接开始口型同步
    pub async fn start_lip_sync(&self, audio_path: &Path, intensity: f32) -> AppResult<()> {
        self.port.start_lip_sync(audio_path, intensity).await?;
        self.bus
            .publish(
                EventKind::LipSyncStarted,
                json!({
                    "audioPath": audio_path.display().to_string(),
                    "intensity": intensity,
                }),
                None,
            )
            .await;
        Ok(())
    }

    /// 停止口型同步
    pub async fn stop_lip_sync(&self) -> AppResult<()> {
        self.port.stop_lip_sync().await?;
        self.bus
            .publish(EventKind::LipSyncStopped, json!({}), None)
            .await;
        Ok(())
    }

    /// 加载模型
    pub async fn load_model(&self, model_path: &Path) -> AppResult<()> {
        self.port.load_model(model_path).await?;
        self.bus
            .publish(
                EventKind::ModelLoaded,
                json!({ "modelPath": model_path.display().to_string() }),
                None,
            )
            .await;
        Ok(())
    }

    pub async fn status(&self) -> AvatarStatus {
        self.port.status().await
    }
}
