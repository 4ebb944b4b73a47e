// Null Avatar Adapter - 无渲染端适配器
//
// 渲染端未接入时的替身：记录触发调用、维护可查询的状态，
// 让情绪与音频链路在无头环境（服务器、测试）下照常运转。

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::RwLock;

use super::super::ports::{AvatarPort, AvatarStatus};
use crate::modules::emotion::EmotionTag;
use crate::shared::AppResult;

struct NullState {
    expression: String,
    lip_sync_active: bool,
    model_path: Option<String>,
}

pub struct NullAvatarAdapter {
    state: RwLock<NullState>,
}

impl NullAvatarAdapter {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(NullState {
                expression: "neutral".to_string(),
                lip_sync_active: false,
                model_path: None,
            }),
        }
    }
}

impl Default for NullAvatarAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AvatarPort for NullAvatarAdapter {
    async fn set_emotion(&self, emotion: EmotionTag, intensity: f32) -> AppResult<()> {
        tracing::debug!(
            "[NullAvatar] set_emotion {} (intensity {:.3})",
            emotion,
            intensity
        );
        self.state.write().await.expression = emotion.to_expression_name().to_string();
        Ok(())
    }

    async fn start_lip_sync(&self, audio_path: &Path, intensity: f32) -> AppResult<()> {
        tracing::debug!(
            "[NullAvatar] start_lip_sync {} (intensity {:.3})",
            audio_path.display(),
            intensity
        );
        self.state.write().await.lip_sync_active = true;
        Ok(())
    }

    async fn stop_lip_sync(&self) -> AppResult<()> {
        self.state.write().await.lip_sync_active = false;
        Ok(())
    }

    async fn load_model(&self, model_path: &Path) -> AppResult<()> {
        self.state.write().await.model_path = Some(model_path.display().to_string());
        Ok(())
    }

    async fn status(&self) -> AvatarStatus {
        let state = self.state.read().await;
        AvatarStatus {
            available: false,
            current_expression: state.expression.clone(),
            lip_sync_active: state.lip_sync_active,
            model_path: state.model_path.clone(),
        }
    }
}
