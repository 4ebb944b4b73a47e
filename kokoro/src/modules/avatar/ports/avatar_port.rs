use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

use crate::modules::emotion::EmotionTag;
use crate::shared::AppResult;

/// 虚拟形象状态
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarStatus {
    pub available: bool,
    pub current_expression: String,
    pub lip_sync_active: bool,
    pub model_path: Option<String>,
}

/// 虚拟形象端口 - 渲染端的窄触发接口
///
/// 渲染（窗口、OpenGL 绘制、模型解析、口型计算）都在外部；
/// 本核心只通过这些触发调用驱动它，并查询状态。
#[async_trait]
pub trait AvatarPort: Send + Sync {
    /// 设置表情与强度
    async fn set_emotion(&self, emotion: EmotionTag, intensity: f32) -> AppResult<()>;

    /// 以音频文件驱动口型同步
    async fn start_lip_sync(&self, audio_path: &Path, intensity: f32) -> AppResult<()>;

    /// 停止口型同步
    async fn stop_lip_sync(&self) -> AppResult<()>;

    /// 加载模型文件
    async fn load_model(&self, model_path: &Path) -> AppResult<()>;

    /// 当前状态
    async fn status(&self) -> AvatarStatus;
}
