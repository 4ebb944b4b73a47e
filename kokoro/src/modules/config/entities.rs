// Config Entities - 配置实体
//
// 只定义配置结构、部分更新合并与校验；配置的加载/持久化在外层。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::infrastructure::Capabilities;
use crate::modules::emotion::{EmotionTag, KeywordTable};

/// 音频（TTS/ASR）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    pub tts_enabled: bool,
    pub asr_enabled: bool,
    pub tts_api_url: String,
    pub asr_api_url: String,
    pub audio_format: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub enable_cache: bool,
    pub cache_dir: PathBuf,
    /// 单次尝试超时（秒）
    pub tts_timeout: f64,
    pub asr_timeout: f64,
    pub max_retries: u32,
    /// 重试间隔（秒），固定值而非指数退避
    pub retry_delay: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            tts_enabled: true,
            asr_enabled: true,
            tts_api_url: "http://127.0.0.1:8000/voice/speak".to_string(),
            asr_api_url: "http://127.0.0.1:8000/voice/transcribe".to_string(),
            audio_format: "wav".to_string(),
            sample_rate: 22050,
            channels: 1,
            enable_cache: true,
            cache_dir: PathBuf::from("audio_cache"),
            tts_timeout: 30.0,
            asr_timeout: 30.0,
            max_retries: 3,
            retry_delay: 1.0,
        }
    }
}

/// 情绪分析配置
///
/// `weights`/`hold_duration` 覆盖关键词表中对应情绪的默认值。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionConfig {
    pub enabled: bool,
    pub weights: HashMap<EmotionTag, f32>,
    pub hold_duration: HashMap<EmotionTag, f32>,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weights: HashMap::new(),
            hold_duration: HashMap::new(),
        }
    }
}

impl EmotionConfig {
    /// 把覆盖项应用到关键词表
    pub fn apply_to(&self, table: &mut KeywordTable) {
        for (tag, weight) in &self.weights {
            table.set_weight(*tag, *weight);
        }
        for (tag, hold) in &self.hold_duration {
            table.set_hold_duration(*tag, *hold);
        }
    }
}

/// 虚拟形象配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarConfig {
    pub model_path: String,
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            model_path: "models/hiyori_pro_mic.model3.json".to_string(),
            scale: 1.0,
            offset_x: 1050,
            offset_y: 600,
        }
    }
}

/// 应用配置聚合根
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub emotion: EmotionConfig,
    pub avatar: AvatarConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            emotion: EmotionConfig::default(),
            avatar: AvatarConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并部分配置更新
    pub fn merge(&mut self, partial: PartialAppConfig) {
        if let Some(audio) = partial.audio {
            if let Some(v) = audio.tts_enabled {
                self.audio.tts_enabled = v;
            }
            if let Some(v) = audio.asr_enabled {
                self.audio.asr_enabled = v;
            }
            if let Some(v) = audio.tts_api_url {
                self.audio.tts_api_url = v;
            }
            if let Some(v) = audio.asr_api_url {
                self.audio.asr_api_url = v;
            }
            if let Some(v) = audio.enable_cache {
                self.audio.enable_cache = v;
            }
            if let Some(v) = audio.tts_timeout {
                self.audio.tts_timeout = v;
            }
            if let Some(v) = audio.asr_timeout {
                self.audio.asr_timeout = v;
            }
            if let Some(v) = audio.max_retries {
                self.audio.max_retries = v;
            }
            if let Some(v) = audio.retry_delay {
                self.audio.retry_delay = v;
            }
        }

        if let Some(emotion) = partial.emotion {
            if let Some(v) = emotion.enabled {
                self.emotion.enabled = v;
            }
            if let Some(weights) = emotion.weights {
                self.emotion.weights.extend(weights);
            }
            if let Some(holds) = emotion.hold_duration {
                self.emotion.hold_duration.extend(holds);
            }
        }

        if let Some(avatar) = partial.avatar {
            if let Some(v) = avatar.model_path {
                self.avatar.model_path = v;
            }
            if let Some(v) = avatar.scale {
                self.avatar.scale = v;
            }
            if let Some(v) = avatar.offset_x {
                self.avatar.offset_x = v;
            }
            if let Some(v) = avatar.offset_y {
                self.avatar.offset_y = v;
            }
        }

        self.normalize();
    }

    /// 把数值拉回合法范围
    pub fn normalize(&mut self) {
        self.avatar.scale = self.avatar.scale.clamp(0.1, 3.0);
        self.avatar.offset_x = self.avatar.offset_x.min(3840);
        self.avatar.offset_y = self.avatar.offset_y.min(2160);
    }

    /// 校验配置与探测到的能力是否自洽
    pub fn validate(&self, caps: &Capabilities) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.audio.tts_enabled && !caps.tts_endpoint {
            errors.push("TTS enabled but ttsApiUrl is missing or invalid".to_string());
        }
        if self.audio.asr_enabled && !caps.asr_endpoint {
            errors.push("ASR enabled but asrApiUrl is missing or invalid".to_string());
        }
        if self.audio.max_retries == 0 {
            errors.push("maxRetries must be at least 1".to_string());
        }
        if self.audio.retry_delay < 0.0 {
            errors.push("retryDelay must not be negative".to_string());
        }
        if self.audio.tts_timeout <= 0.0 || self.audio.asr_timeout <= 0.0 {
            errors.push("timeouts must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// 部分配置更新（用于合并）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PartialAppConfig {
    pub audio: Option<PartialAudioConfig>,
    pub emotion: Option<PartialEmotionConfig>,
    pub avatar: Option<PartialAvatarConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PartialAudioConfig {
    pub tts_enabled: Option<bool>,
    pub asr_enabled: Option<bool>,
    pub tts_api_url: Option<String>,
    pub asr_api_url: Option<String>,
    pub enable_cache: Option<bool>,
    pub tts_timeout: Option<f64>,
    pub asr_timeout: Option<f64>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PartialEmotionConfig {
    pub enabled: Option<bool>,
    pub weights: Option<HashMap<EmotionTag, f32>>,
    pub hold_duration: Option<HashMap<EmotionTag, f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PartialAvatarConfig {
    pub model_path: Option<String>,
    pub scale: Option<f32>,
    pub offset_x: Option<u32>,
    pub offset_y: Option<u32>,
}
