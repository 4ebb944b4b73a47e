// Config Module - 配置模块

pub mod entities;

pub use entities::{
    AppConfig, AudioConfig, AvatarConfig, EmotionConfig, PartialAppConfig, PartialAudioConfig,
    PartialAvatarConfig, PartialEmotionConfig,
};
