// Audio Module - 音频模块
//
// 远程 TTS/ASR 的缓存重试客户端：
// - wav: WAV 文件探测与校验
// - cache: 按文本内容寻址的音频缓存
// - client: 带重试与事件发布的 HTTP 客户端

pub mod cache;
pub mod client;
pub mod wav;

pub use cache::{cache_key, AudioCache, CacheInfo};
pub use client::AudioClient;
pub use wav::WavInfo;

use thiserror::Error;

/// 音频子系统错误
#[derive(Debug, Error)]
pub enum AudioError {
    /// 重试耗尽后远端返回非 2xx
    #[error("Remote service error: HTTP {status} - {detail}")]
    RemoteService { status: u16, detail: String },

    /// 重试耗尽后的传输层故障
    #[error("Network error: {0}")]
    Network(String),

    /// WAV 文件缺失、损坏或参数不受支持
    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),

    /// 功能启用但所需配置缺失
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 缓存读写失败（记录日志后回退到无缓存路径，不致命）
    #[error("Cache IO error: {0}")]
    CacheIo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
