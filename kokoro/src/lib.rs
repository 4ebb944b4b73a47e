// Kokoro - 数字人情绪与语音编排核心
//
// 事件驱动的情绪与音频编排层：进程内发布/订阅总线、
// 流式关键词情绪分类（带衰减语义）、远程 TTS/ASR 的缓存重试客户端。
// 渲染端只通过窄触发接口驱动，不在本核心内。

pub mod infrastructure;
pub mod modules;
pub mod orchestrator;
pub mod shared;

pub use infrastructure::{probe, Capabilities, Event, EventBus, EventKind, Handler};
pub use modules::audio::{AudioCache, AudioClient, AudioError, CacheInfo};
pub use modules::avatar::{AvatarDriver, AvatarPort, AvatarStatus, NullAvatarAdapter};
pub use modules::config::{AppConfig, AudioConfig, EmotionConfig, PartialAppConfig};
pub use modules::emotion::{
    classify, Classification, EmotionSession, EmotionTag, KeywordTable,
};
pub use orchestrator::{Orchestrator, OrchestratorStatus};
pub use shared::{AppError, AppResult};

/// 初始化日志（进程内只应调用一次）
///
/// 默认 info 级别，可用 `RUST_LOG` 覆盖。
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();
}
