// Capability Probe - 能力探测
//
// 启动时执行一次，返回结构化能力集合，供配置校验与编排层降级决策使用。

use serde::{Deserialize, Serialize};

use crate::modules::config::AppConfig;

/// 运行环境能力集合
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// 音频缓存目录可创建且可写
    pub cache_dir_writable: bool,
    /// TTS 端点 URL 已配置且可解析
    pub tts_endpoint: bool,
    /// ASR 端点 URL 已配置且可解析
    pub asr_endpoint: bool,
    /// 渲染端（虚拟形象）已接入
    pub renderer_attached: bool,
}

/// 探测运行环境能力
///
/// 只做本地检查，不发起网络请求。
pub fn probe(config: &AppConfig, renderer_attached: bool) -> Capabilities {
    let caps = Capabilities {
        cache_dir_writable: probe_cache_dir(config),
        tts_endpoint: probe_endpoint(&config.audio.tts_api_url),
        asr_endpoint: probe_endpoint(&config.audio.asr_api_url),
        renderer_attached,
    };
    tracing::info!(
        "[Capabilities] cache_dir_writable={} tts_endpoint={} asr_endpoint={} renderer_attached={}",
        caps.cache_dir_writable,
        caps.tts_endpoint,
        caps.asr_endpoint,
        caps.renderer_attached
    );
    caps
}

fn probe_cache_dir(config: &AppConfig) -> bool {
    let dir = &config.audio.cache_dir;
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe_file = dir.join(".probe");
    match std::fs::write(&probe_file, b"probe") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe_file);
            true
        }
        Err(_) => false,
    }
}

fn probe_endpoint(url: &str) -> bool {
    !url.is_empty() && reqwest::Url::parse(url).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_reports_writable_cache_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.audio.cache_dir = tmp.path().join("audio_cache");
        let caps = probe(&config, false);
        assert!(caps.cache_dir_writable);
        assert!(!caps.renderer_attached);
        // 默认端点 URL 均已配置
        assert!(caps.tts_endpoint);
        assert!(caps.asr_endpoint);
    }

    #[test]
    fn test_probe_rejects_malformed_endpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.audio.cache_dir = tmp.path().to_path_buf();
        config.audio.tts_api_url = "not a url".to_string();
        config.audio.asr_api_url = String::new();
        let caps = probe(&config, true);
        assert!(!caps.tts_endpoint);
        assert!(!caps.asr_endpoint);
        assert!(caps.renderer_attached);
    }
}
