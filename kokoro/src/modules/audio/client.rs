// Audio Client - 音频客户端
//
// 远程 TTS/ASR 的缓存重试客户端。网络调用策略：最多 `max_retries`
// 次尝试，每次受超时约束，失败后等待固定 `retry_delay` 再试；
// 耗尽后以类型化错误上抛，调用方可区分"无语音"与"服务不可用"。
//
// 同一文本的并发合成请求不做合并，各自独立走网络。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use super::{cache::AudioCache, wav, AudioError, CacheInfo};
use crate::infrastructure::{EventBus, EventKind};
use crate::modules::config::AudioConfig;

/// 转写端点不提供置信度，事件中使用固定值
const ASR_CONFIDENCE: f64 = 0.9;

/// 单次网络尝试的失败原因；重试耗尽后映射为 `AudioError`
#[derive(Debug, Error)]
enum AttemptError {
    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: String },
    #[error("{0}")]
    Transport(String),
}

impl From<AttemptError> for AudioError {
    fn from(e: AttemptError) -> Self {
        match e {
            AttemptError::Http { status, detail } => AudioError::RemoteService { status, detail },
            AttemptError::Transport(msg) => AudioError::Network(msg),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AsrResponse {
    text: String,
}

/// 远程语音服务客户端
pub struct AudioClient {
    config: AudioConfig,
    client: reqwest::Client,
    cache: AudioCache,
    bus: Arc<EventBus>,
}

impl AudioClient {
    pub fn new(config: AudioConfig, bus: Arc<EventBus>) -> Result<Self, AudioError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AudioError::Network(e.to_string()))?;
        let cache = AudioCache::new(config.cache_dir.clone(), config.enable_cache);
        Ok(Self {
            config,
            client,
            cache,
            bus,
        })
    }

    /// 文本转语音，返回音频文件路径
    ///
    /// 缓存命中（键存在且文件仍在）时直接返回，不发起网络调用。
    /// 成功后写入音频文件、计算时长、登记缓存并发布 `tts.completed`。
    pub async fn text_to_speech(
        &self,
        text: &str,
        output_path: Option<PathBuf>,
    ) -> Result<PathBuf, AudioError> {
        if !self.config.tts_enabled {
            return Err(AudioError::Configuration("TTS is disabled".to_string()));
        }
        if self.config.tts_api_url.is_empty() {
            return Err(AudioError::Configuration(
                "ttsApiUrl is not configured".to_string(),
            ));
        }

        if let Some(cached) = self.cache.lookup(text).await {
            tracing::info!("[AudioClient] Using cached audio: {}", cached.display());
            return Ok(cached);
        }

        let body = json!({
            "text": text,
            "text_language": "zh",
            "format": self.config.audio_format,
        });
        let timeout = Duration::from_secs_f64(self.config.tts_timeout);
        let attempts = self.config.max_retries.max(1);
        let mut last_err = AttemptError::Transport("no attempt made".to_string());

        for attempt in 1..=attempts {
            match self.tts_attempt(&body, timeout).await {
                Ok(bytes) => return self.finish_tts(text, &bytes, output_path).await,
                Err(e) => {
                    tracing::warn!(
                        "[AudioClient] TTS attempt {}/{} failed: {}",
                        attempt,
                        attempts,
                        e
                    );
                    last_err = e;
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_secs_f64(self.config.retry_delay)).await;
                    }
                }
            }
        }
        Err(last_err.into())
    }

    async fn tts_attempt(&self, body: &Value, timeout: Duration) -> Result<Vec<u8>, AttemptError> {
        let response = self
            .client
            .post(&self.config.tts_api_url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AttemptError::Http {
                status: status.as_u16(),
                detail,
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn finish_tts(
        &self,
        text: &str,
        bytes: &[u8],
        output_path: Option<PathBuf>,
    ) -> Result<PathBuf, AudioError> {
        let path = match output_path {
            Some(path) => path,
            None => self
                .config
                .cache_dir
                .join(format!("tts-{}.wav", Uuid::new_v4())),
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&path, bytes).await?;

        let duration = wav::duration_secs(&path);

        if self.cache.is_enabled() {
            if let Err(e) = self.cache.store(text, &path).await {
                // 缓存失败不致命，本次结果仍然有效
                tracing::warn!("[AudioClient] Failed to cache audio: {}", e);
            }
        }

        self.bus
            .publish(
                EventKind::TtsCompleted,
                json!({
                    "text": text,
                    "audioPath": path.display().to_string(),
                    "duration": duration,
                    "success": true,
                }),
                None,
            )
            .await;

        tracing::info!(
            "[AudioClient] TTS succeeded: {} ({:.2}s)",
            path.display(),
            duration
        );
        Ok(path)
    }

    /// 语音转文本
    ///
    /// 先校验文件存在且为受支持的 PCM WAV，再以 multipart 表单
    /// 上传到 ASR 端点；重试策略与 TTS 相同。成功后发布
    /// `asr.completed` 并返回转写文本。
    pub async fn speech_to_text(&self, audio_path: &Path) -> Result<String, AudioError> {
        if !self.config.asr_enabled {
            return Err(AudioError::Configuration("ASR is disabled".to_string()));
        }
        if self.config.asr_api_url.is_empty() {
            return Err(AudioError::Configuration(
                "asrApiUrl is not configured".to_string(),
            ));
        }

        wav::validate(audio_path)?;
        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let timeout = Duration::from_secs_f64(self.config.asr_timeout);
        let attempts = self.config.max_retries.max(1);
        let mut last_err = AttemptError::Transport("no attempt made".to_string());

        for attempt in 1..=attempts {
            match self
                .asr_attempt(bytes.clone(), file_name.clone(), timeout)
                .await
            {
                Ok(text) => {
                    self.bus
                        .publish(
                            EventKind::AsrCompleted,
                            json!({
                                "audioPath": audio_path.display().to_string(),
                                "text": text,
                                "confidence": ASR_CONFIDENCE,
                                "success": true,
                            }),
                            None,
                        )
                        .await;
                    tracing::info!("[AudioClient] ASR succeeded: {}", text);
                    return Ok(text);
                }
                Err(e) => {
                    tracing::warn!(
                        "[AudioClient] ASR attempt {}/{} failed: {}",
                        attempt,
                        attempts,
                        e
                    );
                    last_err = e;
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_secs_f64(self.config.retry_delay)).await;
                    }
                }
            }
        }
        Err(last_err.into())
    }

    async fn asr_attempt(
        &self,
        bytes: Vec<u8>,
        file_name: String,
        timeout: Duration,
    ) -> Result<String, AttemptError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| AttemptError::Transport(e.to_string()))?;
        let form = multipart::Form::new().part("audio", part);

        let response = self
            .client
            .post(&self.config.asr_api_url)
            .timeout(timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AttemptError::Http {
                status: status.as_u16(),
                detail,
            });
        }
        let parsed: AsrResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;
        Ok(parsed.text)
    }

    /// 清空音频缓存
    pub async fn clear_cache(&self) -> Result<(), AudioError> {
        self.cache.clear().await
    }

    /// 缓存状态
    pub async fn get_cache_info(&self) -> CacheInfo {
        self.cache.info().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    type StubResponse = (u16, &'static str, Vec<u8>);

    struct StubServer {
        url: String,
        hits: Arc<AtomicUsize>,
    }

    /// 极简 HTTP 桩服务：按序返回预设响应，队列耗尽后重复最后一个
    async fn spawn_stub(responses: Vec<StubResponse>) -> StubServer {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let task_hits = hits.clone();
        let fallback = responses.last().cloned().unwrap();
        let mut queue: VecDeque<StubResponse> = responses.into();

        tokio::spawn(async move {
            loop {
                let Ok((sock, _)) = listener.accept().await else {
                    break;
                };
                task_hits.fetch_add(1, Ordering::SeqCst);
                let response = queue.pop_front().unwrap_or_else(|| fallback.clone());
                serve_one(sock, response).await;
            }
        });
        StubServer { url, hits }
    }

    async fn serve_one(mut sock: tokio::net::TcpStream, response: StubResponse) {
        let (status, content_type, body) = response;
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            match sock.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
                        break pos + 4;
                    }
                }
            }
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let content_length = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            match sock.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        let reason = match status {
            200 => "OK",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Error",
        };
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            reason,
            content_type,
            body.len()
        );
        let _ = sock.write_all(head.as_bytes()).await;
        let _ = sock.write_all(&body).await;
        let _ = sock.shutdown().await;
    }

    fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    fn wav_bytes(seconds: f64) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..(22050.0 * seconds) as u32 {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn test_config(dir: &Path, tts_url: &str, asr_url: &str) -> AudioConfig {
        let mut config = AudioConfig::default();
        config.tts_api_url = tts_url.to_string();
        config.asr_api_url = asr_url.to_string();
        config.cache_dir = dir.join("audio_cache");
        config.retry_delay = 0.01;
        config
    }

    #[tokio::test]
    async fn test_tts_success_publishes_event_with_duration() {
        let tmp = tempfile::tempdir().unwrap();
        let stub = spawn_stub(vec![(200, "audio/wav", wav_bytes(1.0))]).await;
        let bus = Arc::new(EventBus::new());
        let client =
            AudioClient::new(test_config(tmp.path(), &stub.url, ""), bus.clone()).unwrap();

        let path = client.text_to_speech("你好呀", None).await.unwrap();
        assert!(path.exists());
        assert_eq!(stub.hits.load(Ordering::SeqCst), 1);

        let events = bus.get_history(Some(EventKind::TtsCompleted), 10).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["success"], true);
        assert_eq!(events[0].payload["text"], "你好呀");
        let duration = events[0].payload["duration"].as_f64().unwrap();
        assert!((duration - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_tts_cache_idempotence() {
        let tmp = tempfile::tempdir().unwrap();
        // 首次 200，之后一律 500：命中缓存则第二次调用不会走网络
        let stub = spawn_stub(vec![
            (200, "audio/wav", wav_bytes(0.5)),
            (500, "text/plain", b"backend gone".to_vec()),
        ])
        .await;
        let bus = Arc::new(EventBus::new());
        let client =
            AudioClient::new(test_config(tmp.path(), &stub.url, ""), bus.clone()).unwrap();

        let first = client.text_to_speech("缓存我", None).await.unwrap();
        let second = client.text_to_speech("缓存我", None).await.unwrap();
        assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
        // 第二次返回缓存条目路径
        assert!(second.exists());
        assert_eq!(second, client.cache.lookup("缓存我").await.unwrap());
        assert!(first.exists());
    }

    #[tokio::test]
    async fn test_tts_retry_exhaustion() {
        let tmp = tempfile::tempdir().unwrap();
        let stub = spawn_stub(vec![(500, "text/plain", b"boom".to_vec())]).await;
        let bus = Arc::new(EventBus::new());
        let client =
            AudioClient::new(test_config(tmp.path(), &stub.url, ""), bus.clone()).unwrap();

        let err = client.text_to_speech("失败的合成", None).await.unwrap_err();
        match err {
            AudioError::RemoteService { status, detail } => {
                assert_eq!(status, 500);
                assert_eq!(detail, "boom");
            }
            other => panic!("unexpected error: {}", other),
        }
        // 正好 max_retries 次尝试
        assert_eq!(stub.hits.load(Ordering::SeqCst), 3);
        // 失败不发布完成事件
        assert!(bus
            .get_history(Some(EventKind::TtsCompleted), 10)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_tts_network_error_after_retries() {
        let tmp = tempfile::tempdir().unwrap();
        // 绑定后立即释放端口，保证连接被拒绝
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let bus = Arc::new(EventBus::new());
        let client = AudioClient::new(test_config(tmp.path(), &dead_url, ""), bus).unwrap();
        let err = client.text_to_speech("无人接听", None).await.unwrap_err();
        assert!(matches!(err, AudioError::Network(_)));
    }

    #[tokio::test]
    async fn test_tts_disabled_is_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(tmp.path(), "http://127.0.0.1:1/tts", "");
        config.tts_enabled = false;
        let client = AudioClient::new(config, Arc::new(EventBus::new())).unwrap();
        let err = client.text_to_speech("你好", None).await.unwrap_err();
        assert!(matches!(err, AudioError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_tts_missing_url_is_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(tmp.path(), "", "");
        config.tts_api_url = String::new();
        let client = AudioClient::new(config, Arc::new(EventBus::new())).unwrap();
        let err = client.text_to_speech("你好", None).await.unwrap_err();
        assert!(matches!(err, AudioError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_tts_disabled_cache_issues_each_request() {
        let tmp = tempfile::tempdir().unwrap();
        let stub = spawn_stub(vec![(200, "audio/wav", wav_bytes(0.2))]).await;
        let mut config = test_config(tmp.path(), &stub.url, "");
        config.enable_cache = false;
        let client = AudioClient::new(config, Arc::new(EventBus::new())).unwrap();

        client.text_to_speech("重复", None).await.unwrap();
        client.text_to_speech("重复", None).await.unwrap();
        // 无缓存时每次调用独立走网络（同文本并发调用也不合并）
        assert_eq!(stub.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_asr_success_publishes_event() {
        let tmp = tempfile::tempdir().unwrap();
        let stub = spawn_stub(vec![(
            200,
            "application/json",
            r#"{"text":"今天天气不错"}"#.as_bytes().to_vec(),
        )])
        .await;
        let bus = Arc::new(EventBus::new());
        let client =
            AudioClient::new(test_config(tmp.path(), "", &stub.url), bus.clone()).unwrap();

        let audio = tmp.path().join("question.wav");
        std::fs::write(&audio, wav_bytes(0.3)).unwrap();

        let text = client.speech_to_text(&audio).await.unwrap();
        assert_eq!(text, "今天天气不错");
        assert_eq!(stub.hits.load(Ordering::SeqCst), 1);

        let events = bus.get_history(Some(EventKind::AsrCompleted), 10).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["text"], "今天天气不错");
        assert_eq!(events[0].payload["confidence"], 0.9);
    }

    #[tokio::test]
    async fn test_asr_rejects_invalid_audio() {
        let tmp = tempfile::tempdir().unwrap();
        let client = AudioClient::new(
            test_config(tmp.path(), "", "http://127.0.0.1:1/asr"),
            Arc::new(EventBus::new()),
        )
        .unwrap();

        let err = client
            .speech_to_text(Path::new("/nonexistent.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::InvalidAudioFormat(_)));

        let fake = tmp.path().join("fake.wav");
        std::fs::write(&fake, b"not audio at all").unwrap();
        let err = client.speech_to_text(&fake).await.unwrap_err();
        assert!(matches!(err, AudioError::InvalidAudioFormat(_)));
    }

    #[tokio::test]
    async fn test_asr_retry_exhaustion() {
        let tmp = tempfile::tempdir().unwrap();
        let stub = spawn_stub(vec![(503, "text/plain", b"overloaded".to_vec())]).await;
        let client = AudioClient::new(
            test_config(tmp.path(), "", &stub.url),
            Arc::new(EventBus::new()),
        )
        .unwrap();

        let audio = tmp.path().join("question.wav");
        std::fs::write(&audio, wav_bytes(0.3)).unwrap();

        let err = client.speech_to_text(&audio).await.unwrap_err();
        match err {
            AudioError::RemoteService { status, .. } => assert_eq!(status, 503),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(stub.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cache_management_passthrough() {
        let tmp = tempfile::tempdir().unwrap();
        let stub = spawn_stub(vec![(200, "audio/wav", wav_bytes(0.2))]).await;
        let client = AudioClient::new(
            test_config(tmp.path(), &stub.url, ""),
            Arc::new(EventBus::new()),
        )
        .unwrap();

        client.text_to_speech("要缓存的话", None).await.unwrap();
        let info = client.get_cache_info().await;
        assert!(info.enabled);
        assert!(info.file_count >= 1);
        assert!(info.total_size_bytes > 0);

        client.clear_cache().await.unwrap();
        assert_eq!(client.get_cache_info().await.file_count, 0);
    }
}
