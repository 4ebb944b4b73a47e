// WAV 文件探测
//
// 音频时长由帧数与采样率计算；校验规则：单声道或双声道、
// 样本宽度 1/2/4 字节、采样率大于零。

use std::path::Path;

use serde::Serialize;

use super::AudioError;

/// WAV 文件基本信息
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WavInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub frames: u32,
    pub duration_secs: f64,
}

/// 读取 WAV 头信息；文件缺失或无法解析时返回 `InvalidAudioFormat`
pub fn read_info(path: &Path) -> Result<WavInfo, AudioError> {
    if !path.exists() {
        return Err(AudioError::InvalidAudioFormat(format!(
            "file not found: {}",
            path.display()
        )));
    }
    let reader = hound::WavReader::open(path)
        .map_err(|e| AudioError::InvalidAudioFormat(e.to_string()))?;
    let spec = reader.spec();
    let frames = reader.duration();
    let duration_secs = if spec.sample_rate > 0 {
        frames as f64 / spec.sample_rate as f64
    } else {
        0.0
    };
    Ok(WavInfo {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        frames,
        duration_secs,
    })
}

/// 校验 WAV 文件可用于上传转写
pub fn validate(path: &Path) -> Result<WavInfo, AudioError> {
    let info = read_info(path)?;
    if info.channels != 1 && info.channels != 2 {
        return Err(AudioError::InvalidAudioFormat(format!(
            "unsupported channel count: {}",
            info.channels
        )));
    }
    if !matches!(info.bits_per_sample, 8 | 16 | 32) {
        return Err(AudioError::InvalidAudioFormat(format!(
            "unsupported sample width: {} bits",
            info.bits_per_sample
        )));
    }
    if info.sample_rate == 0 {
        return Err(AudioError::InvalidAudioFormat("zero sample rate".to_string()));
    }
    Ok(info)
}

/// 音频时长（秒）；读取失败记日志并返回 0.0
pub fn duration_secs(path: &Path) -> f64 {
    match read_info(path) {
        Ok(info) => info.duration_secs,
        Err(e) => {
            tracing::warn!("[Audio] Failed to read duration of {}: {}", path.display(), e);
            0.0
        }
    }
}
