// Audio Cache - 音频缓存
//
// 按内容寻址：键为规整化文本的 SHA-256，跨进程稳定。
// 条目只在首次成功合成后写入；映射无上限，仅可显式清空。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::AudioError;

/// 缓存状态报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub enabled: bool,
    pub cache_dir: PathBuf,
    pub file_count: usize,
    pub total_size_bytes: u64,
}

/// 计算文本的缓存键
///
/// 对首尾空白不敏感；相同文本永远得到相同键。
pub fn cache_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// 文本到音频文件的缓存
pub struct AudioCache {
    dir: PathBuf,
    enabled: bool,
    entries: RwLock<HashMap<String, PathBuf>>,
}

impl AudioCache {
    pub fn new(dir: PathBuf, enabled: bool) -> Self {
        Self {
            dir,
            enabled,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 查找缓存音频
    ///
    /// 命中要求映射或磁盘上存在对应文件；磁盘文件在进程重启后
    /// 仍然有效，会被重新登记进映射。
    pub async fn lookup(&self, text: &str) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        let key = cache_key(text);
        let path = self.entry_path(&key);
        if path.exists() {
            self.entries.write().await.insert(key, path.clone());
            Some(path)
        } else {
            self.entries.write().await.remove(&key);
            None
        }
    }

    /// 把合成好的音频登记进缓存
    pub async fn store(&self, text: &str, source: &Path) -> Result<PathBuf, AudioError> {
        let key = cache_key(text);
        let dest = self.entry_path(&key);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AudioError::CacheIo(e.to_string()))?;
        if source != dest {
            tokio::fs::copy(source, &dest)
                .await
                .map_err(|e| AudioError::CacheIo(e.to_string()))?;
        }
        self.entries.write().await.insert(key, dest.clone());
        tracing::debug!("[AudioCache] Cached audio at {}", dest.display());
        Ok(dest)
    }

    /// 删除所有缓存文件与映射
    pub async fn clear(&self) -> Result<(), AudioError> {
        self.entries.write().await.clear();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            // 目录尚未创建：无可清理
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(AudioError::CacheIo(e.to_string())),
        };
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| AudioError::CacheIo(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "wav") {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| AudioError::CacheIo(e.to_string()))?;
            }
        }
        tracing::info!("[AudioCache] Cleared");
        Ok(())
    }

    /// 缓存文件数量与总字节数
    pub async fn info(&self) -> CacheInfo {
        let mut file_count = 0;
        let mut total_size_bytes = 0;
        if let Ok(mut dir) = tokio::fs::read_dir(&self.dir).await {
            while let Ok(Some(entry)) = dir.next_entry().await {
                let path = entry.path();
                if path.extension().map_or(false, |ext| ext == "wav") {
                    file_count += 1;
                    if let Ok(meta) = entry.metadata().await {
                        total_size_bytes += meta.len();
                    }
                }
            }
        }
        CacheInfo {
            enabled: self.enabled,
            cache_dir: self.dir.clone(),
            file_count,
            total_size_bytes,
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.wav", key))
    }
}
