use crate::core::error::{TunnelError, TunnelResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// ブロックリストの永続化先。
///
/// `load`が`None`を返した場合はまだ何も保存されていないことを表し、
/// 呼び出し側は組み込みの既定リストを使う。
pub trait BlocklistStore: Send + Sync {
    fn load(&self) -> TunnelResult<Option<HashSet<String>>>;
    fn save(&self, domains: &HashSet<String>) -> TunnelResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredBlocklist {
    domains: Vec<String>,
    updated_at: String,
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlocklistStore for JsonFileStore {
    fn load(&self) -> TunnelResult<Option<HashSet<String>>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TunnelError::Store(format!(
                    "{}の読み込みに失敗しました: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let stored: StoredBlocklist = serde_json::from_str(&content).map_err(|e| {
            TunnelError::Store(format!("{}の解析に失敗しました: {}", self.path.display(), e))
        })?;

        Ok(Some(stored.domains.into_iter().collect()))
    }

    fn save(&self, domains: &HashSet<String>) -> TunnelResult<()> {
        let mut sorted: Vec<String> = domains.iter().cloned().collect();
        sorted.sort_unstable();

        let stored = StoredBlocklist {
            domains: sorted,
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        let content = serde_json::to_string_pretty(&stored)
            .map_err(|e| TunnelError::Store(format!("シリアライズに失敗しました: {}", e)))?;

        // 書き込み途中のファイルを読まれないよう一時ファイル経由で置き換える
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                TunnelError::Store(format!("{}への保存に失敗しました: {}", self.path.display(), e))
            })
    }
}

// プロセス内だけで保持するストア
#[derive(Default)]
pub struct MemoryStore {
    domains: Mutex<Option<HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: Mutex::new(Some(domains.into_iter().map(Into::into).collect())),
        }
    }
}

impl BlocklistStore for MemoryStore {
    fn load(&self) -> TunnelResult<Option<HashSet<String>>> {
        let domains = self
            .domains
            .lock()
            .map_err(|_| TunnelError::Store("ロックが壊れています".to_string()))?;
        Ok(domains.clone())
    }

    fn save(&self, domains: &HashSet<String>) -> TunnelResult<()> {
        let mut stored = self
            .domains
            .lock()
            .map_err(|_| TunnelError::Store("ロックが壊れています".to_string()))?;
        *stored = Some(domains.clone());
        Ok(())
    }
}
