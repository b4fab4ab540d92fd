//! ブロック対象ドメインの集合
//!
//! 制御側のスレッドが追加・削除し、パケットポンプが毎パケット参照する。
//! 中身は`Arc<HashSet>`のコピーオンライトで、書き込み側は新しい集合を組み立ててから
//! 差し替えるだけなので、読み込み側が途中状態の集合を見ることはない。

use crate::storage::BlocklistStore;
use log::{info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

pub const DEFAULT_DOMAINS: [&str; 3] = ["example.com", "facebook.com", "youtube.com"];

pub fn default_domains() -> HashSet<String> {
    DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect()
}

/// 前後の空白を除いて小文字化する。空になる入力は`None`。
pub fn normalize(domain: &str) -> Option<String> {
    let domain = domain.trim();
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_lowercase())
    }
}

/// `domain`がいずれかのエントリと一致するか、そのサブドメインであるかを調べる。
pub fn matches(domains: &HashSet<String>, domain: &str) -> bool {
    let Some(domain) = normalize(domain) else {
        return false;
    };
    let mut current = domain.as_str();

    loop {
        if domains.contains(current) {
            return true;
        }
        match current.find('.') {
            Some(pos) => current = &current[pos + 1..],
            None => return false,
        }
    }
}

#[derive(Clone)]
pub struct Blocklist {
    domains: Arc<RwLock<Arc<HashSet<String>>>>,
    save_lock: Arc<Mutex<()>>,
    store: Option<Arc<dyn BlocklistStore>>,
}

impl Blocklist {
    pub fn new() -> Self {
        Self::from_set(default_domains(), None)
    }

    pub fn from_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .filter_map(|d| normalize(d.as_ref()))
            .collect();
        Self::from_set(domains, None)
    }

    // 読み込みに失敗した場合は既定のリストで起動する
    pub fn with_store(store: Arc<dyn BlocklistStore>) -> Self {
        let domains: HashSet<String> = match store.load() {
            Ok(Some(domains)) => domains.iter().filter_map(|d| normalize(d)).collect(),
            Ok(None) => default_domains(),
            Err(e) => {
                warn!("ブロックリストの読み込みに失敗したため既定のリストを使用します: {}", e);
                default_domains()
            }
        };
        info!("ブロックリストを読み込みました: {}件", domains.len());
        Self::from_set(domains, Some(store))
    }

    fn from_set(domains: HashSet<String>, store: Option<Arc<dyn BlocklistStore>>) -> Self {
        Self {
            domains: Arc::new(RwLock::new(Arc::new(domains))),
            save_lock: Arc::new(Mutex::new(())),
            store,
        }
    }

    pub fn contains(&self, domain: &str) -> bool {
        matches(&self.snapshot(), domain)
    }

    pub fn add(&self, domain: &str) -> bool {
        let Some(domain) = normalize(domain) else {
            return false;
        };
        let added = self.update(|domains| domains.insert(domain.clone()));
        if added {
            info!("ブロック対象に追加しました: {}", domain);
        }
        added
    }

    pub fn remove(&self, domain: &str) -> bool {
        let Some(domain) = normalize(domain) else {
            return false;
        };
        let removed = self.update(|domains| domains.remove(&domain));
        if removed {
            info!("ブロック対象から削除しました: {}", domain);
        }
        removed
    }

    pub fn reset(&self) {
        self.update(|domains| {
            *domains = default_domains();
            true
        });
        info!("ブロックリストを既定の状態に戻しました");
    }

    pub fn snapshot(&self) -> Arc<HashSet<String>> {
        let guard = self.domains.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    // 変更があった場合だけ新しい集合に差し替えて保存する。
    // 保存用のロックで差し替えと保存を一続きにし、古い集合が後から保存されないようにする
    fn update<F>(&self, apply: F) -> bool
    where
        F: FnOnce(&mut HashSet<String>) -> bool,
    {
        let _saving = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let updated = {
            let mut guard = self.domains.write().unwrap_or_else(PoisonError::into_inner);
            let mut next = HashSet::clone(&guard);
            if !apply(&mut next) {
                return false;
            }
            let next = Arc::new(next);
            *guard = Arc::clone(&next);
            next
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&updated) {
                warn!("ブロックリストの保存に失敗しました: {}", e);
            }
        }
        true
    }
}

impl Default for Blocklist {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Blocklist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blocklist")
            .field("domains", &self.snapshot())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}
