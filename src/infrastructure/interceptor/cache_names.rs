use sha2::{Digest, Sha256};

const VERSION_HASH_LEN: usize = 12;

/// 現在のビルドに対応する静的・動的キャッシュ名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    pub static_cache: String,
    pub dynamic_cache: String,
    pub version: String,
}

impl CacheNames {
    /// ビルド ID とプリキャッシュ対象から版を決める。どちらかが変われば名前も変わる。
    pub fn for_build(prefix: &str, build_id: &str, manifest: &[String]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(build_id.as_bytes());
        for asset in manifest {
            hasher.update([0u8]);
            hasher.update(asset.as_bytes());
        }
        let digest = format!("{:x}", hasher.finalize());
        let version = digest[..VERSION_HASH_LEN].to_string();

        Self {
            static_cache: format!("{prefix}-static-{version}"),
            dynamic_cache: format!("{prefix}-dynamic-{version}"),
            version,
        }
    }

    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_cache || name == self.dynamic_cache
    }
}
