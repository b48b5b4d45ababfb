use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub interceptor: InterceptorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub interval_secs: u64,
    pub endpoint_url: String,
    pub retention_days: u32,
    pub background_sync_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptorConfig {
    pub origin: String,
    pub api_prefix: String,
    pub offline_document: String,
    pub cache_prefix: String,
    pub build_id: String,
    pub precache_manifest: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://./data/ecolearn.db?mode=rwc".to_string(),
                max_connections: 5,
            },
            remote: RemoteConfig {
                base_url: "http://localhost:5000".to_string(),
                timeout_secs: 10,
                auth_token: None,
            },
            sync: SyncConfig {
                auto_sync: true,
                interval_secs: 300, // 5 minutes
                endpoint_url: "http://localhost:5000/api/sync".to_string(),
                retention_days: 7,
                background_sync_tag: "background-sync".to_string(),
            },
            interceptor: InterceptorConfig::default(),
        }
    }
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            api_prefix: "/api/".to_string(),
            offline_document: "/offline.html".to_string(),
            cache_prefix: "ecolearn".to_string(),
            build_id: env!("CARGO_PKG_VERSION").to_string(),
            precache_manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/offline.html".to_string(),
                "/manifest.json".to_string(),
            ],
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("ECOLEARN_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Some(value) = env_u64("ECOLEARN_DATABASE_MAX_CONNECTIONS") {
            cfg.database.max_connections = value.clamp(1, u64::from(u32::MAX)) as u32;
        }

        // リモート API
        if let Ok(v) = std::env::var("ECOLEARN_API_BASE_URL") {
            if !v.trim().is_empty() {
                cfg.remote.base_url = v.trim().trim_end_matches('/').to_string();
            }
        }
        if let Some(value) = env_u64("ECOLEARN_API_TIMEOUT_SECS") {
            cfg.remote.timeout_secs = value.max(1);
        }
        if let Ok(v) = std::env::var("ECOLEARN_API_TOKEN") {
            cfg.remote.auth_token = if v.trim().is_empty() {
                None
            } else {
                Some(v.trim().to_string())
            };
        }

        // 同期
        if let Ok(v) = std::env::var("ECOLEARN_AUTO_SYNC") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(value) = env_u64("ECOLEARN_SYNC_INTERVAL_SECS") {
            cfg.sync.interval_secs = value.max(1);
        }
        if let Ok(v) = std::env::var("ECOLEARN_SYNC_ENDPOINT") {
            if !v.trim().is_empty() {
                cfg.sync.endpoint_url = v.trim().to_string();
            }
        }
        if let Some(value) = env_u64("ECOLEARN_SYNC_RETENTION_DAYS") {
            cfg.sync.retention_days = value.min(u64::from(u32::MAX)) as u32;
        }
        if let Ok(v) = std::env::var("ECOLEARN_BACKGROUND_SYNC_TAG") {
            if !v.trim().is_empty() {
                cfg.sync.background_sync_tag = v.trim().to_string();
            }
        }

        // インターセプタ
        if let Ok(v) = std::env::var("ECOLEARN_ORIGIN") {
            if !v.trim().is_empty() {
                cfg.interceptor.origin = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("ECOLEARN_BUILD_ID") {
            if !v.trim().is_empty() {
                cfg.interceptor.build_id = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("ECOLEARN_PRECACHE_MANIFEST") {
            let assets: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !assets.is_empty() {
                cfg.interceptor.precache_manifest = assets;
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.trim().is_empty() {
            return Err("Database url must not be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.remote.timeout_secs == 0 {
            return Err("Remote timeout_secs must be greater than 0".to_string());
        }
        if self.sync.auto_sync && self.sync.interval_secs == 0 {
            return Err("Sync interval_secs must be greater than 0".to_string());
        }
        if !self.interceptor.api_prefix.starts_with('/') {
            return Err("Interceptor api_prefix must start with '/'".to_string());
        }
        if !self.interceptor.offline_document.starts_with('/') {
            return Err("Interceptor offline_document must start with '/'".to_string());
        }
        if !self
            .interceptor
            .precache_manifest
            .iter()
            .any(|asset| asset == &self.interceptor.offline_document)
        {
            return Err("Precache manifest must include the offline document".to_string());
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| parse_u64(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
