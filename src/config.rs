use std::env;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

// --- CONFIG AGGREGATOR ---

#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub maintenance: MaintenanceConfig,
    pub store: StoreConfig,
}

impl Config {
    pub fn global() -> &'static Config {
        CONFIG.get_or_init(Self::load)
    }

    fn load() -> Self {
        dotenv::dotenv().ok();
        Self {
            engine: EngineConfig::load(),
            maintenance: MaintenanceConfig::load(),
            store: StoreConfig::load(),
        }
    }

    /// Defaults without touching the environment.
    pub fn default_for_tests() -> Self {
        Self {
            engine: EngineConfig {
                server_uid: "TEST0001".to_string(),
                log_level: "debug".to_string(),
            },
            maintenance: MaintenanceConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

// --- MODULES ---

// ENGINE
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Identity stamped on locally published retained messages.
    pub server_uid: String,
    pub log_level: String,
}

impl EngineConfig {
    fn load() -> Self {
        let generated = uuid::Uuid::new_v4().simple().to_string();
        Self {
            server_uid: get_env("ENGINE_SERVER_UID", &generated),
            log_level:  get_env("ENGINE_LOG", "info"),
        }
    }
}

// MAINTENANCE
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub retained_scan_interval_ms: u64,
    pub retained_stats_interval_ms: u64,
    // REPOSITIONING
    pub reposition_batch: usize,
    pub reposition_min_spread: u64,
    pub reposition_max_in_use_pct: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            retained_scan_interval_ms: 60_000,
            retained_stats_interval_ms: 30_000,
            reposition_batch: 500,
            reposition_min_spread: 100_000,
            reposition_max_in_use_pct: 20.0,
        }
    }
}

impl MaintenanceConfig {
    fn load() -> Self {
        Self {
            retained_scan_interval_ms:  get_env("RETAINED_SCAN_INTERVAL_MS", "60000"),
            retained_stats_interval_ms: get_env("RETAINED_STATS_INTERVAL_MS", "30000"),
            reposition_batch:           get_env("RETAINED_REPOSITION_BATCH", "500"),
            reposition_min_spread:      get_env("RETAINED_REPOSITION_MIN_SPREAD", "100000"),
            reposition_max_in_use_pct:  get_env("RETAINED_REPOSITION_MAX_IN_USE_PCT", "20.0"),
        }
    }
}

// STORE
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub generation_full_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { generation_full_retries: 16 }
    }
}

impl StoreConfig {
    fn load() -> Self {
        Self {
            generation_full_retries: get_env("STORE_GENERATION_FULL_RETRIES", "16"),
        }
    }
}

// --- PRIVATE HELPER ---

fn get_env<T: std::str::FromStr>(key: &str, default: &str) -> T
where
    T::Err: std::fmt::Debug,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!("Config error: {} must be valid (got '{}'), using {}", key, raw, default);
            parse_default(key, default)
        }
    }
}

fn parse_default<T: std::str::FromStr>(key: &str, default: &str) -> T
where
    T::Err: std::fmt::Debug,
{
    match default.parse() {
        Ok(value) => value,
        Err(e) => panic!("built-in default for {} does not parse: {:?}", key, e),
    }
}
