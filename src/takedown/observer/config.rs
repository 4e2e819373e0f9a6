use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "takedowns.db";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:80";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_READ_POOL_SIZE: usize = 4;

/// Origins allowed to call the API from a browser when none are configured.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 3] = [
    "https://twitter.com",
    "https://x.com",
    "http://localhost:8080",
];

/// Settings for the HTTP service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub db_path: PathBuf,
    pub static_dir: PathBuf,
    /// Read connections opened next to the single writer.
    pub read_pool_size: usize,
    pub cors: CorsConfig,
}

/// Cross-origin policy for the API routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl CorsConfig {
    /// Default policy with a custom origin list. An empty list keeps the
    /// default origins.
    pub fn with_origins(origins: Vec<String>) -> Self {
        if origins.is_empty() {
            return Self::default();
        }
        Self {
            allowed_origins: origins,
            ..Self::default()
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.map(String::from).to_vec(),
            allowed_methods: ["GET", "POST", "OPTIONS"].map(String::from).to_vec(),
            allowed_headers: vec!["Content-Type".to_string()],
        }
    }
}
