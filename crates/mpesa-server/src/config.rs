//! Server Configuration

/// Listener and storage settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// `sqlite:` URL; `None` keeps payments in memory
    pub database_url: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
        }
    }
}
