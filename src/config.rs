use anyhow::Result;

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HEALTH_PORT: u16 = 8081;

// WebSocket text frames above this size are rejected before parsing.
// 64 KB covers ~32K characters of UTF-8 text plus the file descriptor
// metadata; media bytes themselves never travel over this socket.
pub const MAX_WEBSOCKET_MESSAGE_SIZE: usize = 64 * 1024;

const MIN_JWT_SECRET_LEN: usize = 32;

// ============================================================================
// Configuration Structures
// ============================================================================

/// Controls whether raw user identifiers may appear in logs. When disabled,
/// identifiers are replaced by salted hashes (see `utils::log_safe_id`).
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub enable_user_identifiers: bool,
    pub hash_salt: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// WebSocket listener port
    pub port: u16,
    /// Health/metrics HTTP sidecar port
    pub health_port: u16,
    pub database_url: String,
    /// HS256 secret shared with the token-issuing auth service
    pub jwt_secret: String,
    pub jwt_issuer: String,
    /// Whether a channel send is echoed to the sender's other live
    /// connections (the originating connection always gets the ack instead)
    pub channel_echo_to_sender: bool,
    pub logging: LoggingConfig,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let jwt_secret = std::env::var("JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            anyhow::bail!(
                "JWT_SECRET must be at least {} characters long; generate one with: openssl rand -base64 32",
                MIN_JWT_SECRET_LEN
            );
        }

        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            health_port: std::env::var("HEALTH_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_HEALTH_PORT),
            database_url: std::env::var("DATABASE_URL")?,
            jwt_secret,
            jwt_issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "courier".to_string()),
            channel_echo_to_sender: std::env::var("CHANNEL_ECHO_TO_SENDER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            logging: LoggingConfig {
                enable_user_identifiers: std::env::var("LOG_USER_IDENTIFIERS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(false),
                hash_salt: std::env::var("LOG_HASH_SALT")
                    .unwrap_or_else(|_| "courier-log-salt".to_string()),
            },
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}
