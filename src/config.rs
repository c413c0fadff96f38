//! Configuration management for the Stash server

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub socket: SocketConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub upload: UploadConfig,
    pub web: WebConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Duplex-socket binding (raw TCP command protocol).
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub port: u16,
    /// Maximum frame payload size in bytes
    pub max_frame: usize,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding `<stream>.tmp` and promoted `<stream>.upload` files
    pub upload_dir: String,
    /// Cached video thumbnails
    pub thumbnail_dir: String,
    /// Static assets and HTML templates
    pub web_root: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Length of durable item ids
    pub id_length: usize,
    /// Upper bound on the extension supplied at stream creation
    pub max_extension_length: usize,
    /// Sliding idle expiration for in-flight streams
    pub idle_timeout_secs: u64,
}

impl UploadConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub base_url: String,
    pub description: String,
    pub embed_color: String,
    pub contact_email: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            socket: SocketConfig {
                port: 3001,
                max_frame: 1024 * 1024,
            },
            storage: StorageConfig {
                upload_dir: "uploads".to_string(),
                thumbnail_dir: "thumbs".to_string(),
                web_root: "web".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite:./stash.db".to_string(),
            },
            upload: UploadConfig {
                id_length: 12,
                max_extension_length: 10,
                idle_timeout_secs: 60,
            },
            web: WebConfig {
                base_url: "http://localhost:3000".to_string(),
                description: "Stash".to_string(),
                embed_color: "#2BFF00".to_string(),
                contact_email: "unknown@example.com".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every key is optional; unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let default = Self::default();

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(default.server.host),
                port: env_parse("SERVER_PORT", default.server.port),
            },
            socket: SocketConfig {
                port: env_parse("SOCKET_PORT", default.socket.port),
                max_frame: env_parse("SOCKET_MAX_FRAME", default.socket.max_frame),
            },
            storage: StorageConfig {
                upload_dir: env::var("UPLOAD_DIR").unwrap_or(default.storage.upload_dir),
                thumbnail_dir: env::var("THUMBNAIL_DIR").unwrap_or(default.storage.thumbnail_dir),
                web_root: env::var("WEB_ROOT").unwrap_or(default.storage.web_root),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(default.database.url),
            },
            upload: UploadConfig {
                id_length: env_parse("ID_LENGTH", default.upload.id_length),
                max_extension_length: env_parse(
                    "MAX_EXTENSION_LENGTH",
                    default.upload.max_extension_length,
                ),
                idle_timeout_secs: env_parse("IDLE_TIMEOUT_SECS", default.upload.idle_timeout_secs),
            },
            web: WebConfig {
                base_url: env::var("BASE_URL").unwrap_or(default.web.base_url),
                description: env::var("SITE_DESCRIPTION").unwrap_or(default.web.description),
                embed_color: env::var("EMBED_COLOR").unwrap_or(default.web.embed_color),
                contact_email: env::var("CONTACT_EMAIL").unwrap_or(default.web.contact_email),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.upload.id_length, 12);
        assert_eq!(config.upload.max_extension_length, 10);
        assert_eq!(config.upload.idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.socket.max_frame, 1024 * 1024);
    }
}
