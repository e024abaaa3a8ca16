use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Deserializer};
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub notification: NotificationStyleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body size in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

/// Messaging provider configuration.
///
/// `backend` selects the implementation: `"fcm"` talks to Firebase Cloud
/// Messaging, `"memory"` keeps everything in-process (local development).
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    pub project_id: Option<String>,
    pub client_email: Option<String>,
    pub private_key: Option<String>,
    /// Path to a service account key JSON file
    pub service_account_path: Option<String>,
    #[serde(default = "default_fcm_endpoint")]
    pub fcm_endpoint: String,
    #[serde(default = "default_iid_endpoint")]
    pub iid_endpoint: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Upper bound on in-flight sends while fanning out a multicast
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Pause between paced batches when the caller gives none (milliseconds)
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Upper bound on `count` for repeated data messages
    #[serde(default = "default_max_repeat_count")]
    pub max_repeat_count: u32,
}

/// Platform hints attached to visible notifications.
///
/// An empty value (e.g. `NOTIFICATION__APNS_BADGE=`) turns a hint off.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationStyleConfig {
    #[serde(default = "default_android_icon", deserialize_with = "empty_as_none")]
    pub android_icon: Option<String>,
    #[serde(default = "default_android_color", deserialize_with = "empty_as_none")]
    pub android_color: Option<String>,
    #[serde(default = "default_apns_badge", deserialize_with = "badge_or_none")]
    pub apns_badge: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024 // 10 MiB
}

fn default_backend() -> String {
    "fcm".to_string()
}

fn default_fcm_endpoint() -> String {
    "https://fcm.googleapis.com".to_string()
}

fn default_iid_endpoint() -> String {
    "https://iid.googleapis.com".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_concurrent_sends() -> usize {
    100
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_max_interval_ms() -> u64 {
    60_000
}

fn default_max_repeat_count() -> u32 {
    100
}

fn default_android_icon() -> Option<String> {
    Some("stock_ticker_update".to_string())
}

fn default_android_color() -> Option<String> {
    Some("#7e55c3".to_string())
}

fn default_apns_badge() -> Option<u32> {
    Some(1)
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

fn badge_or_none<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Badge {
        Number(u32),
        Text(String),
    }

    match Option::<Badge>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Badge::Number(n)) => Ok(Some(n)),
        Some(Badge::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Badge::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid APNs badge {:?}", text))),
    }
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("provider.backend", "fcm")?
            .set_default("dispatch.default_interval_ms", 2000)?
            .set_default("logging.format", "pretty")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER__PORT, PROVIDER__BACKEND, DISPATCH__MAX_REPEAT_COUNT, etc.
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            )
            // Conventional variable names used by existing deployments
            .set_override_option("server.port", env::var("PORT").ok())?
            .set_override_option("provider.project_id", env::var("FIREBASE_PROJECT_ID").ok())?
            .set_override_option(
                "provider.client_email",
                env::var("FIREBASE_CLIENT_EMAIL").ok(),
            )?
            .set_override_option("provider.private_key", env::var("FIREBASE_PRIVATE_KEY").ok())?
            .set_override_option(
                "provider.service_account_path",
                env::var("FIREBASE_SERVICE_ACCOUNT_PATH").ok(),
            )?;

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            provider: ProviderConfig::default(),
            dispatch: DispatchConfig::default(),
            notification: NotificationStyleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            project_id: None,
            client_email: None,
            private_key: None,
            service_account_path: None,
            fcm_endpoint: default_fcm_endpoint(),
            iid_endpoint: default_iid_endpoint(),
            token_uri: default_token_uri(),
            request_timeout_seconds: default_request_timeout(),
            max_concurrent_sends: default_max_concurrent_sends(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: default_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            max_repeat_count: default_max_repeat_count(),
        }
    }
}

impl Default for NotificationStyleConfig {
    fn default() -> Self {
        Self {
            android_icon: default_android_icon(),
            android_color: default_android_color(),
            apns_badge: default_apns_badge(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}
