//! # Configuration
//!
//! Static settings come from the environment once at startup; every missing
//! or malformed value is logged and replaced by its default. Runtime feature
//! flags live in [`DynamicConfig`] and can change while the server runs.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DB: &str = "connectup.redb";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_RATE_LIMIT_PER_SEC: u32 = 50;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 100;
pub const DEFAULT_EMAIL_LIMIT: u64 = 120;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 51;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Local,
    Dev,
    Main,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "dev" => Ok(Self::Dev),
            "main" | "prod" | "production" => Ok(Self::Main),
            other => Err(format!("unknown environment {other:?}")),
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Dev => "dev",
            Self::Main => "main",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub public_url: String,
    pub env: Environment,
    pub rate_limit_per_sec: u32,
    pub rate_limit_burst: u32,
    pub email_limit: u64,
    pub max_upload_mb: usize,
    /// Initial values of the verification flags in [`DynamicConfig`].
    pub email_verification_flow: bool,
    pub email_verification_compulsory: bool,
    pub phone_verification_flow: bool,
    pub phone_verification_compulsory: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: PathBuf::from(DEFAULT_DB),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            public_url: format!("http://localhost:{DEFAULT_PORT}"),
            env: Environment::Local,
            rate_limit_per_sec: DEFAULT_RATE_LIMIT_PER_SEC,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            email_limit: DEFAULT_EMAIL_LIMIT,
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
            email_verification_flow: false,
            email_verification_compulsory: false,
            phone_verification_flow: false,
            phone_verification_compulsory: false,
        }
    }
}

impl Config {
    /// Load from the process environment.
    pub fn load() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = try_load(&lookup, "CONNECTUP_PORT", DEFAULT_PORT);
        let public_url = lookup("CONNECTUP_PUBLIC_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{port}"));
        Self {
            port,
            db_path: PathBuf::from(try_load(&lookup, "CONNECTUP_DB", DEFAULT_DB.to_string())),
            upload_dir: PathBuf::from(try_load(
                &lookup,
                "CONNECTUP_UPLOAD_DIR",
                DEFAULT_UPLOAD_DIR.to_string(),
            )),
            public_url,
            env: try_load(&lookup, "CONNECTUP_ENV", Environment::Local),
            rate_limit_per_sec: try_load(
                &lookup,
                "CONNECTUP_RATE_LIMIT_PER_SEC",
                DEFAULT_RATE_LIMIT_PER_SEC,
            ),
            rate_limit_burst: try_load(&lookup, "CONNECTUP_RATE_LIMIT_BURST", DEFAULT_RATE_LIMIT_BURST),
            email_limit: try_load(&lookup, "CONNECTUP_EMAIL_LIMIT", DEFAULT_EMAIL_LIMIT),
            max_upload_mb: try_load(&lookup, "CONNECTUP_MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB),
            email_verification_flow: try_load(&lookup, "CONNECTUP_EMAIL_VERIFICATION_FLOW", false),
            email_verification_compulsory: try_load(
                &lookup,
                "CONNECTUP_EMAIL_VERIFICATION_COMPULSORY",
                false,
            ),
            phone_verification_flow: try_load(&lookup, "CONNECTUP_PHONE_VERIFICATION_FLOW", false),
            phone_verification_compulsory: try_load(
                &lookup,
                "CONNECTUP_PHONE_VERIFICATION_COMPULSORY",
                false,
            ),
        }
    }

    /// Body limit for upload routes, in bytes.
    #[must_use]
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Base URL of the web client, used for emailed links.
    #[must_use]
    pub fn web_url(&self) -> &str {
        match self.env {
            Environment::Main => "https://connectup.com",
            Environment::Dev => "https://dev.connectup.com",
            Environment::Local => "http://localhost:3000",
        }
    }

    #[must_use]
    pub fn email_verification_link(&self, token: &str) -> String {
        format!("{}/verify/{token}/email", self.web_url())
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key).filter(|v| !v.trim().is_empty()) else {
        info!("{key} not set, using default: {default}");
        return default;
    };
    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
        default
    })
}

// =============================================================================
// DYNAMIC CONFIG
// =============================================================================

pub const EMAIL_VERIFICATION_FLOW: &str = "email_verification_flow";
pub const EMAIL_VERIFICATION_COMPULSORY: &str = "email_verification_compulsory";
pub const PHONE_VERIFICATION_FLOW: &str = "phone_verification_flow";
pub const PHONE_VERIFICATION_COMPULSORY: &str = "phone_verification_compulsory";
pub const EMAIL_LIMIT: &str = "email_limit";

/// Runtime feature flags.
///
/// Values are stored as strings and read through typed getters; a missing or
/// unparsable value reads as `false` / `0`.
#[derive(Debug, Default)]
pub struct DynamicConfig {
    values: RwLock<BTreeMap<String, String>>,
}

impl DynamicConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags seeded from the static config.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let flags = Self::new();
        flags.set(EMAIL_LIMIT, config.email_limit);
        flags.set(EMAIL_VERIFICATION_FLOW, config.email_verification_flow);
        flags.set(EMAIL_VERIFICATION_COMPULSORY, config.email_verification_compulsory);
        flags.set(PHONE_VERIFICATION_FLOW, config.phone_verification_flow);
        flags.set(PHONE_VERIFICATION_COMPULSORY, config.phone_verification_compulsory);
        flags
    }

    pub fn set(&self, key: &str, value: impl ToString) {
        self.values.write().insert(key.to_string(), value.to_string());
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.values
            .read()
            .get(key)
            .and_then(|v| connectup_core::filters::parse_bool(v))
            .unwrap_or(false)
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> i64 {
        self.values
            .read()
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Sends allowed per minute; unset or non-positive means the default.
    #[must_use]
    pub fn email_limit(&self) -> u64 {
        u64::try_from(self.get_int(EMAIL_LIMIT))
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_EMAIL_LIMIT)
    }

    #[must_use]
    pub fn verification_flags(&self) -> connectup_core::users::VerificationFlags {
        connectup_core::users::VerificationFlags {
            is_email_verification_flow_needed: self.get_bool(EMAIL_VERIFICATION_FLOW),
            is_email_verification_compulsory: self.get_bool(EMAIL_VERIFICATION_COMPULSORY),
            is_phone_verification_flow_needed: self.get_bool(PHONE_VERIFICATION_FLOW),
            is_phone_verification_compulsory: self.get_bool(PHONE_VERIFICATION_COMPULSORY),
        }
    }
}
