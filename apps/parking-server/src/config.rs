//! Server configuration.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};
use auth::{DEFAULT_SESSION_TTL_HOURS, OidcConfig};
use entities::NewUser;
use parking_store::DEFAULT_BCRYPT_COST;

/// How operators authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Username and password accounts stored locally.
    #[default]
    Local,
    /// OpenID Connect against an external provider.
    Oidc,
}

impl FromStr for AuthMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "oidc" => Ok(Self::Oidc),
            other => bail!("unknown auth mode {other:?} (expected \"local\" or \"oidc\")"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => bail!("unknown log format {other:?} (expected \"pretty\" or \"json\")"),
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database URL.
    pub database_url: String,
    /// Authentication strategy.
    pub auth_mode: AuthMode,
    /// OIDC settings, present in OIDC mode.
    pub oidc: Option<OidcConfig>,
    /// Session lifetime in hours.
    pub session_ttl_hours: i64,
    /// Interval between expired-session sweeps.
    pub session_sweep_secs: u64,
    /// Whether the session cookie carries the `Secure` attribute.
    pub cookie_secure: bool,
    /// Whether to seed the default layout at startup.
    pub seed_spaces: bool,
    /// Bootstrap operator account name.
    pub admin_username: Option<String>,
    /// Bootstrap operator account password.
    pub admin_password: Option<String>,
    /// bcrypt cost for new password hashes.
    pub bcrypt_cost: u32,
    /// Directory holding the browser client bundle.
    pub static_dir: Option<PathBuf>,
    /// Allowed CORS origins. Empty allows any origin without credentials.
    pub cors_origins: Vec<String>,
    /// Log level.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            database_url: "sqlite:parking.db?mode=rwc".to_string(),
            auth_mode: AuthMode::Local,
            oidc: None,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            session_sweep_secs: 900,
            cookie_secure: false,
            seed_spaces: true,
            admin_username: None,
            admin_password: None,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            static_dir: None,
            cors_origins: Vec::new(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let auth_mode = match var("PARKING_AUTH_MODE") {
            Some(value) => value.parse().context("PARKING_AUTH_MODE")?,
            None => defaults.auth_mode,
        };

        let oidc = match auth_mode {
            AuthMode::Local => None,
            AuthMode::Oidc => Some(oidc_from_lookup(&var)?),
        };

        let admin_username = var("PARKING_ADMIN_USERNAME");
        let admin_password = var("PARKING_ADMIN_PASSWORD");
        if admin_username.is_some() != admin_password.is_some() {
            bail!("PARKING_ADMIN_USERNAME and PARKING_ADMIN_PASSWORD must be set together");
        }

        let session_ttl_hours: i64 =
            parse_or(&var, "PARKING_SESSION_TTL_HOURS", defaults.session_ttl_hours)?;
        if session_ttl_hours <= 0 {
            bail!("PARKING_SESSION_TTL_HOURS must be positive");
        }

        let session_sweep_secs: u64 =
            parse_or(&var, "PARKING_SESSION_SWEEP_SECS", defaults.session_sweep_secs)?;
        if session_sweep_secs == 0 {
            bail!("PARKING_SESSION_SWEEP_SECS must be positive");
        }

        Ok(Self {
            host: var("PARKING_SERVER_HOST").unwrap_or(defaults.host),
            port: parse_or(&var, "PARKING_SERVER_PORT", defaults.port)?,
            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
            auth_mode,
            oidc,
            session_ttl_hours,
            session_sweep_secs,
            cookie_secure: flag_or(&var, "PARKING_COOKIE_SECURE", defaults.cookie_secure)?,
            seed_spaces: flag_or(&var, "PARKING_SEED_SPACES", defaults.seed_spaces)?,
            admin_username,
            admin_password,
            bcrypt_cost: parse_or(&var, "PARKING_BCRYPT_COST", defaults.bcrypt_cost)?,
            static_dir: var("PARKING_STATIC_DIR").map(PathBuf::from),
            cors_origins: var("PARKING_CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            log_level: var("PARKING_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: match var("PARKING_LOG_FORMAT") {
                Some(value) => value.parse().context("PARKING_LOG_FORMAT")?,
                None => defaults.log_format,
            },
        })
    }

    /// Returns the server address.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Session lifetime.
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }

    /// The bootstrap operator account, when configured.
    pub fn admin_account(&self) -> Option<NewUser> {
        match (&self.admin_username, &self.admin_password) {
            (Some(username), Some(password)) => Some(NewUser::new(username, password)),
            _ => None,
        }
    }
}

fn oidc_from_lookup(var: &impl Fn(&str) -> Option<String>) -> anyhow::Result<OidcConfig> {
    let required = |name: &str| {
        var(name).with_context(|| format!("{name} is required when PARKING_AUTH_MODE=oidc"))
    };

    let mut config = OidcConfig::new(
        required("PARKING_OIDC_ISSUER_URL")?,
        required("PARKING_OIDC_CLIENT_ID")?,
        required("PARKING_OIDC_CLIENT_SECRET")?,
        required("PARKING_OIDC_REDIRECT_URL")?,
    );

    if let Some(scopes) = var("PARKING_OIDC_SCOPES") {
        config = config.with_scopes(
            scopes
                .split(',')
                .map(|scope| scope.trim().to_string())
                .filter(|scope| !scope.is_empty())
                .collect(),
        );
    }

    Ok(config)
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {name} {value:?}: {e}")),
        None => Ok(default),
    }
}

fn flag_or(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> anyhow::Result<bool> {
    match var(name).map(|value| value.trim().to_ascii_lowercase()) {
        Some(value) => match value.as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => bail!("invalid {name} {value:?}: expected a boolean"),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.server_addr(), "0.0.0.0:5000");
        assert_eq!(config.auth_mode, AuthMode::Local);
        assert_eq!(config.session_ttl(), chrono::Duration::weeks(1));
        assert!(config.seed_spaces);
        assert!(config.admin_account().is_none());
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PARKING_SERVER_PORT", "8080"),
            ("PARKING_COOKIE_SECURE", "true"),
            ("PARKING_SEED_SPACES", "0"),
            ("PARKING_CORS_ORIGINS", "https://a.test, https://b.test"),
            ("PARKING_LOG_FORMAT", "json"),
            ("PARKING_ADMIN_USERNAME", "admin"),
            ("PARKING_ADMIN_PASSWORD", "admin-pass"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert!(config.cookie_secure);
        assert!(!config.seed_spaces);
        assert_eq!(config.cors_origins, vec!["https://a.test", "https://b.test"]);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.admin_account().map(|u| u.username), Some("admin".to_string()));
    }

    #[test]
    fn test_oidc_mode_requires_provider_settings() {
        let err = load(&[("PARKING_AUTH_MODE", "oidc")]).unwrap_err();
        assert!(err.to_string().contains("PARKING_OIDC_ISSUER_URL"));

        let config = load(&[
            ("PARKING_AUTH_MODE", "oidc"),
            ("PARKING_OIDC_ISSUER_URL", "https://id.test"),
            ("PARKING_OIDC_CLIENT_ID", "parking"),
            ("PARKING_OIDC_CLIENT_SECRET", "secret"),
            ("PARKING_OIDC_REDIRECT_URL", "https://parking.test/api/callback"),
            ("PARKING_OIDC_SCOPES", "openid,email"),
        ])
        .unwrap();
        let oidc = config.oidc.unwrap();
        assert_eq!(oidc.client_id, "parking");
        assert_eq!(oidc.scopes, vec!["openid", "email"]);
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(load(&[("PARKING_AUTH_MODE", "ldap")]).is_err());
        assert!(load(&[("PARKING_SERVER_PORT", "not-a-port")]).is_err());
        assert!(load(&[("PARKING_COOKIE_SECURE", "maybe")]).is_err());
        assert!(load(&[("PARKING_ADMIN_USERNAME", "admin")]).is_err());
        assert!(load(&[("PARKING_SESSION_TTL_HOURS", "0")]).is_err());
    }
}
