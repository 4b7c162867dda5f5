//! Configuration for the mockup server.
//!
//! Holds users, the fixture table, latency bounds and session settings.
//! The configuration is loaded once and never mutated afterwards.

use crate::router::RouteKey;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Paths served by the engine itself, relative to the base URI.
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const STATUS_PATH: &str = "/api/auth/status";
pub const LOGOUT_PATH: &str = "/api/auth/logout";

/// Public documentation endpoints. These are not prefixed by the base URI.
pub const OPENAPI_PATH: &str = "/openapi-json";
pub const DOCS_PATH: &str = "/docs";

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}

/// Main configuration for the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SimulatorConfig {
    /// Prefix for the authentication endpoints
    #[serde(rename = "baseURI", default)]
    pub base_uri: String,

    /// Simulated latency bounds
    #[serde(default)]
    pub response_time: ResponseTime,

    /// Accounts accepted by the login endpoint
    #[serde(default = "default_users")]
    pub users: Vec<UserAccount>,

    /// Fixture table keyed by `"/path"` or `"METHOD /path"`
    #[serde(default)]
    pub services: IndexMap<String, Fixture>,

    /// Session token and cookie settings
    #[serde(default)]
    pub session: SessionSettings,

    /// What to answer when a preference hint names a status with no example
    #[serde(default)]
    pub preference_fallback: PreferenceFallback,

    /// Settings for the generated OpenAPI document
    #[serde(default)]
    pub openapi: OpenApiSettings,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            base_uri: String::new(),
            response_time: ResponseTime::default(),
            users: default_users(),
            services: IndexMap::new(),
            session: SessionSettings::default(),
            preference_fallback: PreferenceFallback::default(),
            openapi: OpenApiSettings::default(),
        }
    }
}

impl SimulatorConfig {
    /// Load configuration from a YAML or JSON file.
    ///
    /// A relative OpenAPI overlay path is resolved against the directory of
    /// the configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;

        if let (Some(overlay), Some(dir)) = (&config.openapi.overlay, path.parent()) {
            if overlay.is_relative() {
                config.openapi.overlay = Some(dir.join(overlay));
            }
        }

        Ok(config)
    }

    /// Parse and validate configuration text. JSON is accepted as well.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.response_time.validate()?;
        self.session.validate()?;

        if self.base_uri.contains(['{', '}', '*', ':', '?', '#']) {
            return Err(ConfigError::invalid(format!(
                "baseURI contains reserved characters: {}",
                self.base_uri
            )));
        }

        let mut usernames = HashSet::new();
        for user in &self.users {
            if user.username.is_empty() {
                return Err(ConfigError::invalid("username cannot be empty"));
            }
            if !usernames.insert(user.username.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate user '{}'",
                    user.username
                )));
            }
        }

        let reserved = self.reserved_paths();
        let mut seen = HashSet::new();
        for (key, fixture) in &self.services {
            let route = RouteKey::parse(key, fixture)
                .map_err(|e| ConfigError::invalid(format!("service '{}': {}", key, e)))?;
            fixture
                .response
                .validate()
                .map_err(|e| ConfigError::invalid(format!("service '{}': {}", key, e)))?;

            if reserved.contains(&route.path) {
                return Err(ConfigError::invalid(format!(
                    "service '{}' collides with built-in endpoint {}",
                    key, route.path
                )));
            }
            if !seen.insert(route.clone()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate route {} {}",
                    route.method, route.path
                )));
            }
        }

        Ok(())
    }

    pub fn login_path(&self) -> String {
        join_base(&self.base_uri, LOGIN_PATH)
    }

    pub fn status_path(&self) -> String {
        join_base(&self.base_uri, STATUS_PATH)
    }

    pub fn logout_path(&self) -> String {
        join_base(&self.base_uri, LOGOUT_PATH)
    }

    fn reserved_paths(&self) -> HashSet<String> {
        [
            self.login_path(),
            self.status_path(),
            self.logout_path(),
            OPENAPI_PATH.to_string(),
            DOCS_PATH.to_string(),
        ]
        .into_iter()
        .collect()
    }

    /// Look up an account by credentials.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<&UserAccount> {
        self.users
            .iter()
            .find(|u| u.username == username && u.password == password)
    }
}

/// Join a base URI and an absolute path the way a POSIX path join would.
pub fn join_base(base: &str, path: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if base.is_empty() {
        format!("/{}", path)
    } else if base.starts_with('/') {
        format!("{}/{}", base, path)
    } else {
        format!("/{}/{}", base, path)
    }
}

/// Inclusive latency bounds in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseTime {
    #[serde(default)]
    pub min: u64,
    #[serde(default)]
    pub max: u64,
}

impl ResponseTime {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::invalid(format!(
                "responseTime.min ({}) exceeds responseTime.max ({})",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Pick a delay uniformly from `min..=max`.
    pub fn sample(&self) -> Duration {
        let ms = if self.max > self.min {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        };
        Duration::from_millis(ms)
    }
}

/// A mock account. Passwords are compared in plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserAccount {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".to_string()
}

fn default_users() -> Vec<UserAccount> {
    vec![UserAccount {
        username: "user".to_string(),
        password: "1234".to_string(),
        full_name: "Mock User".to_string(),
        role: default_role(),
    }]
}

/// A configured request/response pair simulating one backend route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Fixture {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// HTTP method. Required to agree with the route key when both are set.
    #[serde(default)]
    pub method: Option<String>,

    /// Example request, used for documentation only
    #[serde(default)]
    pub request: Option<RequestExample>,

    pub response: ResponseFixture,
}

/// Example request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestExample {
    #[serde(default = "default_content_type", alias = "content_type")]
    pub content_type: String,

    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

fn default_content_type() -> String {
    "application/json".to_string()
}

/// Configured response for a fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseFixture {
    #[serde(default = "default_status")]
    pub status: u16,

    #[serde(default)]
    pub body: Option<serde_json::Value>,

    /// Alternative bodies keyed by status code
    #[serde(default)]
    pub examples: IndexMap<String, serde_json::Value>,
}

fn default_status() -> u16 {
    200
}

/// Final response statuses only; 1xx cannot end an exchange.
pub(crate) fn is_valid_status(status: u16) -> bool {
    (200..=599).contains(&status)
}

impl ResponseFixture {
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_status(self.status) {
            return Err(format!("invalid status code: {}", self.status));
        }
        for key in self.examples.keys() {
            match key.trim().parse::<u16>() {
                Ok(status) if status == self.status => {
                    return Err(format!(
                        "example {} duplicates the configured status; use `body` instead",
                        key
                    ))
                }
                Ok(status) if is_valid_status(status) => {}
                _ => return Err(format!("invalid example status: {}", key)),
            }
        }
        Ok(())
    }

    /// Body paired with `status`, if this fixture can answer with it.
    pub fn example_for(&self, status: u16) -> Option<Option<&serde_json::Value>> {
        if status == self.status {
            return Some(self.body.as_ref());
        }
        self.examples
            .iter()
            .find(|(key, _)| key.trim().parse::<u16>().ok() == Some(status))
            .map(|(_, body)| Some(body))
    }

    /// Keyed examples with their parsed status codes.
    pub fn keyed_examples(&self) -> impl Iterator<Item = (u16, &serde_json::Value)> {
        self.examples
            .iter()
            .filter_map(|(key, body)| key.trim().parse::<u16>().ok().map(|s| (s, body)))
    }
}

/// Session token and cookie settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionSettings {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Signing secret for new tokens
    #[serde(default = "default_secret")]
    pub secret: String,

    /// Secrets still accepted for verification after a rotation
    #[serde(default)]
    pub previous_secrets: Vec<String>,

    /// Token and cookie lifetime in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            secret: default_secret(),
            previous_secrets: Vec::new(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl SessionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::invalid("session.secret cannot be empty"));
        }
        if self.previous_secrets.iter().any(String::is_empty) {
            return Err(ConfigError::invalid(
                "session.previousSecrets cannot contain empty secrets",
            ));
        }
        let valid_name = !self.cookie_name.is_empty()
            && self
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid_name {
            return Err(ConfigError::invalid(format!(
                "invalid session.cookieName: '{}'",
                self.cookie_name
            )));
        }
        if self.ttl_secs == 0 || self.ttl_secs > MAX_TTL_SECS {
            return Err(ConfigError::invalid(format!(
                "session.ttlSecs must be between 1 and {}",
                MAX_TTL_SECS
            )));
        }
        Ok(())
    }
}

fn default_cookie_name() -> String {
    "wst-runtime-session".to_string()
}

fn default_secret() -> String {
    "wst-runtime-mockup-secret".to_string()
}

const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

/// Answer for a preference hint naming a status the fixture has no example for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreferenceFallback {
    /// Return the requested status with an empty body
    #[default]
    EchoStatus,
    /// Return 503 with an empty body
    ServiceUnavailable,
}

/// Settings for the generated OpenAPI document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OpenApiSettings {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_api_version")]
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Hand-authored partial document merged over the generated one
    #[serde(default)]
    pub overlay: Option<PathBuf>,
}

impl Default for OpenApiSettings {
    fn default() -> Self {
        Self {
            title: default_title(),
            version: default_api_version(),
            description: None,
            server_url: default_server_url(),
            overlay: None,
        }
    }
}

fn default_title() -> String {
    "Mockup Server".to_string()
}

fn default_api_version() -> String {
    "1.0.0".to_string()
}

fn default_server_url() -> String {
    "/".to_string()
}
