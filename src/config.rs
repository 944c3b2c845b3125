use std::{fs, path::Path, time::Duration};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

// --- TIMEOUTS ---

/// Upstream timeouts in seconds, one per request class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub connect: u64,
    pub response: u64,
    pub total: u64,
    pub model_load: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: 10,
            response: 60,
            total: 600,
            model_load: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect)
    }

    pub fn response(&self) -> Duration {
        Duration::from_secs(self.response)
    }

    pub fn total(&self) -> Duration {
        Duration::from_secs(self.total)
    }

    pub fn model_load(&self) -> Duration {
        Duration::from_secs(self.model_load)
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialTimeoutConfig {
    pub connect: Option<u64>,
    pub response: Option<u64>,
    pub total: Option<u64>,
    pub model_load: Option<u64>,
}

impl PartialTimeoutConfig {
    fn merge_into(self, final_config: &mut TimeoutConfig) {
        if let Some(connect) = self.connect { final_config.connect = connect; }
        if let Some(response) = self.response { final_config.response = response; }
        if let Some(total) = self.total { final_config.total = total; }
        if let Some(model_load) = self.model_load { final_config.model_load = model_load; }
    }

    fn is_empty(&self) -> bool {
        self.connect.is_none() && self.response.is_none() && self.total.is_none() && self.model_load.is_none()
    }
}

// --- OUTBOUND PROXY ---

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutboundProxyConfig {
    pub http: Option<String>,
    pub https: Option<String>,
    /// Comma separated bypass rules: hosts, `.suffix`, `*.suffix`, IPs, CIDR blocks or `*`.
    pub no_proxy: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialOutboundProxyConfig {
    pub http: Option<String>,
    pub https: Option<String>,
    pub no_proxy: Option<String>,
}

impl PartialOutboundProxyConfig {
    fn merge_into(self, final_config: &mut OutboundProxyConfig) {
        if let Some(http) = self.http { final_config.http = Some(http); }
        if let Some(https) = self.https { final_config.https = Some(https); }
        if let Some(no_proxy) = self.no_proxy { final_config.no_proxy = Some(no_proxy); }
    }

    fn is_empty(&self) -> bool {
        self.http.is_none() && self.https.is_none() && self.no_proxy.is_none()
    }
}

// --- COOLDOWN ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Upstream status codes that put a route into cooldown.
    pub status_codes: Vec<u16>,
    pub seconds: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            status_codes: vec![429],
            seconds: 600,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialCooldownConfig {
    pub status_codes: Option<Vec<u16>>,
    pub seconds: Option<u64>,
}

impl PartialCooldownConfig {
    fn merge_into(self, final_config: &mut CooldownConfig) {
        if let Some(status_codes) = self.status_codes { final_config.status_codes = status_codes; }
        if let Some(seconds) = self.seconds { final_config.seconds = seconds; }
    }
}

// Used for deserializing user-provided config files where all fields are optional.
#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub base_path: Option<String>,
    pub db_url: Option<String>,
    pub memory_seed: Option<String>,
    pub log_level: Option<String>,
    pub proxy: Option<String>,
    pub jwt_secret: Option<String>,
    pub timeouts: Option<PartialTimeoutConfig>,
    pub outbound_proxy: Option<PartialOutboundProxyConfig>,
    pub cooldown: Option<PartialCooldownConfig>,
    pub log_detail_retention_days: Option<u32>,
    pub image_model_pattern: Option<String>,
    pub audio_model_pattern: Option<String>,
    pub responses_model_pattern: Option<String>,
}

impl PartialConfig {
    /// Merges the fields of this partial config into a final config, overwriting existing values.
    fn merge_into(self, final_config: &mut FinalConfig) {
        if let Some(host) = self.host { final_config.host = host; }
        if let Some(port) = self.port { final_config.port = port; }
        if let Some(base_path) = self.base_path { final_config.base_path = base_path; }
        if let Some(db_url) = self.db_url { final_config.db_url = db_url; }
        if let Some(memory_seed) = self.memory_seed { final_config.memory_seed = Some(memory_seed); }
        if let Some(log_level) = self.log_level { final_config.log_level = log_level; }
        if let Some(proxy) = self.proxy { final_config.proxy = Some(proxy); }
        if let Some(jwt_secret) = self.jwt_secret { final_config.jwt_secret = Some(jwt_secret); }
        if let Some(timeouts) = self.timeouts {
            timeouts.merge_into(&mut final_config.timeouts);
        }
        if let Some(outbound_proxy) = self.outbound_proxy {
            outbound_proxy.merge_into(&mut final_config.outbound_proxy);
        }
        if let Some(cooldown) = self.cooldown {
            cooldown.merge_into(&mut final_config.cooldown);
        }
        if let Some(days) = self.log_detail_retention_days { final_config.log_detail_retention_days = days; }
        if let Some(pattern) = self.image_model_pattern { final_config.image_model_pattern = pattern; }
        if let Some(pattern) = self.audio_model_pattern { final_config.audio_model_pattern = pattern; }
        if let Some(pattern) = self.responses_model_pattern { final_config.responses_model_pattern = pattern; }
    }
}

// The fully resolved configuration used by the application.
// This is also the format for the default configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FinalConfig {
    pub host: String,
    pub port: u16,
    pub base_path: String,
    /// `memory` selects the in-process store, anything else is a sqlite path or postgres URL.
    pub db_url: String,
    pub memory_seed: Option<String>,
    pub log_level: String,
    pub proxy: Option<String>,
    pub jwt_secret: Option<String>,
    pub timeouts: TimeoutConfig,
    pub outbound_proxy: OutboundProxyConfig,
    pub cooldown: CooldownConfig,
    pub log_detail_retention_days: u32,
    pub image_model_pattern: String,
    pub audio_model_pattern: String,
    pub responses_model_pattern: String,
}

impl Default for FinalConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            base_path: "".to_string(),
            db_url: "./storage/gateway.db".to_string(),
            memory_seed: None,
            log_level: "info".to_string(),
            proxy: None,
            jwt_secret: None,
            timeouts: TimeoutConfig::default(),
            outbound_proxy: OutboundProxyConfig::default(),
            cooldown: CooldownConfig::default(),
            log_detail_retention_days: 30,
            image_model_pattern: "%dall-e%".to_string(),
            audio_model_pattern: "%whisper%".to_string(),
            responses_model_pattern: "%gpt%".to_string(),
        }
    }
}

impl FinalConfig {
    pub fn uses_memory_store(&self) -> bool {
        self.db_url.eq_ignore_ascii_case("memory")
    }
}

fn get_env_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Upper-case name first, then the lower-case spelling curl and friends accept.
fn get_env_var_any_case<T: std::str::FromStr>(key: &str) -> Option<T> {
    get_env_var(key).or_else(|| get_env_var(&key.to_ascii_lowercase()))
}

fn get_config_from_env() -> PartialConfig {
    let timeouts = PartialTimeoutConfig {
        connect: get_env_var("CONNECT_TIMEOUT"),
        response: get_env_var("RESPONSE_TIMEOUT"),
        total: get_env_var("TOTAL_TIMEOUT"),
        model_load: get_env_var("MODEL_LOAD_TIMEOUT"),
    };
    let outbound_proxy = PartialOutboundProxyConfig {
        http: get_env_var_any_case("HTTP_PROXY"),
        https: get_env_var_any_case("HTTPS_PROXY"),
        no_proxy: get_env_var_any_case("NO_PROXY"),
    };
    PartialConfig {
        host: get_env_var("HOST"),
        port: get_env_var("PORT"),
        base_path: get_env_var("BASE_PATH"),
        db_url: get_env_var("DB_URL"),
        memory_seed: get_env_var("MEMORY_SEED"),
        log_level: get_env_var("LOG_LEVEL"),
        proxy: get_env_var("PROXY"),
        jwt_secret: get_env_var("JWT_SECRET"),
        timeouts: (!timeouts.is_empty()).then_some(timeouts),
        outbound_proxy: (!outbound_proxy.is_empty()).then_some(outbound_proxy),
        ..Default::default()
    }
}

pub static CONFIG: Lazy<FinalConfig> = Lazy::new(|| {
    let default_config_path = Path::new("config.default.yaml");
    let user_config_path_release = Path::new("config.yaml");
    let user_config_path_dev_primary = Path::new("config.local.yaml");

    // Determine which user config file to use for overrides
    let user_config_path = if cfg!(debug_assertions) && user_config_path_dev_primary.exists() {
        user_config_path_dev_primary
    } else {
        user_config_path_release
    };

    let mut effective_default_config = FinalConfig::default();

    // If a default config file exists, load it as partial and merge it over the programmatic defaults.
    if default_config_path.exists() {
        if let Ok(config_str) = fs::read_to_string(default_config_path) {
            let file_defaults: PartialConfig = serde_yaml::from_str(&config_str)
                .unwrap_or_else(|e| panic!("Failed to parse default configuration file at {:?}: {}", default_config_path, e));

            file_defaults.merge_into(&mut effective_default_config);
        }
    }

    // Write the (potentially updated) defaults back so new fields show up in config.default.yaml.
    let yaml_str = serde_yaml::to_string(&effective_default_config)
        .unwrap_or_else(|err| panic!("Failed to serialize default configuration: {}", err));
    fs::write(default_config_path, yaml_str)
        .unwrap_or_else(|err| panic!("Failed to write default configuration file: {}", err));

    let mut final_config = effective_default_config;

    // Load the user's config if it exists. It's optional and overrides the defaults.
    if user_config_path.exists() {
        if let Ok(config_str) = fs::read_to_string(user_config_path) {
            let user_config: PartialConfig = serde_yaml::from_str(&config_str)
                .unwrap_or_else(|e| panic!("Failed to parse user configuration file at {:?}: {}", user_config_path, e));

            user_config.merge_into(&mut final_config);
        }
    }

    // Environment variables have the highest priority.
    get_config_from_env().merge_into(&mut final_config);

    // The legacy single proxy setting covers HTTPS when nothing more specific is given.
    if final_config.outbound_proxy.https.is_none() {
        final_config.outbound_proxy.https = final_config.proxy.clone();
    }

    final_config
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_overrides_only_given_fields() {
        let yaml = r#"
port: 9000
db_url: memory
timeouts:
  total: 120
cooldown:
  status_codes: [429, 503]
"#;
        let partial: PartialConfig = serde_yaml::from_str(yaml).unwrap();
        let mut config = FinalConfig::default();
        partial.merge_into(&mut config);

        assert_eq!(config.port, 9000);
        assert!(config.uses_memory_store());
        assert_eq!(config.timeouts.total, 120);
        assert_eq!(config.timeouts.connect, 10);
        assert_eq!(config.cooldown.status_codes, vec![429, 503]);
        assert_eq!(config.cooldown.seconds, 600);
        assert_eq!(config.image_model_pattern, "%dall-e%");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<PartialConfig, _> = serde_yaml::from_str("not_a_key: 1\n");
        assert!(result.is_err());
    }
}
