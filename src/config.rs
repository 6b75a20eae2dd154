use crate::{auth::UplinkAuth, headers::RequestHeaders};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use config::{Config as SettingsLoader, Environment};
use serde::Deserialize;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

pub const DEFAULT_UPLINK: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkConfig {
    pub url: String,
    pub auth: Option<UplinkAuth>,
    /// Static headers from `uplinks.<name>.headers`, applied after resolution.
    pub headers: RequestHeaders,
}

impl UplinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            auth: None,
            headers: RequestHeaders::new(),
        }
    }

    pub fn with_auth(mut self, auth: UplinkAuth) -> Self {
        self.auth = Some(auth);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub uplinks: HashMap<String, UplinkConfig>,
    pub upstream_registry: Option<String>,
    pub user_agent: Option<String>,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawEnvConfig {
    config: Option<String>,
    config_base64: Option<String>,
    upstream: Option<String>,
    user_agent: Option<String>,
    log_level: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let env_cfg = load_rustaccio_env()?;
        let mut cfg = Self::defaults();
        cfg.apply_env_config_sources_if_present(&env_cfg)?;
        cfg.apply_env_overrides(&env_cfg);
        cfg.ensure_default_uplink();
        Ok(cfg)
    }

    pub fn from_env_with_config_file(config_path: PathBuf) -> Result<Self, String> {
        let env_cfg = load_rustaccio_env()?;
        let mut cfg = Self::defaults();
        cfg.apply_env_config_sources_if_present(&env_cfg)?;
        cfg.apply_yaml_overrides(Self::from_yaml_file(config_path)?);
        cfg.apply_env_overrides(&env_cfg);
        cfg.ensure_default_uplink();
        Ok(cfg)
    }

    pub fn defaults() -> Self {
        Self {
            uplinks: HashMap::new(),
            upstream_registry: None,
            user_agent: None,
            log_level: "info".to_string(),
        }
    }

    fn apply_env_config_sources_if_present(
        &mut self,
        env_cfg: &RawEnvConfig,
    ) -> Result<(), String> {
        let config_path = env_cfg
            .config
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let config_b64 = env_cfg
            .config_base64
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match (config_path, config_b64) {
            (Some(_), Some(_)) => Err(
                "RUSTACCIO_CONFIG and RUSTACCIO_CONFIG_BASE64 are both set; use only one"
                    .to_string(),
            ),
            (Some(path), None) => {
                let loaded = Self::from_yaml_file(PathBuf::from(path))
                    .map_err(|err| format!("failed to load RUSTACCIO_CONFIG={path}: {err}"))?;
                self.apply_yaml_overrides(loaded);
                Ok(())
            }
            (None, Some(value)) => {
                let compact = value
                    .chars()
                    .filter(|ch| !ch.is_ascii_whitespace())
                    .collect::<String>();
                let decoded = B64
                    .decode(compact)
                    .map_err(|err| format!("failed to decode RUSTACCIO_CONFIG_BASE64: {err}"))?;
                let yaml = String::from_utf8(decoded).map_err(|err| {
                    format!(
                        "failed to decode RUSTACCIO_CONFIG_BASE64: decoded bytes are not UTF-8 ({err})"
                    )
                })?;
                let loaded = Self::from_yaml_str("RUSTACCIO_CONFIG_BASE64", &yaml)
                    .map_err(|err| format!("failed to load RUSTACCIO_CONFIG_BASE64: {err}"))?;
                self.apply_yaml_overrides(loaded);
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    fn apply_env_overrides(&mut self, env_cfg: &RawEnvConfig) {
        if let Some(raw_upstream) = env_cfg.upstream.as_deref() {
            let upstream = raw_upstream.trim().trim_end_matches('/').to_string();
            if upstream.is_empty() {
                self.upstream_registry = None;
                self.uplinks.remove(DEFAULT_UPLINK);
            } else {
                self.upstream_registry = Some(upstream.clone());
                self.uplinks
                    .insert(DEFAULT_UPLINK.to_string(), UplinkConfig::new(upstream));
            }
        }

        if let Some(value) = env_cfg.user_agent.as_deref() {
            self.user_agent = empty_string_to_none(value.trim().to_string());
        }
        if let Some(value) = env_cfg.log_level.as_deref()
            && !value.trim().is_empty()
        {
            self.log_level = value.to_string();
        }
    }

    fn apply_yaml_overrides(&mut self, loaded: Self) {
        self.uplinks = loaded.uplinks;
        self.upstream_registry = loaded.upstream_registry;
        self.user_agent = loaded.user_agent;
        self.log_level = loaded.log_level;
    }

    fn ensure_default_uplink(&mut self) {
        if let Some(upstream) = self.upstream_registry.clone() {
            self.uplinks
                .entry(DEFAULT_UPLINK.to_string())
                .or_insert_with(|| UplinkConfig::new(upstream));
        }
    }

    pub fn from_yaml_file(path: PathBuf) -> Result<Self, String> {
        let parsed = load_yaml_config(&path)?;
        Self::from_yaml_config(parsed)
    }

    pub fn from_yaml_str(source: &str, text: &str) -> Result<Self, String> {
        let parsed = serde_yaml::from_str::<YamlConfig>(text)
            .map_err(|err| format!("failed to parse {source}: {err}"))?;
        Self::from_yaml_config(parsed)
    }

    fn from_yaml_config(parsed: YamlConfig) -> Result<Self, String> {
        let mut uplinks = HashMap::new();
        let mut first_url = None;
        if let Some(items) = parsed.uplinks {
            for (name, value) in items {
                let name = name
                    .as_str()
                    .ok_or_else(|| "invalid uplinks key".to_string())?
                    .to_string();
                let uplink = parse_uplink(&name, value)?;
                if uplink.url.is_empty() {
                    continue;
                }
                first_url.get_or_insert_with(|| uplink.url.clone());
                uplinks.insert(name, uplink);
            }
        }

        let log_level = parsed
            .log
            .and_then(|log| log.level)
            .unwrap_or_else(|| "info".to_string());

        Ok(Self {
            uplinks,
            upstream_registry: first_url,
            user_agent: parsed
                .user_agent
                .and_then(|value| empty_string_to_none(value.trim().to_string())),
            log_level,
        })
    }
}

fn load_yaml_config(path: &Path) -> Result<YamlConfig, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    serde_yaml::from_str::<YamlConfig>(&text)
        .map_err(|err| format!("failed to parse {}: {err}", path.display()))
}

fn load_rustaccio_env() -> Result<RawEnvConfig, String> {
    let settings = SettingsLoader::builder()
        .add_source(Environment::with_prefix("RUSTACCIO").try_parsing(false))
        .build()
        .map_err(|err| format!("failed to load RUSTACCIO_* environment: {err}"))?;

    Ok(RawEnvConfig {
        config: env_value_for_var(&settings, "RUSTACCIO_CONFIG"),
        config_base64: env_value_for_var(&settings, "RUSTACCIO_CONFIG_BASE64"),
        upstream: env_value_for_var(&settings, "RUSTACCIO_UPSTREAM"),
        user_agent: env_value_for_var(&settings, "RUSTACCIO_USER_AGENT"),
        log_level: env_value_for_var(&settings, "RUSTACCIO_LOG_LEVEL"),
    })
}

fn env_value_for_var(settings: &SettingsLoader, env_var: &str) -> Option<String> {
    let key = env_var
        .strip_prefix("RUSTACCIO_")
        .unwrap_or(env_var)
        .to_ascii_lowercase();
    settings.get_string(&key).ok()
}

fn empty_string_to_none(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn parse_uplink(name: &str, value: serde_yaml::Value) -> Result<UplinkConfig, String> {
    let parsed: YamlUplink = serde_yaml::from_value(value)
        .map_err(|err| format!("invalid uplink {name}: {err}"))?;

    let mut headers = RequestHeaders::new();
    for (key, value) in parsed.headers.unwrap_or_default() {
        let (Some(key), Some(value)) = (key.as_str(), yaml_scalar_string(&value)) else {
            return Err(format!("invalid uplink {name}: headers must be string pairs"));
        };
        headers.insert(key, value);
    }

    let mut uplink = UplinkConfig::new(parsed.url.trim());
    uplink.auth = parsed.auth;
    uplink.headers = headers;
    Ok(uplink)
}

fn yaml_scalar_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct YamlConfig {
    uplinks: Option<serde_yaml::Mapping>,
    user_agent: Option<String>,
    log: Option<YamlLog>,
}

#[derive(Debug, Deserialize)]
struct YamlUplink {
    url: String,
    auth: Option<UplinkAuth>,
    headers: Option<serde_yaml::Mapping>,
}

#[derive(Debug, Deserialize)]
struct YamlLog {
    level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{Config, UplinkConfig};
    use crate::auth::{AuthBlock, TokenEnv, UplinkAuth};

    #[test]
    fn parses_uplinks_with_auth_blocks() {
        let cfg = Config::from_yaml_str(
            "inline",
            r#"
uplinks:
  npmjs:
    url: https://registry.npmjs.org/
    auth:
      type: bearer
      token_env: NPM_TOKEN_NPMJS
  private:
    url: https://npm.example.com
    auth:
      type: basic
      token: Zm9vX2Jhcg==
  anonymous:
    url: https://mirror.example.com/
"#,
        )
        .expect("parse");

        let npmjs = cfg.uplinks.get("npmjs").expect("npmjs");
        assert_eq!(npmjs.url, "https://registry.npmjs.org");
        assert_eq!(
            npmjs.auth,
            Some(UplinkAuth::Block(
                AuthBlock::new("bearer")
                    .with_token_env(TokenEnv::Name("NPM_TOKEN_NPMJS".to_string()))
            ))
        );
        assert_eq!(
            cfg.uplinks.get("private").and_then(|u| u.auth.clone()),
            Some(UplinkAuth::basic("Zm9vX2Jhcg=="))
        );
        assert_eq!(
            cfg.uplinks.get("anonymous").map(|u| u.auth.is_none()),
            Some(true)
        );
        assert_eq!(
            cfg.upstream_registry.as_deref(),
            Some("https://registry.npmjs.org")
        );
    }

    #[test]
    fn keeps_malformed_auth_for_the_resolver_to_reject() {
        let cfg = Config::from_yaml_str(
            "inline",
            r#"
uplinks:
  broken:
    url: https://npm.example.com
    auth: ''
"#,
        )
        .expect("parse");
        assert_eq!(
            cfg.uplinks.get("broken").and_then(|u| u.auth.clone()),
            Some(UplinkAuth::Malformed)
        );
    }

    #[test]
    fn parses_static_headers_and_drops_empty_urls() {
        let cfg = Config::from_yaml_str(
            "inline",
            r#"
user_agent: npm (acme/1.0.0)
log:
  level: debug
uplinks:
  npmjs:
    url: https://registry.npmjs.org
    headers:
      x-npm-scope: acme
      x-retries: 3
  empty:
    url: ''
"#,
        )
        .expect("parse");
        let npmjs = cfg.uplinks.get("npmjs").expect("npmjs");
        assert_eq!(npmjs.headers.get("x-npm-scope"), Some("acme"));
        assert_eq!(npmjs.headers.get("x-retries"), Some("3"));
        assert!(!cfg.uplinks.contains_key("empty"));
        assert_eq!(cfg.user_agent.as_deref(), Some("npm (acme/1.0.0)"));
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn rejects_uplink_without_url() {
        let err = Config::from_yaml_str(
            "inline",
            r#"
uplinks:
  npmjs:
    auth:
      type: basic
"#,
        )
        .expect_err("missing url");
        assert!(err.contains("invalid uplink npmjs"), "{err}");
    }

    #[test]
    fn uplink_config_trims_trailing_slash() {
        assert_eq!(
            UplinkConfig::new("https://registry.npmjs.org/").url,
            "https://registry.npmjs.org"
        );
    }
}
