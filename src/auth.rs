//! Static uplink credentials: the `auth` block of an uplink and the rules
//! that turn it into a raw token.
//!
//! ```yaml
//! uplinks:
//!   npmjs:
//!     url: https://registry.npmjs.org/
//!     auth:
//!       type: bearer
//!       token_env: NPM_TOKEN_NPMJS
//! ```

use crate::{
    constants::{TOKEN_BASIC, TOKEN_BEARER},
    env::EnvSource,
    error::AuthError,
};
use serde::{Deserialize, Deserializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    Basic,
    Bearer,
}

impl AuthScheme {
    /// Scheme identifiers compare case-insensitively; anything else is rejected
    /// with the offending value.
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        if value.eq_ignore_ascii_case(TOKEN_BASIC) {
            Ok(Self::Basic)
        } else if value.eq_ignore_ascii_case(TOKEN_BEARER) {
            Ok(Self::Bearer)
        } else {
            Err(AuthError::unsupported(value.to_ascii_lowercase()))
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => TOKEN_BASIC,
            Self::Bearer => TOKEN_BEARER,
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders a raw token into an `authorization` header value.
pub trait TokenEncoder: Send + Sync {
    fn encode(&self, scheme: AuthScheme, token: &str) -> String;
}

/// `"<Scheme> <token>"`, the npm client's own format.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemePrefixEncoder;

impl TokenEncoder for SchemePrefixEncoder {
    fn encode(&self, scheme: AuthScheme, token: &str) -> String {
        build_token(scheme, token)
    }
}

pub fn build_token(scheme: AuthScheme, token: &str) -> String {
    format!("{} {token}", scheme.as_str())
}

/// Where `token_env` points.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TokenEnv {
    /// `true` reads the default variable, `false` disables env lookup.
    Flag(bool),
    Name(String),
}

#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthBlock {
    /// Kept as written; a non-string `type` is rendered so it can be reported.
    #[serde(rename = "type", default, deserialize_with = "deserialize_kind")]
    pub kind: Option<String>,
    pub token: Option<String>,
    pub token_env: Option<TokenEnv>,
}

impl AuthBlock {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_token_env(mut self, token_env: TokenEnv) -> Self {
        self.token_env = Some(token_env);
        self
    }

    fn is_empty(&self) -> bool {
        self.kind.is_none() && self.token.is_none() && self.token_env.is_none()
    }

    /// Walks the credential chain: literal `token`, then `token_env`, then
    /// `default_env` when no source was named at all. A blank `token` still
    /// names a source, so it fails instead of reaching for the environment.
    pub fn resolve_token(
        &self,
        env: &dyn EnvSource,
        default_env: &str,
    ) -> Result<ResolvedToken, AuthError> {
        if let Some(token) = self.token.as_deref() {
            if token.is_empty() {
                return Err(AuthError::TokenRequired);
            }
            return Ok(ResolvedToken {
                value: token.to_string(),
                source: TokenSource::Literal,
            });
        }

        let env_name = match &self.token_env {
            Some(TokenEnv::Name(name)) => Some(name.as_str()),
            Some(TokenEnv::Flag(true)) | None => Some(default_env),
            Some(TokenEnv::Flag(false)) => None,
        };

        env_name
            .filter(|name| !name.is_empty())
            .and_then(|name| {
                env.var(name)
                    .filter(|value| !value.is_empty())
                    .map(|value| ResolvedToken {
                        value,
                        source: TokenSource::Env(name.to_string()),
                    })
            })
            .ok_or(AuthError::TokenRequired)
    }
}

fn deserialize_kind<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(value.filter(|value| !value.is_null()).map(|value| flow_text(&value)))
}

/// Single-line rendering of a YAML value, e.g. `5`, `true`, `[basic]`.
fn flow_text(value: &serde_yaml::Value) -> String {
    use serde_yaml::Value;
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(items) => {
            let items = items.iter().map(flow_text).collect::<Vec<_>>();
            format!("[{}]", items.join(", "))
        }
        Value::Mapping(map) => {
            let entries = map
                .iter()
                .map(|(key, value)| format!("{}: {}", flow_text(key), flow_text(value)))
                .collect::<Vec<_>>();
            format!("{{{}}}", entries.join(", "))
        }
        Value::Tagged(tagged) => flow_text(&tagged.value),
    }
}

impl fmt::Debug for AuthBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthBlock")
            .field("kind", &self.kind)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_env", &self.token_env)
            .finish()
    }
}

/// The `auth` value of an uplink as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UplinkAuth {
    Block(AuthBlock),
    /// Anything that is not a well-typed mapping (`auth: ''`, `auth: 12`, ...).
    Malformed,
}

impl UplinkAuth {
    pub fn basic(token: impl Into<String>) -> Self {
        Self::Block(AuthBlock::new(TOKEN_BASIC.to_ascii_lowercase()).with_token(token))
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Block(AuthBlock::new(TOKEN_BEARER.to_ascii_lowercase()).with_token(token))
    }

    pub fn from_value(value: serde_yaml::Value) -> Self {
        if !value.is_mapping() {
            return Self::Malformed;
        }
        serde_yaml::from_value::<AuthBlock>(value)
            .map(Self::Block)
            .unwrap_or(Self::Malformed)
    }

    /// Shape first, then scheme; the token is resolved separately.
    pub fn validate(&self) -> Result<(&AuthBlock, AuthScheme), AuthError> {
        let block = match self {
            Self::Block(block) if !block.is_empty() => block,
            _ => return Err(AuthError::InvalidAuthShape),
        };
        let kind = block.kind.as_deref().ok_or(AuthError::InvalidAuthShape)?;
        Ok((block, AuthScheme::parse(kind)?))
    }
}

impl<'de> Deserialize<'de> for UplinkAuth {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        Ok(Self::from_value(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Literal,
    Env(String),
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal => f.write_str("token"),
            Self::Env(name) => write!(f, "env:{name}"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    pub value: String,
    pub source: TokenSource,
}

impl fmt::Debug for ResolvedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedToken")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}
