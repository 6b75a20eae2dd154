//! Header set construction for requests sent to an uplink.

use crate::{
    auth::{SchemePrefixEncoder, TokenEncoder, UplinkAuth},
    constants::{
        ACCEPT_ENCODING_GZIP, ACCEPT_JSON, DEFAULT_TOKEN_ENV, HEADER_ACCEPT,
        HEADER_ACCEPT_ENCODING, HEADER_AUTHORIZATION, HEADER_USER_AGENT, default_user_agent,
    },
    env::{EnvSource, ProcessEnv},
    error::{AuthError, UplinkError},
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::{fmt, sync::Arc};
use tracing::instrument;

/// Ordered header list. Names compare case-insensitively; insertion order is
/// kept so the outbound request mirrors what the caller supplied.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: Vec<(String, String)>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|idx| self.entries[idx].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Replaces the value in place when `name` already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Appends only when `name` is absent.
    pub fn insert_missing(&mut self, name: &str, value: impl FnOnce() -> String) {
        if !self.contains(name) {
            self.entries.push((name.to_string(), value()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Same as [`iter`](Self::iter) with credential values masked.
    pub fn redacted(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().map(|(name, value)| {
            if name.eq_ignore_ascii_case(HEADER_AUTHORIZATION) {
                (name, "<redacted>")
            } else {
                (name, value)
            }
        })
    }

    pub fn to_header_map(&self) -> Result<HeaderMap, UplinkError> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| UplinkError::invalid_header(name.as_str()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| UplinkError::invalid_header(name.as_str()))?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
    }
}

impl fmt::Debug for RequestHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.redacted()).finish()
    }
}

impl<K, V> FromIterator<(K, V)> for RequestHeaders
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for RequestHeaders
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

/// Builds the final header set for one outbound uplink request.
#[derive(Clone)]
pub struct HeaderResolver {
    env: Arc<dyn EnvSource>,
    encoder: Arc<dyn TokenEncoder>,
    user_agent: Option<String>,
    default_token_env: String,
}

impl Default for HeaderResolver {
    fn default() -> Self {
        Self::new(Arc::new(ProcessEnv))
    }
}

impl fmt::Debug for HeaderResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderResolver")
            .field("user_agent", &self.user_agent)
            .field("default_token_env", &self.default_token_env)
            .finish_non_exhaustive()
    }
}

impl HeaderResolver {
    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self {
            env,
            encoder: Arc::new(SchemePrefixEncoder),
            user_agent: None,
            default_token_env: DEFAULT_TOKEN_ENV.to_string(),
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn TokenEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Fixed `User-Agent` instead of `npm (<crate>/<version>)`.
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn with_default_token_env(mut self, name: impl Into<String>) -> Self {
        self.default_token_env = name.into();
        self
    }

    pub fn default_headers(&self) -> RequestHeaders {
        let mut headers = RequestHeaders::new();
        self.append_defaults(&mut headers);
        headers
    }

    /// Incoming headers, then missing defaults, then `authorization` from the
    /// uplink `auth` block unless the caller already sent one.
    #[instrument(level = "debug", skip_all)]
    pub fn resolve(
        &self,
        auth: Option<&UplinkAuth>,
        incoming: &RequestHeaders,
    ) -> Result<RequestHeaders, AuthError> {
        let mut headers = incoming.clone();
        self.append_defaults(&mut headers);

        if headers.contains(HEADER_AUTHORIZATION) {
            tracing::trace!("keeping authorization supplied with the request");
            return Ok(headers);
        }
        let Some(auth) = auth else {
            return Ok(headers);
        };

        let (block, scheme) = auth.validate().inspect_err(|err| {
            tracing::warn!(error = %err, "rejected uplink auth configuration");
        })?;
        let token = block
            .resolve_token(self.env.as_ref(), &self.default_token_env)
            .inspect_err(|err| {
                tracing::error!(error = %err, scheme = %scheme, "no token for uplink auth");
            })?;

        tracing::debug!(scheme = %scheme, source = %token.source, "attached uplink authorization");
        headers.insert(HEADER_AUTHORIZATION, self.encoder.encode(scheme, &token.value));
        Ok(headers)
    }

    fn append_defaults(&self, headers: &mut RequestHeaders) {
        headers.insert_missing(HEADER_ACCEPT, || ACCEPT_JSON.to_string());
        headers.insert_missing(HEADER_ACCEPT_ENCODING, || ACCEPT_ENCODING_GZIP.to_string());
        headers.insert_missing(HEADER_USER_AGENT, || {
            self.user_agent.clone().unwrap_or_else(default_user_agent)
        });
    }
}
