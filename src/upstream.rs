use crate::{
    config::{Config, UplinkConfig},
    constants::HEADER_AUTHORIZATION,
    error::{AuthError, UplinkError},
    headers::{HeaderResolver, RequestHeaders},
};
use reqwest::{Client, Method, RequestBuilder, Url, header::HeaderMap};
use std::collections::HashMap;

/// Request preparation for one configured uplink. Nothing here sends.
#[derive(Debug, Clone)]
pub struct Upstream {
    name: String,
    config: UplinkConfig,
    resolver: HeaderResolver,
    client: Client,
}

impl Upstream {
    pub fn new(name: impl Into<String>, config: UplinkConfig, resolver: HeaderResolver) -> Self {
        Self::with_client(name, config, resolver, Client::new())
    }

    pub fn with_client(
        name: impl Into<String>,
        config: UplinkConfig,
        resolver: HeaderResolver,
        client: Client,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            resolver,
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.config.url
    }

    /// Resolved headers plus the uplink's static `headers`, which win except
    /// over an `authorization` that is already set.
    pub fn headers(&self, incoming: &RequestHeaders) -> Result<RequestHeaders, AuthError> {
        let mut headers = self
            .resolver
            .resolve(self.config.auth.as_ref(), incoming)
            .inspect_err(|err| {
                tracing::warn!(uplink = %self.name, error = %err, "cannot build uplink headers");
            })?;
        for (name, value) in self.config.headers.iter() {
            if name.eq_ignore_ascii_case(HEADER_AUTHORIZATION) && headers.contains(name) {
                continue;
            }
            headers.insert(name, value);
        }
        Ok(headers)
    }

    pub fn header_map(&self, incoming: &RequestHeaders) -> Result<HeaderMap, UplinkError> {
        self.headers(incoming)?.to_header_map()
    }

    /// `path` is appended to the uplink URL as given.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        incoming: &RequestHeaders,
    ) -> Result<RequestBuilder, UplinkError> {
        let raw = format!("{}/{}", self.config.url, path.trim_start_matches('/'));
        let url = Url::parse(&raw).map_err(|_| UplinkError::InvalidUrl { url: raw.clone() })?;
        let headers = self.header_map(incoming)?;
        tracing::debug!(uplink = %self.name, %method, url = %url, "prepared uplink request");
        Ok(self.client.request(method, url).headers(headers))
    }

    pub fn package_request(
        &self,
        package_name: &str,
        incoming: &RequestHeaders,
    ) -> Result<RequestBuilder, UplinkError> {
        let encoded = urlencoding::encode(package_name);
        self.request(Method::GET, &encoded, incoming)
    }

    pub fn package_url(&self, package_name: &str) -> String {
        format!(
            "{}/{}",
            self.config.url,
            urlencoding::encode(package_name)
        )
    }
}

/// One [`Upstream`] per configured uplink, sharing a resolver and client.
pub fn build_upstreams(config: &Config, resolver: &HeaderResolver) -> HashMap<String, Upstream> {
    let resolver = match config.user_agent.clone() {
        Some(user_agent) => resolver.clone().with_user_agent(Some(user_agent)),
        None => resolver.clone(),
    };
    let client = Client::new();
    config
        .uplinks
        .iter()
        .map(|(name, uplink)| {
            (
                name.clone(),
                Upstream::with_client(name, uplink.clone(), resolver.clone(), client.clone()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Upstream, build_upstreams};
    use crate::{
        auth::UplinkAuth,
        config::{Config, UplinkConfig},
        env::snapshot,
        error::{AuthError, UplinkError},
        headers::{HeaderResolver, RequestHeaders},
    };
    use reqwest::Method;
    use std::sync::Arc;

    fn resolver() -> HeaderResolver {
        HeaderResolver::new(Arc::new(snapshot([("NPM_TOKEN", "envToken")])))
    }

    #[test]
    fn static_headers_apply_after_resolution() {
        let mut config = UplinkConfig::new("https://registry.npmjs.org/");
        config.headers.insert("Accept-Encoding", "identity");
        config.headers.insert("x-npm-scope", "acme");
        let upstream = Upstream::new("npmjs", config, resolver());

        let headers = upstream.headers(&RequestHeaders::new()).expect("headers");
        assert_eq!(headers.get("accept-encoding"), Some("identity"));
        assert_eq!(headers.get("x-npm-scope"), Some("acme"));
        assert_eq!(headers.len(), 4);
    }

    #[test]
    fn static_authorization_only_fills_a_gap() {
        let mut config = UplinkConfig::new("https://npm.example.com");
        config.headers.insert("Authorization", "Bearer static");
        let upstream = Upstream::new("private", config, resolver());

        let anonymous = upstream.headers(&RequestHeaders::new()).expect("headers");
        assert_eq!(anonymous.get("authorization"), Some("Bearer static"));

        let incoming = RequestHeaders::from([("authorization", "Bearer caller")]);
        let headers = upstream.headers(&incoming).expect("headers");
        assert_eq!(headers.get("authorization"), Some("Bearer caller"));
    }

    #[test]
    fn builds_package_request_without_sending() {
        let config =
            UplinkConfig::new("https://registry.npmjs.org").with_auth(UplinkAuth::bearer("abc"));
        let upstream = Upstream::new("npmjs", config, resolver());

        let request = upstream
            .package_request("@acme/utils", &RequestHeaders::new())
            .expect("request")
            .build()
            .expect("build");
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(
            request.url().as_str(),
            "https://registry.npmjs.org/%40acme%2Futils"
        );
        assert_eq!(
            request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok()),
            Some("Bearer abc")
        );
    }

    #[test]
    fn surfaces_auth_errors() {
        let config = UplinkConfig::new("https://npm.example.com").with_auth(UplinkAuth::Malformed);
        let upstream = Upstream::new("private", config, resolver());
        let err = upstream
            .request(Method::GET, "/lodash", &RequestHeaders::new())
            .expect_err("invalid auth");
        assert!(matches!(err, UplinkError::Auth(AuthError::InvalidAuthShape)));
    }

    #[test]
    fn rejects_unparseable_urls() {
        let upstream = Upstream::new("bad", UplinkConfig::new("not a url"), resolver());
        let err = upstream
            .request(Method::GET, "lodash", &RequestHeaders::new())
            .expect_err("invalid url");
        assert!(matches!(err, UplinkError::InvalidUrl { .. }));
    }

    #[test]
    fn build_upstreams_applies_configured_user_agent() {
        let mut config = Config::defaults();
        config.user_agent = Some("npm (acme/1.0.0)".to_string());
        config.uplinks.insert(
            "npmjs".to_string(),
            UplinkConfig::new("https://registry.npmjs.org"),
        );

        let upstreams = build_upstreams(&config, &resolver());
        let npmjs = upstreams.get("npmjs").expect("npmjs");
        assert_eq!(npmjs.name(), "npmjs");
        assert_eq!(npmjs.package_url("lodash"), "https://registry.npmjs.org/lodash");
        let headers = npmjs.headers(&RequestHeaders::new()).expect("headers");
        assert_eq!(headers.get("User-Agent"), Some("npm (acme/1.0.0)"));
    }
}
