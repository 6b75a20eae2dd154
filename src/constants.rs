pub const HEADER_ACCEPT: &str = "Accept";
pub const HEADER_ACCEPT_ENCODING: &str = "Accept-Encoding";
pub const HEADER_USER_AGENT: &str = "User-Agent";
pub const HEADER_AUTHORIZATION: &str = "authorization";

pub const ACCEPT_JSON: &str = "application/json;";
pub const ACCEPT_ENCODING_GZIP: &str = "gzip";

pub const TOKEN_BASIC: &str = "Basic";
pub const TOKEN_BEARER: &str = "Bearer";

/// Variable consulted when an `auth` block names no credential source.
pub const DEFAULT_TOKEN_ENV: &str = "NPM_TOKEN";

pub const ERROR_AUTH_INVALID: &str = "Auth invalid";
pub const ERROR_TOKEN_REQUIRED: &str = "token is required";

/// `npm (<crate>/<version>)`; registry.npmjs.org only returns search results
/// to user agents that mention npm.
pub fn default_user_agent() -> String {
    user_agent_for(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ))
}

pub fn user_agent_for(identity: &str) -> String {
    format!("npm ({identity})")
}
