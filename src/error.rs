use crate::constants::{ERROR_AUTH_INVALID, ERROR_TOKEN_REQUIRED};

/// Validation failures for an uplink `auth` block.
///
/// None of the messages carry the credential itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("{}", ERROR_AUTH_INVALID)]
    InvalidAuthShape,
    #[error("Auth type '{kind}' not allowed")]
    UnsupportedAuthType { kind: String },
    #[error("{}", ERROR_TOKEN_REQUIRED)]
    TokenRequired,
}

impl AuthError {
    pub fn unsupported(kind: impl Into<String>) -> Self {
        Self::UnsupportedAuthType { kind: kind.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UplinkError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("header '{name}' cannot be sent upstream")]
    InvalidHeader { name: String },
    #[error("invalid uplink url '{url}'")]
    InvalidUrl { url: String },
}

impl UplinkError {
    pub fn invalid_header(name: impl Into<String>) -> Self {
        Self::InvalidHeader { name: name.into() }
    }
}
