#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod constants;
pub mod env;
pub mod error;
pub mod headers;
pub mod observability;
pub mod upstream;
