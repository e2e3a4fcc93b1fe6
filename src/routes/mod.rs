//! Routes split by access level; the authentication layer is applied once per group.

/// Routes reachable without a token: registration, login, health.
pub mod public;

/// Routes behind the bearer-token check.
pub mod authenticated;
