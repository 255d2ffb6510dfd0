//! Shared HTTP client construction for consistent timeout and TLS configuration.

use std::time::Duration;

/// Create a shared HTTP client with standard Juris configuration.
///
/// Config: 10s connect timeout, 90s request timeout, rustls TLS,
/// `juris/{version}` user-agent, redirect limit 10. Per-call deadlines are
/// enforced by the caller; this timeout is only a backstop.
#[must_use]
pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(90))
        .user_agent(concat!("juris/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("default HTTP client construction must not fail")
}
