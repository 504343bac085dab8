use reqwest::Client;
use std::time::Duration;

use crate::utils::AppResult;

/// User-agent string derived from Cargo.toml version at compile time.
pub const APP_USER_AGENT: &str = concat!("updatebridge/", env!("CARGO_PKG_VERSION"));

/// Client for catalog fetches. Bounded by a total request timeout.
pub fn create_http_client() -> AppResult<Client> {
    let client = Client::builder()
        .user_agent(APP_USER_AGENT)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .pool_max_idle_per_host(3)
        .tcp_nodelay(true)
        .build()?;
    Ok(client)
}

/// Client for artifact downloads. No total timeout (installers can be several
/// GB); only the connect phase is bounded.
pub fn create_download_client() -> AppResult<Client> {
    let client = Client::builder()
        .user_agent(APP_USER_AGENT)
        .connect_timeout(Duration::from_secs(15))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;
    Ok(client)
}
