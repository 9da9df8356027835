//! Request helpers shared by the adapters.

use build_catalog::ProviderError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

pub const USER_AGENT: &str = concat!("build-catalog/", env!("CARGO_PKG_VERSION"));

/// GET `url` and decode the body as JSON.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, ProviderError> {
    let response = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| ProviderError::Network(format!("GET {url} failed: {e}")))?;

    let response = check_status(response, url)?;

    response
        .json()
        .await
        .map_err(|e| ProviderError::Parse(format!("invalid JSON from {url}: {e}")))
}

/// HEAD `url`, returning the response when it is a success.
pub async fn head(client: &reqwest::Client, url: &str) -> Result<reqwest::Response, ProviderError> {
    let response = client
        .head(url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| ProviderError::Network(format!("HEAD {url} failed: {e}")))?;

    check_status(response, url)
}

fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ProviderError::NotFound(url.to_owned()));
    }
    if !status.is_success() {
        return Err(ProviderError::Http {
            status: status.as_u16(),
            url: url.to_owned(),
        });
    }
    Ok(response)
}

/// Parse a `Last-Modified` header value. Unparseable dates are dropped.
pub fn last_modified(response: &reqwest::Response) -> Option<DateTime<Utc>> {
    let value = response
        .headers()
        .get(reqwest::header::LAST_MODIFIED)?
        .to_str()
        .ok()?;
    parse_http_date(value)
}

pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub fn trim_base(base: &str) -> &str {
    base.trim_end_matches('/')
}
