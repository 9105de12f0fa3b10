//! Outbound schema download for signal-type creation.
//!
//! Only `.json` URLs on allow-listed hosts are fetched. GitHub web-view
//! (`/blob/`) URLs are rewritten to their raw form first, so the stored
//! document is the schema itself rather than an HTML page.

use url::Url;

use crate::error::ApiError;

/// Validate the URL against the allow-list and rewrite web-view URLs to
/// their raw form. Returns the URL to actually fetch.
pub fn resolve_schema_url(raw: &str, allowed_hosts: &[String]) -> Result<Url, ApiError> {
    let url = Url::parse(raw)
        .map_err(|e| ApiError::InvalidField(format!("schema_url: {e}")))?;

    if url.scheme() != "https" {
        return Err(ApiError::InvalidField("schema_url must use https".into()));
    }
    let host = url
        .host_str()
        .ok_or_else(|| ApiError::InvalidField("schema_url has no host".into()))?;
    if !allowed_hosts.iter().any(|h| h == host) {
        return Err(ApiError::InvalidField(format!(
            "schema host {host} is not allowed"
        )));
    }
    if !url.path().ends_with(".json") {
        return Err(ApiError::InvalidField(
            "schema_url must point at a .json document".into(),
        ));
    }

    if host == "github.com" {
        return rewrite_github_blob(&url);
    }
    Ok(url)
}

/// `https://github.com/{owner}/{repo}/blob/{ref}/{path}` →
/// `https://raw.githubusercontent.com/{owner}/{repo}/{ref}/{path}`.
fn rewrite_github_blob(url: &Url) -> Result<Url, ApiError> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.collect())
        .unwrap_or_default();
    match segments.as_slice() {
        // `rest` must carry at least a ref and a file name.
        [owner, repo, "blob", rest @ ..] if rest.len() >= 2 => {
            let raw = format!(
                "https://raw.githubusercontent.com/{owner}/{repo}/{}",
                rest.join("/")
            );
            Url::parse(&raw).map_err(|e| ApiError::InvalidField(format!("schema_url: {e}")))
        }
        _ => Err(ApiError::InvalidField(
            "github.com schema URLs must be /{owner}/{repo}/blob/{ref}/{path}.json".into(),
        )),
    }
}

/// Download a schema and check it is valid JSON that compiles as a JSON
/// Schema. Returns the raw document text.
pub async fn fetch_schema(
    http: &reqwest::Client,
    raw_url: &str,
    allowed_hosts: &[String],
) -> Result<String, ApiError> {
    let url = resolve_schema_url(raw_url, allowed_hosts)?;

    let response = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| ApiError::InvalidField(format!("schema fetch failed: {e}")))?;
    if !response.status().is_success() {
        return Err(ApiError::InvalidField(format!(
            "schema fetch failed: {} returned {}",
            url,
            response.status()
        )));
    }
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::InvalidField(format!("schema fetch failed: {e}")))?;

    let parsed: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| ApiError::InvalidField(format!("fetched schema is not valid JSON: {e}")))?;
    jsonschema::validator_for(&parsed)
        .map_err(|e| ApiError::InvalidField(format!("fetched document is not a valid JSON Schema: {e}")))?;

    Ok(body)
}
