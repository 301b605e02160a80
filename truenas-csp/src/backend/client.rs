use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::error::Result;
use super::query::{Filter, query_body};
use super::version::SystemVersion;
use crate::metrics;

/// API keys look like `<id>-<64 alphanumerics>`. Anything else is treated
/// as the root password of a pre-v12 FreeNAS.
static API_KEY_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[0-9]+-[A-Za-z0-9]{64}$").expect("valid regex"));

/// Resources whose ids are dataset paths and need `/` percent-encoded.
/// All other id-bearing resources take their ids verbatim.
const SLASH_ENCODED_RESOURCES: [&str; 2] = ["zfs/snapshot", "pool/dataset"];

/// Compose an id-addressed URI, percent-encoding `/` for the dataset-path
/// resources only.
pub fn uri_id(resource: &str, rid: &str) -> String {
    if SLASH_ENCODED_RESOURCES.contains(&resource) {
        format!("{}/id/{}", resource, rid.replace('/', "%2f"))
    } else {
        format!("{}/id/{}", resource, rid)
    }
}

/// Captured appliance response: status plus parsed body. Bodies that are
/// not JSON (empty 204 replies, HTML error pages) parse to `Null` and stay
/// available as text for error surfacing.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
    text: String,
}

impl Reply {
    async fn from_response(resp: reqwest::Response) -> Result<Self> {
        let status = resp.status();
        let text = resp.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok(Self { status, body, text })
    }

    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Authenticated client for one appliance, built per request from the
/// credentials the CSI driver supplies.
#[derive(Clone)]
pub struct Backend {
    http: reqwest::Client,
    scheme: String,
    array: String,
    token: String,
    /// Settle time after a DELETE; the appliance acknowledges deletions
    /// before they complete.
    settle: Duration,
}

impl Backend {
    pub fn new(
        http: reqwest::Client,
        scheme: impl Into<String>,
        array: impl Into<String>,
        token: impl Into<String>,
        settle: Duration,
    ) -> Self {
        Self {
            http,
            scheme: scheme.into(),
            array: array.into(),
            token: token.into(),
            settle,
        }
    }

    pub fn array(&self) -> &str {
        &self.array
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Whether the token has the API-key shape and Bearer auth is used.
    pub fn uses_api_key(&self) -> bool {
        API_KEY_SHAPE.is_match(&self.token)
    }

    fn url(&self, uri: &str) -> String {
        format!("{}://{}/api/v2.0/{}", self.scheme, self.array, uri)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.uses_api_key() {
            builder.bearer_auth(&self.token)
        } else {
            builder.basic_auth("root", Some(&self.token))
        }
    }

    /// Probe the appliance with the credentials at hand.
    pub async fn ping(&self) -> bool {
        match self.get("core/ping", None).await {
            Ok(reply) => reply.ok(),
            Err(_) => false,
        }
    }

    pub async fn get(&self, uri: &str, query: Option<&Value>) -> Result<Reply> {
        debug!(uri, "appliance GET");
        let mut builder = self.authed(self.http.get(self.url(uri)));
        if let Some(query) = query {
            builder = builder.json(query);
        }
        let reply = Reply::from_response(builder.send().await?).await?;
        metrics::backend_request("GET", reply.status.as_u16());
        debug!(uri, status = %reply.status, "appliance GET reply");
        Ok(reply)
    }

    pub async fn post(&self, uri: &str, content: &Value) -> Result<Reply> {
        debug!(uri, "appliance POST");
        let builder = self.authed(self.http.post(self.url(uri))).json(content);
        let reply = Reply::from_response(builder.send().await?).await?;
        metrics::backend_request("POST", reply.status.as_u16());
        debug!(uri, status = %reply.status, "appliance POST reply");
        Ok(reply)
    }

    pub async fn put(&self, uri: &str, content: &Value) -> Result<Reply> {
        debug!(uri, "appliance PUT");
        let builder = self.authed(self.http.put(self.url(uri))).json(content);
        let reply = Reply::from_response(builder.send().await?).await?;
        metrics::backend_request("PUT", reply.status.as_u16());
        debug!(uri, status = %reply.status, "appliance PUT reply");
        Ok(reply)
    }

    /// DELETE an id-addressed resource. The resource is probed first so a
    /// repeat delete of something already gone is a no-op, and a settle
    /// pause follows the call because the appliance may still be tearing
    /// the resource down when it answers.
    pub async fn delete(&self, uri: &str, body: Option<&Value>) -> Result<Reply> {
        let probe = self.get(uri, None).await?;
        if !probe.ok() {
            debug!(uri, status = %probe.status, "skipping DELETE of absent resource");
            return Ok(probe);
        }

        debug!(uri, "appliance DELETE");
        let mut builder = self.authed(self.http.delete(self.url(uri)));
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let reply = Reply::from_response(builder.send().await?).await?;
        metrics::backend_request("DELETE", reply.status.as_u16());
        debug!(uri, status = %reply.status, "appliance DELETE reply");

        tokio::time::sleep(self.settle).await;
        Ok(reply)
    }

    /// Fetch a resource list with an optional server-side filter. A non-200
    /// reply or a single-object body both normalize: the former to an empty
    /// list, the latter to a one-element list.
    pub async fn find_all<T: DeserializeOwned>(
        &self,
        resource: &str,
        filter: Option<Filter>,
        extras: Option<Value>,
    ) -> Result<Vec<T>> {
        let query = query_body(filter.as_ref(), extras.as_ref());
        let reply = self.get(resource, query.as_ref()).await?;

        if !reply.ok() {
            debug!(resource, status = %reply.status, "lookup returned no result set");
            return Ok(Vec::new());
        }

        let items = match reply.body {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            single => vec![single],
        };

        items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(Into::into))
            .collect()
    }

    /// First row of a filtered lookup, if any.
    pub async fn find_one<T: DeserializeOwned>(
        &self,
        resource: &str,
        filter: Filter,
    ) -> Result<Option<T>> {
        let mut items = self.find_all::<T>(resource, Some(filter), None).await?;
        if items.is_empty() {
            Ok(None)
        } else {
            Ok(Some(items.remove(0)))
        }
    }

    /// First item whose string field matches the regex. The filtering runs
    /// client side; the appliance query API has no regex operator.
    pub async fn find_one_matching<T: DeserializeOwned>(
        &self,
        resource: &str,
        field: &str,
        pattern: &Regex,
    ) -> Result<Option<T>> {
        let items = self.find_all::<Value>(resource, None, None).await?;

        for item in items {
            if let Some(value) = item.get(field).and_then(Value::as_str) {
                if pattern.is_match(value) {
                    return Ok(Some(serde_json::from_value(item)?));
                }
            }
        }

        Ok(None)
    }

    /// Read and classify the appliance release banner.
    pub async fn system_version(&self) -> Result<SystemVersion> {
        let reply = self.get("system/version", None).await?;
        let banner = reply.body.as_str().unwrap_or_default();
        let version = SystemVersion::from_banner(banner);
        debug!(%version, banner, "appliance version probe");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(token: &str) -> Backend {
        Backend::new(
            reqwest::Client::new(),
            "https",
            "192.0.2.10",
            token,
            Duration::from_millis(1),
        )
    }

    #[test]
    fn test_api_key_shape_detection() {
        let api_key = format!("1-{}", "a".repeat(64));
        assert!(backend(&api_key).uses_api_key());

        assert!(!backend("root").uses_api_key());
        assert!(!backend("password123").uses_api_key());
        // 63 characters is not an API key.
        assert!(!backend(&format!("1-{}", "a".repeat(63))).uses_api_key());
        // Neither is a key with a non-alphanumeric secret.
        assert!(!backend(&format!("1-{}!", "a".repeat(63))).uses_api_key());
    }

    #[test]
    fn test_url_composition() {
        let b = backend("root");
        assert_eq!(
            b.url("iscsi/target"),
            "https://192.0.2.10/api/v2.0/iscsi/target"
        );
    }

    #[test]
    fn test_uri_id_encoding_asymmetry() {
        assert_eq!(
            uri_id("pool/dataset", "tank/pvc-1"),
            "pool/dataset/id/tank%2fpvc-1"
        );
        assert_eq!(
            uri_id("zfs/snapshot", "tank/pvc-1@snap1"),
            "zfs/snapshot/id/tank%2fpvc-1@snap1"
        );
        // Other resources take their ids verbatim.
        assert_eq!(uri_id("iscsi/target", "17"), "iscsi/target/id/17");
        assert_eq!(uri_id("iscsi/initiator", "4"), "iscsi/initiator/id/4");
    }
}
