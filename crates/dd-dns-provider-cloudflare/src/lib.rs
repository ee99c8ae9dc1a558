// # Cloudflare DNS Publisher
//
// This crate provides a Cloudflare implementation of `DnsPublisher`.
//
// ## Behavior
//
// - `ensure_present`: list the A records for the name, create one for the
//   address unless a record with that content already exists
// - `ensure_absent`: list the A records for the name, delete the one whose
//   content is the address; succeed with a warning when there is none
// - Records under the same name with other addresses are never touched, so
//   several containers can share one name (round-robin A records)
//
// ## Trust Level: Untrusted (DNS Publisher)
//
// - Performs HTTP calls to the Cloudflare API only
// - Never retries or backs off; errors go back to the mapping store
// - Never spawns tasks or caches zone state between calls
//
// ## Security Requirements
//
// - The account secret NEVER appears in logs or Debug output
// - The secret is provided via environment variables only
// - Construction fails fast if the secret is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=A`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use dd_dns_core::config::PublisherConfig;
use dd_dns_core::traits::{DnsPublisher, DnsPublisherFactory};
use dd_dns_core::{Error, PublisherRegistry, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PUBLISHER_NAME: &str = "cloudflare";

/// How requests are authenticated
#[derive(Clone)]
enum Credentials {
    /// Account email plus global API key
    GlobalKey { email: String, key: String },
    /// Scoped API token
    Token(String),
}

/// Envelope of every Cloudflare v4 response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DnsRecord {
    id: String,
    content: String,
}

/// Cloudflare DNS publisher
///
/// # Security
///
/// The Debug implementation does NOT expose the account secret.
pub struct CloudflarePublisher {
    /// ⚠️ NEVER log this value
    credentials: Credentials,

    /// Zone ID (optional, looked up from the record name otherwise)
    zone_id: Option<String>,

    client: reqwest::Client,

    api_base: String,
}

// Custom Debug implementation that hides the account secret
impl std::fmt::Debug for CloudflarePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let account = match &self.credentials {
            Credentials::GlobalKey { email, .. } => Some(email.as_str()),
            Credentials::Token(_) => None,
        };
        f.debug_struct("CloudflarePublisher")
            .field("account_name", &account)
            .field("account_secret", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .finish()
    }
}

impl CloudflarePublisher {
    /// Create a new Cloudflare publisher
    ///
    /// # Parameters
    ///
    /// - `account_name`: account email; when set, `account_secret` is a
    ///   global API key, otherwise it is an API token
    /// - `account_secret`: API key or token with Zone:DNS:Edit permissions
    /// - `zone_id`: optional zone ID (looked up per record otherwise)
    pub fn new(
        account_name: Option<String>,
        account_secret: impl Into<String>,
        zone_id: Option<String>,
    ) -> Result<Self> {
        let account_secret = account_secret.into();
        if account_secret.is_empty() {
            return Err(Error::config("Cloudflare account secret cannot be empty"));
        }

        let credentials = match account_name.filter(|name| !name.is_empty()) {
            Some(email) => Credentials::GlobalKey {
                email,
                key: account_secret,
            },
            None => Credentials::Token(account_secret),
        };

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            zone_id: zone_id.filter(|id| !id.is_empty()),
            client,
            api_base: CLOUDFLARE_API_BASE.to_string(),
        })
    }

    /// Point the publisher at another API endpoint (e.g. a local proxy)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Credentials::GlobalKey { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
            Credentials::Token(token) => request.bearer_auth(token),
        }
    }

    /// Send a request and unwrap the v4 response envelope
    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        action: &str,
    ) -> Result<Option<T>> {
        let response = self
            .authorize(request)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::publish(PUBLISHER_NAME, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status.as_u16(), action, &error_text));
        }

        let body: ApiResponse<T> = response.json().await.map_err(|e| {
            Error::publish(PUBLISHER_NAME, format!("Failed to parse response: {}", e))
        })?;

        if !body.success {
            let messages: Vec<String> = body
                .errors
                .iter()
                .map(|m| format!("{} ({})", m.message, m.code))
                .collect();
            return Err(Error::publish(
                PUBLISHER_NAME,
                format!("{} rejected: {}", action, messages.join("; ")),
            ));
        }

        Ok(body.result)
    }

    /// Get the zone ID for a record name
    ///
    /// If zone_id is set, returns it directly. Otherwise, looks up the zone
    /// named by the last two labels of the record name.
    async fn zone_id_for(&self, name: &str) -> Result<String> {
        if let Some(zone_id) = &self.zone_id {
            tracing::debug!("Using pre-configured zone ID");
            return Ok(zone_id.clone());
        }

        let zone_name = zone_name(name);
        tracing::debug!("Looking up zone ID for zone: {}", zone_name);

        let request = self
            .client
            .get(format!("{}/zones", self.api_base))
            .query(&[("name", zone_name)]);
        let zones: Vec<Zone> = self.call(request, "Zone lookup").await?.unwrap_or_default();

        let zone = zones.into_iter().next().ok_or_else(|| {
            Error::publish(PUBLISHER_NAME, format!("Zone not found: {}", zone_name))
        })?;

        tracing::debug!("Found zone ID: {}", zone.id);
        Ok(zone.id)
    }

    /// List the A records published under `name`
    async fn list_a_records(&self, zone_id: &str, name: &str) -> Result<Vec<DnsRecord>> {
        let request = self
            .client
            .get(format!("{}/zones/{}/dns_records", self.api_base, zone_id))
            .query(&[("name", name), ("type", "A")]);

        Ok(self
            .call::<Vec<DnsRecord>>(request, "Record lookup")
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl DnsPublisher for CloudflarePublisher {
    async fn ensure_present(&self, name: &str, address: Ipv4Addr) -> Result<()> {
        tracing::info!("Adding Cloudflare record: {}\tA\t{}", name, address);

        let zone_id = self.zone_id_for(name).await?;
        let records = self.list_a_records(&zone_id, name).await?;

        if find_record(&records, address).is_some() {
            tracing::warn!("Record already exists: {}\tA\t{}", name, address);
            return Ok(());
        }

        let payload = serde_json::json!({
            "type": "A",
            "name": name,
            "content": address.to_string(),
        });
        let request = self
            .client
            .post(format!("{}/zones/{}/dns_records", self.api_base, zone_id))
            .json(&payload);
        self.call::<serde_json::Value>(request, "Record creation")
            .await?;

        tracing::info!("Record created: {}\tA\t{}", name, address);
        Ok(())
    }

    async fn ensure_absent(&self, name: &str, address: Ipv4Addr) -> Result<()> {
        tracing::info!("Removing Cloudflare record: {}\tA\t{}", name, address);

        let zone_id = self.zone_id_for(name).await?;
        let records = self.list_a_records(&zone_id, name).await?;

        let Some(record) = find_record(&records, address) else {
            tracing::warn!("Address is not mapped to name: {}\tA\t{}", name, address);
            return Ok(());
        };

        let request = self.client.delete(format!(
            "{}/zones/{}/dns_records/{}",
            self.api_base, zone_id, record.id
        ));
        self.call::<serde_json::Value>(request, "Record deletion")
            .await?;

        tracing::info!("Record deleted: {}\tA\t{}", name, address);
        Ok(())
    }

    fn publisher_name(&self) -> &'static str {
        PUBLISHER_NAME
    }
}

/// Zone a hostname belongs to: its last two labels
///
/// Names with fewer than two labels are returned unchanged.
pub fn zone_name(hostname: &str) -> &str {
    match hostname.rmatch_indices('.').nth(1) {
        Some((index, _)) => &hostname[index + 1..],
        None => hostname,
    }
}

fn find_record(records: &[DnsRecord], address: Ipv4Addr) -> Option<&DnsRecord> {
    let content = address.to_string();
    records.iter().find(|record| record.content == content)
}

/// Map a failed HTTP status to a publish error
fn status_error(status: u16, action: &str, body: &str) -> Error {
    let message = match status {
        401 | 403 => format!(
            "Authentication failed: invalid credentials or insufficient permissions. Status: {}",
            status
        ),
        404 => format!("{} failed: resource not found. Status: {}", action, status),
        409 => format!("Conflict: record is being changed by another process. Status: {}", status),
        429 => format!("Rate limit exceeded. Please retry later. Status: {}", status),
        500..=599 => format!("Cloudflare server error (transient): {} - {}", status, body),
        _ => format!("{} failed: {} - {}", action, status, body),
    };
    Error::publish(PUBLISHER_NAME, message)
}

/// Factory for creating Cloudflare publishers
pub struct CloudflareFactory;

impl DnsPublisherFactory for CloudflareFactory {
    fn create(&self, config: &PublisherConfig) -> Result<Box<dyn DnsPublisher>> {
        match config {
            PublisherConfig::Cloudflare {
                account_name,
                account_secret,
                zone_id,
            } => Ok(Box::new(CloudflarePublisher::new(
                account_name.clone(),
                account_secret.clone(),
                zone_id.clone(),
            )?)),
            _ => Err(Error::config("Invalid config for Cloudflare publisher")),
        }
    }
}

/// Register the Cloudflare publisher with a registry
///
/// # Example
///
/// ```rust
/// use dd_dns_core::PublisherRegistry;
///
/// let registry = PublisherRegistry::with_builtins();
/// dd_dns_provider_cloudflare::register(&registry);
/// assert!(registry.has_publisher("cloudflare"));
/// ```
pub fn register(registry: &PublisherRegistry) {
    registry.register_publisher(PUBLISHER_NAME, Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_publisher() -> CloudflarePublisher {
        CloudflarePublisher::new(None, "secret_token_12345", None).unwrap()
    }

    #[test]
    fn test_zone_name() {
        assert_eq!(zone_name("example.com"), "example.com");
        assert_eq!(zone_name("svc.example.com"), "example.com");
        assert_eq!(zone_name("a.b.svc.example.com"), "example.com");
        assert_eq!(zone_name("localhost"), "localhost");
        assert_eq!(zone_name(""), "");
    }

    #[test]
    fn test_find_record() {
        let records = vec![
            DnsRecord {
                id: "r1".to_string(),
                content: "127.0.0.1".to_string(),
            },
            DnsRecord {
                id: "r2".to_string(),
                content: "192.168.0.1".to_string(),
            },
        ];

        assert!(find_record(&[], Ipv4Addr::new(127, 0, 0, 1)).is_none());
        assert!(find_record(&records, Ipv4Addr::new(192, 168, 0, 2)).is_none());
        assert_eq!(
            find_record(&records, Ipv4Addr::new(192, 168, 0, 1)).map(|r| r.id.as_str()),
            Some("r2")
        );
    }

    #[test]
    fn test_empty_secret_rejected() {
        let err = CloudflarePublisher::new(None, "", None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_factory_creation() {
        let factory = CloudflareFactory;

        let config = PublisherConfig::Cloudflare {
            account_name: Some("ops@example.com".to_string()),
            account_secret: "key".to_string(),
            zone_id: Some("zone".to_string()),
        };
        let publisher = factory.create(&config).unwrap();
        assert_eq!(publisher.publisher_name(), "cloudflare");

        assert!(factory.create(&PublisherConfig::DryRun).is_err());
    }

    #[test]
    fn test_register() {
        let registry = PublisherRegistry::with_builtins();
        register(&registry);
        assert_eq!(registry.list_publishers(), vec!["cloudflare", "dryrun"]);
    }

    #[test]
    fn test_account_name_selects_global_key_auth() {
        let publisher =
            CloudflarePublisher::new(Some("ops@example.com".to_string()), "global-key", None)
                .unwrap();
        let request = publisher
            .authorize(publisher.client.get("https://api.example.invalid/zones"))
            .build()
            .unwrap();

        assert_eq!(request.headers()["X-Auth-Email"], "ops@example.com");
        assert_eq!(request.headers()["X-Auth-Key"], "global-key");
        assert!(request.headers().get("Authorization").is_none());
    }

    #[test]
    fn test_token_auth_without_account_name() {
        let publisher = token_publisher();
        let request = publisher
            .authorize(publisher.client.get("https://api.example.invalid/zones"))
            .build()
            .unwrap();

        assert_eq!(
            request.headers()["Authorization"],
            "Bearer secret_token_12345"
        );
        assert!(request.headers().get("X-Auth-Key").is_none());
    }

    #[test]
    fn test_status_mapping() {
        for (status, fragment) in [
            (401, "Authentication failed"),
            (403, "Authentication failed"),
            (404, "not found"),
            (409, "Conflict"),
            (429, "Rate limit"),
            (502, "transient"),
            (400, "Record creation failed"),
        ] {
            let err = status_error(status, "Record creation", "bad request");
            match err {
                Error::Publish { publisher, message } => {
                    assert_eq!(publisher, "cloudflare");
                    assert!(message.contains(fragment), "{}: {}", status, message);
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn test_api_response_envelope() {
        let json = r#"{
            "success": true,
            "errors": [],
            "messages": [],
            "result": [{ "id": "rec1", "type": "A", "name": "svc.example.com", "content": "10.0.0.5" }]
        }"#;
        let response: ApiResponse<Vec<DnsRecord>> = serde_json::from_str(json).unwrap();
        assert!(response.success);
        let records = response.result.unwrap();
        assert_eq!(records[0].id, "rec1");
        assert_eq!(records[0].content, "10.0.0.5");
    }

    #[test]
    fn test_secret_not_exposed_in_debug() {
        let debug_str = format!("{:?}", token_publisher());
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflarePublisher"));
    }

    #[test]
    fn test_api_base_override() {
        let publisher = token_publisher().with_api_base("http://127.0.0.1:8080/client/v4/");
        assert_eq!(publisher.api_base, "http://127.0.0.1:8080/client/v4");
    }
}
