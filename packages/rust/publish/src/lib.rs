//! Remote publishing of built documents to an HTTP object store.
//!
//! [`HttpPublisher`] uploads the artifact with a single `PUT` to
//! `<endpoint>/<prefix>/<name>` and hands back the public link
//! `<public_base_url>/<prefix>/<name>`. Any S3-style bucket or static file
//! server that accepts authenticated `PUT`s works.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{info, instrument, warn};
use url::Url;

use everythingpdf_shared::{
    EverythingPdfError, PDF_MEDIA_TYPE, PublishConfig, Publisher, Result,
};

/// User-Agent string for upload requests.
const USER_AGENT: &str = concat!("EverythingPDF/", env!("CARGO_PKG_VERSION"));

/// Suggest a unique object name for a build (`everythingpdf-<unix_millis>.pdf`).
pub fn suggested_name() -> String {
    format!("everythingpdf-{}.pdf", Utc::now().timestamp_millis())
}

// ---------------------------------------------------------------------------
// HttpPublisher
// ---------------------------------------------------------------------------

/// Uploads built documents with HTTP `PUT`.
pub struct HttpPublisher {
    client: Client,
    endpoint: Url,
    public_base: Url,
    prefix: String,
    token: Option<String>,
}

impl HttpPublisher {
    /// Create a publisher for `endpoint`, returning public links under `public_base`.
    pub fn new(endpoint: Url, public_base: Url, prefix: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, public_base, prefix, Duration::from_secs(60))
    }

    fn with_timeout(
        endpoint: Url,
        public_base: Url,
        prefix: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                EverythingPdfError::Publish(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            public_base,
            prefix: prefix.into().trim_matches('/').to_string(),
            token: None,
        })
    }

    /// Build a publisher from the `[publish]` config section.
    ///
    /// Returns `Ok(None)` when no endpoint is configured; sharing is then
    /// simply unavailable.
    pub fn from_config(config: &PublishConfig) -> Result<Option<Self>> {
        let Some(endpoint) = config.endpoint_url()? else {
            return Ok(None);
        };
        let public_base = config.public_url()?.unwrap_or_else(|| endpoint.clone());

        let mut publisher = Self::with_timeout(
            endpoint,
            public_base,
            config.prefix.clone(),
            Duration::from_secs(config.timeout_secs),
        )?;
        publisher.token = config.token();
        Ok(Some(publisher))
    }

    /// Attach a bearer token sent with every upload.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Object key for `name`, e.g. `public/everythingpdf-1.pdf`.
    fn object_key(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.prefix)
        }
    }

    /// Upload target URL for `name`.
    pub fn upload_url(&self, name: &str) -> Result<Url> {
        join_key(&self.endpoint, &self.object_key(name))
    }

    /// Public link for `name`.
    pub fn public_url(&self, name: &str) -> Result<Url> {
        join_key(&self.public_base, &self.object_key(name))
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    #[instrument(skip_all, fields(name = %suggested_name, size = bytes.len()))]
    async fn publish(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
        validate_name(suggested_name)?;
        let target = self.upload_url(suggested_name)?;

        info!(url = %target, "uploading document");

        let mut request = self
            .client
            .put(target.clone())
            .header(CONTENT_TYPE, PDF_MEDIA_TYPE)
            .body(bytes.to_vec());
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| EverythingPdfError::Publish(format!("{target}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %target, %status, "upload rejected");
            return Err(EverythingPdfError::Publish(format!(
                "{target}: HTTP {status}"
            )));
        }

        let link = self.public_url(suggested_name)?;
        info!(url = %link, "document published");
        Ok(link.to_string())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Append a `/`-separated key to a base URL without dropping the base path.
fn join_key(base: &Url, key: &str) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|()| {
            EverythingPdfError::config(format!("publish URL '{base}' cannot be a base"))
        })?;
        segments.pop_if_empty();
        for part in key.split('/').filter(|p| !p.is_empty()) {
            segments.push(part);
        }
    }
    Ok(url)
}

/// Object names are single path segments.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(EverythingPdfError::Publish(format!(
            "invalid object name '{name}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publisher_for(server: &MockServer) -> HttpPublisher {
        let base = Url::parse(&server.uri()).unwrap();
        HttpPublisher::new(base.clone(), base, "public").unwrap()
    }

    #[test]
    fn suggested_name_shape() {
        let name = suggested_name();
        assert!(name.starts_with("everythingpdf-"));
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn join_key_keeps_base_path() {
        let base = Url::parse("https://storage.example.com/bucket/").unwrap();
        let url = join_key(&base, "public/a.pdf").unwrap();
        assert_eq!(url.as_str(), "https://storage.example.com/bucket/public/a.pdf");

        let base = Url::parse("https://storage.example.com/bucket").unwrap();
        let url = join_key(&base, "public/a.pdf").unwrap();
        assert_eq!(url.as_str(), "https://storage.example.com/bucket/public/a.pdf");
    }

    #[test]
    fn public_url_uses_public_base() {
        let publisher = HttpPublisher::new(
            Url::parse("https://upload.example.com/b").unwrap(),
            Url::parse("https://cdn.example.com").unwrap(),
            "/public/",
        )
        .unwrap();
        assert_eq!(
            publisher.public_url("x.pdf").unwrap().as_str(),
            "https://cdn.example.com/public/x.pdf"
        );
        assert_eq!(
            publisher.upload_url("x.pdf").unwrap().as_str(),
            "https://upload.example.com/b/public/x.pdf"
        );
    }

    #[test]
    fn from_config_without_endpoint_is_none() {
        let config = PublishConfig::default();
        assert!(HttpPublisher::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn publish_puts_pdf_and_returns_link() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/public/report.pdf"))
            .and(header("content-type", "application/pdf"))
            .and(body_bytes(b"%PDF-1.7 test".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = publisher_for(&server);
        let link = publisher
            .publish(b"%PDF-1.7 test", "report.pdf")
            .await
            .expect("publish");

        assert_eq!(link, format!("{}/public/report.pdf", server.uri()));
    }

    #[tokio::test]
    async fn publish_sends_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = publisher_for(&server).with_token("s3cret");
        publisher.publish(b"%PDF", "a.pdf").await.expect("publish");
    }

    #[tokio::test]
    async fn publish_surfaces_http_errors() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let publisher = publisher_for(&server);
        let err = publisher.publish(b"%PDF", "a.pdf").await.unwrap_err();
        assert!(matches!(err, EverythingPdfError::Publish(_)));
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn publish_rejects_nested_names() {
        let server = MockServer::start().await;
        let publisher = publisher_for(&server);
        let err = publisher.publish(b"%PDF", "../escape.pdf").await.unwrap_err();
        assert!(err.to_string().contains("invalid object name"));
    }
}
