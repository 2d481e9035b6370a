//! Confluent-compatible registry client
//!
//! Two read-only calls are needed to resolve a subject:
//!
//! - `GET /subjects/{subject}/versions/{latest|n}` for id and version
//! - `GET /schemas/ids/{id}?subject={subject}` for the schema text

use base64::Engine;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::types::{Schema, SchemaId, SchemaMetadata, SchemaReference, SchemaType, Subject};
use super::{RegistryError, RegistryResult};
use crate::config::{RegistryConfig, VersionSelection};

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Read access to a schema registry.
///
/// Implementations must be safe to call from several threads at once.
pub trait SchemaRegistryClient: Send + Sync {
    /// Look up id and version for a subject.
    fn get_metadata(
        &self,
        subject: &Subject,
        version: VersionSelection,
    ) -> RegistryResult<SchemaMetadata>;

    /// Fetch the schema text registered under `id`.
    fn get_schema(&self, subject: &Subject, id: SchemaId) -> RegistryResult<Schema>;
}

#[derive(Debug, Deserialize)]
struct SubjectVersionResponse {
    subject: String,
    version: u32,
    id: u32,
    #[serde(rename = "schemaType", default)]
    schema_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetSchemaResponse {
    schema: String,
    #[serde(rename = "schemaType", default)]
    schema_type: Option<String>,
    #[serde(default)]
    references: Vec<SchemaReference>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error_code: Option<u32>,
    message: Option<String>,
}

/// Blocking HTTP client for the Confluent REST API
pub struct HttpRegistryClient {
    client: Client,
    base_url: Url,
}

impl HttpRegistryClient {
    pub fn new(config: &RegistryConfig) -> RegistryResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(CONTENT_TYPE));

        if let Some(auth) = &config.basic_auth {
            let credentials = format!("{}:{}", auth.username, auth.password);
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            let mut value = HeaderValue::from_str(&format!("Basic {}", encoded))
                .map_err(|e| RegistryError::Config(e.to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        if config.url.cannot_be_a_base() {
            return Err(RegistryError::Config(format!(
                "registry URL '{}' cannot carry a path",
                config.url
            )));
        }

        Ok(Self {
            client,
            base_url: config.url.clone(),
        })
    }

    /// Client with default settings for `url`.
    pub fn with_url(url: Url) -> RegistryResult<Self> {
        Self::new(&RegistryConfig::new(url))
    }

    /// Base URL extended with percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> RegistryResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::Config(format!("invalid base URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> RegistryResult<Response> {
        tracing::debug!(url = %url, "Registry request");
        let response = self.client.get(url).send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(parse_error(status, &body))
    }
}

impl SchemaRegistryClient for HttpRegistryClient {
    fn get_metadata(
        &self,
        subject: &Subject,
        version: VersionSelection,
    ) -> RegistryResult<SchemaMetadata> {
        let version_str = match version {
            VersionSelection::Latest => "latest".to_string(),
            VersionSelection::Pinned(v) => v.to_string(),
        };
        let url = self.endpoint(&["subjects", subject.as_str(), "versions", &version_str])?;

        let result: SubjectVersionResponse = self.get(url)?.json()?;

        Ok(SchemaMetadata {
            subject: Subject::new(result.subject),
            id: SchemaId::new(result.id),
            version: result.version,
            schema_type: parse_schema_type(result.schema_type.as_deref())?,
        })
    }

    fn get_schema(&self, subject: &Subject, id: SchemaId) -> RegistryResult<Schema> {
        let mut url = self.endpoint(&["schemas", "ids", &id.0.to_string()])?;
        url.query_pairs_mut().append_pair("subject", subject.as_str());

        let result: GetSchemaResponse = self.get(url)?.json()?;

        Ok(Schema {
            id,
            schema_type: parse_schema_type(result.schema_type.as_deref())?,
            schema: result.schema,
            references: result.references,
        })
    }
}

fn parse_schema_type(raw: Option<&str>) -> RegistryResult<SchemaType> {
    match raw {
        Some(s) => s.parse().map_err(RegistryError::Serialization),
        None => Ok(SchemaType::default()),
    }
}

/// Map a non-success response to an error, using the Confluent error code
/// when the body carries one.
fn parse_error(status: StatusCode, body: &str) -> RegistryError {
    if let Ok(err) = serde_json::from_str::<ErrorResponse>(body) {
        let msg = err.message.unwrap_or_else(|| body.to_string());
        return match err.error_code {
            Some(40401) => RegistryError::SubjectNotFound(msg),
            Some(40402) => RegistryError::VersionNotFound(msg),
            Some(40403) => RegistryError::SchemaNotFound(msg),
            _ => RegistryError::Http {
                status: status.as_u16(),
                message: msg,
            },
        };
    }

    RegistryError::Http {
        status: status.as_u16(),
        message: body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_codes() {
        let err = parse_error(
            StatusCode::NOT_FOUND,
            r#"{"error_code":40401,"message":"Subject 'orders-value' not found."}"#,
        );
        assert!(matches!(err, RegistryError::SubjectNotFound(ref m) if m.contains("orders-value")));

        let err = parse_error(StatusCode::NOT_FOUND, r#"{"error_code":40403,"message":"Schema not found"}"#);
        assert!(matches!(err, RegistryError::SchemaNotFound(_)));

        let err = parse_error(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert!(matches!(err, RegistryError::Http { status: 502, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_endpoint_encoding() {
        let client =
            HttpRegistryClient::with_url(Url::parse("http://registry:8081/api/").unwrap()).unwrap();
        let url = client
            .endpoint(&["subjects", "db.public/orders-value", "versions", "latest"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://registry:8081/api/subjects/db.public%2Forders-value/versions/latest"
        );
    }
}
