//! Conjur REST client for secret retrieval and resource listing.
//!
//! Every request carries `Authorization: Token token="<bearer>"`. Non-200 responses
//! surface as [`ConjurError::SecretFetch`] with the upstream status and body.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::types::{BearerToken, SecretBytes};
use crate::config::GlobalConjurConfig;
use crate::errors::{ConjurError, Result};

/// Page size requested when listing variable resources
pub const RESOURCE_LIST_LIMIT: u32 = 1000;

/// Build the shared HTTP client with the configured per-request timeout
pub fn build_http_client(config: &GlobalConjurConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
        .timeout(config.http_timeout())
        .build()
        .map_err(|e| ConjurError::transport("Failed to build HTTP client", e))
}

/// One annotation on a Conjur resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    pub value: String,
}

/// A resource descriptor as returned by the resources endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResource {
    /// `<account>:<kind>:<path>`
    pub id: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl RawResource {
    /// The variable path: everything after the second `:` of the id
    pub fn variable_path(&self) -> Option<&str> {
        let mut parts = self.id.splitn(3, ':');
        let (_account, _kind) = (parts.next()?, parts.next()?);
        parts.next().filter(|path| !path.is_empty())
    }

    /// Annotation value by case-insensitive name
    pub fn annotation(&self, name: &str) -> Option<&str> {
        self.annotations
            .iter()
            .find(|annotation| annotation.name.eq_ignore_ascii_case(name))
            .map(|annotation| annotation.value.as_str())
    }
}

/// Authenticated reads against a Conjur server
#[derive(Debug, Clone)]
pub struct ConjurClient {
    http: reqwest::Client,
}

impl ConjurClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Fetch the raw value of one variable
    #[instrument(skip(self, token))]
    pub async fn fetch_secret(
        &self,
        token: &BearerToken,
        account: &str,
        appliance_url: &str,
        path: &str,
    ) -> Result<SecretBytes> {
        let url = format!("{}/secrets/{}/variable/{}", base_url(appliance_url), account, path);
        debug!(path = %path, "Fetching Conjur secret");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, token.authorization_header())
            .send()
            .await
            .map_err(|e| ConjurError::transport(format!("GET secret '{}'", path), e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ConjurError::transport(format!("Reading secret '{}'", path), e))?;

        if status != reqwest::StatusCode::OK {
            return Err(ConjurError::secret_fetch(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }

        Ok(SecretBytes::from(body))
    }

    /// List every variable resource of `account`
    #[instrument(skip(self, token))]
    pub async fn list_resources(
        &self,
        token: &BearerToken,
        account: &str,
        appliance_url: &str,
    ) -> Result<Vec<RawResource>> {
        let url = format!("{}/resources/{}", base_url(appliance_url), account);
        let limit = RESOURCE_LIST_LIMIT.to_string();

        let response = self
            .http
            .get(&url)
            .query(&[("kind", "variable"), ("limit", limit.as_str())])
            .header(reqwest::header::AUTHORIZATION, token.authorization_header())
            .send()
            .await
            .map_err(|e| ConjurError::transport("GET variable resources", e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ConjurError::transport("Reading variable resources", e))?;

        if status != reqwest::StatusCode::OK {
            return Err(ConjurError::secret_fetch(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }

        let resources: Vec<RawResource> = serde_json::from_slice(&body)
            .map_err(|e| ConjurError::serialization("Decoding variable resources", e))?;
        debug!(count = resources.len(), "Listed Conjur variable resources");
        Ok(resources)
    }
}

pub(crate) fn base_url(appliance_url: &str) -> &str {
    appliance_url.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> ConjurClient {
        ConjurClient::new(build_http_client(&GlobalConjurConfig::default()).unwrap())
    }

    #[test]
    fn test_variable_path_keeps_colons_after_kind() {
        let resource = RawResource { id: "myacct:variable:db/url:primary".into(), annotations: vec![] };
        assert_eq!(resource.variable_path(), Some("db/url:primary"));

        let malformed = RawResource { id: "myacct:variable".into(), annotations: vec![] };
        assert_eq!(malformed.variable_path(), None);
    }

    #[test]
    fn test_annotation_lookup_is_case_insensitive() {
        let resource: RawResource = serde_json::from_str(
            r#"{"id":"a:variable:x","annotations":[{"name":"Jenkins_Credential_Username","value":"bob"}]}"#,
        )
        .unwrap();
        assert_eq!(resource.annotation("jenkins_credential_username"), Some("bob"));
        assert_eq!(resource.annotation("jenkins_credential_type"), None);
    }

    #[test]
    fn test_missing_annotations_default_to_empty() {
        let resource: RawResource = serde_json::from_str(r#"{"id":"a:variable:x"}"#).unwrap();
        assert!(resource.annotations.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_secret_sends_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets/myacct/variable/host/x"))
            .and(header("Authorization", "Token token=\"TOK\""))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"s3cr3t".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let value = client()
            .fetch_secret(&BearerToken::new("TOK"), "myacct", &server.uri(), "host/x")
            .await
            .unwrap();
        assert_eq!(value.expose_secret(), b"s3cr3t");
    }

    #[tokio::test]
    async fn test_fetch_secret_non_200_is_secret_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets/myacct/variable/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Variable not found"))
            .mount(&server)
            .await;

        let err = client()
            .fetch_secret(&BearerToken::new("TOK"), "myacct", &server.uri(), "missing")
            .await
            .unwrap_err();
        match err {
            ConjurError::SecretFetch { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "Variable not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_resources() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resources/myacct"))
            .and(query_param("kind", "variable"))
            .and(query_param("limit", "1000"))
            .and(header("Authorization", "Token token=\"TOK\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "myacct:variable:db/password", "annotations": [
                    {"name": "jenkins_credential_username", "value": "dbuser"}
                ]},
                {"id": "myacct:variable:plain"}
            ])))
            .mount(&server)
            .await;

        let trailing = format!("{}/", server.uri());
        let resources = client()
            .list_resources(&BearerToken::new("TOK"), "myacct", &trailing)
            .await
            .unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].variable_path(), Some("db/password"));
    }

    #[tokio::test]
    async fn test_list_resources_undecodable_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resources/myacct"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client()
            .list_resources(&BearerToken::new("TOK"), "myacct", &server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, ConjurError::Serialization { .. }));
    }
}
