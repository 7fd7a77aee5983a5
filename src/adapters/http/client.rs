//! Client for the remote mod service.
//!
//! One service answers three endpoints: `POST /api/generate`, `POST /api/fix`
//! and `POST /api/verify`. Transport and status failures are mapped onto the
//! port error types so the scheduler can tell transient from persistent
//! failures.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::domain::models::{
    FixRequest, GeneratedFile, GenerationRequest, GenerationResult, ProjectFile, ProjectId,
    ServiceConfig, VerificationReport,
};
use crate::domain::ports::{BuildVerifier, CodeGenerator, GenerationError, VerifierError};

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpServiceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl From<&ServiceConfig> for HttpServiceConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Body of a verify request.
#[derive(Serialize)]
struct VerifyRequest {
    project_id: ProjectId,
    files: Vec<GeneratedFile>,
}

/// Failure of a single HTTP exchange, before mapping onto a port error.
#[derive(Debug)]
enum CallError {
    Timeout,
    Network(String),
    Status(StatusCode, String),
    Decode(String),
}

/// Generator and verifier backed by the remote mod service.
pub struct HttpModService {
    http_client: ReqwestClient,
    config: HttpServiceConfig,
}

impl HttpModService {
    pub fn new(config: HttpServiceConfig) -> Result<Self, reqwest::Error> {
        let http_client = ReqwestClient::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()?;

        Ok(Self { http_client, config })
    }

    pub fn from_service_config(config: &ServiceConfig) -> Result<Self, reqwest::Error> {
        Self::new(HttpServiceConfig::from(config))
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, CallError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut request = self
            .http_client
            .post(format!("{}{}", self.config.base_url, path))
            .json(body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CallError::Timeout
            } else {
                CallError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                CallError::Timeout
            } else {
                CallError::Network(e.to_string())
            }
        })?;

        if !status.is_success() {
            warn!(path, status = status.as_u16(), "Mod service returned error status");
            return Err(CallError::Status(status, text));
        }

        debug!(path, bytes = text.len(), "Mod service response received");
        serde_json::from_str(&text).map_err(|e| CallError::Decode(e.to_string()))
    }
}

impl From<CallError> for GenerationError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Timeout => Self::Timeout,
            CallError::Network(message) => Self::Network(message),
            CallError::Status(StatusCode::TOO_MANY_REQUESTS, _) => Self::RateLimited,
            CallError::Status(status, message) if status.is_server_error() => Self::Unavailable {
                status: status.as_u16(),
                message,
            },
            CallError::Status(status, message) => Self::Rejected {
                status: status.as_u16(),
                message,
            },
            CallError::Decode(message) => Self::Malformed(message),
        }
    }
}

impl From<CallError> for VerifierError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Timeout => Self::Unavailable("request timed out".to_string()),
            CallError::Network(message) => Self::Unavailable(message),
            CallError::Status(status, message)
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS =>
            {
                Self::Unavailable(format!("{}: {}", status.as_u16(), message))
            }
            CallError::Status(status, message) => Self::Execution(format!("{}: {}", status.as_u16(), message)),
            CallError::Decode(message) => Self::Malformed(message),
        }
    }
}

#[async_trait]
impl CodeGenerator for HttpModService {
    #[instrument(skip(self, request), fields(project_id = %request.project_id))]
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
        Ok(self.post("/api/generate", request).await?)
    }

    #[instrument(skip(self, request), fields(project_id = %request.project_id, errors = request.errors.len()))]
    async fn fix(&self, request: &FixRequest) -> Result<GenerationResult, GenerationError> {
        Ok(self.post("/api/fix", request).await?)
    }
}

#[async_trait]
impl BuildVerifier for HttpModService {
    #[instrument(skip(self, files), fields(project_id = %project_id, files = files.len()))]
    async fn verify(
        &self,
        project_id: ProjectId,
        files: &[ProjectFile],
    ) -> Result<VerificationReport, VerifierError> {
        let body = VerifyRequest {
            project_id,
            files: files
                .iter()
                .map(|f| GeneratedFile::new(f.path.clone(), f.content.clone()))
                .collect(),
        };
        Ok(self.post("/api/verify", &body).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CompileError, ModLoader};

    fn service(url: &str) -> HttpModService {
        HttpModService::new(HttpServiceConfig {
            base_url: url.to_string(),
            api_key: Some("secret".to_string()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn generation_request() -> GenerationRequest {
        GenerationRequest {
            project_id: ProjectId(1),
            prompt: "ruby sword".to_string(),
            mod_loader: ModLoader::Forge,
            minecraft_version: "1.20.1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_generate_success_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body(r#"{"files":[{"path":"Ruby.java","content":"class Ruby {}"}],"explanation":"ok"}"#)
            .create_async()
            .await;

        let result = service(&server.url()).generate(&generation_request()).await.unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.explanation, "ok");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_mapping_for_generation() {
        let mut server = mockito::Server::new_async().await;
        let _limited = server.mock("POST", "/api/generate").with_status(429).create_async().await;
        let err = service(&server.url()).generate(&generation_request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::RateLimited));
        assert!(err.is_transient());

        let mut server = mockito::Server::new_async().await;
        let _down = server
            .mock("POST", "/api/generate")
            .with_status(503)
            .with_body("busy")
            .create_async()
            .await;
        let err = service(&server.url()).generate(&generation_request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable { status: 503, .. }));

        let mut server = mockito::Server::new_async().await;
        let _bad = server.mock("POST", "/api/generate").with_status(400).create_async().await;
        let err = service(&server.url()).generate(&generation_request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Rejected { status: 400, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/fix")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let request = FixRequest {
            project_id: ProjectId(1),
            files: vec![],
            errors: vec![CompileError::new("A.java", 1, "';' expected")],
            mod_loader: ModLoader::Forge,
            minecraft_version: "1.20.1".to_string(),
        };
        let err = service(&server.url()).fix(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_verify_report_and_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/verify")
            .with_status(200)
            .with_body(r#"{"success":false,"errors":[{"file":"A.java","line":3,"message":"cannot find symbol"}]}"#)
            .create_async()
            .await;

        let files = vec![ProjectFile::new(ProjectId(1), "A.java", "class A {")];
        let report = service(&server.url()).verify(ProjectId(1), &files).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.errors[0].line, 3);

        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/api/verify").with_status(502).create_async().await;
        let err = service(&server.url()).verify(ProjectId(1), &files).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let err = service("http://127.0.0.1:1").generate(&generation_request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Network(_) | GenerationError::Timeout));
    }
}
