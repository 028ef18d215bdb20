//! REST clients: the control plane (create / refresh / delete) and the
//! per-sandbox file transfer endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, info};

use crate::types::{E2bConfig, Error, SandboxInfo};

const API_KEY_HEADER: &str = "X-API-Key";
const FILE_ROUTE: &str = "/file";
/// Directory uploads land in.
pub(crate) const UPLOAD_DIR: &str = "/home/user";

#[derive(Serialize)]
struct CreateRequest<'a> {
    #[serde(rename = "templateID")]
    template_id: &'a str,
    metadata: &'a HashMap<String, String>,
}

#[derive(Serialize)]
struct RefreshRequest {
    duration: u64,
}

/// Turn a non-2xx response into [`Error::Api`] carrying the body.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}

/// Control plane client. Clone is a cheap Arc refcount bump.
#[derive(Clone)]
pub(crate) struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    api_url: String,
    api_key: String,
}

impl ApiClient {
    pub fn new(config: &E2bConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(config.timing.connect_timeout)
            .timeout(config.timing.request_timeout)
            .build()?;
        let api_url = config.api_url.trim_end_matches('/').to_string();
        debug!(api_url = %api_url, "control plane client initialized");
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                api_url,
                api_key: config.api_key.clone(),
            }),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.inner.api_url);
        self.inner
            .client
            .request(method, url)
            .header(API_KEY_HEADER, &self.inner.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    pub async fn create_sandbox(
        &self,
        template: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<SandboxInfo, Error> {
        let resp = self
            .request(reqwest::Method::POST, "/sandboxes")
            .json(&CreateRequest {
                template_id: template,
                metadata,
            })
            .send()
            .await?;
        let info: SandboxInfo = check_status(resp).await?.json().await?;
        info!(
            sandbox_id = %info.sandbox_id,
            template = %info.template_id,
            "sandbox created"
        );
        Ok(info)
    }

    pub async fn refresh_sandbox(&self, sandbox_id: &str, duration: Duration) -> Result<(), Error> {
        let path = format!("/sandboxes/{sandbox_id}/refreshes");
        let resp = self
            .request(reqwest::Method::POST, &path)
            .json(&RefreshRequest {
                duration: duration.as_secs(),
            })
            .send()
            .await?;
        check_status(resp).await?;
        debug!(sandbox_id, secs = duration.as_secs(), "sandbox refreshed");
        Ok(())
    }

    pub async fn delete_sandbox(&self, sandbox_id: &str) -> Result<(), Error> {
        let path = format!("/sandboxes/{sandbox_id}");
        let resp = self.request(reqwest::Method::DELETE, &path).send().await?;
        check_status(resp).await?;
        info!(sandbox_id, "sandbox deleted");
        Ok(())
    }
}

/// Client for the `/file` route of one sandbox.
#[derive(Clone)]
pub(crate) struct FileClient {
    client: Client,
    url: String,
}

impl FileClient {
    pub fn new(envd_url: &str, config: &E2bConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(config.timing.connect_timeout)
            .timeout(config.timing.request_timeout)
            .build()?;
        Ok(Self {
            client,
            url: format!("{}{FILE_ROUTE}", envd_url.trim_end_matches('/')),
        })
    }

    /// Upload `content` as `file_name`; returns the path it was stored under.
    pub async fn upload(&self, file_name: &str, content: Vec<u8>) -> Result<String, Error> {
        if file_name.is_empty() || file_name.contains('/') {
            return Err(Error::InvalidArgument(format!(
                "file name must be a plain name, got {file_name:?}"
            )));
        }
        let path = format!("{UPLOAD_DIR}/{file_name}");
        let size = content.len();
        let part = reqwest::multipart::Part::bytes(content).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .client
            .post(&self.url)
            .query(&[("path", path.as_str())])
            .multipart(form)
            .send()
            .await?;
        check_status(resp).await?;
        debug!(path = %path, size, "file uploaded");
        Ok(path)
    }

    pub async fn download(&self, path: &str) -> Result<Vec<u8>, Error> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[("path", path)])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(path.to_string()));
        }
        let bytes = check_status(resp).await?.bytes().await?;
        debug!(path, size = bytes.len(), "file downloaded");
        Ok(bytes.to_vec())
    }
}
