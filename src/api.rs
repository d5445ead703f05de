//! REST client for the agent's HTTP endpoints.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::config::{AppSettings, ClientConfig};
use crate::error::{ClientError, Result};
use crate::input_validation::{validate_endpoint_uri, validate_task_uuid, validate_tree_path};
use crate::patch::{patches_from_page, Patch};
use crate::remote_tree::RemoteLister;
use crate::status::TaskConfig;
use crate::types::TreeEntry;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TreeRequest<'a> {
    #[serde(rename = "EndpointURI")]
    endpoint_uri: &'a str,
    path: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TreeResponse {
    #[serde(default)]
    children: Vec<TreeEntry>,
}

#[derive(Serialize)]
struct DefaultRequest<'a> {
    #[serde(rename = "EndpointURI")]
    endpoint_uri: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DefaultResponse {
    node: DefaultNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DefaultNode {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl AgentClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `POST /tree`: immediate children of `path` on the endpoint.
    pub async fn list_tree(&self, endpoint_uri: &str, path: &str) -> Result<Vec<TreeEntry>> {
        validate_endpoint_uri(endpoint_uri).map_err(ClientError::validation)?;
        validate_tree_path(path).map_err(ClientError::validation)?;

        let url = self.config.http_url("/tree")?;
        debug!("listing '{path}' on {endpoint_uri}");
        let response = self
            .http
            .post(url)
            .json(&TreeRequest { endpoint_uri, path })
            .send()
            .await?;
        let body: TreeResponse = read_json(response).await?;
        Ok(body.children)
    }

    /// `POST /default`: the folder a picker should open on.
    pub async fn default_path(&self, endpoint_uri: &str) -> Result<String> {
        validate_endpoint_uri(endpoint_uri).map_err(ClientError::validation)?;

        let url = self.config.http_url("/default")?;
        let response = self
            .http
            .post(url)
            .json(&DefaultRequest { endpoint_uri })
            .send()
            .await?;
        let body: DefaultResponse = read_json(response).await?;
        Ok(body.node.path)
    }

    /// `GET /patches/{uuid}/{offset}/{limit}`. Patches come back in response
    /// key order; see [`Patch::sort_newest_first`].
    pub async fn load_patches(
        &self,
        config: &TaskConfig,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Patch>> {
        validate_task_uuid(&config.uuid).map_err(ClientError::validation)?;

        let url = self
            .config
            .http_url(&format!("/patches/{}/{}/{}", config.uuid, offset, limit))?;
        let response = self.http.get(url).send().await?;
        let page: Map<String, Value> = read_json(response).await?;
        Ok(patches_from_page(config, page))
    }

    /// `GET /config`
    pub async fn get_settings(&self) -> Result<AppSettings> {
        let url = self.config.http_url("/config")?;
        let response = self.http.get(url).send().await?;
        read_json(response).await
    }

    /// `PUT /config`
    pub async fn put_settings(&self, settings: &AppSettings) -> Result<()> {
        let url = self.config.http_url("/config")?;
        let response = self.http.put(url).json(settings).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        if (200..300).contains(&status) && error_field(&body).is_none() {
            return Ok(());
        }
        Err(rejection(status, &body))
    }
}

impl RemoteLister for AgentClient {
    fn list(
        &self,
        endpoint_uri: &str,
        path: &str,
    ) -> impl Future<Output = Result<Vec<TreeEntry>>> + Send {
        self.list_tree(endpoint_uri, path)
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status().as_u16();
    let body = response.bytes().await?;
    interpret_response(status, &body)
}

/// Decodes an agent response. A body of the form `{"error": "..."}` is a
/// rejection whatever the status; other non-2xx bodies become
/// [`ClientError::Status`].
pub fn interpret_response<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T> {
    if let Some(reason) = error_field(body) {
        error!("agent rejected request ({status}): {reason}");
        return Err(ClientError::Agent(reason));
    }
    if !(200..300).contains(&status) {
        return Err(rejection(status, body));
    }
    Ok(serde_json::from_slice(body)?)
}

fn error_field(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body).ok().map(|b| b.error)
}

fn rejection(status: u16, body: &[u8]) -> ClientError {
    match error_field(body) {
        Some(reason) => ClientError::Agent(reason),
        None => ClientError::Status {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        },
    }
}
