use std::{env, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::backend::WorkflowBackend;
use crate::error::EditorError;
use crate::graph::{
    EdgeDraft, EdgeRecord, ExecutionHandle, NodeDraft, NodePatch, NodeRecord, WorkflowRecord,
};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3001/api";

#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub request_timeout: Duration,
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_env() -> Self {
        let mut config =
            Self::new(env::var("FLOWDECK_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()));
        if let Ok(token) = env::var("FLOWDECK_API_TOKEN") {
            config.bearer_token = Some(token);
        }
        if let Ok(timeout_ms) = env::var("FLOWDECK_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = timeout_ms.parse::<u64>() {
                config.request_timeout = Duration::from_millis(ms);
            }
        }
        config
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

/// REST client for the workflow persistence surface.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: HttpBackendConfig,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, EditorError> {
        Self::from_config(HttpBackendConfig::new(base_url))
    }

    pub fn from_env() -> Result<Self, EditorError> {
        Self::from_config(HttpBackendConfig::from_env())
    }

    pub fn from_config(config: HttpBackendConfig) -> Result<Self, EditorError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn with_default_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn expect_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, EditorError> {
        let response = self.with_default_headers(builder).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EditorError::Backend {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn expect_ok(&self, builder: RequestBuilder) -> Result<(), EditorError> {
        let response = self.with_default_headers(builder).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EditorError::Backend {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowBackend for HttpBackend {
    async fn fetch_workflow(&self, workflow_id: &str) -> Result<WorkflowRecord, EditorError> {
        let url = self.endpoint(&format!("workflows/{workflow_id}"));
        self.expect_json(self.client.get(url)).await
    }

    async fn update_workflow(
        &self,
        record: &WorkflowRecord,
    ) -> Result<WorkflowRecord, EditorError> {
        let url = self.endpoint(&format!("workflows/{}", record.id));
        self.expect_json(self.client.put(url).json(record)).await
    }

    async fn list_nodes(&self, workflow_id: &str) -> Result<Vec<NodeRecord>, EditorError> {
        let url = self.endpoint(&format!("workflows/{workflow_id}/nodes"));
        self.expect_json(self.client.get(url)).await
    }

    async fn create_node(
        &self,
        workflow_id: &str,
        draft: &NodeDraft,
    ) -> Result<NodeRecord, EditorError> {
        let url = self.endpoint(&format!("workflows/{workflow_id}/nodes"));
        self.expect_json(self.client.post(url).json(draft)).await
    }

    async fn update_node(
        &self,
        workflow_id: &str,
        node_id: &str,
        patch: &NodePatch,
    ) -> Result<NodeRecord, EditorError> {
        let url = self.endpoint(&format!("workflows/{workflow_id}/nodes/{node_id}"));
        self.expect_json(self.client.put(url).json(patch)).await
    }

    async fn delete_node(&self, workflow_id: &str, node_id: &str) -> Result<(), EditorError> {
        let url = self.endpoint(&format!("workflows/{workflow_id}/nodes/{node_id}"));
        self.expect_ok(self.client.delete(url)).await
    }

    async fn list_edges(&self, workflow_id: &str) -> Result<Vec<EdgeRecord>, EditorError> {
        let url = self.endpoint(&format!("workflows/{workflow_id}/edges"));
        self.expect_json(self.client.get(url)).await
    }

    async fn create_edge(
        &self,
        workflow_id: &str,
        draft: &EdgeDraft,
    ) -> Result<EdgeRecord, EditorError> {
        let url = self.endpoint(&format!("workflows/{workflow_id}/edges"));
        self.expect_json(self.client.post(url).json(draft)).await
    }

    async fn delete_edge(&self, workflow_id: &str, edge_id: &str) -> Result<(), EditorError> {
        let url = self.endpoint(&format!("workflows/{workflow_id}/edges/{edge_id}"));
        self.expect_ok(self.client.delete(url)).await
    }

    async fn execute(&self, workflow_id: &str) -> Result<ExecutionHandle, EditorError> {
        let url = self.endpoint(&format!("workflows/{workflow_id}/execute"));
        self.expect_json(self.client.post(url)).await
    }
}
