//! Health polling clients, constructed during Setup and used only after the
//! units are started. They never drive orchestration logic.

use std::time::Duration;

use crate::error::SetupError;

const APISERVER_URL: &str = "http://127.0.0.1:8080";
const KUBELET_HEALTHZ_URL: &str = "http://127.0.0.1:10248/healthz";

/// Kubernetes API and kubelet HTTP clients.
pub struct KubeClients {
    client: reqwest::Client,
    apiserver_url: String,
}

impl KubeClients {
    pub fn new() -> Result<Self, SetupError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(KubeClients {
            client,
            apiserver_url: APISERVER_URL.to_string(),
        })
    }

    pub async fn apiserver_healthy(&self) -> bool {
        self.probe(&format!("{}/healthz", self.apiserver_url)).await
    }

    pub async fn kubelet_healthy(&self) -> bool {
        self.probe(KUBELET_HEALTHZ_URL).await
    }

    async fn probe(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("[Health] {} not ready: {}", url, e);
                false
            }
        }
    }

    /// List pods known to the control plane, as raw JSON objects. Used by
    /// the workload drain; best effort by design.
    pub async fn list_pods(&self) -> Result<Vec<(String, String)>, SetupError> {
        let url = format!("{}/api/v1/pods", self.apiserver_url);
        let body: serde_json::Value = self.client.get(&url).send().await?.json().await?;
        let mut pods = Vec::new();
        if let Some(items) = body.get("items").and_then(|i| i.as_array()) {
            for item in items {
                let namespace = item
                    .pointer("/metadata/namespace")
                    .and_then(|v| v.as_str())
                    .unwrap_or("default");
                let name = item.pointer("/metadata/name").and_then(|v| v.as_str());
                if let Some(name) = name {
                    pods.push((namespace.to_string(), name.to_string()));
                }
            }
        }
        Ok(pods)
    }

    /// Delete one pod. Grace period zero; the node is going away.
    pub async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), SetupError> {
        let url = format!(
            "{}/api/v1/namespaces/{}/pods/{}?gracePeriodSeconds=0",
            self.apiserver_url, namespace, name
        );
        self.client.delete(&url).send().await?.error_for_status()?;
        Ok(())
    }
}
