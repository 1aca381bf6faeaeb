// Copyright 2025 Edge Kube Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Works with the TLS trust of container image registries: fetches a
//! registry's CA chain, tests whether it is already trusted, and adds
//! it to the cluster trust configuration.

use crate::infrastructure::jq;
use crate::infrastructure::kubernetes::{conflict_backoff, gvks, EdgeKubeClient};
use crate::shared::error::{EdgeError, Result};
use backon::Retryable;
use kube::core::DynamicObject;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use serde_json::json;
use std::sync::Arc;

const DEFAULT_PORT: &str = "443";
const TRUST_NAMESPACE: &str = "openshift-config";
const DEFAULT_TRUST_CONFIGMAP: &str = "registry-cas";

pub struct RegistryTool {
    client: Arc<dyn EdgeKubeClient>,
}

impl RegistryTool {
    pub fn new(client: Arc<dyn EdgeKubeClient>) -> Self {
        Self { client }
    }

    /// Connects to the registry with verification disabled and returns
    /// its certificate chain, PEM encoded.
    pub async fn fetch_ca(&self, addr: &str) -> Result<Vec<u8>> {
        let addr = with_default_port(addr);
        tokio::task::spawn_blocking(move || fetch_ca_blocking(&addr))
            .await
            .map_err(|e| EdgeError::Transport(e.to_string()))?
    }

    /// Whether a verifying TLS handshake with the registry succeeds
    /// using the system trust anchors.
    pub async fn is_trusted(&self, addr: &str) -> Result<bool> {
        let addr = with_default_port(addr);
        tokio::task::spawn_blocking(move || is_trusted_blocking(&addr))
            .await
            .map_err(|e| EdgeError::Transport(e.to_string()))?
    }

    /// Merges the registry's CA into the cluster image trust: the
    /// configmap named by the image configuration (created when
    /// missing) gains a key for the registry address. The whole
    /// read-modify-write repeats when another writer wins the race.
    pub async fn add_trusted_registry(&self, addr: &str, ca: &[u8]) -> Result<()> {
        let key = with_default_port(addr).replace(':', "..");
        let ca_text = String::from_utf8(ca.to_vec())
            .map_err(|e| EdgeError::Decode(format!("registry CA is not UTF-8: {}", e)))?;

        let update = || async { self.merge_trusted_ca(&key, &ca_text).await };
        update
            .retry(&conflict_backoff())
            .when(|e| matches!(e, EdgeError::Conflict(_)))
            .await
    }

    async fn merge_trusted_ca(&self, key: &str, ca_text: &str) -> Result<()> {
        let image_config = self.client.get(&gvks::image_config(), None, "cluster").await?;
        let configmap_name: Option<String> =
            jq::query(".spec.additionalTrustedCA.name?", &image_config)?;
        let configmap_name = configmap_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_TRUST_CONFIGMAP.to_string());

        let patch = json!({"data": {key: ca_text}});

        match self
            .client
            .patch_merge(
                &gvks::config_map(),
                Some(TRUST_NAMESPACE),
                &configmap_name,
                &patch,
            )
            .await
        {
            Ok(_) => {}
            Err(EdgeError::NotFound { .. }) => {
                let configmap: DynamicObject = serde_json::from_value(json!({
                    "apiVersion": "v1",
                    "kind": "ConfigMap",
                    "metadata": {
                        "name": configmap_name,
                        "namespace": TRUST_NAMESPACE,
                    },
                    "data": patch["data"],
                }))?;
                self.client.create(&configmap).await?;
            }
            Err(e) => return Err(e),
        }

        self.client
            .patch_merge(
                &gvks::image_config(),
                None,
                "cluster",
                &json!({"spec": {"additionalTrustedCA": {"name": configmap_name}}}),
            )
            .await?;
        Ok(())
    }
}

fn with_default_port(addr: &str) -> String {
    if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{}:{}", addr, DEFAULT_PORT)
    }
}

fn host_of(addr: &str) -> &str {
    addr.split(':').next().unwrap_or(addr)
}

fn fetch_ca_blocking(addr: &str) -> Result<Vec<u8>> {
    let mut builder = SslConnector::builder(SslMethod::tls())
        .map_err(|e| EdgeError::Transport(e.to_string()))?;
    builder.set_verify(SslVerifyMode::NONE);
    let connector = builder.build();

    let tcp = std::net::TcpStream::connect(addr)?;
    let mut config = connector
        .configure()
        .map_err(|e| EdgeError::Transport(e.to_string()))?;
    config.set_verify_hostname(false);
    let stream = config
        .connect(host_of(addr), tcp)
        .map_err(|e| EdgeError::Transport(format!("TLS handshake with '{}' failed: {}", addr, e)))?;

    let chain = stream.ssl().peer_cert_chain().ok_or_else(|| {
        EdgeError::Transport(format!("'{}' presented no certificates", addr))
    })?;
    let mut pem = Vec::new();
    for cert in chain {
        pem.extend(
            cert.to_pem()
                .map_err(|e| EdgeError::Transport(e.to_string()))?,
        );
    }
    Ok(pem)
}

fn is_trusted_blocking(addr: &str) -> Result<bool> {
    let connector = SslConnector::builder(SslMethod::tls())
        .map_err(|e| EdgeError::Transport(e.to_string()))?
        .build();
    let tcp = std::net::TcpStream::connect(addr)?;
    Ok(connector.connect(host_of(addr), tcp).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_default_port() {
        assert_eq!(with_default_port("registry.local"), "registry.local:443");
        assert_eq!(with_default_port("registry.local:5000"), "registry.local:5000");
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("registry.local:5000"), "registry.local");
        assert_eq!(host_of("registry.local"), "registry.local");
    }
}
