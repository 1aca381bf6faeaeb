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

//! Per-cluster drivers: precondition checks, transport construction,
//! and the wait-for-condition loops that follow an apply.

use crate::domain::model::{Cluster, Config, NodeKind};
use crate::infrastructure::jq;
use crate::infrastructure::kubernetes::{
    gvks, ClientOptions, EdgeKubeClient, EdgeKubeClientImpl, SshSpec,
};
use crate::shared::error::{EdgeError, Result};
use base64::Engine as _;
use colored::Colorize;
use kube::core::GroupVersionKind;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// SSH user on cluster nodes.
pub const SSH_USER: &str = "core";

/// Runs `task` for each cluster in order. Failures are reported per
/// cluster and do not abort the rest unless `fail_fast` is set; if any
/// cluster failed the whole run fails with exit code 1.
pub async fn for_each_cluster<'c, F>(config: &'c Config, fail_fast: bool, mut task: F) -> Result<()>
where
    F: FnMut(&'c Cluster) -> Pin<Box<dyn Future<Output = Result<()>> + 'c>>,
{
    let mut failed = 0usize;
    for cluster in &config.clusters {
        info!(cluster = %cluster.name, "processing cluster");
        match task(cluster).await {
            Ok(()) => {}
            Err(e) => {
                eprintln!(
                    "{}",
                    format!("Cluster '{}' failed: {}", cluster.name, e).red()
                );
                if fail_fast {
                    return Err(e);
                }
                error!(cluster = %cluster.name, error = %e, "cluster task failed");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        Err(EdgeError::Exit(1))
    } else {
        Ok(())
    }
}

pub fn require_control_plane(cluster: &Cluster) -> Result<()> {
    if cluster.control_plane_nodes().next().is_none() {
        return Err(EdgeError::Enrichment(format!(
            "cluster '{}' has no control plane nodes",
            cluster.name
        )));
    }
    Ok(())
}

pub fn require_kubeconfig(cluster: &Cluster) -> Result<()> {
    if cluster.kubeconfig.is_none() {
        return Err(EdgeError::Enrichment(format!(
            "cluster '{}' has no kubeconfig yet",
            cluster.name
        )));
    }
    Ok(())
}

pub fn require_ssh(cluster: &Cluster) -> Result<()> {
    if cluster.ssh_key.is_none() {
        return Err(EdgeError::Enrichment(format!(
            "cluster '{}' has no SSH key",
            cluster.name
        )));
    }
    let reachable = cluster
        .control_plane_nodes()
        .any(|n| n.external_ip.is_some());
    if !reachable {
        return Err(EdgeError::Enrichment(format!(
            "no control plane node of cluster '{}' has an external address",
            cluster.name
        )));
    }
    Ok(())
}

/// Builds the cluster's own API client from its admin kubeconfig,
/// dialing through an SSH tunnel into a control-plane node when asked.
pub async fn cluster_client(cluster: &Cluster, tunneled: bool) -> Result<Arc<EdgeKubeClientImpl>> {
    require_kubeconfig(cluster)?;
    let mut options = ClientOptions {
        kubeconfig_bytes: cluster.kubeconfig.clone(),
        ..Default::default()
    };
    if tunneled {
        require_ssh(cluster)?;
        let node_address = cluster
            .control_plane_nodes()
            .find_map(|n| n.external_ip)
            .map(|ip| ip.address.to_string())
            .ok_or_else(|| {
                EdgeError::Enrichment(format!(
                    "no control plane node of cluster '{}' has an external address",
                    cluster.name
                ))
            })?;
        let key = cluster
            .ssh_key
            .as_ref()
            .map(|k| k.private_key.clone())
            .unwrap_or_default();
        options.ssh = Some(SshSpec {
            host: node_address,
            user: SSH_USER.to_string(),
            private_key: key,
        });
    }
    Ok(Arc::new(EdgeKubeClientImpl::new(options).await?))
}

/// One wait-for-condition loop: watches objects, projects a state out
/// of each event with a jq expression, prints a line when the state
/// changes, and finishes when the ready state is seen.
pub struct WaitSpec {
    pub cluster: String,
    pub gvk: GroupVersionKind,
    pub namespace: Option<String>,
    pub field_selector: Option<String>,
    pub state_query: String,
    pub ready_state: String,
    pub error_state: Option<String>,
    pub subject: String,
    pub timeout: Duration,
}

pub async fn wait_status(client: &dyn EdgeKubeClient, spec: &WaitSpec) -> Result<()> {
    if spec.timeout.is_zero() {
        return Ok(());
    }
    let mut stream = client
        .watch(
            &spec.gvk,
            spec.namespace.as_deref(),
            spec.field_selector.as_deref(),
        )
        .await?;

    let mut last: Option<String> = None;
    let wait = async {
        while let Some(event) = stream.next().await {
            let event = event?;
            let state = match object_state(&spec.state_query, event.object())? {
                Some(state) => state,
                None => continue,
            };
            if state == spec.ready_state {
                return Ok(());
            }
            if spec.error_state.as_deref() == Some(state.as_str()) {
                return Err(EdgeError::DownstreamReportedError {
                    cluster: spec.cluster.clone(),
                    kind: spec.gvk.kind.clone(),
                    name: event
                        .object()
                        .metadata
                        .name
                        .clone()
                        .unwrap_or_default(),
                    state,
                });
            }
            if last.as_deref() != Some(state.as_str()) {
                println!("{}", format!("{} is now '{}'", spec.subject, state).cyan());
                last = Some(state);
            }
        }
        Err(EdgeError::Server(format!(
            "watch for {} ended unexpectedly",
            spec.subject
        )))
    };

    tokio::time::timeout(spec.timeout, wait)
        .await
        .map_err(|_| EdgeError::Timeout(format!("{} never became ready", spec.subject)))?
}

/// Waits until every host of the cluster reports provisioned.
pub async fn wait_provisioned_hosts(
    hub: &dyn EdgeKubeClient,
    cluster: &Cluster,
    timeout: Duration,
) -> Result<()> {
    if timeout.is_zero() {
        return Ok(());
    }
    let expected = cluster.nodes.len();
    let mut provisioned = std::collections::BTreeSet::new();
    let mut states: std::collections::BTreeMap<String, String> = Default::default();

    let mut stream = hub
        .watch(&gvks::bare_metal_host(), Some(&cluster.name), None)
        .await?;
    let wait = async {
        while let Some(event) = stream.next().await {
            let event = event?;
            let obj = event.object();
            let name = obj.metadata.name.clone().unwrap_or_default();

            if let Some("error") = obj.data["status"]["operationalStatus"].as_str() {
                return Err(EdgeError::DownstreamReportedError {
                    cluster: cluster.name.clone(),
                    kind: "BareMetalHost".to_string(),
                    name,
                    state: "error".to_string(),
                });
            }

            let state = match object_state(".status.provisioning.state?", obj)? {
                Some(state) => state,
                None => continue,
            };
            if states.get(&name) != Some(&state) {
                println!(
                    "{}",
                    format!("Host '{}/{}' is now '{}'", cluster.name, name, state).cyan()
                );
                states.insert(name.clone(), state.clone());
            }
            if state == "provisioned" {
                provisioned.insert(name);
                if provisioned.len() >= expected {
                    return Ok(());
                }
            }
        }
        Err(EdgeError::Server(format!(
            "host watch for cluster '{}' ended unexpectedly",
            cluster.name
        )))
    };

    tokio::time::timeout(timeout, wait).await.map_err(|_| {
        EdgeError::Timeout(format!(
            "hosts of cluster '{}' never finished provisioning",
            cluster.name
        ))
    })?
}

/// Waits until the cluster installation reports completed.
pub async fn wait_installed(
    hub: &dyn EdgeKubeClient,
    cluster: &Cluster,
    timeout: Duration,
) -> Result<()> {
    if timeout.is_zero() {
        return Ok(());
    }
    let selector = format!("metadata.name={}", cluster.name);
    let mut stream = hub
        .watch(
            &gvks::agent_cluster_install(),
            Some(&cluster.name),
            Some(&selector),
        )
        .await?;

    let mut last: Option<String> = None;
    let wait = async {
        while let Some(event) = stream.next().await {
            let event = event?;
            let obj = event.object();

            let failed: Vec<String> = jq::query(
                ".status.conditions[]?|select(.type==\"Failed\")|.status",
                obj,
            )?;
            if failed.iter().any(|s| s == "True") {
                return Err(EdgeError::DownstreamReportedError {
                    cluster: cluster.name.clone(),
                    kind: "AgentClusterInstall".to_string(),
                    name: cluster.name.clone(),
                    state: "Failed".to_string(),
                });
            }

            let completed: Vec<String> = jq::query(
                ".status.conditions[]?|select(.type==\"Completed\")|.status",
                obj,
            )?;
            if completed.iter().any(|s| s == "True") {
                return Ok(());
            }

            if let Some(phase) = object_state(".status.debugInfo.state?", obj)? {
                if last.as_deref() != Some(phase.as_str()) {
                    println!(
                        "{}",
                        format!("Cluster '{}' install is now '{}'", cluster.name, phase).cyan()
                    );
                    last = Some(phase);
                }
            }
        }
        Err(EdgeError::Server(format!(
            "install watch for cluster '{}' ended unexpectedly",
            cluster.name
        )))
    };

    tokio::time::timeout(timeout, wait).await.map_err(|_| {
        EdgeError::Timeout(format!("cluster '{}' never finished installing", cluster.name))
    })?
}

fn object_state(query: &str, obj: &kube::core::DynamicObject) -> Result<Option<String>> {
    let states: Vec<Value> = jq::query(query, obj)?;
    Ok(states
        .into_iter()
        .find_map(|v| v.as_str().map(str::to_string)))
}

/// The context every manifest template renders with.
pub fn template_data(config: &Config, cluster: &Cluster) -> Value {
    let b64 = |bytes: &[u8]| base64::engine::general_purpose::STANDARD.encode(bytes);
    json!({
        "properties": config.properties,
        "cluster": {
            "name": cluster.name,
            "sno": cluster.sno,
            "tpm": cluster.tpm,
            "domain": cluster.dns.domain,
            "image_set": cluster.image_set,
            "pull_secret": cluster.pull_secret.as_deref().map(b64),
            "ssh_public_key": cluster.ssh_key.as_ref().map(|k| k.public_key.clone()),
            "ssh_private_key": cluster.ssh_key.as_ref().map(|k| k.private_key.clone()),
            "api_ip": cluster.api.internal_ip.map(|ip| ip.to_string()),
            "ingress_ip": cluster.ingress.internal_ip.map(|ip| ip.to_string()),
            "cluster_networks": cluster
                .cluster_networks
                .iter()
                .map(|n| json!({"cidr": n.cidr.to_string(), "host_prefix": n.host_prefix}))
                .collect::<Vec<_>>(),
            "machine_networks": cluster
                .machine_networks
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>(),
            "service_networks": cluster
                .service_networks
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>(),
            "registry": {
                "url": cluster.registry.url,
                "ca": cluster.registry.ca.as_deref().map(b64),
            },
            "nodes": cluster
                .nodes
                .iter()
                .map(|node| {
                    json!({
                        "name": node.name,
                        "role": match node.kind {
                            Some(NodeKind::ControlPlane) => "master",
                            Some(NodeKind::Worker) => "worker",
                            None => "",
                        },
                        "index": node.index(),
                        "hostname": node.hostname,
                        "bmc": {
                            "url": node.bmc.url,
                            "user": node.bmc.user,
                            "pass": node.bmc.pass,
                        },
                        "root_disk": node.root_disk,
                        "storage_disks": node.storage_disks,
                        "internal_nic": {
                            "name": node.internal_nic.name,
                            "mac": node.internal_nic.mac,
                        },
                        "internal_ip": node.internal_ip.map(|ip| ip.to_string()),
                        "external_nic": {
                            "name": node.external_nic.name,
                            "mac": node.external_nic.mac,
                        },
                        "external_ip": node.external_ip.map(|ip| ip.to_string()),
                        "ignored_nics": node.ignored_nics,
                    })
                })
                .collect::<Vec<_>>(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Node;

    #[test]
    fn test_require_control_plane() {
        let mut cluster = Cluster {
            name: "edge0".to_string(),
            ..Default::default()
        };
        assert!(require_control_plane(&cluster).is_err());

        cluster.nodes.push(Node {
            name: "master0".to_string(),
            kind: Node::kind_from_name("master0"),
            ..Default::default()
        });
        assert!(require_control_plane(&cluster).is_ok());
    }

    #[test]
    fn test_template_data_shape() {
        let config = Config::default();
        let cluster = Cluster {
            name: "edge0".to_string(),
            pull_secret: Some(b"{}".to_vec()),
            ..Default::default()
        };
        let data = template_data(&config, &cluster);
        assert_eq!(data["cluster"]["name"], "edge0");
        assert_eq!(data["cluster"]["pull_secret"], "e30=");
    }
}
