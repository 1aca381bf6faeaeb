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

//! Parses the site configuration YAML into the typed model.

use crate::domain::model::{Bmc, Cluster, Config, Nic, Node};
use crate::infrastructure::jq;
use crate::shared::error::{EdgeError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Where the site configuration comes from. A string ending in `.yaml`
/// or `.yml` names a file; any other string is the YAML body itself.
#[derive(Debug, Clone)]
pub enum Source {
    File(PathBuf),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        if s.ends_with(".yaml") || s.ends_with(".yml") {
            Source::File(PathBuf::from(s))
        } else {
            Source::Text(s.to_string())
        }
    }
}

impl From<&Path> for Source {
    fn from(p: &Path) -> Self {
        Source::File(p.to_path_buf())
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct NodeYaml {
    bmc_url: Option<String>,
    bmc_user: Option<String>,
    bmc_pass: Option<String>,
    root_disk: Option<String>,
    storage_disk: Option<Vec<String>>,
    nic_int_static: Option<String>,
    mac_int_static: Option<String>,
    nic_ext_dhcp: Option<String>,
    mac_ext_dhcp: Option<String>,
    ignore_ifaces: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ClusterConfigYaml {
    tpm: Option<bool>,
}

pub fn load(source: impl Into<Source>) -> Result<Config> {
    let text = match source.into() {
        Source::File(path) => std::fs::read_to_string(&path).map_err(|e| {
            EdgeError::Config(format!("failed to read '{}': {}", path.display(), e))
        })?,
        Source::Text(text) => text,
        Source::Bytes(bytes) => String::from_utf8(bytes)
            .map_err(|e| EdgeError::Config(format!("configuration is not UTF-8: {}", e)))?,
    };

    let root: Value = serde_yaml::from_str(&text)?;

    let mut config = Config {
        properties: Default::default(),
        clusters: Vec::new(),
    };

    for properties in jq::run(".config", root.clone())? {
        if let Value::Object(map) = properties {
            for (name, value) in map {
                if let Some(value) = scalar_to_string(&value) {
                    config.properties.insert(name, value);
                }
            }
        }
    }

    for entry in jq::run(".edgeclusters[]?", root)? {
        let map = entry
            .as_object()
            .ok_or_else(|| EdgeError::Config("edgecluster entry is not a mapping".to_string()))?;
        for (name, body) in map {
            if config.cluster(name).is_some() {
                return Err(EdgeError::Config(format!(
                    "duplicate cluster name '{}'",
                    name
                )));
            }
            config.clusters.push(load_cluster(name, body)?);
        }
    }

    config.clusters.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(config)
}

fn load_cluster(name: &str, body: &Value) -> Result<Cluster> {
    let mut cluster = Cluster {
        name: name.to_string(),
        ..Default::default()
    };

    let map = body.as_object().ok_or_else(|| {
        EdgeError::Config(format!("cluster '{}' body is not a mapping", name))
    })?;

    for (key, value) in map {
        match key.as_str() {
            // Reserved keys: 'config' holds cluster toggles, 'contrib'
            // holds unmanaged extras and is skipped.
            "config" => {
                let cfg: ClusterConfigYaml = serde_json::from_value(value.clone())?;
                if let Some(tpm) = cfg.tpm {
                    cluster.tpm = tpm;
                }
            }
            "contrib" => {}
            node_name => {
                cluster.nodes.push(load_node(node_name, value)?);
            }
        }
    }

    cluster.nodes.sort_by(|a, b| a.name.cmp(&b.name));
    if cluster
        .nodes
        .iter()
        .zip(cluster.nodes.iter().skip(1))
        .any(|(a, b)| a.name == b.name)
    {
        return Err(EdgeError::Config(format!(
            "cluster '{}' has duplicate node names",
            name
        )));
    }

    Ok(cluster)
}

fn load_node(name: &str, body: &Value) -> Result<Node> {
    let yaml: NodeYaml = serde_json::from_value(body.clone())?;

    let mut node = Node {
        name: name.to_string(),
        kind: Node::kind_from_name(name),
        ..Default::default()
    };

    node.bmc = Bmc {
        url: yaml.bmc_url,
        user: yaml.bmc_user,
        pass: yaml.bmc_pass,
    };
    node.root_disk = yaml.root_disk;
    if let Some(disks) = yaml.storage_disk {
        node.storage_disks = disks;
    }
    node.internal_nic = Nic {
        name: yaml.nic_int_static,
        mac: yaml.mac_int_static.map(|m| m.to_lowercase()),
    };
    node.external_nic = Nic {
        name: yaml.nic_ext_dhcp,
        mac: yaml.mac_ext_dhcp.map(|m| m.to_lowercase()),
    };
    if let Some(ifaces) = yaml.ignore_ifaces {
        node.ignored_nics = ifaces.split_whitespace().map(str::to_string).collect();
    }

    Ok(node)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
