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

use super::ip::Ip;
use super::node::Node;
use std::net::IpAddr;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiEndpoints {
    pub internal_ip: Option<IpAddr>,
    pub external_ip: Option<IpAddr>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ingress {
    pub internal_ip: Option<IpAddr>,
    pub external_ip: Option<IpAddr>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dns {
    pub domain: Option<String>,
}

/// PEM encoded private key together with OpenSSH public key material.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshKeyPair {
    pub private_key: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    pub url: Option<String>,
    pub ca: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterNetwork {
    pub cidr: Ip,
    pub host_prefix: u8,
}

/// One edge cluster of the site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cluster {
    pub name: String,
    pub sno: bool,
    pub tpm: bool,
    pub api: ApiEndpoints,
    pub ingress: Ingress,
    pub dns: Dns,
    pub image_set: Option<String>,
    pub pull_secret: Option<Vec<u8>>,
    pub ssh_key: Option<SshKeyPair>,
    pub kubeconfig: Option<Vec<u8>>,
    pub registry: Registry,
    pub cluster_networks: Vec<ClusterNetwork>,
    pub machine_networks: Vec<Ip>,
    pub service_networks: Vec<Ip>,
    pub nodes: Vec<Node>,
}

impl Cluster {
    pub fn control_plane_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_control_plane())
    }

    pub fn worker_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_worker())
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// SNO means exactly one control-plane node and no workers.
    pub fn is_single_node(&self) -> bool {
        self.control_plane_nodes().count() == 1 && self.worker_nodes().count() == 0
    }
}
