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

use super::cluster::Cluster;
use std::collections::BTreeMap;

// Recognized property names. Unknown keys are preserved verbatim.
pub const PROP_OCP_VERSION: &str = "OC_OCP_VERSION";
pub const PROP_OCP_TAG: &str = "OC_OCP_TAG";
pub const PROP_RHCOS_RELEASE: &str = "OC_RHCOS_RELEASE";
pub const PROP_OCP_MIRROR: &str = "OC_OCP_MIRROR";
pub const PROP_CLUSTER_IMAGE_SET: &str = "clusterimageset";
pub const PROP_REGISTRY: &str = "REGISTRY";
pub const PROP_ODF_VERSION: &str = "ODF_VERSION";

/// Top-level site description: free-form tuning knobs plus the clusters,
/// kept sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub properties: BTreeMap<String, String>,
    pub clusters: Vec<Cluster>,
}

impl Config {
    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.name == name)
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn ocp_version(&self) -> Option<&str> {
        self.property(PROP_OCP_VERSION)
    }

    pub fn ocp_tag(&self) -> Option<&str> {
        self.property(PROP_OCP_TAG)
    }
}
