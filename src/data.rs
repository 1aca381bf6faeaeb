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

//! Manifest templates compiled into the binary. The map key is the
//! template name; applies select by directory prefix, so file names
//! double as apply order.

use std::collections::BTreeMap;

macro_rules! template {
    ($map:ident, $name:literal) => {
        $map.insert(
            $name.to_string(),
            include_str!(concat!("../data/", $name)).to_string(),
        );
    };
}

pub fn templates() -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    template!(map, "cluster/objects/00-namespace.yaml");
    template!(map, "cluster/objects/01-pull-secret.yaml");
    template!(map, "cluster/objects/02-cluster-deployment.yaml");
    template!(map, "cluster/objects/03-agent-cluster-install.yaml");
    template!(map, "cluster/objects/04-nmstate-configs.yaml");
    template!(map, "cluster/objects/05-infraenv.yaml");
    template!(map, "cluster/objects/06-bmc-secrets.yaml");
    template!(map, "cluster/objects/07-bare-metal-hosts.yaml");
    template!(map, "registry/objects/00-namespace.yaml");
    template!(map, "registry/objects/01-config.yaml");
    template!(map, "registry/objects/02-quay-registry.yaml");
    template!(map, "metallb/objects/00-namespace.yaml");
    template!(map, "metallb/objects/01-metallb.yaml");
    template!(map, "metallb/objects/02-address-pools.yaml");
    template!(map, "lso/objects/00-namespace.yaml");
    template!(map, "lso/objects/01-local-volume.yaml");
    template!(map, "odf/objects/00-storage-cluster.yaml");
    template!(map, "ui/objects/00-namespace.yaml");
    template!(map, "ui/objects/01-deployment.yaml");
    template!(map, "ui/objects/02-service.yaml");
    template!(map, "icsp/objects/00-mirror-policy.yaml");
    template!(map, "mirror/oc-mirror-config.yaml");
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_non_empty() {
        let map = templates();
        assert!(map.len() >= 20);
        for (name, body) in &map {
            assert!(!body.is_empty(), "template '{}' is empty", name);
        }
    }
}
