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

//! Fills missing fields of the site model by probing the hub cluster.
//! Re-running on a fully populated model is a no-op; optional hub
//! objects that are absent are tolerated, required ones surface as
//! enrichment failures.

use crate::domain::model::config::{
    PROP_CLUSTER_IMAGE_SET, PROP_OCP_MIRROR, PROP_OCP_TAG, PROP_OCP_VERSION, PROP_ODF_VERSION,
    PROP_REGISTRY, PROP_RHCOS_RELEASE,
};
use crate::domain::model::{Cluster, ClusterNetwork, Config, Ip, NodeKind, SshKeyPair};
use crate::infrastructure::jq;
use crate::infrastructure::kubernetes::{gvks, EdgeKubeClient};
use crate::infrastructure::registry::RegistryTool;
use crate::shared::error::{EdgeError, Result};
use backon::{ExponentialBuilder, Retryable};
use base64::Engine as _;
use kube::core::DynamicObject;
use serde_json::json;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::debug;

const DEFAULT_OCP_MIRROR: &str = "https://mirror.openshift.com/pub/openshift-v4/clients/ocp";
const REGISTRY_NAMESPACE: &str = "edge-registry";
const REGISTRY_CONFIGMAP: &str = "edge-config";

const DEFAULT_CLUSTER_NETWORK: &str = "10.128.0.0/14";
const DEFAULT_CLUSTER_HOST_PREFIX: u8 = 23;
const DEFAULT_MACHINE_NETWORK: &str = "192.168.7.0/24";
const DEFAULT_SERVICE_NETWORK: &str = "172.30.0.0/16";

// Host offsets inside the machine network.
const API_HOST_OFFSET: u32 = 243;
const INGRESS_HOST_OFFSET: u32 = 242;
const NODE_HOST_OFFSET: u32 = 10;

pub struct Enricher {
    client: Arc<dyn EdgeKubeClient>,
    http: reqwest::Client,
}

impl Enricher {
    pub fn new(client: Arc<dyn EdgeKubeClient>) -> Self {
        Self {
            client,
            http: reqwest::Client::new(),
        }
    }

    pub async fn enrich(&self, config: &mut Config) -> Result<()> {
        self.set_ocp_tag(config);
        self.set_image_set_property(config);
        set_odf_version(config);
        self.set_registry_property(config).await?;
        self.set_rhcos_release(config).await;

        let properties = config.properties.clone();
        for cluster in &mut config.clusters {
            self.enrich_cluster(&properties, cluster).await?;
        }
        Ok(())
    }

    async fn enrich_cluster(
        &self,
        properties: &BTreeMap<String, String>,
        cluster: &mut Cluster,
    ) -> Result<()> {
        cluster.sno = cluster.is_single_node();
        self.set_pull_secret(cluster).await?;
        self.set_ssh_keys(cluster).await?;
        self.set_dns_domain(cluster).await?;
        set_default_networks(cluster);
        set_internal_ips(cluster)?;
        self.set_external_node_ips(cluster).await?;
        self.set_kubeconfig(cluster).await?;
        set_image_set(properties, cluster)?;
        self.set_registry(properties, cluster).await?;
        set_hostnames(cluster);
        self.set_external_endpoints(cluster).await;
        Ok(())
    }

    fn set_ocp_tag(&self, config: &mut Config) {
        if config.properties.contains_key(PROP_OCP_TAG) {
            return;
        }
        if let Some(version) = config.property(PROP_OCP_VERSION) {
            let tag = format!("{}-x86_64", version);
            config.properties.insert(PROP_OCP_TAG.to_string(), tag);
        }
    }

    fn set_image_set_property(&self, config: &mut Config) {
        if config.properties.contains_key(PROP_CLUSTER_IMAGE_SET) {
            return;
        }
        if let Some(version) = config.property(PROP_OCP_VERSION) {
            let image_set = format!("openshift-v{}", version);
            config
                .properties
                .insert(PROP_CLUSTER_IMAGE_SET.to_string(), image_set);
        }
    }

    /// The hub-local registry advertises itself through a configmap
    /// with a base64 encoded URI.
    async fn set_registry_property(&self, config: &mut Config) -> Result<()> {
        if config.properties.contains_key(PROP_REGISTRY) {
            return Ok(());
        }
        let configmap = match self
            .client
            .get(
                &gvks::config_map(),
                Some(REGISTRY_NAMESPACE),
                REGISTRY_CONFIGMAP,
            )
            .await
        {
            Ok(configmap) => configmap,
            Err(EdgeError::NotFound { .. }) => {
                debug!("no hub registry configmap, skipping registry discovery");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if let Some(encoded) = configmap.data["data"]["uri"].as_str() {
            let uri = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| EdgeError::Decode(format!("registry URI: {}", e)))?;
            let uri = String::from_utf8(uri)
                .map_err(|e| EdgeError::Decode(format!("registry URI: {}", e)))?;
            config.properties.insert(PROP_REGISTRY.to_string(), uri);
        }
        Ok(())
    }

    /// Extracts the RHCOS release matching the configured OpenShift
    /// version from the mirror's release notes. Only the mirror command
    /// needs this, so download failures are tolerated here and caught
    /// by its precondition check.
    async fn set_rhcos_release(&self, config: &mut Config) {
        if config.properties.contains_key(PROP_RHCOS_RELEASE) {
            return;
        }
        let version = match config.property(PROP_OCP_VERSION) {
            Some(version) => version.to_string(),
            None => return,
        };
        let mirror = config
            .property(PROP_OCP_MIRROR)
            .unwrap_or(DEFAULT_OCP_MIRROR)
            .trim_end_matches('/')
            .to_string();
        let url = format!("{}/{}/release.txt", mirror, version);

        let fetch = || async {
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| EdgeError::Transport(e.to_string()))?;
            response
                .text()
                .await
                .map_err(|e| EdgeError::Transport(e.to_string()))
        };
        let text = match fetch
            .retry(&ExponentialBuilder::default().with_max_times(3))
            .await
        {
            Ok(text) => text,
            Err(e) => {
                debug!(url = %url, error = %e, "cannot download release notes");
                return;
            }
        };

        if let Some(capture) = rhcos_release_re()
            .captures(&text)
            .and_then(|c| c.get(1))
        {
            config.properties.insert(
                PROP_RHCOS_RELEASE.to_string(),
                capture.as_str().trim().to_string(),
            );
        } else {
            debug!(url = %url, "release notes carry no machine-os line");
        }
    }

    async fn set_pull_secret(&self, cluster: &mut Cluster) -> Result<()> {
        if cluster.pull_secret.is_some() {
            return Ok(());
        }
        let secret = self
            .client
            .get(&gvks::secret(), Some("openshift-config"), "pull-secret")
            .await
            .map_err(|e| match e {
                EdgeError::NotFound { .. } => {
                    EdgeError::Enrichment("hub has no pull secret".to_string())
                }
                other => other,
            })?;
        cluster.pull_secret = secret_value(&secret, ".dockerconfigjson")?;
        if cluster.pull_secret.is_none() {
            return Err(EdgeError::Enrichment(
                "hub pull secret has no .dockerconfigjson".to_string(),
            ));
        }
        Ok(())
    }

    /// Loads the cluster key pair from the hub, or generates a fresh
    /// RSA pair and stores it there so re-runs see the same keys.
    async fn set_ssh_keys(&self, cluster: &mut Cluster) -> Result<()> {
        if cluster.ssh_key.is_some() {
            return Ok(());
        }
        let secret_name = format!("{}-keypair", cluster.name);
        match self
            .client
            .get(&gvks::secret(), Some(&cluster.name), &secret_name)
            .await
        {
            Ok(secret) => {
                let private = secret_value(&secret, "id_rsa.key")?;
                let public = secret_value(&secret, "id_rsa.pub")?;
                if let (Some(private), Some(public)) = (private, public) {
                    cluster.ssh_key = Some(SshKeyPair {
                        private_key: String::from_utf8(private)
                            .map_err(|e| EdgeError::Decode(e.to_string()))?,
                        public_key: String::from_utf8(public)
                            .map_err(|e| EdgeError::Decode(e.to_string()))?,
                    });
                    return Ok(());
                }
            }
            Err(EdgeError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let pair = tokio::task::spawn_blocking(generate_key_pair)
            .await
            .map_err(|e| EdgeError::Enrichment(e.to_string()))??;
        self.store_key_pair(cluster, &pair, &secret_name).await?;
        cluster.ssh_key = Some(pair);
        Ok(())
    }

    async fn store_key_pair(
        &self,
        cluster: &Cluster,
        pair: &SshKeyPair,
        secret_name: &str,
    ) -> Result<()> {
        let b64 = |s: &str| base64::engine::general_purpose::STANDARD.encode(s.as_bytes());
        let secret: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": secret_name,
                "namespace": cluster.name,
            },
            "data": {
                "id_rsa.key": b64(&pair.private_key),
                "id_rsa.pub": b64(&pair.public_key),
            },
        }))?;
        match self.client.create(&secret).await {
            Ok(_) | Err(EdgeError::AlreadyExists { .. }) => Ok(()),
            Err(EdgeError::NotFound { .. }) => {
                // The cluster namespace does not exist yet; the keys are
                // persisted when the cluster objects are applied.
                debug!(cluster = %cluster.name, "cannot store key pair yet");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// The base DNS domain is the hub ingress domain with the first two
    /// labels removed.
    async fn set_dns_domain(&self, cluster: &mut Cluster) -> Result<()> {
        if cluster.dns.domain.is_some() {
            return Ok(());
        }
        let controller = self
            .client
            .get(
                &gvks::ingress_controller(),
                Some("openshift-ingress-operator"),
                "default",
            )
            .await
            .map_err(|e| match e {
                EdgeError::NotFound { .. } => {
                    EdgeError::Enrichment("hub has no default ingress controller".to_string())
                }
                other => other,
            })?;
        let domain: Option<String> = jq::query(".status.domain?", &controller)?;
        let domain = domain
            .filter(|d| !d.is_empty())
            .ok_or_else(|| EdgeError::Enrichment("ingress controller has no domain".to_string()))?;

        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() < 3 {
            return Err(EdgeError::Enrichment(format!(
                "ingress domain '{}' has fewer than three labels",
                domain
            )));
        }
        cluster.dns.domain = Some(labels[2..].join("."));
        Ok(())
    }

    /// External node addresses come from the agent inventories, keyed
    /// by the MAC of the externally connected interface.
    async fn set_external_node_ips(&self, cluster: &mut Cluster) -> Result<()> {
        if cluster
            .nodes
            .iter()
            .all(|n| n.external_ip.is_some() || n.external_nic.mac.is_none())
        {
            return Ok(());
        }
        let agents = match self.client.list(&gvks::agent(), Some(&cluster.name)).await {
            Ok(agents) => agents,
            Err(EdgeError::NotFound { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut by_mac: BTreeMap<String, Ip> = BTreeMap::new();
        for agent in &agents {
            let interfaces: Vec<serde_json::Value> =
                jq::query(".status.inventory.interfaces[]?", agent)?;
            for interface in interfaces {
                let mac = interface["macAddress"].as_str().map(str::to_lowercase);
                let address = interface["ipV4Addresses"][0].as_str();
                if let (Some(mac), Some(address)) = (mac, address) {
                    if let Ok(ip) = address.parse::<Ip>() {
                        by_mac.insert(mac, ip);
                    }
                }
            }
        }

        for node in &mut cluster.nodes {
            if node.external_ip.is_some() {
                continue;
            }
            if let Some(mac) = &node.external_nic.mac {
                if let Some(ip) = by_mac.get(&mac.to_lowercase()) {
                    node.external_ip = Some(*ip);
                }
            }
        }
        Ok(())
    }

    async fn set_kubeconfig(&self, cluster: &mut Cluster) -> Result<()> {
        if cluster.kubeconfig.is_some() {
            return Ok(());
        }
        let secret_name = format!("{}-admin-kubeconfig", cluster.name);
        match self
            .client
            .get(&gvks::secret(), Some(&cluster.name), &secret_name)
            .await
        {
            Ok(secret) => {
                cluster.kubeconfig = secret_value(&secret, "kubeconfig")?;
                Ok(())
            }
            // The secret only appears once the installation makes
            // progress.
            Err(EdgeError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn set_registry(
        &self,
        properties: &BTreeMap<String, String>,
        cluster: &mut Cluster,
    ) -> Result<()> {
        if cluster.registry.url.is_none() {
            match properties.get(PROP_REGISTRY) {
                Some(url) => cluster.registry.url = Some(url.clone()),
                None => return Ok(()),
            }
        }
        if cluster.registry.ca.is_none() {
            if let Some(url) = cluster.registry.url.clone() {
                let tool = RegistryTool::new(self.client.clone());
                cluster.registry.ca = Some(tool.fetch_ca(&url).await?);
            }
        }
        Ok(())
    }

    /// Resolves the published API and ingress names once the cluster
    /// DNS is delegated. Resolution failures are expected early in the
    /// installation and are ignored.
    async fn set_external_endpoints(&self, cluster: &mut Cluster) {
        let domain = match &cluster.dns.domain {
            Some(domain) => domain.clone(),
            None => return,
        };
        if cluster.api.external_ip.is_none() {
            let host = format!("api.{}.{}", cluster.name, domain);
            cluster.api.external_ip = resolve(&host).await;
        }
        if cluster.ingress.external_ip.is_none() {
            let host = format!("apps.{}.{}", cluster.name, domain);
            cluster.ingress.external_ip = resolve(&host).await;
        }
    }
}

fn set_default_networks(cluster: &mut Cluster) {
    if cluster.cluster_networks.is_empty() {
        cluster.cluster_networks.push(ClusterNetwork {
            cidr: DEFAULT_CLUSTER_NETWORK.parse().unwrap_or(Ip {
                address: IpAddr::V4(Ipv4Addr::new(10, 128, 0, 0)),
                prefix: 14,
            }),
            host_prefix: DEFAULT_CLUSTER_HOST_PREFIX,
        });
    }
    if cluster.machine_networks.is_empty() {
        if let Ok(network) = DEFAULT_MACHINE_NETWORK.parse() {
            cluster.machine_networks.push(network);
        }
    }
    if cluster.service_networks.is_empty() {
        if let Ok(network) = DEFAULT_SERVICE_NETWORK.parse() {
            cluster.service_networks.push(network);
        }
    }
}

/// The ODF operator channel tracks the OpenShift minor release.
fn set_odf_version(config: &mut Config) {
    if config.properties.contains_key(PROP_ODF_VERSION) {
        return;
    }
    let version = match config.property(PROP_OCP_VERSION) {
        Some(version) => version,
        None => return,
    };
    let mut labels = version.split('.');
    if let (Some(major), Some(minor)) = (labels.next(), labels.next()) {
        config
            .properties
            .insert(PROP_ODF_VERSION.to_string(), format!("{}.{}", major, minor));
    }
}

fn set_internal_ips(cluster: &mut Cluster) -> Result<()> {
    let machine_network = match cluster.machine_networks.first() {
        Some(network) => *network,
        None => return Ok(()),
    };
    if cluster.api.internal_ip.is_none() {
        cluster.api.internal_ip = Some(host_in(&machine_network, API_HOST_OFFSET)?);
    }
    if cluster.ingress.internal_ip.is_none() {
        cluster.ingress.internal_ip = Some(host_in(&machine_network, INGRESS_HOST_OFFSET)?);
    }
    for (index, node) in cluster.nodes.iter_mut().enumerate() {
        if node.internal_ip.is_none() {
            node.internal_ip = Some(Ip {
                address: host_in(&machine_network, NODE_HOST_OFFSET + index as u32)?,
                prefix: machine_network.prefix,
            });
        }
    }
    Ok(())
}

fn set_image_set(properties: &BTreeMap<String, String>, cluster: &mut Cluster) -> Result<()> {
    if cluster.image_set.is_some() {
        return Ok(());
    }
    match properties.get(PROP_CLUSTER_IMAGE_SET) {
        Some(image_set) => {
            cluster.image_set = Some(image_set.clone());
            Ok(())
        }
        None => Err(EdgeError::Enrichment(format!(
            "cluster '{}' has no image set and no '{}' or '{}' property is set",
            cluster.name, PROP_CLUSTER_IMAGE_SET, PROP_OCP_VERSION
        ))),
    }
}

fn set_hostnames(cluster: &mut Cluster) {
    let cluster_name = cluster.name.clone();
    for node in &mut cluster.nodes {
        if node.hostname.is_some() {
            continue;
        }
        let role = match node.kind {
            Some(NodeKind::ControlPlane) => "master",
            Some(NodeKind::Worker) => "worker",
            None => continue,
        };
        if let Some(index) = node.index() {
            node.hostname = Some(format!("edge-{}-{}-{}", cluster_name, role, index));
        }
    }
}

fn host_in(network: &Ip, offset: u32) -> Result<IpAddr> {
    match network.address {
        IpAddr::V4(v4) => {
            let base = u32::from(v4);
            Ok(IpAddr::V4(Ipv4Addr::from(base + offset)))
        }
        IpAddr::V6(_) => Err(EdgeError::Enrichment(
            "IPv6 machine networks are not supported".to_string(),
        )),
    }
}

fn secret_value(secret: &DynamicObject, key: &str) -> Result<Option<Vec<u8>>> {
    match secret.data["data"][key].as_str() {
        Some(encoded) => Ok(Some(
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| EdgeError::Decode(format!("secret key '{}': {}", key, e)))?,
        )),
        None => Ok(None),
    }
}

fn generate_key_pair() -> Result<SshKeyPair> {
    use ssh_key::private::{KeypairData, RsaKeypair};
    use ssh_key::{LineEnding, PrivateKey};

    let mut rng = ssh_key::rand_core::OsRng;
    let rsa = RsaKeypair::random(&mut rng, 4096)
        .map_err(|e| EdgeError::Enrichment(format!("cannot generate RSA key pair: {}", e)))?;
    let private = PrivateKey::new(KeypairData::Rsa(rsa), "")
        .map_err(|e| EdgeError::Enrichment(e.to_string()))?;
    let private_pem = private
        .to_openssh(LineEnding::LF)
        .map_err(|e| EdgeError::Enrichment(e.to_string()))?
        .to_string();
    let public = private
        .public_key()
        .to_openssh()
        .map_err(|e| EdgeError::Enrichment(e.to_string()))?;
    Ok(SshKeyPair {
        private_key: private_pem,
        public_key: public,
    })
}

async fn resolve(host: &str) -> Option<IpAddr> {
    match tokio::net::lookup_host((host, 443)).await {
        Ok(mut addresses) => addresses.next().map(|a| a.ip()),
        Err(e) => {
            debug!(host = %host, error = %e, "name does not resolve yet");
            None
        }
    }
}

fn rhcos_release_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(?m)^\s*machine-os\s+(.*)\s+Red\s+Hat\s+Enterprise\s+Linux\s+CoreOS\s*$")
            .unwrap()
    })
}
