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

//! Renders the bundled manifest templates against a fully enriched
//! site model and checks the decoded objects.

use edge_kube::data;
use edge_kube::domain::model::{
    cluster::{ApiEndpoints, ClusterNetwork, Ingress, Registry, SshKeyPair},
    Cluster, Config, Ip, Node,
};
use edge_kube::domain::tasks::template_data;
use edge_kube::infrastructure::templating::Engine;
use kube::core::DynamicObject;
use serde::Deserialize;
use serde_json::Value;

fn node(name: &str, internal_ip: &str) -> Node {
    Node {
        name: name.to_string(),
        kind: Node::kind_from_name(name),
        hostname: Some(format!("edge-edge0-host-{}", name)),
        bmc: edge_kube::domain::model::Bmc {
            url: Some(format!("redfish://bmc/{}", name)),
            user: Some("admin".to_string()),
            pass: Some("secret".to_string()),
        },
        root_disk: Some("/dev/sda".to_string()),
        storage_disks: vec!["/dev/sdb".to_string()],
        internal_nic: edge_kube::domain::model::Nic {
            name: Some("eno1".to_string()),
            mac: Some("aa:bb:cc:dd:ee:01".to_string()),
        },
        internal_ip: Some(internal_ip.parse().unwrap()),
        external_nic: edge_kube::domain::model::Nic {
            name: Some("eno2".to_string()),
            mac: Some("aa:bb:cc:dd:ee:02".to_string()),
        },
        external_ip: None,
        ignored_nics: vec!["eno3".to_string()],
    }
}

fn site() -> (Config, Cluster) {
    let cluster = Cluster {
        name: "edge0".to_string(),
        sno: false,
        tpm: false,
        api: ApiEndpoints {
            internal_ip: Some("192.168.7.243".parse().unwrap()),
            external_ip: None,
        },
        ingress: Ingress {
            internal_ip: Some("192.168.7.242".parse().unwrap()),
            external_ip: None,
        },
        dns: edge_kube::domain::model::cluster::Dns {
            domain: Some("example.com".to_string()),
        },
        image_set: Some("openshift-v4.16.0".to_string()),
        pull_secret: Some(br#"{"auths":{}}"#.to_vec()),
        ssh_key: Some(SshKeyPair {
            private_key: "PRIVATE".to_string(),
            public_key: "ssh-rsa AAAA test".to_string(),
        }),
        kubeconfig: None,
        registry: Registry {
            url: Some("registry.example.com:8443".to_string()),
            ca: Some(b"-----BEGIN CERTIFICATE-----".to_vec()),
        },
        cluster_networks: vec![ClusterNetwork {
            cidr: "10.128.0.0/14".parse().unwrap(),
            host_prefix: 23,
        }],
        machine_networks: vec!["192.168.7.0/24".parse::<Ip>().unwrap()],
        service_networks: vec!["172.30.0.0/16".parse::<Ip>().unwrap()],
        nodes: vec![
            node("master0", "192.168.7.10/24"),
            node("master1", "192.168.7.11/24"),
            node("master2", "192.168.7.12/24"),
            node("worker3", "192.168.7.13/24"),
        ],
    };
    let mut config = Config::default();
    config
        .properties
        .insert("REGISTRY".to_string(), "registry.example.com:8443".to_string());
    config
        .properties
        .insert("OC_OCP_VERSION".to_string(), "4.16.0".to_string());
    // The tag shape the enricher derives when none is configured.
    config
        .properties
        .insert("OC_OCP_TAG".to_string(), "4.16.0-x86_64".to_string());
    config
        .properties
        .insert("ODF_VERSION".to_string(), "4.16".to_string());
    config.clusters.push(cluster.clone());
    (config, cluster)
}

fn render(dir: &str, data: &Value) -> Vec<DynamicObject> {
    let engine = Engine::new(data::templates()).unwrap();
    let mut objects = Vec::new();
    for name in engine.names_under(&format!("{}/objects", dir)) {
        let text = engine.execute(name, data).unwrap();
        for document in serde_yaml::Deserializer::from_str(&text) {
            let value = Value::deserialize(document).unwrap();
            if value.is_null() {
                continue;
            }
            objects.push(serde_json::from_value(value).unwrap());
        }
    }
    objects
}

fn kinds(objects: &[DynamicObject]) -> Vec<String> {
    objects
        .iter()
        .map(|o| o.types.as_ref().unwrap().kind.clone())
        .collect()
}

#[test]
fn test_cluster_manifests() {
    let (config, cluster) = site();
    let objects = render("cluster", &template_data(&config, &cluster));
    assert_eq!(
        kinds(&objects),
        vec![
            "Namespace",
            "Secret",
            "ClusterDeployment",
            "AgentClusterInstall",
            "NMStateConfig",
            "NMStateConfig",
            "NMStateConfig",
            "NMStateConfig",
            "InfraEnv",
            "Secret",
            "Secret",
            "Secret",
            "Secret",
            "BareMetalHost",
            "BareMetalHost",
            "BareMetalHost",
            "BareMetalHost",
        ]
    );

    let install = &objects[3];
    assert_eq!(install.data["spec"]["apiVIP"], "192.168.7.243");
    assert_eq!(
        install.data["spec"]["provisionRequirements"]["controlPlaneAgents"],
        3
    );
    assert_eq!(
        install.data["spec"]["provisionRequirements"]["workerAgents"],
        1
    );
    assert_eq!(
        install.data["spec"]["networking"]["clusterNetwork"][0]["cidr"],
        "10.128.0.0/14"
    );

    let nmstate = &objects[4];
    let address = &nmstate.data["spec"]["config"]["interfaces"][0]["ipv4"]["address"][0];
    assert_eq!(address["ip"], "192.168.7.10");
    assert_eq!(address["prefix-length"], 24);

    let host = &objects[13];
    assert_eq!(host.metadata.name.as_deref(), Some("master0"));
    assert_eq!(host.data["spec"]["bootMACAddress"], "aa:bb:cc:dd:ee:01");
    assert_eq!(
        host.metadata.annotations.as_ref().unwrap()["bmac.agent-install.openshift.io/role"],
        "master"
    );
}

#[test]
fn test_single_node_install_has_no_vips() {
    let (config, mut cluster) = site();
    cluster.nodes.truncate(1);
    cluster.sno = true;
    let objects = render("cluster", &template_data(&config, &cluster));
    let install = &objects[3];
    assert!(install.data["spec"].get("apiVIP").is_none());
    assert_eq!(
        install.data["spec"]["provisionRequirements"]["controlPlaneAgents"],
        1
    );
}

#[test]
fn test_metallb_manifests() {
    let (config, cluster) = site();
    let objects = render("metallb", &template_data(&config, &cluster));
    assert_eq!(
        kinds(&objects),
        vec![
            "Namespace",
            "MetalLB",
            "IPAddressPool",
            "IPAddressPool",
            "L2Advertisement",
        ]
    );
    assert_eq!(
        objects[2].data["spec"]["addresses"][0],
        "192.168.7.243/32"
    );
}

#[test]
fn test_lso_wipe_flag() {
    let (config, cluster) = site();
    let mut data = template_data(&config, &cluster);
    data["wipe"] = Value::Bool(true);
    let objects = render("lso", &data);
    let volume = &objects[1];
    assert_eq!(
        volume.data["spec"]["forceWipeDevicesAndDestroyAllData"],
        true
    );
    let devices = &volume.data["spec"]["storageClassDevices"][0]["devicePaths"];
    assert_eq!(devices.as_array().unwrap().len(), 4);
}

#[test]
fn test_mirror_config() {
    let (config, cluster) = site();
    let engine = Engine::new(data::templates()).unwrap();
    let text = engine
        .execute("mirror/oc-mirror-config.yaml", &template_data(&config, &cluster))
        .unwrap();
    let value: Value = serde_yaml::from_str(&text).unwrap();
    assert_eq!(value["kind"], "ImageSetConfiguration");
    assert_eq!(
        value["storageConfig"]["registry"]["imageURL"],
        "registry.example.com:8443/mirror/oc-mirror-metadata"
    );
    // Channel and catalog names track the major.minor release, not the
    // architecture-qualified tag.
    assert_eq!(
        value["mirror"]["platform"]["channels"][0]["name"],
        "stable-4.16"
    );
    assert_eq!(
        value["mirror"]["platform"]["channels"][0]["minVersion"],
        "4.16.0"
    );
    assert_eq!(
        value["mirror"]["operators"][0]["catalog"],
        "registry.redhat.io/redhat/redhat-operator-index:v4.16"
    );
    let packages = value["mirror"]["operators"][0]["packages"].as_array().unwrap();
    assert_eq!(packages[3]["name"], "odf-operator");
    assert_eq!(packages[3]["channels"][0]["name"], "stable-4.16");
}

#[test]
fn test_registry_manifests() {
    let (config, cluster) = site();
    let objects = render("registry", &template_data(&config, &cluster));
    assert_eq!(kinds(&objects), vec!["Namespace", "ConfigMap", "QuayRegistry"]);
    // The registry URI is stored base64 encoded.
    assert_eq!(
        objects[1].data["data"]["uri"],
        "cmVnaXN0cnkuZXhhbXBsZS5jb206ODQ0Mw=="
    );
}
