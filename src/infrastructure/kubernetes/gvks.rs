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

//! Group/version/kind tags for the object kinds the tool touches.

use kube::core::GroupVersionKind;

pub fn namespace() -> GroupVersionKind {
    GroupVersionKind::gvk("", "v1", "Namespace")
}

pub fn secret() -> GroupVersionKind {
    GroupVersionKind::gvk("", "v1", "Secret")
}

pub fn config_map() -> GroupVersionKind {
    GroupVersionKind::gvk("", "v1", "ConfigMap")
}

pub fn crd() -> GroupVersionKind {
    GroupVersionKind::gvk(
        "apiextensions.k8s.io",
        "v1",
        "CustomResourceDefinition",
    )
}

pub fn ingress_controller() -> GroupVersionKind {
    GroupVersionKind::gvk("operator.openshift.io", "v1", "IngressController")
}

pub fn image_config() -> GroupVersionKind {
    GroupVersionKind::gvk("config.openshift.io", "v1", "Image")
}

pub fn agent() -> GroupVersionKind {
    GroupVersionKind::gvk("agent-install.openshift.io", "v1beta1", "Agent")
}

pub fn bare_metal_host() -> GroupVersionKind {
    GroupVersionKind::gvk("metal3.io", "v1alpha1", "BareMetalHost")
}

pub fn agent_cluster_install() -> GroupVersionKind {
    GroupVersionKind::gvk("extensions.hive.openshift.io", "v1beta1", "AgentClusterInstall")
}

pub fn deployment() -> GroupVersionKind {
    GroupVersionKind::gvk("apps", "v1", "Deployment")
}

pub fn backing_store() -> GroupVersionKind {
    GroupVersionKind::gvk("noobaa.io", "v1alpha1", "BackingStore")
}
