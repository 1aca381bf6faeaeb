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

use super::gvks;
use super::tunnel::{SshSpec, SshTunnel};
use crate::shared::error::{EdgeError, Result};
use futures::StreamExt;
use kube::api::{DeleteParams, ListParams, PostParams, WatchEvent, WatchParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// How to build the client: credentials from a kubeconfig file, from
/// raw kubeconfig bytes, or from the default resolution; optionally a
/// tunnel through a cluster node.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub kubeconfig: Option<PathBuf>,
    pub kubeconfig_bytes: Option<Vec<u8>>,
    pub context: Option<String>,
    pub ssh: Option<SshSpec>,
}

#[derive(Debug, Clone)]
pub enum ObjectEvent {
    Added(DynamicObject),
    Modified(DynamicObject),
    Deleted(DynamicObject),
}

impl ObjectEvent {
    pub fn object(&self) -> &DynamicObject {
        match self {
            ObjectEvent::Added(o) | ObjectEvent::Modified(o) | ObjectEvent::Deleted(o) => o,
        }
    }
}

#[async_trait::async_trait]
pub trait EventSource: Send {
    async fn next(&mut self) -> Option<Result<ObjectEvent>>;
}

/// A stream of watch events. Callers drop or `stop` it when done to
/// release the underlying watch.
pub struct WatchStream {
    source: Box<dyn EventSource>,
}

impl WatchStream {
    pub fn new(source: Box<dyn EventSource>) -> Self {
        Self { source }
    }

    pub async fn next(&mut self) -> Option<Result<ObjectEvent>> {
        self.source.next().await
    }

    pub fn stop(self) {}
}

#[async_trait::async_trait]
pub trait EdgeKubeClient: Send + Sync {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject>;

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>>;

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject>;

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject>;

    async fn patch_merge(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject>;

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()>;

    async fn watch(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<WatchStream>;

    async fn close(&self) -> Result<()>;

    async fn add_labels(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let patch = json!({"metadata": {"labels": labels}});
        self.patch_merge(gvk, namespace, name, &patch).await?;
        Ok(())
    }

    async fn add_annotation(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let patch = json!({"metadata": {"annotations": {key: value}}});
        self.patch_merge(gvk, namespace, name, &patch).await?;
        Ok(())
    }

    /// Deletes every CustomResourceDefinition whose API group equals
    /// `group` and returns how many were actually deleted.
    async fn delete_crd_group(&self, group: &str) -> Result<usize> {
        let crd_gvk = gvks::crd();
        let mut deleted = 0;
        for crd in self.list(&crd_gvk, None).await? {
            if crd.data["spec"]["group"].as_str() != Some(group) {
                continue;
            }
            let name = match &crd.metadata.name {
                Some(name) => name.clone(),
                None => continue,
            };
            match self.delete(&crd_gvk, None, &name).await {
                Ok(()) | Err(EdgeError::NotFound { .. }) => deleted += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }
}

/// Extracts the group/version/kind tag carried by a rendered object.
pub fn gvk_of(obj: &DynamicObject) -> Result<GroupVersionKind> {
    let types = obj
        .types
        .as_ref()
        .ok_or_else(|| EdgeError::Decode("object carries no apiVersion/kind".to_string()))?;
    let gv: kube::core::GroupVersion = types
        .api_version
        .parse()
        .map_err(|e| EdgeError::Decode(format!("bad apiVersion: {}", e)))?;
    Ok(GroupVersionKind::gvk(&gv.group, &gv.version, &types.kind))
}

pub struct EdgeKubeClientImpl {
    client: Client,
    tunnel: Option<SshTunnel>,
}

impl EdgeKubeClientImpl {
    pub async fn new(options: ClientOptions) -> Result<Self> {
        let mut config = Self::rest_config(&options).await?;

        let tunnel = match &options.ssh {
            Some(ssh) => {
                let host = config
                    .cluster_url
                    .host()
                    .ok_or_else(|| {
                        EdgeError::Transport("kubeconfig server URL has no host".to_string())
                    })?
                    .to_string();
                let port = config.cluster_url.port_u16().unwrap_or(443);
                let tunnel = SshTunnel::open(ssh, &host, port).await?;

                // The transport now dials the loopback forwarder, but the
                // certificate still carries the API server's name.
                if config.tls_server_name.is_none() {
                    config.tls_server_name = Some(host);
                }
                config.cluster_url = format!("https://{}", tunnel.local_addr())
                    .parse()
                    .map_err(|e| EdgeError::Transport(format!("invalid tunnel URL: {}", e)))?;
                Some(tunnel)
            }
            None => None,
        };

        let client = Client::try_from(config)
            .map_err(|e| EdgeError::Transport(format!("failed to create client: {}", e)))?;

        Ok(Self { client, tunnel })
    }

    async fn rest_config(options: &ClientOptions) -> Result<kube::Config> {
        use kube::config::{KubeConfigOptions, Kubeconfig};

        let kubeconfig = if let Some(bytes) = &options.kubeconfig_bytes {
            serde_yaml::from_slice::<Kubeconfig>(bytes)?
        } else if let Some(path) = &options.kubeconfig {
            Kubeconfig::read_from(path)
                .map_err(|e| EdgeError::Config(format!("failed to load kubeconfig: {}", e)))?
        } else {
            Kubeconfig::read()
                .map_err(|e| EdgeError::Config(format!("failed to load kubeconfig: {}", e)))?
        };

        let config_options = KubeConfigOptions {
            context: options.context.clone(),
            cluster: None,
            user: None,
        };

        kube::Config::from_custom_kubeconfig(kubeconfig, &config_options)
            .await
            .map_err(|e| EdgeError::Config(format!("failed to build client config: {}", e)))
    }

    fn api_for(&self, gvk: &GroupVersionKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(gvk);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

#[async_trait::async_trait]
impl EdgeKubeClient for EdgeKubeClientImpl {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        let api = self.api_for(gvk, namespace);
        match api.get(name).await {
            Ok(obj) => Ok(obj),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(EdgeError::not_found(
                &gvk.kind,
                name,
                namespace.unwrap_or(""),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let api = self.api_for(gvk, namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let gvk = gvk_of(obj)?;
        let namespace = obj.metadata.namespace.as_deref();
        let name = obj.metadata.name.as_deref().unwrap_or("");
        let api = self.api_for(&gvk, namespace);
        match api.create(&PostParams::default(), obj).await {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(EdgeError::already_exists(
                &gvk.kind,
                name,
                namespace.unwrap_or(""),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let gvk = gvk_of(obj)?;
        let namespace = obj.metadata.namespace.as_deref();
        let name = obj
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| EdgeError::Decode("object has no name".to_string()))?;
        let api = self.api_for(&gvk, namespace);
        Ok(api.replace(name, &PostParams::default(), obj).await?)
    }

    async fn patch_merge(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject> {
        let api = self.api_for(gvk, namespace);
        let params = kube::api::PatchParams::default();
        match api
            .patch(name, &params, &kube::api::Patch::Merge(patch))
            .await
        {
            Ok(patched) => Ok(patched),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(EdgeError::not_found(
                &gvk.kind,
                name,
                namespace.unwrap_or(""),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let api = self.api_for(gvk, namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(EdgeError::not_found(
                &gvk.kind,
                name,
                namespace.unwrap_or(""),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn watch(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<WatchStream> {
        let api = self.api_for(gvk, namespace);
        let mut params = WatchParams::default();
        if let Some(fields) = field_selector {
            params = params.fields(fields);
        }
        Ok(WatchStream::new(Box::new(ApiEventSource {
            api,
            params,
            version: "0".to_string(),
            stream: None,
            delay: RESTART_DELAY_MIN,
        })))
    }

    async fn close(&self) -> Result<()> {
        if let Some(tunnel) = &self.tunnel {
            tunnel.close().await?;
        }
        Ok(())
    }
}

const RESTART_DELAY_MIN: Duration = Duration::from_secs(1);
const RESTART_DELAY_MAX: Duration = Duration::from_secs(60);

type RawWatch = Pin<Box<dyn futures::Stream<Item = kube::Result<WatchEvent<DynamicObject>>> + Send>>;

/// A watch that survives server-side closure: it re-establishes itself
/// from the last observed resource version, backing off exponentially
/// up to one minute with no overall deadline.
struct ApiEventSource {
    api: Api<DynamicObject>,
    params: WatchParams,
    version: String,
    stream: Option<RawWatch>,
    delay: Duration,
}

impl ApiEventSource {
    fn note_version(&mut self, obj: &DynamicObject) {
        if let Some(version) = &obj.metadata.resource_version {
            self.version = version.clone();
        }
    }

    async fn back_off(&mut self) {
        tokio::time::sleep(self.delay).await;
        self.delay = (self.delay * 2).min(RESTART_DELAY_MAX);
    }
}

#[async_trait::async_trait]
impl EventSource for ApiEventSource {
    async fn next(&mut self) -> Option<Result<ObjectEvent>> {
        loop {
            if self.stream.is_none() {
                match self.api.watch(&self.params, &self.version).await {
                    Ok(stream) => {
                        self.stream = Some(Box::pin(stream));
                    }
                    Err(e) => {
                        debug!(error = %e, "watch failed to start, backing off");
                        self.back_off().await;
                        continue;
                    }
                }
            }

            let event = match self.stream.as_mut() {
                Some(stream) => stream.next().await,
                None => continue,
            };

            match event {
                Some(Ok(WatchEvent::Added(obj))) => {
                    self.note_version(&obj);
                    self.delay = RESTART_DELAY_MIN;
                    return Some(Ok(ObjectEvent::Added(obj)));
                }
                Some(Ok(WatchEvent::Modified(obj))) => {
                    self.note_version(&obj);
                    self.delay = RESTART_DELAY_MIN;
                    return Some(Ok(ObjectEvent::Modified(obj)));
                }
                Some(Ok(WatchEvent::Deleted(obj))) => {
                    self.note_version(&obj);
                    self.delay = RESTART_DELAY_MIN;
                    return Some(Ok(ObjectEvent::Deleted(obj)));
                }
                Some(Ok(WatchEvent::Bookmark(bookmark))) => {
                    self.version = bookmark.metadata.resource_version.clone();
                }
                Some(Ok(WatchEvent::Error(er))) if er.code == 410 => {
                    // Our resource version expired, start over.
                    self.version = "0".to_string();
                    self.stream = None;
                }
                Some(Ok(WatchEvent::Error(er))) => {
                    return Some(Err(EdgeError::Server(er.message)));
                }
                Some(Err(e)) => {
                    debug!(error = %e, "watch interrupted, restarting");
                    self.stream = None;
                    self.back_off().await;
                }
                None => {
                    self.stream = None;
                }
            }
        }
    }
}
