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

//! The object application engine: renders a directory of manifest
//! templates into concrete objects and applies or deletes them against
//! the API, reporting progress through a listener.

pub mod listener;

pub use listener::{ApplyEvent, ApplyListener, ConsoleListener, NullListener};

use crate::infrastructure::jq;
use crate::infrastructure::kubernetes::{conflict_backoff, gvk_of, EdgeKubeClient, ObjectEvent};
use crate::infrastructure::templating::Engine;
use crate::shared::error::{EdgeError, Result};
use backon::Retryable;
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const CRD_ESTABLISH_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Applier {
    client: Arc<dyn EdgeKubeClient>,
    engine: Arc<Engine>,
    root: String,
    dir: String,
    labels: BTreeMap<String, String>,
    listener: Arc<dyn ApplyListener>,
}

impl Applier {
    pub fn new(
        client: Arc<dyn EdgeKubeClient>,
        engine: Arc<Engine>,
        root: impl Into<String>,
        listener: Arc<dyn ApplyListener>,
    ) -> Self {
        Self {
            client,
            engine,
            root: root.into(),
            dir: "objects".to_string(),
            labels: BTreeMap::new(),
            listener,
        }
    }

    pub fn with_dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Labels stamped on every rendered object.
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Renders every template under the configured directory with
    /// `data`, splits the output into YAML documents and decodes each
    /// into an object. Pure: no I/O against the API. The returned order
    /// is the lexical order of the template file names.
    pub fn render<D: Serialize>(&self, data: &D) -> Result<Vec<DynamicObject>> {
        let dir = format!("{}/{}", self.root, self.dir);
        let mut objects = Vec::new();
        for name in self.engine.names_under(&dir) {
            let text = self.engine.execute(name, data)?;
            for document in serde_yaml::Deserializer::from_str(&text) {
                let value = serde_json::Value::deserialize(document)?;
                if value.is_null() {
                    continue;
                }
                let mut obj: DynamicObject = serde_json::from_value(value)
                    .map_err(|e| EdgeError::Decode(format!("{}: {}", name, e)))?;
                if obj.types.is_none() {
                    return Err(EdgeError::Decode(format!(
                        "{}: document has no apiVersion/kind",
                        name
                    )));
                }
                if !self.labels.is_empty() {
                    obj.metadata
                        .labels
                        .get_or_insert_with(BTreeMap::new)
                        .extend(self.labels.clone());
                }
                objects.push(obj);
            }
        }
        Ok(objects)
    }

    pub async fn apply<D: Serialize>(&self, data: &D) -> Result<()> {
        let objects = self.render(data)?;
        self.apply_objects(&objects).await
    }

    pub async fn delete<D: Serialize>(&self, data: &D) -> Result<()> {
        let objects = self.render(data)?;
        self.delete_objects(&objects).await
    }

    /// Applies the objects in list order, except that namespaces go
    /// first and custom resource definitions second, before anything
    /// that may live in those namespaces or instantiate those
    /// definitions. Each CRD is then watched until the API reports it
    /// established.
    pub async fn apply_objects(&self, objects: &[DynamicObject]) -> Result<()> {
        let mut namespaces = Vec::new();
        let mut crds = Vec::new();
        let mut rest = Vec::new();
        for obj in objects {
            match kind_of(obj) {
                "Namespace" => namespaces.push(obj),
                "CustomResourceDefinition" => crds.push(obj),
                _ => rest.push(obj),
            }
        }

        for obj in namespaces {
            self.apply_object(obj).await?;
        }
        for obj in &crds {
            let mut crd = (*obj).clone();
            // The server owns the status.
            if let Some(map) = crd.data.as_object_mut() {
                map.remove("status");
            }
            self.apply_object(&crd).await?;
        }
        for obj in &crds {
            self.wait_crd_established(obj).await?;
        }
        for obj in rest {
            self.apply_object(obj).await?;
        }
        Ok(())
    }

    /// Deletes the objects in reverse list order. Objects that are
    /// already gone count as deleted.
    pub async fn delete_objects(&self, objects: &[DynamicObject]) -> Result<()> {
        for obj in objects.iter().rev() {
            self.listener.on_event(ApplyEvent::WillDelete(obj));
            let gvk = gvk_of(obj)?;
            let name = obj
                .metadata
                .name
                .as_deref()
                .ok_or_else(|| EdgeError::Decode("object has no name".to_string()))?;
            match self
                .client
                .delete(&gvk, obj.metadata.namespace.as_deref(), name)
                .await
            {
                Ok(()) => self.listener.on_event(ApplyEvent::Deleted(obj)),
                Err(EdgeError::NotFound { .. }) => {
                    self.listener.on_event(ApplyEvent::NotFound(obj))
                }
                Err(e) => {
                    self.listener.on_event(ApplyEvent::Error {
                        object: obj,
                        error: &e,
                    });
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn apply_object(&self, obj: &DynamicObject) -> Result<()> {
        self.listener.on_event(ApplyEvent::WillCreate(obj));
        match self.client.create(obj).await {
            Ok(_) => {
                self.listener.on_event(ApplyEvent::Created(obj));
                Ok(())
            }
            Err(EdgeError::AlreadyExists { .. }) => {
                self.listener.on_event(ApplyEvent::AlreadyExists(obj));
                let update = || async {
                    if kind_of(obj) == "Secret" {
                        // Secrets carry immutable fields that merge
                        // patches cannot clear, so replace the whole
                        // object.
                        self.replace_existing(obj).await
                    } else {
                        self.merge_existing(obj).await
                    }
                };
                // The update can race a concurrent writer over the
                // same object.
                let result = update
                    .retry(&conflict_backoff())
                    .when(|e| matches!(e, EdgeError::Conflict(_)))
                    .await;
                if let Err(e) = &result {
                    self.listener.on_event(ApplyEvent::Error {
                        object: obj,
                        error: e,
                    });
                }
                result
            }
            Err(e) => {
                self.listener.on_event(ApplyEvent::Error {
                    object: obj,
                    error: &e,
                });
                Err(e)
            }
        }
    }

    async fn merge_existing(&self, obj: &DynamicObject) -> Result<()> {
        let gvk = gvk_of(obj)?;
        let name = obj
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| EdgeError::Decode("object has no name".to_string()))?;
        let patch = serde_json::to_value(obj)?;
        self.client
            .patch_merge(&gvk, obj.metadata.namespace.as_deref(), name, &patch)
            .await?;
        Ok(())
    }

    async fn replace_existing(&self, obj: &DynamicObject) -> Result<()> {
        let gvk = gvk_of(obj)?;
        let name = obj
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| EdgeError::Decode("object has no name".to_string()))?;
        let existing = self
            .client
            .get(&gvk, obj.metadata.namespace.as_deref(), name)
            .await?;
        let mut replacement = obj.clone();
        replacement.metadata.resource_version = existing.metadata.resource_version;
        self.client.update(&replacement).await?;
        Ok(())
    }

    async fn wait_crd_established(&self, obj: &DynamicObject) -> Result<()> {
        let gvk = gvk_of(obj)?;
        let name = obj
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| EdgeError::Decode("object has no name".to_string()))?;

        if is_established(obj)? {
            return Ok(());
        }

        let selector = format!("metadata.name={}", name);
        let mut watch = self.client.watch(&gvk, None, Some(&selector)).await?;
        let wait = async {
            while let Some(event) = watch.next().await {
                let event = event?;
                if is_established(event.object())? {
                    return Ok(());
                }
                if let ObjectEvent::Deleted(_) = event {
                    return Err(EdgeError::not_found(&gvk.kind, name, ""));
                }
            }
            Err(EdgeError::Server(format!(
                "watch on '{}' ended unexpectedly",
                name
            )))
        };
        tokio::time::timeout(CRD_ESTABLISH_TIMEOUT, wait)
            .await
            .map_err(|_| {
                EdgeError::Timeout(format!("definition '{}' never became established", name))
            })?
    }
}

fn kind_of(obj: &DynamicObject) -> &str {
    obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("")
}

fn is_established(obj: &DynamicObject) -> Result<bool> {
    let statuses: Vec<String> = jq::query(
        ".status.conditions[]?|select(.type==\"Established\")|.status",
        obj,
    )?;
    Ok(statuses.iter().any(|s| s == "True"))
}
