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

//! End-to-end tests of the object application engine against a fake
//! API that records every call.

use edge_kube::domain::applier::{Applier, NullListener};
use edge_kube::domain::tasks::{self, WaitSpec};
use edge_kube::infrastructure::kubernetes::{
    EdgeKubeClient, EventSource, ObjectEvent, WatchStream,
};
use edge_kube::infrastructure::registry::RegistryTool;
use edge_kube::infrastructure::templating::Engine;
use edge_kube::shared::error::{EdgeError, Result};
use kube::core::{DynamicObject, GroupVersionKind};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct VecSource {
    events: VecDeque<ObjectEvent>,
}

#[async_trait::async_trait]
impl EventSource for VecSource {
    async fn next(&mut self) -> Option<Result<ObjectEvent>> {
        self.events.pop_front().map(Ok)
    }
}

/// Records every API call and simulates a cluster where the names in
/// `existing` are already present. The next `conflicts` merge patches
/// fail with a conflict.
#[derive(Default)]
struct FakeApi {
    calls: Mutex<Vec<String>>,
    existing: Mutex<BTreeSet<String>>,
    watch_events: Mutex<Vec<ObjectEvent>>,
    conflicts: Mutex<u32>,
}

impl FakeApi {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn with_existing(names: &[&str]) -> Self {
        Self {
            existing: Mutex::new(names.iter().map(|n| n.to_string()).collect()),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl EdgeKubeClient for FakeApi {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        self.record(format!("get {} {}", gvk.kind, name));
        let mut obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": gvk.kind,
            "metadata": { "name": name, "namespace": namespace },
        }))?;
        obj.metadata.resource_version = Some("7".to_string());
        Ok(obj)
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        _namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        self.record(format!("list {}", gvk.kind));
        Ok(Vec::new())
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let kind = obj.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.record(format!("create {} {}", kind, name));
        if self.existing.lock().unwrap().contains(&name) {
            return Err(EdgeError::already_exists(kind, name, ""));
        }
        Ok(obj.clone())
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let kind = obj.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
        self.record(format!(
            "update {} {} rv={}",
            kind,
            obj.metadata.name.clone().unwrap_or_default(),
            obj.metadata.resource_version.clone().unwrap_or_default()
        ));
        Ok(obj.clone())
    }

    async fn patch_merge(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        _patch: &Value,
    ) -> Result<DynamicObject> {
        self.record(format!("patch {} {}", gvk.kind, name));
        {
            let mut conflicts = self.conflicts.lock().unwrap();
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(EdgeError::Conflict("object was modified".to_string()));
            }
        }
        self.get(gvk, namespace, name).await
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        _namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        self.record(format!("delete {} {}", gvk.kind, name));
        if gvk.kind == "ConfigMap" && name == "gone" {
            return Err(EdgeError::not_found(gvk.kind.clone(), name, ""));
        }
        Ok(())
    }

    async fn watch(
        &self,
        gvk: &GroupVersionKind,
        _namespace: Option<&str>,
        _field_selector: Option<&str>,
    ) -> Result<WatchStream> {
        self.record(format!("watch {}", gvk.kind));
        let events = self.watch_events.lock().unwrap().drain(..).collect();
        Ok(WatchStream::new(Box::new(VecSource { events })))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn engine(files: &[(&str, &str)]) -> Arc<Engine> {
    let map: BTreeMap<String, String> = files
        .iter()
        .map(|(name, body)| (name.to_string(), body.to_string()))
        .collect();
    Arc::new(Engine::new(map).unwrap())
}

fn configmap(name: &str) -> (String, String) {
    (
        format!("demo/objects/{}.yaml", name),
        format!(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\n  namespace: demo\n",
            name
        ),
    )
}

fn configmap_engine(names: &[&str]) -> Arc<Engine> {
    let map: BTreeMap<String, String> = names
        .iter()
        .map(|n| configmap(n))
        .collect();
    Arc::new(Engine::new(map).unwrap())
}

#[tokio::test]
async fn test_apply_in_render_order() {
    let api = Arc::new(FakeApi::default());
    let applier = Applier::new(
        api.clone(),
        configmap_engine(&["a", "b", "c"]),
        "demo",
        Arc::new(NullListener),
    );
    applier.apply(&json!({})).await.unwrap();
    assert_eq!(
        api.calls(),
        vec![
            "create ConfigMap a",
            "create ConfigMap b",
            "create ConfigMap c",
        ]
    );
}

#[tokio::test]
async fn test_delete_in_reverse_render_order() {
    let api = Arc::new(FakeApi::default());
    let applier = Applier::new(
        api.clone(),
        configmap_engine(&["a", "b", "c"]),
        "demo",
        Arc::new(NullListener),
    );
    applier.delete(&json!({})).await.unwrap();
    assert_eq!(
        api.calls(),
        vec![
            "delete ConfigMap c",
            "delete ConfigMap b",
            "delete ConfigMap a",
        ]
    );
}

#[tokio::test]
async fn test_delete_tolerates_missing_objects() {
    let api = Arc::new(FakeApi::default());
    let applier = Applier::new(
        api.clone(),
        configmap_engine(&["a", "gone"]),
        "demo",
        Arc::new(NullListener),
    );
    applier.delete(&json!({})).await.unwrap();
    assert_eq!(
        api.calls(),
        vec!["delete ConfigMap gone", "delete ConfigMap a"]
    );
}

#[tokio::test]
async fn test_create_is_idempotent() {
    let api = Arc::new(FakeApi::with_existing(&["b"]));
    let applier = Applier::new(
        api.clone(),
        configmap_engine(&["a", "b"]),
        "demo",
        Arc::new(NullListener),
    );
    applier.apply(&json!({})).await.unwrap();
    // Existing objects fall back to a merge patch instead of failing.
    assert_eq!(
        api.calls(),
        vec![
            "create ConfigMap a",
            "create ConfigMap b",
            "patch ConfigMap b",
            "get ConfigMap b",
        ]
    );
}

#[tokio::test]
async fn test_merge_patch_retries_after_conflict() {
    let api = Arc::new(FakeApi::with_existing(&["b"]));
    *api.conflicts.lock().unwrap() = 1;
    let applier = Applier::new(
        api.clone(),
        configmap_engine(&["b"]),
        "demo",
        Arc::new(NullListener),
    );
    applier.apply(&json!({})).await.unwrap();
    assert_eq!(
        api.calls(),
        vec![
            "create ConfigMap b",
            "patch ConfigMap b",
            "patch ConfigMap b",
            "get ConfigMap b",
        ]
    );
}

#[tokio::test]
async fn test_existing_secret_is_replaced() {
    let api = Arc::new(FakeApi::with_existing(&["token"]));
    let applier = Applier::new(
        api.clone(),
        engine(&[(
            "demo/objects/secret.yaml",
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: token\n  namespace: demo\n",
        )]),
        "demo",
        Arc::new(NullListener),
    );
    applier.apply(&json!({})).await.unwrap();
    // The replacement carries the live resource version.
    assert_eq!(
        api.calls(),
        vec![
            "create Secret token",
            "get Secret token",
            "update Secret token rv=7",
        ]
    );
}

#[tokio::test]
async fn test_namespaces_and_definitions_go_first() {
    let api = Arc::new(FakeApi::default());
    let crd: DynamicObject = serde_json::from_value(json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": { "name": "widgets.example.io" },
        "spec": { "group": "example.io" },
        "status": { "conditions": [ { "type": "Established", "status": "True" } ] },
    }))
    .unwrap();
    api.watch_events
        .lock()
        .unwrap()
        .push(ObjectEvent::Modified(crd));

    let applier = Applier::new(
        api.clone(),
        engine(&[
            (
                "demo/objects/00-widget.yaml",
                "apiVersion: example.io/v1\nkind: Widget\nmetadata:\n  name: w\n  namespace: demo\n",
            ),
            (
                "demo/objects/01-crd.yaml",
                "apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: widgets.example.io\nspec:\n  group: example.io\n",
            ),
            (
                "demo/objects/02-namespace.yaml",
                "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: demo\n",
            ),
        ]),
        "demo",
        Arc::new(NullListener),
    );
    applier.apply(&json!({})).await.unwrap();
    assert_eq!(
        api.calls(),
        vec![
            "create Namespace demo",
            "create CustomResourceDefinition widgets.example.io",
            "watch CustomResourceDefinition",
            "create Widget w",
        ]
    );
}

#[tokio::test]
async fn test_rendered_objects_carry_labels() {
    let api = Arc::new(FakeApi::default());
    let applier = Applier::new(
        api.clone(),
        configmap_engine(&["a"]),
        "demo",
        Arc::new(NullListener),
    )
    .with_labels([("managed".to_string(), "yes".to_string())].into());
    let objects = applier.render(&json!({})).unwrap();
    assert_eq!(
        objects[0].metadata.labels.as_ref().unwrap().get("managed"),
        Some(&"yes".to_string())
    );
}

fn phase_event(phase: &str) -> ObjectEvent {
    ObjectEvent::Modified(
        serde_json::from_value(json!({
            "apiVersion": "example.io/v1",
            "kind": "Widget",
            "metadata": { "name": "w", "namespace": "demo" },
            "status": { "phase": phase },
        }))
        .unwrap(),
    )
}

#[tokio::test]
async fn test_wait_status_follows_phases_until_ready() {
    let api = Arc::new(FakeApi::default());
    {
        let mut events = api.watch_events.lock().unwrap();
        events.push(phase_event("Progressing"));
        events.push(phase_event("Progressing"));
        events.push(phase_event("Ready"));
    }
    let spec = WaitSpec {
        cluster: "edge0".to_string(),
        gvk: GroupVersionKind::gvk("example.io", "v1", "Widget"),
        namespace: Some("demo".to_string()),
        field_selector: None,
        state_query: ".status.phase?".to_string(),
        ready_state: "Ready".to_string(),
        error_state: Some("Error".to_string()),
        subject: "widget 'w'".to_string(),
        timeout: Duration::from_secs(5),
    };
    tasks::wait_status(api.as_ref(), &spec).await.unwrap();
}

#[tokio::test]
async fn test_wait_status_surfaces_error_state() {
    let api = Arc::new(FakeApi::default());
    {
        let mut events = api.watch_events.lock().unwrap();
        events.push(phase_event("Progressing"));
        events.push(phase_event("Error"));
    }
    let spec = WaitSpec {
        cluster: "edge0".to_string(),
        gvk: GroupVersionKind::gvk("example.io", "v1", "Widget"),
        namespace: Some("demo".to_string()),
        field_selector: None,
        state_query: ".status.phase?".to_string(),
        ready_state: "Ready".to_string(),
        error_state: Some("Error".to_string()),
        subject: "widget 'w'".to_string(),
        timeout: Duration::from_secs(5),
    };
    let err = tasks::wait_status(api.as_ref(), &spec).await.unwrap_err();
    match err {
        EdgeError::DownstreamReportedError { cluster, state, .. } => {
            assert_eq!(cluster, "edge0");
            assert_eq!(state, "Error");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_wait_status_times_out() {
    // The fake watch ends immediately, so an unbounded loop would hang
    // on nothing; an exhausted stream surfaces as a server error, and a
    // zero timeout skips the wait entirely.
    let api = Arc::new(FakeApi::default());
    let spec = WaitSpec {
        cluster: "edge0".to_string(),
        gvk: GroupVersionKind::gvk("example.io", "v1", "Widget"),
        namespace: None,
        field_selector: None,
        state_query: ".status.phase?".to_string(),
        ready_state: "Ready".to_string(),
        error_state: None,
        subject: "widget 'w'".to_string(),
        timeout: Duration::ZERO,
    };
    tasks::wait_status(api.as_ref(), &spec).await.unwrap();
}

#[tokio::test]
async fn test_trusted_registry_retries_on_conflict() {
    let api = Arc::new(FakeApi::default());
    *api.conflicts.lock().unwrap() = 1;
    let tool = RegistryTool::new(api.clone());
    tool.add_trusted_registry("registry.local:5000", b"CA")
        .await
        .unwrap();
    // The trust configmap is re-read and patched again after the
    // losing write.
    let patches = api
        .calls()
        .iter()
        .filter(|c| c.as_str() == "patch ConfigMap registry-cas")
        .count();
    assert_eq!(patches, 2);
}

#[tokio::test]
async fn test_delete_crd_group_counts_matches() {
    let api = Arc::new(FakeApi::default());
    let deleted = api.delete_crd_group("metallb.io").await.unwrap();
    assert_eq!(deleted, 0);
    assert_eq!(api.calls(), vec!["list CustomResourceDefinition"]);
}
