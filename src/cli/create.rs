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

//! The `create` subcommands.

use super::commands::{parse_duration, CommonArgs, Session};
use crate::domain::applier::{Applier, ConsoleListener};
use crate::domain::model::{
    config::{PROP_OCP_VERSION, PROP_REGISTRY},
    Cluster,
};
use crate::domain::tasks;
use crate::infrastructure::environment::EnvBuilder;
use crate::infrastructure::kubernetes::{gvks, EdgeKubeClient};
use crate::infrastructure::process::{self, ProcessSpec};
use crate::infrastructure::registry::RegistryTool;
use crate::shared::error::{EdgeError, Result};
use clap::Parser;
use serde_json::json;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

fn managed_labels() -> std::collections::BTreeMap<String, String> {
    [(
        "app.kubernetes.io/managed-by".to_string(),
        "edge-kube".to_string(),
    )]
    .into()
}

#[derive(Parser, Debug, Clone)]
pub struct CreateClusterCommand {
    #[command(flatten)]
    pub common: CommonArgs,

    /// How long to wait for the cluster installs to finish (0 to skip)
    #[arg(long, default_value = "60m")]
    pub wait: String,

    /// Directory to write per-cluster SSH key artifacts into
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl CreateClusterCommand {
    pub async fn execute(&self) -> Result<()> {
        let wait = parse_duration(&self.wait)?;
        let session = self.common.open().await?;
        let Session {
            config,
            hub,
            engine,
        } = &session;

        tasks::for_each_cluster(config, false, |cluster| {
            let hub = hub.clone();
            let engine = engine.clone();
            let output = self.output.clone();
            Box::pin(async move {
                tasks::require_control_plane(cluster)?;
                let applier = Applier::new(hub.clone(), engine, "cluster", Arc::new(ConsoleListener))
                    .with_labels(managed_labels());
                applier.apply(&tasks::template_data(config, cluster)).await?;

                if let Some(dir) = &output {
                    write_ssh_artifacts(dir, cluster)?;
                }

                tasks::wait_provisioned_hosts(hub.as_ref(), cluster, wait).await?;
                tasks::wait_installed(hub.as_ref(), cluster, wait).await?;
                info!(cluster = %cluster.name, "cluster created");
                Ok(())
            })
        })
        .await
    }
}

fn write_ssh_artifacts(dir: &Path, cluster: &Cluster) -> Result<()> {
    let key = match &cluster.ssh_key {
        Some(key) => key,
        None => {
            warn!(cluster = %cluster.name, "no SSH key to write");
            return Ok(());
        }
    };
    let cluster_dir = dir.join(&cluster.name);
    std::fs::create_dir_all(&cluster_dir)?;
    let private = cluster_dir.join(format!("{}-rsa.key", cluster.name));
    let public = cluster_dir.join(format!("{}-rsa.key.pub", cluster.name));
    std::fs::write(&private, &key.private_key)?;
    std::fs::write(&public, &key.public_key)?;
    for path in [&private, &public] {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    info!(cluster = %cluster.name, dir = %cluster_dir.display(), "wrote SSH key artifacts");
    Ok(())
}

#[derive(Parser, Debug, Clone)]
pub struct CreateRegistryCommand {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl CreateRegistryCommand {
    pub async fn execute(&self) -> Result<()> {
        let session = self.common.open().await?;
        let registry = session
            .config
            .property(PROP_REGISTRY)
            .ok_or_else(|| EdgeError::config(format!("property '{}' is not set", PROP_REGISTRY)))?
            .to_string();

        let applier = Applier::new(
            session.hub.clone(),
            session.engine.clone(),
            "registry",
            Arc::new(ConsoleListener),
        )
        .with_labels(managed_labels());
        applier
            .apply(&json!({ "properties": session.config.properties }))
            .await?;

        let tool = RegistryTool::new(session.hub.clone());
        let ca = tool.fetch_ca(&registry).await?;
        tool.add_trusted_registry(&registry, &ca).await?;
        info!(registry = %registry, "registry created and trusted");
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct CreateOdfCommand {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl CreateOdfCommand {
    pub async fn execute(&self) -> Result<()> {
        let session = self.common.open().await?;
        let Session { config, engine, .. } = &session;

        tasks::for_each_cluster(config, false, |cluster| {
            let engine = engine.clone();
            Box::pin(async move {
                let client = tasks::cluster_client(cluster, true).await?;
                let applier =
                    Applier::new(client.clone(), engine, "odf", Arc::new(ConsoleListener))
                        .with_labels(managed_labels());
                let result = applier.apply(&tasks::template_data(config, cluster)).await;
                let result = match result {
                    Ok(()) if cluster.sno => shrink_backing_store(client.as_ref()).await,
                    other => other,
                };
                client.close().await?;
                result
            })
        })
        .await
    }
}

/// Single-node clusters cannot spread the default backing store, so
/// its pool is patched down to one volume. The patch is computed from
/// the object as fetched, not from the modified copy.
async fn shrink_backing_store(client: &dyn EdgeKubeClient) -> Result<()> {
    let gvk = gvks::backing_store();
    let original = client
        .get(&gvk, Some("openshift-storage"), "noobaa-default-backing-store")
        .await?;
    let current = original.data["spec"]["pvPool"]["numVolumes"].as_u64();
    if current == Some(1) {
        debug!("backing store already shrunk");
        return Ok(());
    }
    let patch = json!({ "spec": { "pvPool": { "numVolumes": 1 } } });
    client
        .patch_merge(
            &gvk,
            Some("openshift-storage"),
            "noobaa-default-backing-store",
            &patch,
        )
        .await?;
    Ok(())
}

#[derive(Parser, Debug, Clone)]
pub struct CreateMetallbCommand {
    #[command(flatten)]
    pub common: CommonArgs,

    /// How long to wait for the MetalLB controller (0 to skip)
    #[arg(long, default_value = "10m")]
    pub wait: String,
}

impl CreateMetallbCommand {
    pub async fn execute(&self) -> Result<()> {
        let wait = parse_duration(&self.wait)?;
        let session = self.common.open().await?;
        let Session { config, engine, .. } = &session;

        tasks::for_each_cluster(config, false, |cluster| {
            let engine = engine.clone();
            Box::pin(async move {
                let client = tasks::cluster_client(cluster, true).await?;
                let applier =
                    Applier::new(client.clone(), engine, "metallb", Arc::new(ConsoleListener))
                        .with_labels(managed_labels());
                let result = applier.apply(&tasks::template_data(config, cluster)).await;
                let result = match result {
                    Ok(()) => {
                        tasks::wait_status(
                            client.as_ref(),
                            &tasks::WaitSpec {
                                cluster: cluster.name.clone(),
                                gvk: gvks::deployment(),
                                namespace: Some("metallb".to_string()),
                                field_selector: Some("metadata.name=controller".to_string()),
                                state_query:
                                    ".status.conditions[]?|select(.type==\"Available\")|.status"
                                        .to_string(),
                                ready_state: "True".to_string(),
                                error_state: None,
                                subject: format!("MetalLB controller of '{}'", cluster.name),
                                timeout: wait,
                            },
                        )
                        .await
                    }
                    err => err,
                };
                client.close().await?;
                result
            })
        })
        .await
    }
}

#[derive(Parser, Debug, Clone)]
pub struct CreateLsoCommand {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Wipe the storage disks before handing them to the operator
    #[arg(long)]
    pub wipe: bool,
}

impl CreateLsoCommand {
    pub async fn execute(&self) -> Result<()> {
        let session = self.common.open().await?;
        let Session { config, engine, .. } = &session;

        tasks::for_each_cluster(config, false, |cluster| {
            let engine = engine.clone();
            Box::pin(async move {
                let client = tasks::cluster_client(cluster, true).await?;
                let applier =
                    Applier::new(client.clone(), engine, "lso", Arc::new(ConsoleListener))
                        .with_labels(managed_labels());
                let mut data = tasks::template_data(config, cluster);
                data["wipe"] = json!(self.wipe);
                let result = applier.apply(&data).await;
                client.close().await?;
                result
            })
        })
        .await
    }
}

#[derive(Parser, Debug, Clone)]
pub struct CreateUiCommand {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl CreateUiCommand {
    pub async fn execute(&self) -> Result<()> {
        let session = self.common.open().await?;
        let applier = Applier::new(
            session.hub.clone(),
            session.engine.clone(),
            "ui",
            Arc::new(ConsoleListener),
        )
        .with_labels(managed_labels());
        applier
            .apply(&json!({ "properties": session.config.properties }))
            .await
    }
}

#[derive(Parser, Debug, Clone)]
pub struct CreateIcspCommand {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl CreateIcspCommand {
    pub async fn execute(&self) -> Result<()> {
        let session = self.common.open().await?;
        let Session { config, engine, .. } = &session;

        tasks::for_each_cluster(config, false, |cluster| {
            let engine = engine.clone();
            Box::pin(async move {
                let client = tasks::cluster_client(cluster, true).await?;
                let applier =
                    Applier::new(client.clone(), engine, "icsp", Arc::new(ConsoleListener))
                        .with_labels(managed_labels());
                let result = applier.apply(&tasks::template_data(config, cluster)).await;
                client.close().await?;
                result
            })
        })
        .await
    }
}

#[derive(Parser, Debug, Clone)]
pub struct CreateMirrorCommand {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl CreateMirrorCommand {
    pub async fn execute(&self) -> Result<()> {
        let session = self.common.open().await?;
        let Session { config, engine, .. } = &session;

        tasks::for_each_cluster(config, true, |cluster| {
            let engine = engine.clone();
            Box::pin(async move {
                mirror_images(&engine, config, cluster).await
            })
        })
        .await
    }
}

/// Mirrors release and operator images into the site registry with
/// `oc-mirror`, run in a private working directory that carries the
/// pull secret as `containers/auth.json` and the registry CA.
async fn mirror_images(
    engine: &crate::infrastructure::templating::Engine,
    config: &crate::domain::model::Config,
    cluster: &Cluster,
) -> Result<()> {
    if config.property(PROP_OCP_VERSION).is_none() {
        return Err(EdgeError::config(format!(
            "property '{}' must be set to mirror images",
            PROP_OCP_VERSION
        )));
    }
    let registry = cluster
        .registry
        .url
        .as_deref()
        .ok_or_else(|| EdgeError::config(format!("cluster '{}' has no registry", cluster.name)))?;
    let pull_secret = cluster.pull_secret.as_deref().ok_or_else(|| {
        EdgeError::config(format!("cluster '{}' has no pull secret", cluster.name))
    })?;

    let dir = tempfile::Builder::new().suffix(".mirror").tempdir()?;
    let auth_dir = dir.path().join("containers");
    std::fs::create_dir_all(&auth_dir)?;
    let auth_file = auth_dir.join("auth.json");
    std::fs::write(&auth_file, pull_secret)?;
    std::fs::set_permissions(&auth_file, std::fs::Permissions::from_mode(0o600))?;

    let mut env = EnvBuilder::new();
    env.set_env(std::env::vars().map(|(k, v)| format!("{}={}", k, v)));
    env.set_var("XDG_RUNTIME_DIR", dir.path().to_string_lossy().as_ref())?;
    if let Some(ca) = &cluster.registry.ca {
        let ca_file = dir.path().join("ca.pem");
        std::fs::write(&ca_file, ca)?;
        env.set_var("SSL_CERT_FILE", ca_file.to_string_lossy().as_ref())?;
    }

    let rendered = engine.execute(
        "mirror/oc-mirror-config.yaml",
        &tasks::template_data(config, cluster),
    )?;
    std::fs::write(dir.path().join("oc-mirror-config.yaml"), rendered)?;

    let args = vec![
        "--config".to_string(),
        "oc-mirror-config.yaml".to_string(),
        format!("docker://{}", registry),
    ];
    let env = env.build();
    info!(cluster = %cluster.name, registry = %registry, "mirroring images");
    process::run(ProcessSpec {
        program: "oc-mirror",
        args: &args,
        env: &env,
        dir: dir.path(),
    })
    .await
    .map_err(|e| match e {
        EdgeError::SubprocessFailed { code, .. } => EdgeError::Exit(code),
        other => other,
    })
}
