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

//! The `delete` subcommands. Deletions run in reverse render order so
//! dependents go before the namespaces and definitions they live in.

use super::commands::{CommonArgs, Session};
use crate::domain::applier::{Applier, ConsoleListener};
use crate::domain::tasks;
use crate::infrastructure::kubernetes::EdgeKubeClient;
use crate::shared::error::Result;
use clap::Parser;
use colored::Colorize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// CRD groups installed by the operators this tool deploys.
const CRD_GROUPS: &[&str] = &["metallb.io", "nmstate.io", "quay.redhat.com"];

async fn delete_crd_groups(client: &dyn EdgeKubeClient) -> Result<()> {
    let mut deleted = 0;
    for group in CRD_GROUPS {
        deleted += client.delete_crd_group(group).await?;
    }
    if deleted == 0 {
        println!("There are no CRDs to delete");
    } else {
        println!("Deleted {} CRDs", deleted);
    }
    Ok(())
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteClusterCommand {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl DeleteClusterCommand {
    pub async fn execute(&self) -> Result<()> {
        let session = self.common.open().await?;
        let Session {
            config,
            hub,
            engine,
        } = &session;

        tasks::for_each_cluster(config, false, |cluster| {
            let hub = hub.clone();
            let engine = engine.clone();
            Box::pin(async move {
                let applier = Applier::new(hub, engine, "cluster", Arc::new(ConsoleListener));
                applier
                    .delete(&tasks::template_data(config, cluster))
                    .await?;
                info!(cluster = %cluster.name, "cluster objects deleted");
                Ok(())
            })
        })
        .await
    }
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteRegistryCommand {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Also delete the CRD groups left behind by the operators
    #[arg(long)]
    pub crds: bool,
}

impl DeleteRegistryCommand {
    pub async fn execute(&self) -> Result<()> {
        let session = self.common.open().await?;
        let applier = Applier::new(
            session.hub.clone(),
            session.engine.clone(),
            "registry",
            Arc::new(ConsoleListener),
        );
        applier
            .delete(&json!({ "properties": session.config.properties }))
            .await?;
        if self.crds {
            delete_crd_groups(session.hub.as_ref()).await?;
        }
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteMetallbCommand {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Also delete the CRD groups left behind by the operators
    #[arg(long)]
    pub crds: bool,
}

impl DeleteMetallbCommand {
    pub async fn execute(&self) -> Result<()> {
        let session = self.common.open().await?;
        let Session { config, engine, .. } = &session;
        let crds = self.crds;

        tasks::for_each_cluster(config, false, |cluster| {
            let engine = engine.clone();
            Box::pin(async move {
                let client = tasks::cluster_client(cluster, true).await?;
                let applier =
                    Applier::new(client.clone(), engine, "metallb", Arc::new(ConsoleListener));
                let mut result = applier.delete(&tasks::template_data(config, cluster)).await;
                if result.is_ok() && crds {
                    result = delete_crd_groups(client.as_ref()).await;
                }
                client.close().await?;
                result
            })
        })
        .await
    }
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteUiCommand {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl DeleteUiCommand {
    pub async fn execute(&self) -> Result<()> {
        let session = self.common.open().await?;
        let applier = Applier::new(
            session.hub.clone(),
            session.engine.clone(),
            "ui",
            Arc::new(ConsoleListener),
        );
        applier
            .delete(&json!({ "properties": session.config.properties }))
            .await
    }
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteMirrorCommand {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl DeleteMirrorCommand {
    pub async fn execute(&self) -> Result<()> {
        eprintln!(
            "{}",
            "Deleting mirrored images is not implemented".yellow()
        );
        Ok(())
    }
}
