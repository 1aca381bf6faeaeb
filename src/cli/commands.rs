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

//! CLI command definitions

use super::create::{
    CreateClusterCommand, CreateIcspCommand, CreateLsoCommand, CreateMetallbCommand,
    CreateMirrorCommand, CreateOdfCommand, CreateRegistryCommand, CreateUiCommand,
};
use super::delete::{
    DeleteClusterCommand, DeleteMetallbCommand, DeleteMirrorCommand, DeleteRegistryCommand,
    DeleteUiCommand,
};
use crate::data;
use crate::domain::loader;
use crate::domain::model::Config;
use crate::domain::Enricher;
use crate::infrastructure::kubernetes::{ClientOptions, EdgeKubeClientImpl};
use crate::infrastructure::templating::Engine;
use crate::shared::error::{EdgeError, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "edge-kube",
    version,
    about = "Edge cluster bootstrap tool",
    long_about = "Provisions and manages edge Kubernetes clusters from a declarative site configuration"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Create site resources on the hub or the edge clusters
    #[command(subcommand)]
    Create(CreateCommands),

    /// Delete previously created site resources
    #[command(subcommand)]
    Delete(DeleteCommands),
}

#[derive(clap::Subcommand, Debug)]
pub enum CreateCommands {
    /// Provision the edge clusters declared in the site configuration
    Cluster(CreateClusterCommand),

    /// Deploy the disconnected image registry on the hub
    Registry(CreateRegistryCommand),

    /// Deploy OpenShift Data Foundation on the edge clusters
    Odf(CreateOdfCommand),

    /// Deploy MetalLB and its address pools on the edge clusters
    Metallb(CreateMetallbCommand),

    /// Deploy the local storage operator resources on the edge clusters
    Lso(CreateLsoCommand),

    /// Deploy the edge management UI on the hub
    Ui(CreateUiCommand),

    /// Mirror release and operator images into the site registry
    Mirror(CreateMirrorCommand),

    /// Apply image content source policies on the edge clusters
    Icsp(CreateIcspCommand),
}

#[derive(clap::Subcommand, Debug)]
pub enum DeleteCommands {
    /// Delete the edge cluster provisioning objects from the hub
    Cluster(DeleteClusterCommand),

    /// Delete the image registry from the hub
    Registry(DeleteRegistryCommand),

    /// Delete MetalLB from the edge clusters
    Metallb(DeleteMetallbCommand),

    /// Delete the edge management UI from the hub
    Ui(DeleteUiCommand),

    /// Delete mirrored images (not implemented)
    Mirror(DeleteMirrorCommand),
}

/// Flags every subcommand shares: the site configuration and the hub
/// API access.
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// Path to the site configuration YAML
    #[arg(long, env = "EDGECLUSTERS_FILE")]
    pub config: String,

    /// Path to the hub kubeconfig file
    /// If not specified, uses default kubeconfig resolution (KUBECONFIG env or ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<std::path::PathBuf>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,
}

/// Everything a subcommand needs: the enriched site model, the hub
/// client, and the template engine.
pub struct Session {
    pub config: Config,
    pub hub: Arc<EdgeKubeClientImpl>,
    pub engine: Arc<Engine>,
}

impl CommonArgs {
    pub async fn open(&self) -> Result<Session> {
        let mut config = loader::load(self.config.as_str())?;
        let hub = Arc::new(
            EdgeKubeClientImpl::new(ClientOptions {
                kubeconfig: self.kubeconfig.clone(),
                context: self.context.clone(),
                ..Default::default()
            })
            .await?,
        );
        Enricher::new(hub.clone()).enrich(&mut config).await?;
        let engine = Arc::new(Engine::new(data::templates())?);
        Ok(Session {
            config,
            hub,
            engine,
        })
    }
}

/// Parses durations of the form `300s`, `10m` or `2h`. Plain numbers
/// are seconds; `0` disables the wait.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    let (number, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(at) => value.split_at(at),
        None => (value, "s"),
    };
    let count: u64 = number
        .parse()
        .map_err(|_| EdgeError::config(format!("invalid duration '{}'", value)))?;
    let seconds = match unit {
        "s" => count,
        "m" => count * 60,
        "h" => count * 3600,
        _ => return Err(EdgeError::config(format!("invalid duration '{}'", value))),
    };
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("").is_err());
    }
}
