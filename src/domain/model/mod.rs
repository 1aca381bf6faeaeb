//! Typed representation of the site configuration

pub mod cluster;
pub mod config;
pub mod ip;
pub mod node;

pub use cluster::{
    ApiEndpoints, Cluster, ClusterNetwork, Dns, Ingress, Registry, SshKeyPair,
};
pub use config::Config;
pub use ip::Ip;
pub use node::{Bmc, Nic, Node, NodeKind};
