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

//! TCP forwarding over SSH. The tunnel binds a loopback listener and
//! pipes every accepted connection into a `direct-tcpip` channel to the
//! target, so an HTTPS client pointed at the loopback address reaches
//! the API server through the node.

use crate::shared::error::{EdgeError, Result};
use russh::client;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// How to reach the node that carries the tunnel. The private key is
/// PEM encoded. Host-key verification is disabled; bootstrap runs on
/// trusted networks and the fleet operator owns both ends.
#[derive(Debug, Clone)]
pub struct SshSpec {
    pub host: String,
    pub user: String,
    pub private_key: String,
}

struct AcceptAll;

#[async_trait::async_trait]
impl client::Handler for AcceptAll {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct SshTunnel {
    local_addr: SocketAddr,
    handle: Arc<client::Handle<AcceptAll>>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl SshTunnel {
    /// Connects to the node and starts forwarding loopback connections
    /// to `target_host:target_port`.
    pub async fn open(spec: &SshSpec, target_host: &str, target_port: u16) -> Result<Self> {
        let key = russh_keys::decode_secret_key(&spec.private_key, None)
            .map_err(|e| EdgeError::Ssh(format!("cannot decode private key: {}", e)))?;

        let addr = if spec.host.contains(':') {
            spec.host.clone()
        } else {
            format!("{}:22", spec.host)
        };
        let config = Arc::new(client::Config::default());
        let mut handle = client::connect(config, addr.as_str(), AcceptAll)
            .await
            .map_err(|e| EdgeError::Ssh(format!("cannot connect to '{}': {}", addr, e)))?;

        let authenticated = handle
            .authenticate_publickey(&spec.user, Arc::new(key))
            .await
            .map_err(|e| EdgeError::Ssh(format!("authentication failed: {}", e)))?;
        if !authenticated {
            return Err(EdgeError::Ssh(format!(
                "public key authentication as '{}' rejected by '{}'",
                spec.user, addr
            )));
        }
        let handle = Arc::new(handle);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
        let local_addr = listener.local_addr()?;
        debug!(
            node = %addr,
            target = %format!("{}:{}", target_host, target_port),
            local = %local_addr,
            "SSH tunnel established"
        );

        let forward_handle = handle.clone();
        let target_host = target_host.to_string();
        let accept_task = tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => break,
                };
                let handle = forward_handle.clone();
                let host = target_host.clone();
                tokio::spawn(async move {
                    match handle
                        .channel_open_direct_tcpip(host, target_port as u32, "127.0.0.1", 0)
                        .await
                    {
                        Ok(channel) => {
                            let mut stream = channel.into_stream();
                            let _ = tokio::io::copy_bidirectional(&mut socket, &mut stream).await;
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to open tunnel channel");
                        }
                    }
                });
            }
        });

        Ok(Self {
            local_addr,
            handle,
            accept_task,
        })
    }

    /// Loopback address the forwarder listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn close(&self) -> Result<()> {
        self.accept_task.abort();
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| EdgeError::Ssh(e.to_string()))
    }
}
