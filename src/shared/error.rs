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

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EdgeError>;

#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Query produced {count} results but the output holds a single value")]
    UnmarshalMismatch { count: usize },

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Template '{0}' not found")]
    TemplateNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("SSH error: {0}")]
    Ssh(String),

    #[error("Resource not found: {kind} '{name}' in namespace '{namespace}'")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    #[error("Resource already exists: {kind} '{name}' in namespace '{namespace}'")]
    AlreadyExists {
        kind: String,
        name: String,
        namespace: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Failed to decode object: {0}")]
    Decode(String),

    #[error("Enrichment failed: {0}")]
    Enrichment(String),

    #[error("Cluster '{cluster}' reported error state '{state}' for {kind} '{name}'")]
    DownstreamReportedError {
        cluster: String,
        kind: String,
        name: String,
        state: String,
    },

    #[error("Command '{0}' not found in PATH")]
    SubprocessNotFound(String),

    #[error("Command '{command}' exited with code {code}")]
    SubprocessFailed { command: String, code: i32 },

    #[error("Unsupported environment variable type for '{0}'")]
    EnvTypeUnsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("exit code {0}")]
    Exit(i32),
}

impl EdgeError {
    pub fn config(context: impl Into<String>) -> Self {
        Self::Config(context.into())
    }

    pub fn not_found(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn already_exists(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Exit code the process should terminate with when this error reaches
    /// the outermost command. `Exit` carries its code through untouched,
    /// everything else maps to 1.
    pub fn code(&self) -> i32 {
        match self {
            EdgeError::Exit(code) => *code,
            _ => 1,
        }
    }
}

impl From<kube::Error> for EdgeError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => match ae.code {
                404 => EdgeError::NotFound {
                    kind: "object".to_string(),
                    name: ae.message,
                    namespace: String::new(),
                },
                409 if ae.reason == "AlreadyExists" => EdgeError::AlreadyExists {
                    kind: "object".to_string(),
                    name: ae.message,
                    namespace: String::new(),
                },
                409 => EdgeError::Conflict(ae.message),
                403 => EdgeError::Forbidden(ae.message),
                _ => EdgeError::Server(ae.message),
            },
            kube::Error::Service(e) => EdgeError::Transport(e.to_string()),
            kube::Error::HyperError(e) => EdgeError::Transport(e.to_string()),
            other => EdgeError::Server(other.to_string()),
        }
    }
}
