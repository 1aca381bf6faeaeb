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

//! Runs external tools with an explicit environment, a private working
//! directory and stdio inherited from the parent.

use crate::shared::error::{EdgeError, Result};
use std::path::Path;
use std::process::Stdio;
use tracing::debug;

pub struct ProcessSpec<'a> {
    pub program: &'a str,
    pub args: &'a [String],
    pub env: &'a [String],
    pub dir: &'a Path,
}

/// Runs the process to completion, propagating its exit code. The
/// child's environment is exactly `env`, nothing is inherited.
pub async fn run(spec: ProcessSpec<'_>) -> Result<()> {
    debug!(
        program = spec.program,
        args = ?spec.args,
        dir = %spec.dir.display(),
        "running subprocess"
    );

    let mut command = tokio::process::Command::new(spec.program);
    command
        .args(spec.args)
        .current_dir(spec.dir)
        .env_clear()
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    for pair in spec.env {
        if let Some((key, value)) = pair.split_once('=') {
            command.env(key, value);
        }
    }

    let status = command.status().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EdgeError::SubprocessNotFound(spec.program.to_string())
        } else {
            EdgeError::Io(e)
        }
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(EdgeError::SubprocessFailed {
            command: spec.program.to_string(),
            code: status.code().unwrap_or(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(ProcessSpec {
            program: "definitely-not-a-real-binary",
            args: &[],
            env: &[],
            dir: dir.path(),
        })
        .await;
        assert!(matches!(result, Err(EdgeError::SubprocessNotFound(_))));
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let args = vec!["-c".to_string(), "exit 3".to_string()];
        let result = run(ProcessSpec {
            program: "sh",
            args: &args,
            env: &["PATH=/usr/bin:/bin".to_string()],
            dir: dir.path(),
        })
        .await;
        assert!(matches!(
            result,
            Err(EdgeError::SubprocessFailed { code: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_success() {
        let dir = tempfile::tempdir().unwrap();
        let args = vec!["-c".to_string(), "true".to_string()];
        run(ProcessSpec {
            program: "sh",
            args: &args,
            env: &["PATH=/usr/bin:/bin".to_string()],
            dir: dir.path(),
        })
        .await
        .unwrap();
    }
}
