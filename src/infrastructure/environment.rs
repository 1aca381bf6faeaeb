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

use crate::shared::error::{EdgeError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Builds a deterministically ordered list of `KEY=VALUE` strings for
/// subprocess invocations. Later `set_var` calls overwrite earlier ones
/// and the output is sorted by key.
#[derive(Debug, Default)]
pub struct EnvBuilder {
    vars: BTreeMap<String, String>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds variables from existing `KEY=VALUE` strings, for example
    /// the current process environment. Malformed entries are skipped.
    pub fn set_env<I, S>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pair in pairs {
            if let Some((key, value)) = pair.as_ref().split_once('=') {
                self.vars.insert(key.to_string(), value.to_string());
            }
        }
        self
    }

    /// Sets one variable from any scalar value: unit becomes empty,
    /// strings pass through, booleans and numbers use their textual
    /// form. Sequences and mappings are rejected.
    pub fn set_var<V: Serialize>(&mut self, name: &str, value: V) -> Result<&mut Self> {
        let text = match serde_json::to_value(value)? {
            Value::Null => String::new(),
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(EdgeError::EnvTypeUnsupported(name.to_string()))
            }
        };
        self.vars.insert(name.to_string(), text);
        Ok(self)
    }

    pub fn build(&self) -> Vec<String> {
        self.vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_sorted_by_key() {
        let mut builder = EnvBuilder::new();
        builder.set_var("ZEBRA", "z").unwrap();
        builder.set_var("ALPHA", "a").unwrap();
        builder.set_var("MIKE", "m").unwrap();
        assert_eq!(builder.build(), vec!["ALPHA=a", "MIKE=m", "ZEBRA=z"]);
    }

    #[test]
    fn test_supported_value_forms() {
        let mut builder = EnvBuilder::new();
        builder.set_var("EMPTY", ()).unwrap();
        builder.set_var("TEXT", "value").unwrap();
        builder.set_var("FLAG", true).unwrap();
        builder.set_var("COUNT", 42).unwrap();
        builder.set_var("RATIO", 1.5).unwrap();
        assert_eq!(
            builder.build(),
            vec!["COUNT=42", "EMPTY=", "FLAG=true", "RATIO=1.5", "TEXT=value"]
        );
    }

    #[test]
    fn test_unsupported_value_type() {
        let mut builder = EnvBuilder::new();
        let result = builder.set_var("LIST", vec![1, 2, 3]);
        assert!(matches!(result, Err(EdgeError::EnvTypeUnsupported(_))));
    }

    #[test]
    fn test_later_set_var_overwrites() {
        let mut builder = EnvBuilder::new();
        builder.set_var("KEY", "first").unwrap();
        builder.set_var("KEY", "second").unwrap();
        assert_eq!(builder.build(), vec!["KEY=second"]);
    }

    #[test]
    fn test_set_env_seeds_pairs() {
        let mut builder = EnvBuilder::new();
        builder.set_env(["PATH=/usr/bin", "HOME=/root", "garbage"]);
        assert_eq!(builder.build(), vec!["HOME=/root", "PATH=/usr/bin"]);
    }
}
