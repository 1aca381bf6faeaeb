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

//! Expands named text templates with a shared data context.

use crate::shared::error::{EdgeError, Result};
use base64::Engine as _;
use minijinja::Environment;
use serde::Serialize;
use std::collections::BTreeMap;

/// An engine over an in-memory tree of named templates. Templates may
/// reference each other by name within the same tree.
pub struct Engine {
    env: Environment<'static>,
    names: Vec<String>,
}

impl Engine {
    pub fn new(files: BTreeMap<String, String>) -> Result<Self> {
        let mut env = Environment::new();
        env.add_filter("b64encode", b64encode);
        env.add_filter("b64decode", b64decode);
        env.add_filter("json", to_json);

        let names: Vec<String> = files.keys().cloned().collect();
        for (name, source) in files {
            env.add_template_owned(name, source)?;
        }

        Ok(Self { env, names })
    }

    /// Renders the template identified by `name` with `data` as its
    /// context.
    pub fn execute<D: Serialize>(&self, name: &str, data: &D) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .map_err(|_| EdgeError::TemplateNotFound(name.to_string()))?;
        Ok(template.render(data)?)
    }

    /// Template names, in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Template names under `dir`, in lexical order.
    pub fn names_under<'a>(&'a self, dir: &str) -> Vec<&'a str> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.names()
            .filter(|name| name.starts_with(&prefix))
            .collect()
    }
}

fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

fn b64decode(value: String) -> std::result::Result<String, minijinja::Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| {
            minijinja::Error::new(
                minijinja::ErrorKind::InvalidOperation,
                format!("invalid base64: {}", e),
            )
        })?;
    String::from_utf8(bytes).map_err(|e| {
        minijinja::Error::new(
            minijinja::ErrorKind::InvalidOperation,
            format!("decoded base64 is not UTF-8: {}", e),
        )
    })
}

fn to_json(value: minijinja::Value) -> std::result::Result<String, minijinja::Error> {
    serde_json::to_string(&value).map_err(|e| {
        minijinja::Error::new(
            minijinja::ErrorKind::InvalidOperation,
            format!("cannot serialize to JSON: {}", e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> Engine {
        let mut files = BTreeMap::new();
        files.insert(
            "objects/greeting.txt".to_string(),
            "Hello {{ name }}!".to_string(),
        );
        files.insert(
            "objects/encoded.txt".to_string(),
            "{{ secret | b64encode }}".to_string(),
        );
        Engine::new(files).unwrap()
    }

    #[test]
    fn test_execute() {
        let out = engine()
            .execute("objects/greeting.txt", &json!({"name": "world"}))
            .unwrap();
        assert_eq!(out, "Hello world!");
    }

    #[test]
    fn test_b64encode_filter() {
        let out = engine()
            .execute("objects/encoded.txt", &json!({"secret": "hunter2"}))
            .unwrap();
        assert_eq!(out, "aHVudGVyMg==");
    }

    #[test]
    fn test_missing_template() {
        let result = engine().execute("objects/absent.txt", &json!({}));
        assert!(matches!(result, Err(EdgeError::TemplateNotFound(_))));
    }

    #[test]
    fn test_names_under() {
        let engine = engine();
        assert_eq!(
            engine.names_under("objects"),
            vec!["objects/encoded.txt", "objects/greeting.txt"]
        );
        assert!(engine.names_under("other").is_empty());
    }
}
