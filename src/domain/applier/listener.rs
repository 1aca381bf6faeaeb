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

use crate::shared::error::EdgeError;
use colored::Colorize;
use kube::core::DynamicObject;
use tracing::debug;

#[derive(Debug)]
pub enum ApplyEvent<'a> {
    WillCreate(&'a DynamicObject),
    Created(&'a DynamicObject),
    AlreadyExists(&'a DynamicObject),
    WillDelete(&'a DynamicObject),
    Deleted(&'a DynamicObject),
    NotFound(&'a DynamicObject),
    Error {
        object: &'a DynamicObject,
        error: &'a EdgeError,
    },
}

pub trait ApplyListener: Send + Sync {
    fn on_event(&self, event: ApplyEvent<'_>);
}

/// Swallows all events. Useful for render-only paths and tests.
pub struct NullListener;

impl ApplyListener for NullListener {
    fn on_event(&self, _event: ApplyEvent<'_>) {}
}

/// Prints a per-object progress line for every mutating call.
pub struct ConsoleListener;

impl ApplyListener for ConsoleListener {
    fn on_event(&self, event: ApplyEvent<'_>) {
        match event {
            ApplyEvent::WillCreate(obj) => {
                debug!(object = %coordinates(obj), "creating");
            }
            ApplyEvent::Created(obj) => {
                println!(
                    "{}",
                    format!("Created {} '{}'", friendly_kind(obj), coordinates(obj)).green()
                );
            }
            ApplyEvent::AlreadyExists(obj) => {
                println!(
                    "{}",
                    format!(
                        "{} '{}' already exists",
                        capitalize(&friendly_kind(obj)),
                        coordinates(obj)
                    )
                    .yellow()
                );
            }
            ApplyEvent::WillDelete(obj) => {
                debug!(object = %coordinates(obj), "deleting");
            }
            ApplyEvent::Deleted(obj) => {
                println!(
                    "{}",
                    format!("Deleted {} '{}'", friendly_kind(obj), coordinates(obj)).green()
                );
            }
            ApplyEvent::NotFound(obj) => {
                println!(
                    "{}",
                    format!(
                        "{} '{}' does not exist",
                        capitalize(&friendly_kind(obj)),
                        coordinates(obj)
                    )
                    .yellow()
                );
            }
            ApplyEvent::Error { object, error } => {
                eprintln!(
                    "{}",
                    format!(
                        "Failed to apply {} '{}': {}",
                        friendly_kind(object),
                        coordinates(object),
                        error
                    )
                    .red()
                );
            }
        }
    }
}

/// `ns/name` for namespaced objects, `name` otherwise.
pub fn coordinates(obj: &DynamicObject) -> String {
    let name = obj.metadata.name.as_deref().unwrap_or("");
    match obj.metadata.namespace.as_deref() {
        Some(ns) => format!("{}/{}", ns, name),
        None => name.to_string(),
    }
}

/// Splits the kind's camel case into lowercase words, so progress lines
/// read "bare metal host" instead of "BareMetalHost".
pub fn friendly_kind(obj: &DynamicObject) -> String {
    let kind = obj
        .types
        .as_ref()
        .map(|t| t.kind.as_str())
        .unwrap_or("object");
    let mut words = String::new();
    for (i, c) in kind.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                words.push(' ');
            }
            words.extend(c.to_lowercase());
        } else {
            words.push(c);
        }
    }
    words
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(kind: &str, namespace: Option<&str>, name: &str) -> DynamicObject {
        let mut value = json!({
            "apiVersion": "v1",
            "kind": kind,
            "metadata": {"name": name},
        });
        if let Some(ns) = namespace {
            value["metadata"]["namespace"] = json!(ns);
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_friendly_kind() {
        assert_eq!(friendly_kind(&object("Namespace", None, "a")), "namespace");
        assert_eq!(
            friendly_kind(&object("BareMetalHost", Some("ns"), "a")),
            "bare metal host"
        );
        assert_eq!(friendly_kind(&object("ConfigMap", Some("ns"), "a")), "config map");
    }

    #[test]
    fn test_coordinates() {
        assert_eq!(coordinates(&object("Namespace", None, "edge0")), "edge0");
        assert_eq!(
            coordinates(&object("Secret", Some("edge0"), "pull")),
            "edge0/pull"
        );
    }
}
