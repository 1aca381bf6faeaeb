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

use super::ip::Ip;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    ControlPlane,
    Worker,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bmc {
    pub url: Option<String>,
    pub user: Option<String>,
    pub pass: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nic {
    pub name: Option<String>,
    pub mac: Option<String>,
}

/// One machine in a cluster. `kind` stays unset when the name matches
/// neither the control-plane nor the worker pattern, and such nodes are
/// skipped by the control-plane filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub kind: Option<NodeKind>,
    pub hostname: Option<String>,
    pub bmc: Bmc,
    pub root_disk: Option<String>,
    pub storage_disks: Vec<String>,
    pub internal_nic: Nic,
    pub internal_ip: Option<Ip>,
    pub external_nic: Nic,
    pub external_ip: Option<Ip>,
    pub ignored_nics: Vec<String>,
}

fn control_plane_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^master\d+$").unwrap())
}

fn worker_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^worker\d+$").unwrap())
}

impl Node {
    pub fn kind_from_name(name: &str) -> Option<NodeKind> {
        if control_plane_re().is_match(name) {
            Some(NodeKind::ControlPlane)
        } else if worker_re().is_match(name) {
            Some(NodeKind::Worker)
        } else {
            None
        }
    }

    pub fn is_control_plane(&self) -> bool {
        self.kind == Some(NodeKind::ControlPlane)
    }

    pub fn is_worker(&self) -> bool {
        self.kind == Some(NodeKind::Worker)
    }

    /// Trailing numeric index of the node name, used for rack labeling
    /// and host addressing.
    pub fn index(&self) -> Option<u32> {
        let digits: String = self
            .name
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_name() {
        assert_eq!(Node::kind_from_name("master0"), Some(NodeKind::ControlPlane));
        assert_eq!(Node::kind_from_name("worker1"), Some(NodeKind::Worker));
        assert_eq!(Node::kind_from_name("master"), None);
        assert_eq!(Node::kind_from_name("worker1x"), None);
        assert_eq!(Node::kind_from_name("storage0"), None);
    }

    #[test]
    fn test_index() {
        let node = Node {
            name: "master12".to_string(),
            ..Default::default()
        };
        assert_eq!(node.index(), Some(12));

        let node = Node {
            name: "master".to_string(),
            ..Default::default()
        };
        assert_eq!(node.index(), None);
    }
}
