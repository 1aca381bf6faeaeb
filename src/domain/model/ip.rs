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
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// An address together with a prefix length, written `A.B.C.D/N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ip {
    pub address: IpAddr,
    pub prefix: u8,
}

impl Ip {
    pub fn new(address: IpAddr, prefix: u8) -> Self {
        Self { address, prefix }
    }
}

impl FromStr for Ip {
    type Err = EdgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = s
            .split_once('/')
            .ok_or_else(|| EdgeError::Config(format!("IP '{}' is missing the '/N' prefix", s)))?;
        let address = address
            .parse::<IpAddr>()
            .map_err(|e| EdgeError::Config(format!("invalid IP address '{}': {}", address, e)))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|e| EdgeError::Config(format!("invalid IP prefix '{}': {}", prefix, e)))?;
        Ok(Self { address, prefix })
    }
}

impl fmt::Display for Ip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_round_trip() {
        let ip: Ip = "192.168.122.123/24".parse().unwrap();
        assert_eq!(ip.address, "192.168.122.123".parse::<IpAddr>().unwrap());
        assert_eq!(ip.prefix, 24);
        assert_eq!(ip.to_string(), "192.168.122.123/24");
    }

    #[test]
    fn test_ip_missing_slash() {
        assert!("192.168.122.123".parse::<Ip>().is_err());
    }

    #[test]
    fn test_ip_bad_prefix() {
        assert!("192.168.122.123/abc".parse::<Ip>().is_err());
    }
}
