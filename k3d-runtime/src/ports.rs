use k3d_core::{K3dError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A published port: `host_ip:host_port` on the host forwards to `container_port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortBinding {
    /// Host interface to bind; `0.0.0.0` means all interfaces.
    #[serde(default = "default_host_ip")]
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
    /// The network protocol (TCP or UDP). Defaults to TCP.
    #[serde(default)]
    pub protocol: Protocol,
}

/// Represents the network protocol for a port binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

fn default_host_ip() -> String {
    "0.0.0.0".to_string()
}

impl PortBinding {
    /// Bind `host_port` on all host interfaces to a TCP `container_port`.
    pub fn all_interfaces(host_port: u16, container_port: u16) -> Self {
        Self {
            host_ip: default_host_ip(),
            host_port,
            container_port,
            protocol: Protocol::Tcp,
        }
    }

    /// Parse `[host_ip:]host_port:container_port[/protocol]`.
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            K3dError::Config(format!("Invalid port spec '{}': {}", spec, reason))
        };

        let (addr, protocol) = match spec.split_once('/') {
            Some((addr, proto)) => (addr, proto.parse::<Protocol>().map_err(|e| invalid(&e))?),
            None => (spec, Protocol::Tcp),
        };

        // parsed right to left: container, host, then the optional address
        let mut parts = addr.rsplitn(3, ':');
        let container = parts.next().ok_or_else(|| invalid("missing container port"))?;
        let host = parts.next().ok_or_else(|| invalid("missing host port"))?;
        let host_ip = match parts.next() {
            Some("") => return Err(invalid("empty host address")),
            Some(ip) => ip.to_string(),
            None => default_host_ip(),
        };

        let parse_port = |value: &str, what: &str| -> Result<u16> {
            match value.parse::<u16>() {
                Ok(0) | Err(_) => Err(invalid(&format!("{} '{}' is not a valid port", what, value))),
                Ok(port) => Ok(port),
            }
        };

        Ok(Self {
            host_ip,
            host_port: parse_port(host, "host port")?,
            container_port: parse_port(container, "container port")?,
            protocol,
        })
    }

    /// The `port/proto` key the container exposes.
    pub fn exposed_port(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol)
    }
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}/{}",
            self.host_ip, self.host_port, self.container_port, self.protocol
        )
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(format!("unknown protocol '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_spec() {
        let binding = PortBinding::parse("0.0.0.0:5001:5000/tcp").expect("valid spec");
        assert_eq!(binding, PortBinding::all_interfaces(5001, 5000));
        assert_eq!(binding.to_string(), "0.0.0.0:5001:5000/tcp");
        assert_eq!(binding.exposed_port(), "5000/tcp");
    }

    #[test]
    fn test_parse_defaults() {
        let binding = PortBinding::parse("8080:80").expect("valid spec");
        assert_eq!(binding.host_ip, "0.0.0.0");
        assert_eq!(binding.protocol, Protocol::Tcp);

        let udp = PortBinding::parse("127.0.0.1:53:53/UDP").expect("valid spec");
        assert_eq!(udp.host_ip, "127.0.0.1");
        assert_eq!(udp.protocol, Protocol::Udp);
    }

    #[test]
    fn test_parse_rejects_bad_specs() {
        for spec in ["5000", "abc:5000", "5000:0", "70000:5000", ":5000:5000", "1:2/sctp"] {
            assert!(
                PortBinding::parse(spec).is_err(),
                "expected '{}' to be rejected",
                spec
            );
        }
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let binding: PortBinding =
            serde_json::from_str(r#"{"host_port": 6000, "container_port": 5000}"#)
                .expect("should deserialize");
        assert_eq!(binding, PortBinding::all_interfaces(6000, 5000));
    }
}
