use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunable constants from the spec, with the defaults it mandates. A
/// conforming deployment may override any of these via `ringchat.toml` (or
/// `ringchat.yaml`/`.json`, whatever `config` finds) or `RINGCHAT_*`
/// environment variables, but a zero-config run matches the spec exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeConfig {
    pub multicast_group: Ipv4Addr,
    pub multicast_port: u16,
    pub multicast_ttl: u32,
    pub hello_interval: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub peer_staleness: Duration,
    pub election_cooldown: Duration,
    pub startup_election_delay: Duration,
    pub connect_timeout: Duration,
    pub client_write_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            multicast_group: Ipv4Addr::new(224, 1, 1, 1),
            multicast_port: 50000,
            multicast_ttl: 2,
            hello_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(2),
            heartbeat_timeout: Duration::from_secs(6),
            peer_staleness: Duration::from_secs(10),
            election_cooldown: Duration::from_secs(2),
            startup_election_delay: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(2),
            client_write_timeout: Duration::from_secs(2),
        }
    }
}

/// Plain-seconds mirror of [`NodeConfig`], the shape the `config` crate
/// actually deserializes (duration-as-struct-field has no natural TOML/env
/// representation, so raw seconds are converted after layering).
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct RawNodeConfig {
    multicast_group: Ipv4Addr,
    multicast_port: u16,
    multicast_ttl: u32,
    hello_interval_secs: u64,
    heartbeat_interval_secs: u64,
    heartbeat_timeout_secs: u64,
    peer_staleness_secs: u64,
    election_cooldown_secs: u64,
    startup_election_delay_secs: u64,
    connect_timeout_secs: u64,
    client_write_timeout_secs: u64,
}

impl Default for RawNodeConfig {
    fn default() -> Self {
        let d = NodeConfig::default();
        RawNodeConfig {
            multicast_group: d.multicast_group,
            multicast_port: d.multicast_port,
            multicast_ttl: d.multicast_ttl,
            hello_interval_secs: d.hello_interval.as_secs(),
            heartbeat_interval_secs: d.heartbeat_interval.as_secs(),
            heartbeat_timeout_secs: d.heartbeat_timeout.as_secs(),
            peer_staleness_secs: d.peer_staleness.as_secs(),
            election_cooldown_secs: d.election_cooldown.as_secs(),
            startup_election_delay_secs: d.startup_election_delay.as_secs(),
            connect_timeout_secs: d.connect_timeout.as_secs(),
            client_write_timeout_secs: d.client_write_timeout.as_secs(),
        }
    }
}

impl From<RawNodeConfig> for NodeConfig {
    fn from(raw: RawNodeConfig) -> Self {
        NodeConfig {
            multicast_group: raw.multicast_group,
            multicast_port: raw.multicast_port,
            multicast_ttl: raw.multicast_ttl,
            hello_interval: Duration::from_secs(raw.hello_interval_secs),
            heartbeat_interval: Duration::from_secs(raw.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(raw.heartbeat_timeout_secs),
            peer_staleness: Duration::from_secs(raw.peer_staleness_secs),
            election_cooldown: Duration::from_secs(raw.election_cooldown_secs),
            startup_election_delay: Duration::from_secs(raw.startup_election_delay_secs),
            connect_timeout: Duration::from_secs(raw.connect_timeout_secs),
            client_write_timeout: Duration::from_secs(raw.client_write_timeout_secs),
        }
    }
}

/// Load the node configuration: defaults, optionally overridden by a
/// `ringchat.{toml,yaml,json,...}` file in the working directory, then by
/// `RINGCHAT_*` environment variables.
pub fn load() -> Result<NodeConfig> {
    let raw: RawNodeConfig = config::Config::builder()
        .add_source(config::Config::try_from(&RawNodeConfig::default())?)
        .add_source(config::File::with_name("ringchat").required(false))
        .add_source(config::Environment::with_prefix("RINGCHAT"))
        .build()?
        .try_deserialize()?;
    Ok(raw.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.hello_interval, Duration::from_secs(1));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(6));
        assert_eq!(cfg.peer_staleness, Duration::from_secs(10));
        assert_eq!(cfg.election_cooldown, Duration::from_secs(2));
        assert_eq!(cfg.startup_election_delay, Duration::from_secs(2));
        assert_eq!(cfg.connect_timeout, Duration::from_secs(2));
        assert_eq!(cfg.multicast_group, Ipv4Addr::new(224, 1, 1, 1));
        assert_eq!(cfg.multicast_port, 50000);
        assert_eq!(cfg.multicast_ttl, 2);
    }
}
