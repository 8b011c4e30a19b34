use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use chrono::Utc;

const NETPULSE_PORT: &str = "NETPULSE_PORT";

const DEFAULT_PORT: u16 = 8080;

pub fn get_default_port() -> u16 {
    DEFAULT_PORT
}

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(NETPULSE_PORT);
    port_from_env.map_or(DEFAULT_PORT, |res| res.parse().unwrap_or(DEFAULT_PORT))
}

const NETPULSE_ADDR: &str = "NETPULSE_ADDR";

const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

pub fn get_addr() -> IpAddr {
    let addr_from_env = std::env::var(NETPULSE_ADDR);
    addr_from_env.map_or(IpAddr::V4(DEFAULT_ADDR), |res| {
        res.parse().unwrap_or(IpAddr::V4(DEFAULT_ADDR))
    })
}

/// Bind address from `NETPULSE_ADDR`/`NETPULSE_PORT`, falling back to the defaults
pub fn get_bind_addr() -> SocketAddr {
    SocketAddr::new(get_addr(), get_port())
}

/// Process-unique identifier used when registering with the load balancer
pub fn generate_instance_id() -> String {
    let hostname = sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string());
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{hostname}-{nanos}")
}
