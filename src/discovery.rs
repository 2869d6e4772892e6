//! SSDP discovery of HEOS devices.
//!
//! One M-SEARCH per attempt goes to the SSDP multicast group from a socket
//! bound on the local outbound interface; devices answer unicast to that
//! socket. Responses are collected until the attempt times out.

use crate::error::{HeosError, Result};
use crate::types::DeviceDescriptor;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::{BTreeMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::Instrument;

/// SSDP multicast group
pub const SSDP_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

pub const SSDP_PORT: u16 = 1900;

/// Search target HEOS devices answer to
pub const HEOS_SEARCH_TARGET: &str = "urn:schemas-denon-com:device:ACT-Denon:1";

const RECV_BUFFER: usize = 4096;

/// Discovery settings
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Where M-SEARCH requests are sent
    pub target: SocketAddrV4,
    pub search_target: String,
    /// How long each attempt collects responses
    pub timeout: Duration,
    /// Number of attempts
    pub retries: u32,
    /// Seconds a device may wait before answering
    pub mx: u32,
    pub ttl: u32,
    /// Local address to bind; the outbound interface address when unset
    pub bind_ip: Option<Ipv4Addr>,
    pub bind_port: u16,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            target: SocketAddrV4::new(SSDP_ADDR, SSDP_PORT),
            search_target: HEOS_SEARCH_TARGET.to_string(),
            timeout: Duration::from_secs(5),
            retries: 1,
            mx: 3,
            ttl: 3,
            bind_ip: None,
            bind_port: 12112,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_search_target(mut self, search_target: impl Into<String>) -> Self {
        self.search_target = search_target.into();
        self
    }

    /// Bind to `ip:port` instead of the outbound interface and port 12112
    pub fn with_bind(mut self, ip: Ipv4Addr, port: u16) -> Self {
        self.bind_ip = Some(ip);
        self.bind_port = port;
        self
    }
}

/// Discover HEOS devices with the default settings and the given budget
pub async fn discover(timeout: Duration, retries: u32, mx: u32) -> Result<Vec<DeviceDescriptor>> {
    Discovery::new(DiscoveryConfig {
        timeout,
        retries,
        mx,
        ..DiscoveryConfig::default()
    })
    .discover()
    .await
}

/// SSDP search for devices answering one search target
///
/// # Example
///
/// ```no_run
/// use heos_control::{Discovery, DiscoveryConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let devices = Discovery::new(DiscoveryConfig::default()).discover().await?;
///     for device in devices {
///         println!("Found {:?} at {}", device.server, device.location);
///     }
///     Ok(())
/// }
/// ```
pub struct Discovery {
    config: DiscoveryConfig,
}

impl Discovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Run every attempt and return the devices seen, first answer first.
    ///
    /// Devices answering several attempts are listed once. No answers is an
    /// empty list.
    pub async fn discover(&self) -> Result<Vec<DeviceDescriptor>> {
        let span = tracing::debug_span!("discovery", st = %self.config.search_target);
        async {
            let local_ip = match self.config.bind_ip {
                Some(ip) => ip,
                None => outbound_ipv4()?,
            };
            let message = build_msearch_message(&self.config);

            let mut seen = HashSet::new();
            let mut devices = Vec::new();

            for attempt in 1..=self.config.retries.max(1) {
                let socket = create_socket(local_ip, &self.config)?;
                socket
                    .send_to(message.as_bytes(), SocketAddr::V4(self.config.target))
                    .await?;
                tracing::debug!(
                    "Sent M-SEARCH from {} to {} (attempt {})",
                    local_ip,
                    self.config.target,
                    attempt
                );

                for device in collect_responses(&socket, self.config.timeout).await {
                    if seen.insert(device.location.clone()) {
                        tracing::info!("Discovered device at {}", device.location);
                        devices.push(device);
                    }
                }
            }

            tracing::debug!("Discovery finished with {} device(s)", devices.len());
            Ok(devices)
        }
        .instrument(span)
        .await
    }
}

fn outbound_ipv4() -> Result<Ipv4Addr> {
    match local_ip_address::local_ip() {
        Ok(IpAddr::V4(ip)) => Ok(ip),
        Ok(IpAddr::V6(ip)) => Err(HeosError::Discovery(format!(
            "outbound interface has no IPv4 address ({})",
            ip
        ))),
        Err(e) => Err(HeosError::Discovery(format!(
            "cannot determine local address: {}",
            e
        ))),
    }
}

pub(crate) fn build_msearch_message(config: &DiscoveryConfig) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         ST: {}\r\n\
         MX: {}\r\n\r\n",
        config.target, config.search_target, config.mx
    )
}

/// Socket for one attempt. Multicast options are applied only when the
/// target is a multicast group, and failures there are not fatal.
fn create_socket(local_ip: Ipv4Addr, config: &DiscoveryConfig) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    if let Err(e) = socket.set_reuse_address(true) {
        tracing::warn!("Failed to set SO_REUSEADDR on {}: {}", local_ip, e);
    }

    let group = *config.target.ip();
    if group.is_multicast() {
        if let Err(e) = socket.set_multicast_ttl_v4(config.ttl) {
            tracing::warn!("Failed to set multicast TTL on {}: {}", local_ip, e);
        }
        if let Err(e) = socket.set_multicast_if_v4(&local_ip) {
            tracing::warn!("Failed to set multicast interface {}: {}", local_ip, e);
        }
        if let Err(e) = socket.join_multicast_v4(&group, &local_ip) {
            tracing::warn!("Failed to join {} on {}: {}", group, local_ip, e);
        }
    }

    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::new(IpAddr::V4(local_ip), config.bind_port).into())?;

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Read responses until `window` elapses
async fn collect_responses(socket: &UdpSocket, window: Duration) -> Vec<DeviceDescriptor> {
    let deadline = Instant::now() + window;
    let mut buf = vec![0u8; RECV_BUFFER];
    let mut devices = Vec::new();

    loop {
        match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => break,
            Ok(Err(e)) => {
                tracing::warn!("SSDP receive failed: {}", e);
                break;
            }
            Ok(Ok((len, from))) => {
                let text = String::from_utf8_lossy(&buf[..len]);
                match parse_ssdp_response(&text) {
                    Some(device) => devices.push(device),
                    None => tracing::trace!("Ignoring SSDP datagram from {}", from),
                }
            }
        }
    }

    devices
}

/// Parse one SSDP response into a descriptor.
///
/// Returns `None` for anything that is not an HTTP response carrying a
/// LOCATION header (M-SEARCH requests echoed back, NOTIFY, garbage).
pub fn parse_ssdp_response(response: &str) -> Option<DeviceDescriptor> {
    let mut lines = response.lines();
    let status = lines.next()?.trim();
    if status.len() < 5 || !status.as_bytes()[..5].eq_ignore_ascii_case(b"HTTP/") {
        return None;
    }

    let mut headers = BTreeMap::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        headers.insert(name.to_ascii_uppercase(), value.trim().to_string());
    }

    let location = headers.get("LOCATION").filter(|l| !l.is_empty())?.clone();
    Some(DeviceDescriptor {
        location,
        service_type: headers.get("ST").cloned(),
        usn: headers.get("USN").cloned(),
        cache_control: headers.get("CACHE-CONTROL").cloned(),
        server: headers.get("SERVER").cloned(),
        headers,
    })
}
