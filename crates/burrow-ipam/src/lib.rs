//! IP address allocation for the VPN tunnel subnet.
//!
//! One [`Ipam`] manages a single IPv4 subnet. Each WireGuard public key gets
//! at most one address; re-registering the same key returns the same address
//! (allocation is idempotent). A rotating cursor cycles through the whole
//! host range before any released address is reused, so a freed address is
//! not immediately handed to the next peer.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use parking_lot::Mutex;
use tracing::debug;

/// Minimum prefix length accepted. Anything shorter would allow the free
/// scan to walk millions of candidate hosts.
const MIN_PREFIX_LEN: u8 = 16;

/// Errors that can occur during IP allocation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IpamError {
    /// The subnet CIDR could not be parsed.
    #[error("invalid CIDR {cidr:?}: {reason}")]
    InvalidCidr {
        /// The CIDR string that failed to parse.
        cidr: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// The subnet prefix is shorter than the supported minimum.
    #[error("subnet /{0} is too large; minimum prefix length is /{MIN_PREFIX_LEN}")]
    SubnetTooLarge(u8),

    /// Every usable host address is taken.
    #[error("no available IP addresses in subnet {0}")]
    PoolExhausted(Ipv4Net),
}

#[derive(Debug)]
struct IpamState {
    /// pubkey -> assigned IP
    allocated: HashMap<String, Ipv4Addr>,
    /// assigned IP -> pubkey
    used: HashMap<Ipv4Addr, String>,
    /// Next host number to try; starts at 2 (1 is the gateway).
    next_host: u32,
}

/// Allocator for tunnel-internal addresses within one subnet.
///
/// The gateway (the address part of the configured CIDR, e.g. `10.0.0.1` of
/// `10.0.0.1/24`) is reserved, as are the network and broadcast addresses.
#[derive(Debug)]
pub struct Ipam {
    network: Ipv4Net,
    gateway: Ipv4Addr,
    state: Mutex<IpamState>,
}

impl Ipam {
    /// Creates an allocator for the given CIDR (e.g. `"10.0.0.1/24"`).
    ///
    /// # Errors
    ///
    /// Returns an error if the CIDR is malformed or the prefix is shorter
    /// than /16.
    pub fn new(cidr: &str) -> Result<Self, IpamError> {
        let network: Ipv4Net = cidr.parse().map_err(|e| IpamError::InvalidCidr {
            cidr: cidr.to_string(),
            reason: format!("{e}"),
        })?;

        if network.prefix_len() < MIN_PREFIX_LEN {
            return Err(IpamError::SubnetTooLarge(network.prefix_len()));
        }

        Ok(Self {
            gateway: network.addr(),
            network,
            state: Mutex::new(IpamState {
                allocated: HashMap::new(),
                used: HashMap::new(),
                next_host: 2,
            }),
        })
    }

    /// Last usable host number (excludes network and broadcast addresses).
    fn max_host(&self) -> u32 {
        let host_bits = 32 - u32::from(self.network.prefix_len());
        (1u32 << host_bits) - 2
    }

    /// Assigns an address to the given public key.
    ///
    /// Idempotent: if the key already holds an address, that address is
    /// returned. Otherwise the scan starts at the cursor and wraps through
    /// the whole host range, skipping the gateway and taken addresses.
    ///
    /// # Errors
    ///
    /// Returns [`IpamError::PoolExhausted`] when no free host remains.
    pub fn allocate(&self, public_key: &str) -> Result<Ipv4Addr, IpamError> {
        let mut state = self.state.lock();

        if let Some(ip) = state.allocated.get(public_key) {
            return Ok(*ip);
        }

        let ip = self.find_available(&mut state)?;
        state.allocated.insert(public_key.to_string(), ip);
        state.used.insert(ip, public_key.to_string());
        debug!(%ip, peers = state.allocated.len(), "allocated tunnel address");
        Ok(ip)
    }

    fn find_available(&self, state: &mut IpamState) -> Result<Ipv4Addr, IpamError> {
        let max_host = self.max_host();
        let base = u32::from(self.network.network());
        let gateway = u32::from(self.gateway);

        for i in 0..max_host {
            // Wrap the host number within [1, max_host].
            let host_num = (state.next_host - 1 + i) % max_host + 1;
            let candidate_bits = base + host_num;
            let candidate = Ipv4Addr::from(candidate_bits);

            if candidate_bits == gateway {
                continue;
            }
            if state.used.contains_key(&candidate) {
                continue;
            }

            state.next_host = if host_num + 1 > max_host {
                1
            } else {
                host_num + 1
            };
            return Ok(candidate);
        }

        Err(IpamError::PoolExhausted(self.network))
    }

    /// Frees the address held by the given public key. Silent no-op when the
    /// key has no allocation.
    pub fn release(&self, public_key: &str) {
        let mut state = self.state.lock();
        if let Some(ip) = state.allocated.remove(public_key) {
            state.used.remove(&ip);
            debug!(%ip, "released tunnel address");
        }
    }

    /// Returns the address held by the given public key, if any.
    #[must_use]
    pub fn get(&self, public_key: &str) -> Option<Ipv4Addr> {
        self.state.lock().allocated.get(public_key).copied()
    }

    /// Number of live allocations.
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.state.lock().allocated.len()
    }

    /// The gateway address reserved for the server.
    #[must_use]
    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    /// The managed subnet.
    #[must_use]
    pub fn network(&self) -> Ipv4Net {
        self.network
    }
}
