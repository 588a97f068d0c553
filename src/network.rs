//! Network planner.
//!
//! Derives every address the cluster needs from two CIDR inputs. Pure
//! function of its inputs, so re-runs against an existing root path always
//! produce the same plan.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::error::SetupError;

/// Derived cluster addressing. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPlan {
    /// Service cluster IP range.
    pub cluster_cidr: Ipv4Net,
    /// Pod IP range.
    pub pod_cidr: Ipv4Net,
    /// Kubernetes service address, offset 1 in the cluster CIDR.
    pub cluster_ip: Ipv4Addr,
    /// Cluster DNS address, offset 2 in the cluster CIDR.
    pub dns_ip: Ipv4Addr,
    /// Pod bridge gateway, offset 1 in the pod CIDR.
    pub pod_gateway_ip: Ipv4Addr,
}

/// Pick the Nth usable address inside a CIDR by adding N to the network
/// address. Fails when the result collides with the network or broadcast
/// address or falls outside the range.
pub fn nth_ip(net: &Ipv4Net, n: u32) -> Result<Ipv4Addr, SetupError> {
    let base = u32::from(net.network());
    let candidate = base.checked_add(n).ok_or_else(|| {
        SetupError::Addressing(format!("offset {} overflows address space of {}", n, net))
    })?;
    let ip = Ipv4Addr::from(candidate);
    if !net.contains(&ip) || ip == net.network() || ip == net.broadcast() {
        return Err(SetupError::Addressing(format!(
            "offset {} does not yield a usable address in {}",
            n, net
        )));
    }
    Ok(ip)
}

impl NetworkPlan {
    /// Plan cluster addressing from the service and pod CIDRs.
    pub fn plan(cluster_cidr: &str, pod_cidr: &str) -> Result<Self, SetupError> {
        let cluster: Ipv4Net = cluster_cidr.parse().map_err(|e| {
            SetupError::Config(format!("invalid cluster CIDR {:?}: {}", cluster_cidr, e))
        })?;
        let pod: Ipv4Net = pod_cidr
            .parse()
            .map_err(|e| SetupError::Config(format!("invalid pod CIDR {:?}: {}", pod_cidr, e)))?;

        let plan = NetworkPlan {
            cluster_ip: nth_ip(&cluster, 1)?,
            dns_ip: nth_ip(&cluster, 2)?,
            pod_gateway_ip: nth_ip(&pod, 1)?,
            cluster_cidr: cluster,
            pod_cidr: pod,
        };
        tracing::debug!(
            "[NetworkPlan] cluster={} cluster_ip={} dns_ip={} pod={} gateway={}",
            plan.cluster_cidr,
            plan.cluster_ip,
            plan.dns_ip,
            plan.pod_cidr,
            plan.pod_gateway_ip
        );
        Ok(plan)
    }
}

/// Best-effort outbound IP detection: the address the host would use to reach
/// a public resolver. No packet is sent, connect() on UDP only selects a route.
pub fn outbound_ip() -> Result<Ipv4Addr, SetupError> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    match socket.local_addr()? {
        std::net::SocketAddr::V4(addr) => Ok(*addr.ip()),
        std::net::SocketAddr::V6(addr) => Err(SetupError::Addressing(format!(
            "expected an IPv4 outbound address, got {}",
            addr
        ))),
    }
}
