// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

use super::ResourceId;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32 for IPv4)")]
    InvalidPrefixLength(u8),

    #[error("Address {address} has host bits set for prefix /{prefix_length}")]
    UnalignedAddress { address: Ipv4Addr, prefix_length: u8 },

    #[error("Subnet group {name}: mask /{mask} must be between /{min} and /{max}")]
    InvalidSubnetMask { name: String, mask: u8, min: u8, max: u8 },

    #[error("Duplicate subnet group name: {0}")]
    DuplicateSubnetGroup(String),

    #[error("Network requires at least one {0} subnet group")]
    MissingSubnetKind(SubnetKind),

    #[error("At least one availability zone is required")]
    NoAvailabilityZones,

    #[error("Address space {cidr} cannot accommodate subnet group {group} in zone {zone}")]
    AddressSpaceExhausted {
        cidr: Ipv4Cidr,
        group: String,
        zone: String,
    },

    #[error("Subnets {0} and {1} overlap")]
    OverlappingSubnets(Ipv4Cidr, Ipv4Cidr),
}

/// IPv4 network in CIDR notation
///
/// Invariants:
/// - Prefix length 0-32
/// - Address is the network address (no host bits set)
///
/// # Examples
///
/// ```rust
/// use backend_stack::domain::Ipv4Cidr;
///
/// let net: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
/// assert_eq!(net.size(), 65536);
/// assert!("10.0.0.1/16".parse::<Ipv4Cidr>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    address: Ipv4Addr,
    prefix_length: u8,
}

impl Ipv4Cidr {
    /// Route matching every IPv4 destination
    pub const ANY: Ipv4Cidr = Ipv4Cidr {
        address: Ipv4Addr::UNSPECIFIED,
        prefix_length: 0,
    };

    /// `10.0.0.0/16`
    pub const DEFAULT_VPC: Ipv4Cidr = Ipv4Cidr {
        address: Ipv4Addr::new(10, 0, 0, 0),
        prefix_length: 16,
    };

    /// Create from separate address and prefix
    pub fn new(address: Ipv4Addr, prefix_length: u8) -> Result<Self, NetworkError> {
        if prefix_length > 32 {
            return Err(NetworkError::InvalidPrefixLength(prefix_length));
        }

        let bits = u32::from(address);
        if bits & !Self::mask_bits(prefix_length) != 0 {
            return Err(NetworkError::UnalignedAddress {
                address,
                prefix_length,
            });
        }

        Ok(Self {
            address,
            prefix_length,
        })
    }

    fn mask_bits(prefix_length: u8) -> u32 {
        if prefix_length == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_length))
        }
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    /// Number of addresses in the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_length))
    }

    /// First address as an integer
    pub fn first(&self) -> u64 {
        u64::from(u32::from(self.address))
    }

    /// One past the last address as an integer
    pub fn end(&self) -> u64 {
        self.first() + self.size()
    }

    /// Whether `other` lies entirely within `self`
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.first() >= self.first() && other.end() <= self.end()
    }

    /// Whether the two blocks share any address
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.first() < other.end() && other.first() < self.end()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_length)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, prefix_str) = s
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(s.to_string()))?;

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;

        let prefix_length = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(s.to_string()))?;

        Self::new(address, prefix_length)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(value: Ipv4Cidr) -> Self {
        value.to_string()
    }
}

/// Reachability class of a subnet group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetKind {
    /// Routes to the internet through the internet gateway
    Public,
    /// No route outside the network
    PrivateIsolated,
}

impl SubnetKind {
    pub fn has_internet_route(&self) -> bool {
        matches!(self, SubnetKind::Public)
    }
}

impl fmt::Display for SubnetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetKind::Public => write!(f, "public"),
            SubnetKind::PrivateIsolated => write!(f, "private-isolated"),
        }
    }
}

/// Requested subnet group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub name: String,
    pub cidr_mask: u8,
    pub kind: SubnetKind,
}

impl SubnetSpec {
    pub fn new(name: impl Into<String>, cidr_mask: u8, kind: SubnetKind) -> Self {
        Self {
            name: name.into(),
            cidr_mask,
            kind,
        }
    }
}

/// Where a route sends matching traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    /// Delivered inside the network
    Local,
    /// Sent to the internet gateway
    InternetGateway,
}

/// One route table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub destination: Ipv4Cidr,
    pub target: RouteTarget,
}

/// Allocated subnet in a single availability zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    /// Subnet group name
    pub group: String,
    pub kind: SubnetKind,
    pub availability_zone: String,
    pub cidr: Ipv4Cidr,
    pub routes: Vec<Route>,
}

impl Subnet {
    /// Logical id of the subnet, e.g. `public-subnet-1`
    pub fn logical_name(&self, index: usize) -> String {
        format!("{}-subnet-{}", self.group, index + 1)
    }

    /// Whether any route sends traffic to the internet gateway
    pub fn routes_to_internet(&self) -> bool {
        self.routes
            .iter()
            .any(|route| route.target == RouteTarget::InternetGateway)
    }
}

/// Virtual network with its subnet groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: ResourceId,
    pub cidr: Ipv4Cidr,
    pub availability_zones: Vec<String>,
    /// Requested groups, in declaration order
    pub groups: Vec<SubnetSpec>,
    /// Allocated subnets, group-major then zone order
    pub subnets: Vec<Subnet>,
    pub internet_gateway: bool,
}

impl Network {
    /// Subnets of one group, in zone order
    pub fn subnet_group(&self, name: &str) -> Vec<&Subnet> {
        self.subnets.iter().filter(|s| s.group == name).collect()
    }

    /// Subnets of one kind, in allocation order
    pub fn subnets_of(&self, kind: SubnetKind) -> Vec<&Subnet> {
        self.subnets.iter().filter(|s| s.kind == kind).collect()
    }

    /// First group name of the given kind
    pub fn first_group_of(&self, kind: SubnetKind) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.kind == kind)
            .map(|g| g.name.as_str())
    }
}
