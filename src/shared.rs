use std::fmt;

/// A 32-bit Autonomous System Number.
pub type Asn = u32;

/// An ASN outside the routable range, used as the received-from/origin of a
/// synthesized blackhole route. The data-plane meaning is "drop".
pub const UNUSED_ASN_FLAG_FOR_BLACKHOLES: Asn = 64514;

/// An ASN outside the routable range, used to mark a route that has been
/// neutralised because it collided with this AS's own local origin.
pub const OVERRIDDEN_LOCAL_ORIGIN_ASN: Asn = 64515;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Relationships {
    Providers = 1,
    Peers = 2,
    Customers = 3,
    Origin = 4,
}

impl Relationships {
    pub fn invert(&self) -> Self {
        match self {
            Relationships::Providers => Relationships::Customers,
            Relationships::Customers => Relationships::Providers,
            Relationships::Peers => Relationships::Peers,
            Relationships::Origin => Relationships::Origin,
        }
    }
}

impl fmt::Display for Relationships {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Relationships::Providers => "PROVIDERS",
            Relationships::Peers => "PEERS",
            Relationships::Customers => "CUSTOMERS",
            Relationships::Origin => "ORIGIN",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ROAValidity {
    Valid = 0,
    Unknown = 1,
    InvalidLength = 2,
    InvalidOrigin = 3,
    InvalidLengthAndOrigin = 4,
}

impl fmt::Display for ROAValidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ROAValidity::Valid => "VALID",
            ROAValidity::Unknown => "UNKNOWN",
            ROAValidity::InvalidLength => "INVALID_LENGTH",
            ROAValidity::InvalidOrigin => "INVALID_ORIGIN",
            ROAValidity::InvalidLengthAndOrigin => "INVALID_LENGTH_AND_ORIGIN",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ROARouted {
    Routed = 0,
    Unknown = 1,
    NonRouted = 2,
}
