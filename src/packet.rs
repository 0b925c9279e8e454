use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::{fmt, io::Cursor, net::Ipv6Addr};

/// ICMPv6 message types handled by the listener
pub const ICMPV6_ROUTER_SOLICITATION: u8 = 133;
pub const ICMPV6_ROUTER_ADVERTISEMENT: u8 = 134;
/// Constants for Neighbor Discovery sockets
pub const ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x1);
pub const ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x2);
pub const ND_HOP_LIMIT: u32 = 255;
/// Constants for header lengths and packet sizes
// XXX: query link MTU from kernel
pub const ASSUMED_MTU: usize = 1500;
pub const IPV6_HEADER_LEN: usize = 40;
pub const ICMPV6_PKT_MAX_LEN: usize = ASSUMED_MTU - IPV6_HEADER_LEN;
pub const RA_HEADER_LEN: usize = 16;
pub const RS_LEN: usize = 8;
/// ND option lengths are carried in units of 8 octets
pub const ND_OPT_UNIT: usize = 8;

/// ICMPv6 Router Advertisement (RFC 4861 section 4.2)
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |     Code      |          Checksum             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Cur Hop Limit |M|O|  Reserved |       Router Lifetime         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Reachable Time                        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          Retrans Timer                        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Options ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-
///
/// Options that fail validation are kept out of `options` and recorded in
/// `warnings`; the remaining options are still parsed.
#[derive(Clone, Debug)]
pub struct RouterAdvertisement {
    pub hop_limit: u8,
    pub flags: u8,
    pub router_lifetime: u16,
    pub reachable_time: u32,
    pub retrans_timer: u32,
    pub options: Vec<NdOption>,
    pub warnings: Vec<OptionError>,
}

impl RouterAdvertisement {
    pub const FLAG_MANAGED: u8 = 0x80;
    pub const FLAG_OTHER: u8 = 0x40;

    pub fn from_bytes(b: &[u8]) -> Result<Self, PacketError> {
        if b.len() < RA_HEADER_LEN {
            return Err(PacketError::TooShort(b.len()));
        }

        let mut cursor = Cursor::new(b);

        // START HEADER
        let typ = cursor.read_u8()?;
        if typ != ICMPV6_ROUTER_ADVERTISEMENT {
            return Err(PacketError::WrongType(typ));
        }
        let code = cursor.read_u8()?;
        if code != 0 {
            return Err(PacketError::WrongCode(code));
        }
        // the kernel verifies the checksum on raw ICMPv6 sockets
        let _checksum = cursor.read_u16::<BigEndian>()?;
        let hop_limit = cursor.read_u8()?;
        let flags = cursor.read_u8()?;
        let router_lifetime = cursor.read_u16::<BigEndian>()?;
        let reachable_time = cursor.read_u32::<BigEndian>()?;
        let retrans_timer = cursor.read_u32::<BigEndian>()?;
        // END HEADER

        let mut options = Vec::new();
        let mut warnings = Vec::new();
        let mut offset = RA_HEADER_LEN;
        while offset < b.len() {
            let remaining = b.len() - offset;
            let typ = b[offset];
            if remaining < 2 {
                warnings.push(OptionError::Truncated {
                    typ,
                    claimed: 2,
                    remaining,
                });
                break;
            }

            // a zero length option can't be skipped over, so nothing after it is trustworthy
            let len = b[offset + 1];
            if len == 0 {
                warnings.push(OptionError::ZeroLength { typ });
                break;
            }

            let opt_len = usize::from(len) * ND_OPT_UNIT;
            if opt_len > remaining {
                warnings.push(OptionError::Truncated {
                    typ,
                    claimed: opt_len,
                    remaining,
                });
                break;
            }

            match NdOption::from_bytes(&b[offset..offset + opt_len]) {
                Ok(opt) => options.push(opt),
                Err(e) => warnings.push(e),
            }
            offset += opt_len;
        }

        Ok(RouterAdvertisement {
            hop_limit,
            flags,
            router_lifetime,
            reachable_time,
            retrans_timer,
            options,
            warnings,
        })
    }
}

impl fmt::Display for RouterAdvertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RouterAdvertisement {{ hop_limit: {}, managed: {}, other: {}, lifetime: {}, reachable: {}, retrans: {}, options: [{}] }}",
            self.hop_limit,
            self.flags & Self::FLAG_MANAGED != 0,
            self.flags & Self::FLAG_OTHER != 0,
            self.router_lifetime,
            self.reachable_time,
            self.retrans_timer,
            self.options
                .iter()
                .map(std::string::ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

/// Failures that cause an entire message to be dropped
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("message too short: {0} bytes, need at least {}", RA_HEADER_LEN)]
    TooShort(usize),

    #[error("wrong type: expected {}, got {0}", ICMPV6_ROUTER_ADVERTISEMENT)]
    WrongType(u8),

    #[error("wrong code: expected 0, got {0}")]
    WrongCode(u8),

    #[error("source {0} is not a link-local address")]
    NotLinkLocal(Ipv6Addr),

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures confined to a single option. These are reported as warnings and
/// the option is skipped.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OptionError {
    #[error("option type {typ} has zero length")]
    ZeroLength { typ: u8 },

    #[error("option type {typ} truncated: needs {claimed} bytes, {remaining} remain")]
    Truncated {
        typ: u8,
        claimed: usize,
        remaining: usize,
    },

    #[error("option type {typ} has invalid length {len}")]
    InvalidLength { typ: u8, len: u8 },

    #[error("option type {typ} has invalid prefix length {prefix_len}")]
    InvalidPrefixLength { typ: u8, prefix_len: u8 },

    #[error("route information option uses the reserved preference value")]
    ReservedPreference,
}

/// Neighbor Discovery option types
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NdOption {
    PrefixInformation(PrefixInformation),
    RouteInformation(RouteInformation),
    Unrecognized { typ: u8, len: u8 },
}

impl NdOption {
    pub const PREFIX_INFORMATION: u8 = 3;
    pub const ROUTE_INFORMATION: u8 = 24;

    /// `b` covers exactly one option, type and length octets included.
    fn from_bytes(b: &[u8]) -> Result<Self, OptionError> {
        let (typ, len) = (b[0], b[1]);
        match typ {
            Self::PREFIX_INFORMATION => Ok(Self::PrefixInformation(PrefixInformation::parse(b)?)),
            Self::ROUTE_INFORMATION => Ok(Self::RouteInformation(RouteInformation::parse(b)?)),
            _ => Ok(Self::Unrecognized { typ, len }),
        }
    }
}

impl fmt::Display for NdOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NdOption::PrefixInformation(pi) => write!(
                f,
                "PrefixInformation {{ prefix: {}/{}, on_link: {}, autonomous: {}, valid: {}, preferred: {} }}",
                pi.prefix,
                pi.prefix_len,
                pi.on_link,
                pi.autonomous,
                pi.valid_lifetime,
                pi.preferred_lifetime
            ),
            NdOption::RouteInformation(ri) => write!(
                f,
                "RouteInformation {{ prefix: {}/{}, preference: {}, lifetime: {} }}",
                ri.prefix, ri.prefix_len, ri.preference, ri.lifetime
            ),
            NdOption::Unrecognized { typ, len } => {
                write!(f, "Unrecognized {{ type: {typ}, len: {len} }}")
            }
        }
    }
}

/// Prefix Information option (RFC 4861 section 4.6.2)
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |    Length     | Prefix Length |L|A| Reserved1 |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Valid Lifetime                        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       Preferred Lifetime                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Reserved2                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// ~                            Prefix (16)                        ~
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixInformation {
    pub prefix_len: u8,
    pub on_link: bool,
    pub autonomous: bool,
    pub valid_lifetime: u32,
    pub preferred_lifetime: u32,
    pub prefix: Ipv6Addr,
}

impl PrefixInformation {
    pub const LEN: u8 = 4;
    const FLAG_ON_LINK: u8 = 0x80;
    const FLAG_AUTONOMOUS: u8 = 0x40;

    fn parse(b: &[u8]) -> Result<Self, OptionError> {
        let len = b[1];
        if len != Self::LEN {
            return Err(OptionError::InvalidLength {
                typ: NdOption::PREFIX_INFORMATION,
                len,
            });
        }

        let prefix_len = b[2];
        if u32::from(prefix_len) > Ipv6Addr::BITS {
            return Err(OptionError::InvalidPrefixLength {
                typ: NdOption::PREFIX_INFORMATION,
                prefix_len,
            });
        }

        let flags = b[3];
        Ok(Self {
            prefix_len,
            on_link: flags & Self::FLAG_ON_LINK != 0,
            autonomous: flags & Self::FLAG_AUTONOMOUS != 0,
            valid_lifetime: BigEndian::read_u32(&b[4..8]),
            preferred_lifetime: BigEndian::read_u32(&b[8..12]),
            prefix: Ipv6Addr::from_bits(BigEndian::read_u128(&b[16..32])),
        })
    }
}

/// Route Information option (RFC 4191 section 2.3). The prefix field is
/// 0, 8 or 16 octets long depending on the option length.
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |    Length     | Prefix Length |Resvd|Prf|Resvd|
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        Route Lifetime                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                   Prefix (Variable Length)                    |
/// .                                                               .
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteInformation {
    pub prefix_len: u8,
    pub preference: RoutePreference,
    pub lifetime: u32,
    pub prefix: Ipv6Addr,
}

impl RouteInformation {
    pub const MAX_LEN: u8 = 3;

    fn parse(b: &[u8]) -> Result<Self, OptionError> {
        let len = b[1];
        if len > Self::MAX_LEN {
            return Err(OptionError::InvalidLength {
                typ: NdOption::ROUTE_INFORMATION,
                len,
            });
        }

        // prefix bytes carried: len 1 -> 0, len 2 -> 8, len 3 -> 16
        let prefix_bytes = (usize::from(len) - 1) * ND_OPT_UNIT;
        let prefix_len = b[2];
        if usize::from(prefix_len) > prefix_bytes * 8 {
            return Err(OptionError::InvalidPrefixLength {
                typ: NdOption::ROUTE_INFORMATION,
                prefix_len,
            });
        }

        let Some(preference) = RoutePreference::from_bits(b[3] >> 3) else {
            return Err(OptionError::ReservedPreference);
        };

        let mut octets = [0u8; 16];
        octets[..prefix_bytes].copy_from_slice(&b[8..8 + prefix_bytes]);

        Ok(Self {
            prefix_len,
            preference,
            lifetime: BigEndian::read_u32(&b[4..8]),
            prefix: Ipv6Addr::from(octets),
        })
    }
}

/// Default router / route preference (RFC 4191 section 2.1)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutePreference {
    High,
    Medium,
    Low,
}

impl RoutePreference {
    fn from_bits(n: u8) -> Option<Self> {
        match n & 0b11 {
            0b01 => Some(Self::High),
            0b00 => Some(Self::Medium),
            0b11 => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for RoutePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::High => "high",
                Self::Medium => "medium",
                Self::Low => "low",
            }
        )
    }
}

/// ICMPv6 Router Solicitation (RFC 4861 section 4.1)
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |     Code      |          Checksum             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            Reserved                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[derive(Clone, Copy, Debug, Default)]
pub struct RouterSolicitation {
    reserved: u32,
}

impl RouterSolicitation {
    pub fn to_byte_vec(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(RS_LEN);
        b.push(ICMPV6_ROUTER_SOLICITATION);
        b.push(0);
        // checksum is filled in by the kernel
        b.extend_from_slice(&0u16.to_be_bytes());
        b.extend_from_slice(&self.reserved.to_be_bytes());
        b
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_prefix_and_route_information() {
        let b = ra_bytes(&[
            source_lladdr(),
            prefix_info("fd82:cd32:5ad7:ff4a::", 64),
            route_info("fd4e:a053:febd::", 48),
        ]);
        let ra = RouterAdvertisement::from_bytes(&b).unwrap();

        assert_eq!(ra.hop_limit, 64);
        assert_eq!(ra.router_lifetime, 1800);
        assert!(ra.warnings.is_empty());
        assert_eq!(
            ra.options,
            vec![
                NdOption::Unrecognized { typ: 1, len: 1 },
                NdOption::PrefixInformation(PrefixInformation {
                    prefix_len: 64,
                    on_link: true,
                    autonomous: true,
                    valid_lifetime: 1800,
                    preferred_lifetime: 1800,
                    prefix: "fd82:cd32:5ad7:ff4a::".parse().unwrap(),
                }),
                NdOption::RouteInformation(RouteInformation {
                    prefix_len: 48,
                    preference: RoutePreference::Medium,
                    lifetime: 1800,
                    prefix: "fd4e:a053:febd::".parse().unwrap(),
                }),
            ]
        );
    }

    #[test]
    fn short_route_information_zero_fills_prefix() {
        let mut opt = vec![NdOption::ROUTE_INFORMATION, 2, 48, 0x08];
        opt.extend_from_slice(&600u32.to_be_bytes());
        opt.extend_from_slice(&[0xfd, 0x4e, 0xa0, 0x53, 0xfe, 0xbd, 0, 0]);
        let ra = RouterAdvertisement::from_bytes(&ra_bytes(&[opt])).unwrap();

        assert_eq!(
            ra.options,
            vec![NdOption::RouteInformation(RouteInformation {
                prefix_len: 48,
                preference: RoutePreference::High,
                lifetime: 600,
                prefix: "fd4e:a053:febd::".parse().unwrap(),
            })]
        );
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(matches!(
            RouterAdvertisement::from_bytes(&[ICMPV6_ROUTER_ADVERTISEMENT, 0, 0, 0]),
            Err(PacketError::TooShort(4))
        ));

        let mut b = ra_bytes(&[]);
        b[0] = ICMPV6_ROUTER_SOLICITATION;
        assert!(matches!(
            RouterAdvertisement::from_bytes(&b),
            Err(PacketError::WrongType(ICMPV6_ROUTER_SOLICITATION))
        ));

        let mut b = ra_bytes(&[]);
        b[1] = 1;
        assert!(matches!(
            RouterAdvertisement::from_bytes(&b),
            Err(PacketError::WrongCode(1))
        ));
    }

    #[test]
    fn truncated_option_is_a_warning() {
        let mut truncated = prefix_info("fd00:1::", 64);
        truncated.truncate(20);
        let b = ra_bytes(&[route_info("fd00:2::", 64), truncated]);
        let ra = RouterAdvertisement::from_bytes(&b).unwrap();

        assert_eq!(ra.options.len(), 1);
        assert_eq!(
            ra.warnings,
            vec![OptionError::Truncated {
                typ: NdOption::PREFIX_INFORMATION,
                claimed: 32,
                remaining: 20,
            }]
        );
    }

    #[test]
    fn zero_length_option_stops_parsing() {
        let b = ra_bytes(&[vec![NdOption::PREFIX_INFORMATION, 0], route_info("fd00:2::", 64)]);
        let ra = RouterAdvertisement::from_bytes(&b).unwrap();

        assert!(ra.options.is_empty());
        assert_eq!(
            ra.warnings,
            vec![OptionError::ZeroLength {
                typ: NdOption::PREFIX_INFORMATION
            }]
        );
    }

    #[test]
    fn invalid_option_is_skipped_and_parsing_continues() {
        let bad_len = prefix_info("fd00:1::", 200);
        let mut reserved_prf = route_info("fd00:3::", 64);
        reserved_prf[3] = 0b10 << 3;
        let b = ra_bytes(&[bad_len, reserved_prf, route_info("fd00:2::", 64)]);
        let ra = RouterAdvertisement::from_bytes(&b).unwrap();

        assert_eq!(ra.options.len(), 1);
        assert_eq!(
            ra.warnings,
            vec![
                OptionError::InvalidPrefixLength {
                    typ: NdOption::PREFIX_INFORMATION,
                    prefix_len: 200,
                },
                OptionError::ReservedPreference,
            ]
        );
    }

    #[test]
    fn route_information_prefix_must_fit() {
        // length 1 carries no prefix bytes, so only ::/0 is valid
        let mut opt = vec![NdOption::ROUTE_INFORMATION, 1, 8, 0];
        opt.extend_from_slice(&0u32.to_be_bytes());
        let ra = RouterAdvertisement::from_bytes(&ra_bytes(&[opt])).unwrap();

        assert_eq!(
            ra.warnings,
            vec![OptionError::InvalidPrefixLength {
                typ: NdOption::ROUTE_INFORMATION,
                prefix_len: 8,
            }]
        );
    }

    #[test]
    fn router_solicitation_layout() {
        assert_eq!(
            RouterSolicitation::default().to_byte_vec(),
            vec![ICMPV6_ROUTER_SOLICITATION, 0, 0, 0, 0, 0, 0, 0]
        );
    }
}
