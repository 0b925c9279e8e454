use crate::packet::{NdOption, OptionError, PacketError, RouterAdvertisement};
use crate::types::{RouteCandidate, RouteKind};
use ipnet::Ipv6Net;
use std::net::Ipv6Addr;

/// Route candidates from one advertisement, in option order, plus a warning
/// for every option that was dropped as malformed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    pub candidates: Vec<RouteCandidate>,
    pub warnings: Vec<OptionError>,
    /// Type codes of well-formed options that carry no route.
    pub skipped: Vec<u8>,
}

pub fn decode(src: Ipv6Addr, payload: &[u8]) -> Result<Decoded, PacketError> {
    // RFC 4861 section 6.1.2: advertisements must come from a link-local address
    if src.segments()[0] & 0xffc0 != 0xfe80 {
        return Err(PacketError::NotLinkLocal(src));
    }

    let ra = RouterAdvertisement::from_bytes(payload)?;
    let mut decoded = Decoded {
        warnings: ra.warnings,
        ..Default::default()
    };

    for opt in ra.options {
        let (typ, prefix, prefix_len, kind) = match opt {
            NdOption::PrefixInformation(pi) => (
                NdOption::PREFIX_INFORMATION,
                pi.prefix,
                pi.prefix_len,
                RouteKind::Prefix {
                    on_link: pi.on_link,
                    autonomous: pi.autonomous,
                    valid_lifetime: pi.valid_lifetime,
                    preferred_lifetime: pi.preferred_lifetime,
                },
            ),
            NdOption::RouteInformation(ri) => (
                NdOption::ROUTE_INFORMATION,
                ri.prefix,
                ri.prefix_len,
                RouteKind::Route {
                    preference: ri.preference,
                    lifetime: ri.lifetime,
                },
            ),
            NdOption::Unrecognized { typ, .. } => {
                decoded.skipped.push(typ);
                continue;
            }
        };

        match Ipv6Net::new(prefix, prefix_len) {
            Ok(net) => decoded.candidates.push(RouteCandidate {
                prefix: net.trunc(),
                kind,
                router: src,
            }),
            Err(_) => decoded
                .warnings
                .push(OptionError::InvalidPrefixLength { typ, prefix_len }),
        }
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::fixtures::*;
    use crate::packet::RoutePreference;
    use pretty_assertions::assert_eq;

    fn router() -> Ipv6Addr {
        "fe80::1451:3cb7:4e5f:e588".parse().unwrap()
    }

    #[test]
    fn one_candidate_per_route_option() {
        let b = ra_bytes(&[
            source_lladdr(),
            prefix_info("fd82:cd32:5ad7:ff4a::", 64),
            route_info("fd4e:a053:febd::", 48),
        ]);
        let decoded = decode(router(), &b).unwrap();

        assert_eq!(
            decoded.candidates,
            vec![
                RouteCandidate {
                    prefix: "fd82:cd32:5ad7:ff4a::/64".parse().unwrap(),
                    kind: RouteKind::Prefix {
                        on_link: true,
                        autonomous: true,
                        valid_lifetime: 1800,
                        preferred_lifetime: 1800,
                    },
                    router: router(),
                },
                RouteCandidate {
                    prefix: "fd4e:a053:febd::/48".parse().unwrap(),
                    kind: RouteKind::Route {
                        preference: RoutePreference::Medium,
                        lifetime: 1800,
                    },
                    router: router(),
                },
            ]
        );
        assert_eq!(decoded.skipped, vec![1]);
        assert!(decoded.warnings.is_empty());
    }

    #[test]
    fn well_formed_and_truncated_option() {
        let mut truncated = route_info("fd00:2::", 64);
        truncated.truncate(12);
        let b = ra_bytes(&[prefix_info("fd00:1::", 64), truncated]);
        let decoded = decode(router(), &b).unwrap();

        assert_eq!(decoded.candidates.len(), 1);
        assert_eq!(decoded.warnings.len(), 1);
    }

    #[test]
    fn host_bits_are_cleared() {
        let b = ra_bytes(&[prefix_info("fd00:1:2:3::1", 64)]);
        let decoded = decode(router(), &b).unwrap();

        assert_eq!(
            decoded.candidates[0].prefix,
            "fd00:1:2:3::/64".parse::<Ipv6Net>().unwrap()
        );
    }

    #[test]
    fn advertisement_without_options() {
        let decoded = decode(router(), &ra_bytes(&[])).unwrap();

        assert_eq!(decoded, Decoded::default());
    }

    #[test]
    fn non_link_local_source_is_rejected() {
        let b = ra_bytes(&[prefix_info("fd00:1::", 64)]);

        assert!(matches!(
            decode("2001:db8::1".parse().unwrap(), &b),
            Err(PacketError::NotLinkLocal(_))
        ));
    }
}
