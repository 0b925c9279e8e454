use ipnet::Ipv6Net;
use std::net::Ipv6Addr;

/// Leading octet of locally assigned Unique Local Addresses (fd00::/8, RFC 4193)
pub const ULA_LOCAL_OCTET: u8 = 0xfd;

/// True iff the prefix lies in the locally assigned half of the ULA range.
pub fn is_locally_significant(prefix: &Ipv6Net) -> bool {
    prefix.addr().octets()[0] == ULA_LOCAL_OCTET
}

/// Same check for `addr` or `addr/len` text. Anything unparsable is not ULA.
pub fn is_locally_significant_str(s: &str) -> bool {
    if let Ok(net) = s.parse::<Ipv6Net>() {
        return is_locally_significant(&net);
    }
    match s.parse::<Ipv6Addr>() {
        Ok(addr) => addr.octets()[0] == ULA_LOCAL_OCTET,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(s: &str) -> bool {
        is_locally_significant(&s.parse().unwrap())
    }

    #[test]
    fn ula_prefixes_pass() {
        assert!(check("fd00::/8"));
        assert!(check("fd00:1234:5678::/64"));
        assert!(check("fd82:cd32:5ad7:ff4a::/64"));
        assert!(check("fdff:ffff:ffff:ffff::/64"));
    }

    #[test]
    fn everything_else_is_dropped() {
        assert!(!check("2001:db8::/32"));
        assert!(!check("2406:e001:abcd:5600::/64"));
        assert!(!check("fe80::/10"));
        assert!(!check("fc00::/8"));
        assert!(!check("fc00:1::/64"));
        assert!(!check("::/0"));
        assert!(!check("ff02::/16"));
    }

    #[test]
    fn leading_zeros_do_not_count() {
        // textually "fd::", but the first octet is 0x00
        assert!(!check("fd::/16"));
    }

    #[test]
    fn text_input_never_fails() {
        assert!(is_locally_significant_str("fd00:1234:5678::/64"));
        assert!(is_locally_significant_str("fd00::"));
        assert!(!is_locally_significant_str("2001:db8::/32"));
        assert!(!is_locally_significant_str("fe80::/10"));
        assert!(!is_locally_significant_str("fd::/16"));
        assert!(!is_locally_significant_str("fd00::/200"));
        assert!(!is_locally_significant_str("not an address"));
        assert!(!is_locally_significant_str("fd00"));
        assert!(!is_locally_significant_str("192.0.2.0/24"));
        assert!(!is_locally_significant_str(""));
    }
}
