use crate::error::Error;
use crate::helpers::ifname_to_ifindex;
use crate::packet::RoutePreference;
use ipnet::Ipv6Net;
use serde::Serialize;
use std::{collections::BTreeMap, fmt, net::Ipv6Addr};

/// Identity of a route: prefix and prefix length, host bits cleared.
pub type RouteKey = Ipv6Net;

/// What kind of option a route was learned from. Prefix Information yields an
/// on-link route, Route Information a route via the advertising router.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteKind {
    Prefix {
        on_link: bool,
        autonomous: bool,
        valid_lifetime: u32,
        preferred_lifetime: u32,
    },
    Route {
        preference: RoutePreference,
        lifetime: u32,
    },
}

impl RouteKind {
    pub fn is_prefix(&self) -> bool {
        matches!(self, Self::Prefix { .. })
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix {
                on_link,
                autonomous,
                valid_lifetime,
                preferred_lifetime,
            } => write!(
                f,
                "prefix (on_link: {on_link}, autonomous: {autonomous}, valid: {valid_lifetime}s, preferred: {preferred_lifetime}s)"
            ),
            Self::Route {
                preference,
                lifetime,
            } => write!(f, "route (preference: {preference}, lifetime: {lifetime}s)"),
        }
    }
}

/// A route learned from one option of one advertisement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteCandidate {
    pub prefix: Ipv6Net,
    pub kind: RouteKind,
    pub router: Ipv6Addr,
}

impl RouteCandidate {
    pub fn key(&self) -> RouteKey {
        self.prefix
    }
}

impl fmt::Display for RouteCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}: {}", self.prefix, self.router, self.kind)
    }
}

/// Result of checking a candidate against the route table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    New,
    Unchanged,
    /// Another router now advertises the route; carries the previous owner.
    Updated(Ipv6Addr),
}

impl Disposition {
    pub fn needs_action(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Updated(prev) => write!(f, "updated (was {prev})"),
        }
    }
}

/// Last router seen advertising each route. Entries are never removed.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RouteTable(BTreeMap<RouteKey, Ipv6Addr>);

impl RouteTable {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn evaluate(&mut self, key: RouteKey, router: Ipv6Addr) -> Disposition {
        match self.0.insert(key, router) {
            None => Disposition::New,
            Some(prev) if prev == router => Disposition::Unchanged,
            Some(prev) => Disposition::Updated(prev),
        }
    }

    pub fn contains(&self, key: &RouteKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &RouteKey) -> Option<Ipv6Addr> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A network interface known to exist when it was looked up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interface {
    name: String,
    index: u32,
}

impl Interface {
    pub fn lookup(name: &str) -> Result<Self, Error> {
        let index = ifname_to_ifindex(name)?;
        if index == 0 {
            return Err(Error::InterfaceNotFound(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Whether an interface with this name and index still exists.
    pub fn is_present(&self) -> bool {
        matches!(ifname_to_ifindex(&self.name), Ok(index) if index == self.index)
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ifindex {})", self.name, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(s: &str) -> RouteKey {
        s.parse().unwrap()
    }

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn same_router_is_idempotent() {
        let mut table = RouteTable::new();
        let k = key("fd00:1234:5678::/64");

        assert_eq!(table.evaluate(k, addr("fe80::1")), Disposition::New);
        assert_eq!(table.evaluate(k, addr("fe80::1")), Disposition::Unchanged);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn last_writer_wins() {
        let mut table = RouteTable::new();
        let k = key("fd00:1234:5678::/64");

        assert_eq!(table.evaluate(k, addr("fe80::1")), Disposition::New);
        assert_eq!(
            table.evaluate(k, addr("fe80::2")),
            Disposition::Updated(addr("fe80::1"))
        );
        assert_eq!(table.evaluate(k, addr("fe80::2")), Disposition::Unchanged);
        assert_eq!(table.get(&k), Some(addr("fe80::2")));

        // flapping back is an update too, there is no preference between routers
        assert_eq!(
            table.evaluate(k, addr("fe80::1")),
            Disposition::Updated(addr("fe80::2"))
        );
    }

    #[test]
    fn prefix_length_is_part_of_the_key() {
        let mut table = RouteTable::new();

        assert_eq!(table.evaluate(key("fd00::/48"), addr("fe80::1")), Disposition::New);
        assert_eq!(table.evaluate(key("fd00::/64"), addr("fe80::1")), Disposition::New);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn needs_action() {
        assert!(Disposition::New.needs_action());
        assert!(Disposition::Updated(addr("fe80::1")).needs_action());
        assert!(!Disposition::Unchanged.needs_action());
    }

    #[test]
    fn table_serializes_as_json_map() {
        let mut table = RouteTable::new();
        table.evaluate(key("fd00:1::/64"), addr("fe80::1"));

        assert_eq!(
            serde_json::to_string(&table).unwrap(),
            r#"{"fd00:1::/64":"fe80::1"}"#
        );
    }

    #[test]
    fn missing_interface_is_an_error() {
        assert!(matches!(
            Interface::lookup("nosuchif0"),
            Err(Error::InterfaceNotFound(name)) if name == "nosuchif0"
        ));
    }
}
