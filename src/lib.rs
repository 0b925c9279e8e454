//! Listens for IPv6 Router Advertisements on one interface and installs a
//! kernel route for every Unique Local Address prefix or route they carry,
//! re-installing it whenever a different router takes over the advertisement.

pub mod capture;
pub mod configurator;
pub mod decode;
pub mod error;
pub mod filter;
pub mod helpers;
pub mod listener;
pub mod packet;
pub mod types;

pub use capture::{Capture, Captured, Icmp6Capture};
pub use configurator::{IpRouteInstaller, RouteInstaller, RouteRequest, ScriptInstaller};
pub use error::{Error, Result};
pub use listener::{Listener, ListenerConfig, ListenerState, Outcome};
pub use types::{Disposition, Interface, RouteCandidate, RouteKey, RouteKind, RouteTable};
