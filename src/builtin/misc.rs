//! Text-encoded scalars: identifiers, patterns and network addresses.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use regex::Regex;
use uuid::Uuid;

use super::scalar::textual;
use super::{scalar_types, BuiltinTable};

scalar_types!(Uuid, Regex, IpAddr, Ipv4Addr, Ipv6Addr);

pub(crate) fn register(table: &mut BuiltinTable) {
    table.add::<Uuid, _>(textual::<Uuid>("Uuid"));
    table.add::<Regex, _>(textual::<Regex>("Regex"));
    table.add::<IpAddr, _>(textual::<IpAddr>("IpAddr"));
    table.add::<Ipv4Addr, _>(textual::<Ipv4Addr>("Ipv4Addr"));
    table.add::<Ipv6Addr, _>(textual::<Ipv6Addr>("Ipv6Addr"));
}

// ------------------------------- Tests ------------------------------------ //
