// This file is part of the terraform-provider-previder project
//
// Copyright (C) ANEO, 2024-2024. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License")
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Checks run on the planned configuration before any remote call

use std::net::IpAddr;

use ipnet::IpNet;

use crate::reconcile::{Error, Result};

/// Parse a CIDR, the prefix length is mandatory
pub fn parse_cidr(value: &str) -> Result<IpNet> {
    value
        .parse()
        .map_err(|_| Error::validation(format!("invalid CIDR {value:?}")))
}

pub fn parse_ip(value: &str) -> Result<IpAddr> {
    value
        .parse()
        .map_err(|_| Error::validation(format!("invalid IP address {value:?}")))
}

pub fn check_port(what: &str, port: i64) -> Result<u16> {
    u16::try_from(port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| Error::validation(format!("invalid {what} {port}, expected 1 to 65535")))
}

pub fn check_protocol(protocol: &str) -> Result<()> {
    match protocol {
        "TCP" | "UDP" => Ok(()),
        _ => Err(Error::validation(format!(
            "invalid protocol {protocol:?}, allowed values are TCP or UDP"
        ))),
    }
}

/// Both ends of the DHCP range must lie in the LAN subnet
pub fn check_dhcp_range(lan: &str, start: &str, end: &str) -> Result<(IpAddr, IpAddr)> {
    let lan = parse_cidr(lan)?;
    let start = parse_ip(start)?;
    if !lan.contains(&start) {
        return Err(Error::validation(format!(
            "the DHCP range start {start} is not in the LAN subnet {}",
            lan.trunc()
        )));
    }
    let end = parse_ip(end)?;
    if !lan.contains(&end) {
        return Err(Error::validation(format!(
            "the DHCP range end {end} is not in the LAN subnet {}",
            lan.trunc()
        )));
    }
    Ok((start, end))
}

pub fn check_count(what: &str, count: usize, min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&count) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{what} must contain between {min} and {max} elements, got {count}"
        )))
    }
}

/// Exactly one of the creation sources must be given
pub fn check_single_source(template: &str, guest_id: &str, source: &str) -> Result<()> {
    let given = [template, guest_id, source]
        .iter()
        .filter(|value| !value.is_empty())
        .count();
    if given == 1 {
        Ok(())
    } else {
        Err(Error::validation(
            "either template, guest_id or source has to be provided, only 1 value allowed",
        ))
    }
}

/// Whether `value` is a 24 hexadecimal digits object id rather than a name
pub fn is_object_id(value: &str) -> bool {
    value.len() == 24 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_requires_a_valid_prefix() {
        assert!(parse_cidr("192.168.1.0/24").is_ok());
        assert!(parse_cidr("192.168.1.1/24").is_ok());
        assert!(parse_cidr("fd00::/64").is_ok());
        assert!(parse_cidr("192.168.1.0/33").unwrap_err().is_validation());
        assert!(parse_cidr("10.0.0.5").is_err());
        assert!(parse_cidr("").is_err());
    }

    #[test]
    fn plain_ip_accepts_addresses_only() {
        assert!(parse_ip("10.0.0.5").is_ok());
        assert!(parse_ip("fe80::1").is_ok());
        assert!(parse_ip("10.0.0.0/8").is_err());
        assert!(parse_ip("10.0.0.256").is_err());
    }

    #[test]
    fn ports_and_protocols() {
        assert_eq!(check_port("port", 443).unwrap(), 443);
        assert!(check_port("port", 65535).is_ok());
        assert!(check_port("port", 0).is_err());
        assert!(check_port("nat_port", 65536).is_err());
        assert!(check_port("port", -1).is_err());
        assert!(check_protocol("TCP").is_ok());
        assert!(check_protocol("UDP").is_ok());
        assert!(check_protocol("tcp").is_err());
        assert!(check_protocol("ICMP").is_err());
    }

    #[test]
    fn dhcp_range_must_be_in_lan() {
        assert!(check_dhcp_range("192.168.1.1/24", "192.168.1.100", "192.168.1.200").is_ok());

        let err = check_dhcp_range("192.168.1.1/24", "192.168.2.100", "192.168.1.200").unwrap_err();
        assert_eq!(
            err.to_string(),
            "the DHCP range start 192.168.2.100 is not in the LAN subnet 192.168.1.0/24"
        );
        assert!(check_dhcp_range("192.168.1.1/24", "192.168.1.100", "10.0.0.1").is_err());
        assert!(check_dhcp_range("192.168.1.1", "192.168.1.100", "192.168.1.200").is_err());
    }

    #[test]
    fn counts() {
        assert!(check_count("disks", 1, 1, 16).is_ok());
        assert!(check_count("disks", 0, 1, 16).is_err());
        assert!(check_count("network_interfaces", 9, 1, 8).is_err());
        assert!(check_count("volumes", 0, 0, 16).is_ok());
    }

    #[test]
    fn exactly_one_source() {
        assert!(check_single_source("ubuntu", "", "").is_ok());
        assert!(check_single_source("", "", "vm-1").is_ok());
        assert!(check_single_source("", "", "").is_err());
        assert!(check_single_source("ubuntu", "otherGuest", "").is_err());
    }

    #[test]
    fn object_ids() {
        assert!(is_object_id("5f0c2b7e9d1a4c3b2a1f0e9d"));
        assert!(!is_object_id("my-network"));
        assert!(!is_object_id("5f0c2b7e9d1a4c3b2a1f0e9"));
        assert!(!is_object_id("5f0c2b7e9d1a4c3b2a1f0e9z"));
    }
}
