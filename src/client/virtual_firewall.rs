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

use std::net::IpAddr;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use super::{PageRequest, PreviderClient, Reference, Result};

pub const FIREWALL_READY: &str = "READY";
pub const FIREWALL_PENDING_REMOVAL: &str = "PENDING_REMOVAL";

/// Page size and order used to list NAT rules
pub const NAT_RULE_PAGE_SIZE: u64 = 100;
pub const NAT_RULE_SORT: &str = "+description";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualFirewall {
    pub id: String,
    pub name: String,
    pub type_label: String,
    pub type_name: String,
    pub group: String,
    pub group_name: String,
    pub network: String,
    pub network_name: String,
    pub lan_address: String,
    pub wan_address: Vec<String>,
    pub dhcp_enabled: bool,
    pub dhcp_range_start: String,
    pub dhcp_range_end: String,
    pub local_domain_name: String,
    pub dns_enabled: bool,
    pub nameservers: Vec<String>,
    pub termination_protected: bool,
    pub icmp_wan_enabled: bool,
    pub icmp_lan_enabled: bool,
    pub state: String,
}

/// Body of the create and update calls, `type` is only sent on creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualFirewallUpdate {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
    pub network: String,
    pub lan_address: String,
    pub dhcp_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp_range_start: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp_range_end: Option<IpAddr>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub local_domain_name: String,
    pub dns_enabled: bool,
    pub nameservers: Vec<IpAddr>,
    pub termination_protected: bool,
    pub icmp_wan_enabled: bool,
    pub icmp_lan_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NatRule {
    pub id: String,
    pub description: String,
    pub port: u16,
    pub protocol: String,
    pub active: bool,
    pub source: String,
    pub nat_destination: String,
    pub nat_port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NatRuleCreate {
    pub description: String,
    pub port: u16,
    pub protocol: String,
    pub active: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
    pub nat_destination: String,
    pub nat_port: u16,
}

const PATH: &str = "v2/iaas/virtualfirewall";

impl PreviderClient {
    pub async fn get_virtual_firewall(&self, id: &str) -> Result<VirtualFirewall> {
        self.get(&format!("{PATH}/{id}")).await
    }

    pub async fn create_virtual_firewall(&self, create: &VirtualFirewallUpdate) -> Result<Reference> {
        self.post(PATH, create).await
    }

    pub async fn update_virtual_firewall(&self, id: &str, update: &VirtualFirewallUpdate) -> Result<()> {
        self.put::<IgnoredAny, _>(&format!("{PATH}/{id}"), update).await.map(drop)
    }

    pub async fn delete_virtual_firewall(&self, id: &str) -> Result<()> {
        self.delete::<IgnoredAny>(&format!("{PATH}/{id}")).await.map(drop)
    }

    /// Every NAT rule of the firewall, across all pages
    pub async fn list_nat_rules(&self, id: &str) -> Result<Vec<NatRule>> {
        self.get_all_pages(
            &format!("{PATH}/{id}/natrule"),
            PageRequest::sorted(NAT_RULE_PAGE_SIZE, NAT_RULE_SORT),
        )
        .await
    }

    pub async fn create_nat_rule(&self, id: &str, rule: &NatRuleCreate) -> Result<Reference> {
        self.post(&format!("{PATH}/{id}/natrule"), rule).await
    }

    pub async fn update_nat_rule(&self, id: &str, rule_id: &str, rule: &NatRuleCreate) -> Result<()> {
        self.put::<IgnoredAny, _>(&format!("{PATH}/{id}/natrule/{rule_id}"), rule)
            .await
            .map(drop)
    }

    pub async fn delete_nat_rule(&self, id: &str, rule_id: &str) -> Result<()> {
        self.delete::<IgnoredAny>(&format!("{PATH}/{id}/natrule/{rule_id}")).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::tests::client_for;

    #[tokio::test]
    async fn nat_rules_are_listed_sorted_by_description() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/iaas/virtualfirewall/fw-1/natrule"))
            .and(query_param("size", "100"))
            .and(query_param("sort", "+description"))
            .and(query_param("page", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"id": "r1", "description": "http", "port": 80, "protocol": "TCP",
                     "active": true, "natDestination": "10.0.0.5", "natPort": 8080},
                    {"id": "r2", "description": "ssh", "port": 22, "protocol": "TCP",
                     "active": false, "natDestination": "10.0.0.6", "natPort": 22}
                ],
                "totalElements": 2,
                "totalPages": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rules = client_for(&server).list_nat_rules("fw-1").await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].nat_port, 8080);
        assert_eq!(rules[1].description, "ssh");
    }

    #[tokio::test]
    async fn update_omits_type_and_serializes_addresses() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v2/iaas/virtualfirewall/fw-1"))
            .and(body_json(json!({
                "name": "edge",
                "network": "lan",
                "lanAddress": "192.168.1.1/24",
                "dhcpEnabled": true,
                "dhcpRangeStart": "192.168.1.100",
                "dhcpRangeEnd": "192.168.1.200",
                "localDomainName": "int",
                "dnsEnabled": true,
                "nameservers": ["1.1.1.1"],
                "terminationProtected": false,
                "icmpWanEnabled": true,
                "icmpLanEnabled": true
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .update_virtual_firewall(
                "fw-1",
                &VirtualFirewallUpdate {
                    name: String::from("edge"),
                    network: String::from("lan"),
                    lan_address: String::from("192.168.1.1/24"),
                    dhcp_enabled: true,
                    dhcp_range_start: "192.168.1.100".parse().ok(),
                    dhcp_range_end: "192.168.1.200".parse().ok(),
                    local_domain_name: String::from("int"),
                    dns_enabled: true,
                    nameservers: vec!["1.1.1.1".parse().unwrap()],
                    icmp_wan_enabled: true,
                    icmp_lan_enabled: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
}
