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

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tf_provider::schema::{AttributeConstraint, AttributeType, Block, Description, Schema};
use tf_provider::value::{Value, ValueBool, ValueList, ValueMap, ValueNumber, ValueString};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::client::virtual_firewall::{NatRule, NatRuleCreate, VirtualFirewall};
use crate::reconcile::{Error, Result};
use crate::utils::{
    attribute, non_empty, owned, reference, remote_or, settle, string_list, string_list_type, strings,
    unknown_if_null, WithNormalize, WithSchema, WithValidate,
};
use crate::validate::{check_dhcp_range, check_port, check_protocol, parse_cidr, parse_ip};

use super::reconcile::FirewallSpec;

const DEFAULT_LOCAL_DOMAIN: &str = "int";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NatRuleState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub description: ValueString<'a>,
    pub port: ValueNumber,
    pub protocol: ValueString<'a>,
    pub active: ValueBool,
    pub source: ValueString<'a>,
    pub nat_destination: ValueString<'a>,
    pub nat_port: ValueNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VirtualFirewallState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    #[serde(rename = "type")]
    pub kind: ValueString<'a>,
    pub type_name: ValueString<'a>,
    pub lan_address: ValueString<'a>,
    pub wan_address: ValueList<ValueString<'a>>,
    pub group: ValueString<'a>,
    pub group_name: ValueString<'a>,
    pub network: ValueString<'a>,
    pub network_name: ValueString<'a>,
    pub dhcp_enabled: ValueBool,
    pub dhcp_range_start: ValueString<'a>,
    pub dhcp_range_end: ValueString<'a>,
    pub local_domain_name: ValueString<'a>,
    pub dns_enabled: ValueBool,
    pub nameservers: ValueList<ValueString<'a>>,
    pub termination_protected: ValueBool,
    pub icmp_wan_enabled: ValueBool,
    pub icmp_lan_enabled: ValueBool,
    pub state: ValueString<'a>,
    pub nat_rules: ValueMap<'a, Value<NatRuleState<'a>>>,
}

impl WithSchema for VirtualFirewallState<'_> {
    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};

        let nat_rule = map! {
            "id" => attribute(AttributeType::String, Computed, "Id of the NAT rule"),
            "description" => attribute(
                AttributeType::String,
                Computed,
                "Description of the NAT rule, taken from its key",
            ),
            "port" => attribute(AttributeType::Number, Required, "Public port"),
            "protocol" => attribute(AttributeType::String, Required, "TCP or UDP"),
            "active" => attribute(AttributeType::Bool, Required, "Whether the rule is enforced"),
            "source" => attribute(
                AttributeType::String,
                OptionalComputed,
                "Source CIDR allowed to use the rule",
            ),
            "nat_destination" => attribute(
                AttributeType::String,
                Required,
                "IP address the traffic is forwarded to",
            ),
            "nat_port" => attribute(AttributeType::Number, Required, "Port the traffic is forwarded to"),
        };

        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Virtual firewall of the Previder IaaS platform"),
                attributes: map! {
                    "id" => attribute(AttributeType::String, Computed, "Id of the virtual firewall"),
                    "name" => attribute(AttributeType::String, Required, "Name of the virtual firewall"),
                    "type" => attribute(AttributeType::String, Required, "Type of the virtual firewall"),
                    "type_name" => attribute(AttributeType::String, Computed, "Name of the firewall type"),
                    "lan_address" => attribute(
                        AttributeType::String,
                        Required,
                        "LAN address of the firewall in CIDR notation",
                    ),
                    "wan_address" => attribute(string_list_type(), Computed, "WAN addresses"),
                    "group" => attribute(
                        AttributeType::String,
                        OptionalComputed,
                        "Name or id of the group of the firewall",
                    ),
                    "group_name" => attribute(AttributeType::String, Computed, "Name of the group"),
                    "network" => attribute(
                        AttributeType::String,
                        Required,
                        "Name or id of the LAN network, changing it replaces the firewall",
                    ),
                    "network_name" => attribute(AttributeType::String, Computed, "Name of the LAN network"),
                    "dhcp_enabled" => attribute(AttributeType::Bool, Required, "Serve DHCP on the LAN"),
                    "dhcp_range_start" => attribute(AttributeType::String, Optional, "First DHCP address"),
                    "dhcp_range_end" => attribute(AttributeType::String, Optional, "Last DHCP address"),
                    "local_domain_name" => attribute(
                        AttributeType::String,
                        OptionalComputed,
                        "Local domain name served by DHCP, defaults to `int`",
                    ),
                    "dns_enabled" => attribute(AttributeType::Bool, Required, "Serve DNS on the LAN"),
                    "nameservers" => attribute(string_list_type(), Optional, "Upstream nameservers"),
                    "termination_protected" => attribute(
                        AttributeType::Bool,
                        Optional,
                        "Prevent the firewall from being deleted",
                    ),
                    "icmp_wan_enabled" => attribute(
                        AttributeType::Bool,
                        OptionalComputed,
                        "Answer ICMP on the WAN, defaults to true",
                    ),
                    "icmp_lan_enabled" => attribute(
                        AttributeType::Bool,
                        OptionalComputed,
                        "Answer ICMP on the LAN, defaults to true",
                    ),
                    "state" => attribute(AttributeType::String, Computed, "State of the firewall"),
                    "nat_rules" => attribute(
                        AttributeType::AttributeMap(nat_rule),
                        Optional,
                        "NAT rules keyed by description",
                    ),
                },
                ..Default::default()
            },
        }
    }
}

impl WithNormalize for VirtualFirewallState<'_> {
    fn normalize(&mut self, _diags: &mut Diagnostics) {
        if self.local_domain_name.is_null() {
            self.local_domain_name = owned(DEFAULT_LOCAL_DOMAIN);
        }
        if self.icmp_wan_enabled.is_null() {
            self.icmp_wan_enabled = Value::Value(true);
        }
        if self.icmp_lan_enabled.is_null() {
            self.icmp_lan_enabled = Value::Value(true);
        }
        for (key, rule) in self.nat_rules.iter_mut().flatten() {
            if let Value::Value(rule) = rule {
                rule.description = owned(key);
            }
        }
    }
}

impl WithValidate for VirtualFirewallState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        for (path, err) in self.checks(attr_path) {
            diags.error("Invalid virtual firewall", err.to_string(), path);
        }
    }
}

impl NatRuleState<'_> {
    fn checks(&self, attr_path: AttributePath) -> Vec<(AttributePath, Error)> {
        let mut failed = Vec::new();
        if let Some(destination) = self.nat_destination.as_deref_option() {
            if parse_ip(destination).is_err() {
                failed.push((
                    attr_path.clone().attribute("nat_destination"),
                    Error::validation(format!("invalid destination IP {destination}")),
                ));
            }
        }
        if let Some(source) = self.source.as_deref_option().filter(|s| !s.is_empty()) {
            if parse_cidr(source).is_err() {
                failed.push((
                    attr_path.clone().attribute("source"),
                    Error::validation(format!("invalid source CIDR {source}")),
                ));
            }
        }
        for (name, port) in [("port", &self.port), ("nat_port", &self.nat_port)] {
            if let Value::Value(port) = port {
                if let Err(err) = check_port("port", *port) {
                    failed.push((attr_path.clone().attribute(name), err));
                }
            }
        }
        if let Some(protocol) = self.protocol.as_deref_option() {
            if let Err(err) = check_protocol(protocol) {
                failed.push((attr_path.clone().attribute("protocol"), err));
            }
        }
        failed
    }

    fn request(&self, description: &str) -> Result<NatRuleCreate> {
        Ok(NatRuleCreate {
            description: description.to_owned(),
            port: check_port("port", self.port.as_ref_option().copied().unwrap_or_default())?,
            protocol: self.protocol.as_str().to_owned(),
            active: self.active.unwrap_or_default(),
            source: self.source.as_str().to_owned(),
            nat_destination: self.nat_destination.as_str().to_owned(),
            nat_port: check_port(
                "port",
                self.nat_port.as_ref_option().copied().unwrap_or_default(),
            )?,
        })
    }

    fn from_remote<'a>(rule: &NatRule) -> NatRuleState<'a> {
        NatRuleState {
            id: owned(&rule.id),
            description: owned(&rule.description),
            port: Value::Value(rule.port.into()),
            protocol: owned(&rule.protocol),
            active: Value::Value(rule.active),
            source: non_empty(&rule.source),
            nat_destination: owned(&rule.nat_destination),
            nat_port: Value::Value(rule.nat_port.into()),
        }
    }
}

impl<'a> VirtualFirewallState<'a> {
    /// Failed checks on the known values of the configuration
    pub fn checks(&self, attr_path: AttributePath) -> Vec<(AttributePath, Error)> {
        let mut failed = Vec::new();

        if let Some(lan) = self.lan_address.as_deref_option() {
            match parse_cidr(lan) {
                Err(_) => failed.push((
                    attr_path.clone().attribute("lan_address"),
                    Error::validation("The Lan Address is not a valid CIDR"),
                )),
                Ok(_) if self.dhcp_enabled == Value::Value(true) => {
                    if let (Some(start), Some(end)) = (
                        self.dhcp_range_start.as_deref_option(),
                        self.dhcp_range_end.as_deref_option(),
                    ) {
                        if let Err(err) = check_dhcp_range(lan, start, end) {
                            failed.push((attr_path.clone().attribute("dhcp_range_start"), err));
                        }
                    } else if self.dhcp_range_start.is_null() || self.dhcp_range_end.is_null() {
                        failed.push((
                            attr_path.clone().attribute("dhcp_range_start"),
                            Error::validation("a DHCP range is required when DHCP is enabled"),
                        ));
                    }
                }
                Ok(_) => (),
            }
        }

        for (index, nameserver) in self.nameservers.iter().flatten().enumerate() {
            if let Some(nameserver) = nameserver.as_deref_option() {
                if let Err(err) = parse_ip(nameserver) {
                    failed.push((
                        attr_path.clone().attribute("nameservers").index(index as i64),
                        err,
                    ));
                }
            }
        }

        for (key, rule) in self.nat_rules.iter().flatten() {
            if let Value::Value(rule) = rule {
                let path = attr_path.clone().attribute("nat_rules").key(key.to_string());
                failed.extend(rule.checks(path));
            }
        }

        failed
    }

    pub fn spec(&self) -> Result<FirewallSpec> {
        if let Some((_, err)) = self.checks(AttributePath::root()).into_iter().next() {
            return Err(err);
        }

        let dhcp_enabled = self.dhcp_enabled.unwrap_or_default();
        let dhcp_range = if dhcp_enabled {
            Some(check_dhcp_range(
                self.lan_address.as_str(),
                self.dhcp_range_start.as_str(),
                self.dhcp_range_end.as_str(),
            )?)
        } else {
            None
        };

        let mut nat_rules = BTreeMap::new();
        for (key, rule) in self.nat_rules.iter().flatten() {
            if let Value::Value(rule) = rule {
                nat_rules.insert(key.to_string(), rule.request(key)?);
            }
        }

        Ok(FirewallSpec {
            name: self.name.as_str().to_owned(),
            kind: self.kind.as_str().to_owned(),
            group: self.group.as_str().to_owned(),
            network: self.network.as_str().to_owned(),
            lan_address: self.lan_address.as_str().to_owned(),
            dhcp_enabled,
            dhcp_range,
            local_domain_name: self.local_domain_name.as_str().to_owned(),
            dns_enabled: self.dns_enabled.unwrap_or_default(),
            nameservers: strings(&self.nameservers)
                .iter()
                .map(|ns| parse_ip(ns))
                .collect::<Result<_>>()?,
            termination_protected: self.termination_protected.unwrap_or_default(),
            icmp_wan_enabled: self.icmp_wan_enabled.unwrap_or(true),
            icmp_lan_enabled: self.icmp_lan_enabled.unwrap_or(true),
            nat_rules,
        })
    }

    /// Mark the values computed by the platform as unknown
    pub fn plan_computed(&mut self, prior: Option<&Self>) {
        if prior.is_none() {
            self.id = Value::Unknown;
            self.type_name = Value::Unknown;
            self.wan_address = Value::Unknown;
            self.group_name = Value::Unknown;
            self.network_name = Value::Unknown;
            self.state = Value::Unknown;
            unknown_if_null(&mut self.group);
        }
        let prior_rules = prior.and_then(|prior| prior.nat_rules.as_ref_option());
        for (key, rule) in self.nat_rules.iter_mut().flatten() {
            let Value::Value(rule) = rule else { continue };
            let prior_rule = prior_rules
                .and_then(|rules| rules.get(key))
                .and_then(Value::as_ref_option);
            match prior_rule {
                Some(prior_rule) => {
                    rule.id = prior_rule.id.clone();
                    if rule.source.is_null() {
                        rule.source = prior_rule.source.clone();
                    }
                }
                None => {
                    rule.id = Value::Unknown;
                    unknown_if_null(&mut rule.source);
                }
            }
        }
    }

    pub fn refresh(&mut self, firewall: &VirtualFirewall, rules: &[NatRule]) {
        self.id = owned(&firewall.id);
        self.name = owned(&firewall.name);
        self.kind = owned(&firewall.type_label);
        self.type_name = owned(&firewall.type_name);
        self.lan_address = owned(&firewall.lan_address);
        self.wan_address = string_list(&firewall.wan_address);
        self.group = reference(&self.group, &firewall.group, &firewall.group_name);
        self.group_name = owned(&firewall.group_name);
        self.network = reference(&self.network, &firewall.network, &firewall.network_name);
        self.network_name = owned(&firewall.network_name);
        self.dhcp_enabled = Value::Value(firewall.dhcp_enabled);
        self.dhcp_range_start = remote_or(&self.dhcp_range_start, &firewall.dhcp_range_start);
        self.dhcp_range_end = remote_or(&self.dhcp_range_end, &firewall.dhcp_range_end);
        self.local_domain_name = remote_or(&self.local_domain_name, &firewall.local_domain_name);
        self.dns_enabled = Value::Value(firewall.dns_enabled);
        if !firewall.nameservers.is_empty() {
            self.nameservers = string_list(&firewall.nameservers);
        }
        settle(&mut self.nameservers);
        if firewall.termination_protected || !self.termination_protected.is_null() {
            self.termination_protected = Value::Value(firewall.termination_protected);
        }
        self.icmp_wan_enabled = Value::Value(firewall.icmp_wan_enabled);
        self.icmp_lan_enabled = Value::Value(firewall.icmp_lan_enabled);
        self.state = owned(&firewall.state);

        self.nat_rules = if rules.is_empty() && self.nat_rules.is_null() {
            Value::Null
        } else {
            Value::Value(
                rules
                    .iter()
                    .map(|rule| {
                        (
                            Cow::Owned(rule.description.clone()),
                            Value::Value(NatRuleState::from_remote(rule)),
                        )
                    })
                    .collect(),
            )
        };
    }

    /// State of a firewall known only by its id
    pub fn created(id: &str, planned: &Self) -> Self {
        let mut state = planned.clone();
        state.id = non_empty(id);
        settle(&mut state.type_name);
        settle(&mut state.wan_address);
        settle(&mut state.group);
        settle(&mut state.group_name);
        settle(&mut state.network_name);
        settle(&mut state.state);
        for rule in state.nat_rules.iter_mut().flatten().map(|(_, rule)| rule) {
            if let Value::Value(rule) = rule {
                settle(&mut rule.id);
                settle(&mut rule.source);
            }
        }
        state
    }
}
