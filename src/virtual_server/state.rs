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

use crate::client::virtual_machine::{Disk, NetworkInterface, VirtualMachine};
use crate::reconcile::{Error, Result};
use crate::utils::{
    attribute, non_empty, number, owned, reference, remote_or, sensitive, settle, string_list,
    string_list_type, strings, unknown_if_null, WithNormalize, WithSchema, WithValidate,
};
use crate::validate::{check_count, check_single_source};

use super::reconcile::{first_addresses, DiskSpec, NetworkInterfaceSpec, ServerSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DiskState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub size: ValueNumber,
    pub uuid: ValueString<'a>,
    pub label: ValueString<'a>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NetworkInterfaceState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub network: ValueString<'a>,
    pub connected: ValueBool,
    #[serde(rename = "type")]
    pub kind: ValueString<'a>,
    pub ipv4_address: ValueString<'a>,
    pub ipv6_address: ValueString<'a>,
    pub mac_address: ValueString<'a>,
    pub assigned_addresses: ValueList<ValueString<'a>>,
    pub discovered_addresses: ValueList<ValueString<'a>>,
    pub label: ValueString<'a>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VirtualServerState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub compute_cluster: ValueString<'a>,
    pub memory: ValueNumber,
    pub cpu_cores: ValueNumber,
    pub cpu_sockets: ValueNumber,
    pub group: ValueString<'a>,
    pub template: ValueString<'a>,
    pub guest_id: ValueString<'a>,
    pub source: ValueString<'a>,
    pub user_data: ValueString<'a>,
    pub provisioning_type: ValueString<'a>,
    pub termination_protection: ValueBool,
    pub state: ValueString<'a>,
    pub initial_password: ValueString<'a>,
    pub tags: ValueList<ValueString<'a>>,
    pub disks: ValueMap<'a, Value<DiskState<'a>>>,
    pub network_interfaces: ValueMap<'a, Value<NetworkInterfaceState<'a>>>,
}

impl WithSchema for VirtualServerState<'_> {
    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};

        let disk = map! {
            "id" => attribute(AttributeType::String, Computed, "Id of the disk"),
            "size" => attribute(AttributeType::Number, Required, "Size of the disk in MB"),
            "uuid" => attribute(AttributeType::String, Computed, "UUID of the disk"),
            "label" => attribute(AttributeType::String, Computed, "Label of the disk, taken from its key"),
        };
        let network_interface = map! {
            "id" => attribute(AttributeType::String, Computed, "Id of the network interface"),
            "network" => attribute(AttributeType::String, Required, "Name or id of the network"),
            "connected" => attribute(
                AttributeType::Bool,
                OptionalComputed,
                "Whether the interface is connected, defaults to true",
            ),
            "type" => attribute(AttributeType::String, OptionalComputed, "Type of the network interface"),
            "ipv4_address" => attribute(AttributeType::String, Computed, "First assigned IPv4 address"),
            "ipv6_address" => attribute(AttributeType::String, Computed, "First assigned IPv6 address"),
            "mac_address" => attribute(AttributeType::String, Computed, "MAC address"),
            "assigned_addresses" => attribute(string_list_type(), Computed, "Addresses assigned by the platform"),
            "discovered_addresses" => attribute(string_list_type(), Computed, "Addresses discovered on the interface"),
            "label" => attribute(AttributeType::String, Computed, "Label of the interface, taken from its key"),
        };

        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Virtual server of the Previder IaaS platform"),
                attributes: map! {
                    "id" => attribute(AttributeType::String, Computed, "Id of the virtual server"),
                    "name" => attribute(AttributeType::String, Required, "Name of the virtual server"),
                    "compute_cluster" => attribute(
                        AttributeType::String,
                        Required,
                        "Compute cluster the server runs on",
                    ),
                    "memory" => attribute(AttributeType::Number, Required, "Memory in MB"),
                    "cpu_cores" => attribute(AttributeType::Number, Required, "Number of cpu cores"),
                    "cpu_sockets" => attribute(AttributeType::Number, Optional, "Number of cpu sockets"),
                    "group" => attribute(
                        AttributeType::String,
                        OptionalComputed,
                        "Name or id of the group of the server",
                    ),
                    "template" => attribute(
                        AttributeType::String,
                        OptionalComputed,
                        "Template to deploy the server from",
                    ),
                    "guest_id" => attribute(
                        AttributeType::String,
                        OptionalComputed,
                        "Guest operating system id of an empty server",
                    ),
                    "source" => attribute(
                        AttributeType::String,
                        OptionalComputed,
                        "Id of the virtual server to clone",
                    ),
                    "user_data" => attribute(AttributeType::String, Optional, "Cloud-init user data"),
                    "provisioning_type" => attribute(
                        AttributeType::String,
                        Optional,
                        "Provisioning type of the template",
                    ),
                    "termination_protection" => attribute(
                        AttributeType::Bool,
                        OptionalComputed,
                        "Prevent the server from being deleted",
                    ),
                    "state" => attribute(AttributeType::String, Computed, "Power state of the server"),
                    "initial_password" => sensitive(attribute(
                        AttributeType::String,
                        Computed,
                        "Password generated at creation",
                    )),
                    "tags" => attribute(string_list_type(), Optional, "Tags of the server"),
                    "disks" => attribute(
                        AttributeType::AttributeMap(disk),
                        Required,
                        "Disks keyed by label",
                    ),
                    "network_interfaces" => attribute(
                        AttributeType::AttributeMap(network_interface),
                        Required,
                        "Network interfaces keyed by label",
                    ),
                },
                ..Default::default()
            },
        }
    }
}

impl WithNormalize for VirtualServerState<'_> {
    fn normalize(&mut self, _diags: &mut Diagnostics) {
        for (label, disk) in self.disks.iter_mut().flatten() {
            if let Value::Value(disk) = disk {
                disk.label = owned(label);
            }
        }
        for (label, nic) in self.network_interfaces.iter_mut().flatten() {
            if let Value::Value(nic) = nic {
                nic.label = owned(label);
                if nic.connected.is_null() {
                    nic.connected = Value::Value(true);
                }
            }
        }
    }
}

impl WithValidate for VirtualServerState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        for (path, err) in self.checks(attr_path) {
            diags.error("Invalid virtual server", err.to_string(), path);
        }
    }
}

impl<'a> VirtualServerState<'a> {
    /// Failed checks on the known values of the configuration
    pub fn checks(&self, attr_path: AttributePath) -> Vec<(AttributePath, Error)> {
        let mut failed = Vec::new();

        let sources = [&self.template, &self.guest_id, &self.source];
        if sources.iter().all(|source| !source.is_unknown()) {
            if let Err(err) = check_single_source(
                self.template.as_str(),
                self.guest_id.as_str(),
                self.source.as_str(),
            ) {
                failed.push((attr_path.clone().attribute("template"), err));
            }
        }

        for (name, value) in [("cpu_cores", &self.cpu_cores), ("cpu_sockets", &self.cpu_sockets)] {
            if let Err(err) = number::<u32>(name, value) {
                failed.push((attr_path.clone().attribute(name), err));
            }
        }
        if let Err(err) = number::<u64>("memory", &self.memory) {
            failed.push((attr_path.clone().attribute("memory"), err));
        }

        if let Value::Value(disks) = &self.disks {
            if let Err(err) = check_count("disks", disks.len(), 1, 16) {
                failed.push((attr_path.clone().attribute("disks"), err));
            }
            for (label, disk) in disks {
                if let Value::Value(disk) = disk {
                    if let Err(err) = number::<u64>("disk size", &disk.size) {
                        let path = attr_path.clone().attribute("disks").key(label.to_string());
                        failed.push((path.attribute("size"), err));
                    }
                }
            }
        }
        if let Value::Value(nics) = &self.network_interfaces {
            if let Err(err) = check_count("network_interfaces", nics.len(), 1, 8) {
                failed.push((attr_path.clone().attribute("network_interfaces"), err));
            }
        }

        failed
    }

    pub fn spec(&self) -> Result<ServerSpec> {
        if let Some((_, err)) = self.checks(AttributePath::root()).into_iter().next() {
            return Err(err);
        }

        let mut disks = BTreeMap::new();
        for (label, disk) in self.disks.iter().flatten() {
            if let Value::Value(disk) = disk {
                disks.insert(
                    label.to_string(),
                    DiskSpec {
                        size: number("disk size", &disk.size)?,
                    },
                );
            }
        }
        let network_interfaces = self
            .network_interfaces
            .iter()
            .flatten()
            .filter_map(|(label, nic)| nic.as_ref_option().map(|nic| (label, nic)))
            .map(|(label, nic)| {
                (
                    label.to_string(),
                    NetworkInterfaceSpec {
                        network: nic.network.as_str().to_owned(),
                        connected: nic.connected.unwrap_or(true),
                        kind: nic.kind.as_str().to_owned(),
                    },
                )
            })
            .collect();

        Ok(ServerSpec {
            name: self.name.as_str().to_owned(),
            compute_cluster: self.compute_cluster.as_str().to_owned(),
            cpu_cores: number("cpu_cores", &self.cpu_cores)?,
            cpu_sockets: match self.cpu_sockets {
                Value::Value(_) => Some(number("cpu_sockets", &self.cpu_sockets)?),
                _ => None,
            },
            memory: number("memory", &self.memory)?,
            group: self.group.as_str().to_owned(),
            template: self.template.as_str().to_owned(),
            guest_id: self.guest_id.as_str().to_owned(),
            source: self.source.as_str().to_owned(),
            user_data: self.user_data.as_str().to_owned(),
            provisioning_type: self.provisioning_type.as_str().to_owned(),
            termination_protection: self.termination_protection.unwrap_or_default(),
            tags: strings(&self.tags),
            disks,
            network_interfaces,
        })
    }

    /// Mark the values computed by the platform as unknown
    pub fn plan_computed(&mut self, prior: Option<&Self>) {
        if prior.is_none() {
            self.id = Value::Unknown;
            self.state = Value::Unknown;
            self.initial_password = Value::Unknown;
            unknown_if_null(&mut self.group);
            unknown_if_null(&mut self.template);
            unknown_if_null(&mut self.guest_id);
            unknown_if_null(&mut self.source);
            unknown_if_null(&mut self.termination_protection);
        }

        let prior_disks = prior.and_then(|prior| prior.disks.as_ref_option());
        for (label, disk) in self.disks.iter_mut().flatten() {
            let Value::Value(disk) = disk else { continue };
            let prior_disk = prior_disks
                .and_then(|disks| disks.get(label))
                .and_then(Value::as_ref_option);
            match prior_disk {
                Some(prior_disk) => {
                    disk.id = prior_disk.id.clone();
                    disk.uuid = prior_disk.uuid.clone();
                }
                None => {
                    disk.id = Value::Unknown;
                    disk.uuid = Value::Unknown;
                }
            }
        }

        let prior_nics = prior.and_then(|prior| prior.network_interfaces.as_ref_option());
        for (label, nic) in self.network_interfaces.iter_mut().flatten() {
            let Value::Value(nic) = nic else { continue };
            let prior_nic = prior_nics
                .and_then(|nics| nics.get(label))
                .and_then(Value::as_ref_option);
            match prior_nic {
                Some(prior_nic) => {
                    nic.id = prior_nic.id.clone();
                    nic.mac_address = prior_nic.mac_address.clone();
                    if nic.kind.is_null() {
                        nic.kind = prior_nic.kind.clone();
                    }
                    if nic.network == prior_nic.network {
                        nic.ipv4_address = prior_nic.ipv4_address.clone();
                        nic.ipv6_address = prior_nic.ipv6_address.clone();
                        nic.assigned_addresses = prior_nic.assigned_addresses.clone();
                        nic.discovered_addresses = prior_nic.discovered_addresses.clone();
                    } else {
                        nic.unknown_addresses();
                    }
                }
                None => {
                    nic.id = Value::Unknown;
                    nic.mac_address = Value::Unknown;
                    unknown_if_null(&mut nic.kind);
                    nic.unknown_addresses();
                }
            }
        }
    }

    pub fn refresh(&mut self, vm: &VirtualMachine) {
        self.id = owned(&vm.id);
        self.name = owned(&vm.name);
        self.compute_cluster = remote_or(&self.compute_cluster, &vm.compute_cluster);
        self.memory = Value::Value(to_number(vm.memory));
        self.cpu_cores = Value::Value(vm.cpu_cores.into());
        if vm.cpu_sockets != 0 && !self.cpu_sockets.is_null() {
            self.cpu_sockets = Value::Value(vm.cpu_sockets.into());
        }
        self.group = reference(&self.group, &vm.group, "");
        self.template = remote_or(&self.template, &vm.template);
        settle(&mut self.template);
        self.guest_id = remote_or(&self.guest_id, &vm.guest_id);
        settle(&mut self.guest_id);
        settle(&mut self.source);
        self.termination_protection = Value::Value(vm.termination_protection_enabled);
        self.state = owned(&vm.state);
        self.initial_password = remote_or(&self.initial_password, &vm.initial_password);
        settle(&mut self.initial_password);
        self.tags = if vm.tags.is_empty() && self.tags.is_null() {
            Value::Null
        } else {
            string_list(&vm.tags)
        };

        self.disks = Value::Value(
            vm.disks
                .iter()
                .map(|disk| {
                    (
                        Cow::Owned(disk.label.clone()),
                        Value::Value(DiskState::from_remote(disk)),
                    )
                })
                .collect(),
        );

        let configured = self.network_interfaces.as_ref_option();
        let network_interfaces = vm
            .network_interfaces
            .iter()
            .map(|nic| {
                let configured = configured
                    .and_then(|nics| nics.get(nic.label.as_str()))
                    .and_then(Value::as_ref_option);
                (
                    Cow::Owned(nic.label.clone()),
                    Value::Value(NetworkInterfaceState::from_remote(nic, configured)),
                )
            })
            .collect();
        self.network_interfaces = Value::Value(network_interfaces);
    }

    /// State of a server known only by its id
    pub fn created(id: &str, planned: &Self) -> Self {
        let mut state = planned.clone();
        state.id = non_empty(id);
        settle(&mut state.state);
        settle(&mut state.initial_password);
        settle(&mut state.group);
        settle(&mut state.template);
        settle(&mut state.guest_id);
        settle(&mut state.source);
        settle(&mut state.termination_protection);
        for disk in state.disks.iter_mut().flatten().map(|(_, disk)| disk) {
            if let Value::Value(disk) = disk {
                settle(&mut disk.id);
                settle(&mut disk.uuid);
            }
        }
        for nic in state.network_interfaces.iter_mut().flatten().map(|(_, nic)| nic) {
            if let Value::Value(nic) = nic {
                settle(&mut nic.id);
                settle(&mut nic.kind);
                settle(&mut nic.mac_address);
                settle(&mut nic.ipv4_address);
                settle(&mut nic.ipv6_address);
                settle(&mut nic.assigned_addresses);
                settle(&mut nic.discovered_addresses);
            }
        }
        state
    }

    /// Whether the plan resizes the server, which powers it off
    pub fn resizes(&self, prior: &Self) -> bool {
        self.cpu_cores != prior.cpu_cores || self.memory != prior.memory
    }
}

impl DiskState<'_> {
    fn from_remote<'a>(disk: &Disk) -> DiskState<'a> {
        DiskState {
            id: owned(&disk.id),
            size: Value::Value(to_number(disk.size)),
            uuid: owned(&disk.uuid),
            label: owned(&disk.label),
        }
    }
}

impl NetworkInterfaceState<'_> {
    fn unknown_addresses(&mut self) {
        self.ipv4_address = Value::Unknown;
        self.ipv6_address = Value::Unknown;
        self.assigned_addresses = Value::Unknown;
        self.discovered_addresses = Value::Unknown;
    }

    fn from_remote<'a>(nic: &NetworkInterface, configured: Option<&Self>) -> NetworkInterfaceState<'a> {
        let (ipv4, ipv6) = first_addresses(&nic.assigned_addresses);
        let configured_network = configured.map(|c| c.network.clone()).unwrap_or_default();
        let configured_kind = configured.map(|c| c.kind.clone()).unwrap_or_default();
        let mut kind = remote_or(&configured_kind, &nic.kind);
        settle(&mut kind);

        NetworkInterfaceState {
            id: owned(&nic.id),
            network: reference(&configured_network, &nic.network, ""),
            connected: Value::Value(nic.connected),
            kind,
            ipv4_address: ipv4.map_or(Value::Null, |ip| owned(&ip.to_string())),
            ipv6_address: ipv6.map_or(Value::Null, |ip| owned(&ip.to_string())),
            mac_address: non_empty(&nic.mac_address),
            assigned_addresses: string_list(&nic.assigned_addresses),
            discovered_addresses: string_list(&nic.discovered_addresses),
            label: owned(&nic.label),
        }
    }
}

fn to_number(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nic<'a>(network: &'a str) -> NetworkInterfaceState<'a> {
        NetworkInterfaceState {
            network: Value::from(network),
            ..Default::default()
        }
    }

    fn server<'a>() -> VirtualServerState<'a> {
        VirtualServerState {
            name: Value::from("web"),
            compute_cluster: Value::from("cluster-1"),
            memory: Value::Value(4096),
            cpu_cores: Value::Value(2),
            template: Value::from("ubuntu"),
            disks: Value::Value(BTreeMap::from([(
                Cow::from("disk0"),
                Value::Value(DiskState {
                    size: Value::Value(20480),
                    ..Default::default()
                }),
            )])),
            network_interfaces: Value::Value(BTreeMap::from([(
                Cow::from("nic0"),
                Value::Value(nic("lan")),
            )])),
            ..Default::default()
        }
    }

    fn remote() -> VirtualMachine {
        VirtualMachine {
            id: String::from("vm-1"),
            name: String::from("web"),
            group: String::from("5f1e5c6b7d8e9f0a1b2c3d4e"),
            compute_cluster: String::from("cluster-1"),
            cpu_cores: 2,
            memory: 4096,
            template: String::from("ubuntu"),
            state: String::from("POWEREDON"),
            disks: vec![Disk {
                id: String::from("d0"),
                size: 20480,
                uuid: String::from("u0"),
                label: String::from("disk0"),
            }],
            network_interfaces: vec![NetworkInterface {
                id: String::from("n0"),
                network: String::from("5f1e5c6b7d8e9f0a1b2c3d4f"),
                connected: true,
                label: String::from("nic0"),
                kind: String::from("VMXNET3"),
                mac_address: String::from("00:50:56:00:00:01"),
                assigned_addresses: vec![String::from("fe80::1"), String::from("10.0.0.5")],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn normalize_labels_entries_and_connects_interfaces() {
        let mut state = server();
        state.normalize(&mut Diagnostics::default());
        let disk = state.disks.as_ref_option().unwrap()["disk0"].as_ref_option().unwrap();
        assert_eq!(disk.label, Value::from("disk0"));
        let nic = state.network_interfaces.as_ref_option().unwrap()["nic0"]
            .as_ref_option()
            .unwrap();
        assert_eq!(nic.connected, Value::Value(true));

        let spec = state.spec().unwrap();
        assert_eq!(spec.disks["disk0"].size, 20480);
        assert!(spec.network_interfaces["nic0"].connected);
        assert_eq!(spec.cpu_sockets, None);
    }

    #[test]
    fn several_sources_are_reported() {
        let mut state = server();
        state.source = Value::from("vm-0");
        let failed = state.checks(AttributePath::root());
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, AttributePath::new("template"));

        // Unknown sources are checked at apply time
        state.source = Value::Unknown;
        assert!(state.checks(AttributePath::root()).is_empty());
    }

    #[test]
    fn disk_and_interface_counts_are_bounded() {
        let mut state = server();
        state.disks = Value::Value(BTreeMap::new());
        state.network_interfaces = Value::Value(
            (0..9)
                .map(|i| (Cow::Owned(format!("nic{i}")), Value::Value(nic("lan"))))
                .collect(),
        );
        let paths: Vec<_> = state
            .checks(AttributePath::root())
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert_eq!(
            paths,
            vec![AttributePath::new("disks"), AttributePath::new("network_interfaces")]
        );
    }

    #[test]
    fn refresh_keeps_configured_names_and_splits_addresses() {
        let mut state = server();
        state.refresh(&remote());

        assert_eq!(state.id, Value::from("vm-1"));
        assert_eq!(state.group, Value::from("5f1e5c6b7d8e9f0a1b2c3d4e"));
        assert_eq!(state.tags, Value::Null);
        let nic = state.network_interfaces.as_ref_option().unwrap()["nic0"]
            .as_ref_option()
            .unwrap();
        assert_eq!(nic.network, Value::from("lan"));
        assert_eq!(nic.ipv4_address, Value::from("10.0.0.5"));
        assert_eq!(nic.ipv6_address, Value::from("fe80::1"));
        assert_eq!(nic.kind, Value::from("VMXNET3"));
    }

    #[test]
    fn refresh_is_stable() {
        let mut first = server();
        first.refresh(&remote());
        let mut second = first.clone();
        second.refresh(&remote());
        assert_eq!(first, second);
    }

    #[test]
    fn new_entries_are_planned_unknown() {
        let mut prior = server();
        prior.refresh(&remote());

        let mut planned = prior.clone();
        if let Value::Value(nics) = &mut planned.network_interfaces {
            nics.insert(Cow::from("nic1"), Value::Value(nic("dmz")));
        }
        planned.normalize(&mut Diagnostics::default());
        planned.plan_computed(Some(&prior));

        let nics = planned.network_interfaces.as_ref_option().unwrap();
        let kept = nics["nic0"].as_ref_option().unwrap();
        assert_eq!(kept.id, Value::from("n0"));
        assert_eq!(kept.ipv4_address, Value::from("10.0.0.5"));
        let added = nics["nic1"].as_ref_option().unwrap();
        assert!(added.id.is_unknown());
        assert!(added.ipv4_address.is_unknown());
        assert!(!planned.resizes(&prior));
    }

    #[test]
    fn created_settles_unknowns() {
        let mut planned = server();
        planned.plan_computed(None);
        let state = VirtualServerState::created("vm-1", &planned);
        assert_eq!(state.id, Value::from("vm-1"));
        assert_eq!(state.guest_id, Value::Null);
        assert_eq!(state.template, Value::from("ubuntu"));
        let disk = state.disks.as_ref_option().unwrap()["disk0"].as_ref_option().unwrap();
        assert_eq!(disk.id, Value::Null);
    }
}
