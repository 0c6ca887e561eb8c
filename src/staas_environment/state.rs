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
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use tf_provider::schema::{AttributeConstraint, AttributeType, Block, Description, Schema};
use tf_provider::value::{Value, ValueBool, ValueList, ValueMap, ValueNumber, ValueString};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::client::staas::{StaasEnvironment, StaasNetwork, StaasVolume};
use crate::reconcile::{Error, Result};
use crate::utils::{
    attribute, non_empty, number, owned, remote_or, settle, string_list, string_list_type,
    strings, unknown_if_null, WithSchema, WithValidate,
};
use crate::validate::{check_count, parse_cidr};

use super::reconcile::{EnvironmentSpec, NetworkAttachmentSpec, VolumeSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StaasVolumeState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub size_mb: ValueNumber,
    pub state: ValueString<'a>,
    #[serde(rename = "type")]
    pub kind: ValueString<'a>,
    pub allowed_ips_ro: ValueList<ValueString<'a>>,
    pub allowed_ips_rw: ValueList<ValueString<'a>>,
    pub synchronous_environment_id: ValueString<'a>,
    pub synchronous_environment_name: ValueString<'a>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StaasNetworkState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub state: ValueString<'a>,
    pub network_id: ValueString<'a>,
    pub network_name: ValueString<'a>,
    pub ip_addresses: ValueList<ValueString<'a>>,
    pub cidr: ValueString<'a>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StaasEnvironmentState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub state: ValueString<'a>,
    pub windows: ValueBool,
    pub cluster: ValueString<'a>,
    #[serde(rename = "type")]
    pub kind: ValueString<'a>,
    pub volumes: ValueMap<'a, Value<StaasVolumeState<'a>>>,
    pub networks: ValueMap<'a, Value<StaasNetworkState<'a>>>,
}

impl WithSchema for StaasEnvironmentState<'_> {
    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};

        let volume = map! {
            "id" => attribute(AttributeType::String, Computed, "Id of the volume"),
            "name" => attribute(AttributeType::String, Required, "Name of the volume"),
            "size_mb" => attribute(AttributeType::Number, Required, "Size of the volume in MB"),
            "state" => attribute(AttributeType::String, Computed, "State of the volume"),
            "type" => attribute(AttributeType::String, Required, "Type of the volume"),
            "allowed_ips_ro" => attribute(string_list_type(), Optional, "CIDRs with read-only access"),
            "allowed_ips_rw" => attribute(string_list_type(), Optional, "CIDRs with read-write access"),
            "synchronous_environment_id" => attribute(
                AttributeType::String,
                OptionalComputed,
                "Id of the environment the volume is replicated to",
            ),
            "synchronous_environment_name" => attribute(
                AttributeType::String,
                OptionalComputed,
                "Name of the environment the volume is replicated to",
            ),
        };
        let network = map! {
            "id" => attribute(AttributeType::String, Computed, "Id of the attachment"),
            "state" => attribute(AttributeType::String, Computed, "State of the attachment"),
            "network_id" => attribute(AttributeType::String, Required, "Id of the attached VLAN"),
            "network_name" => attribute(AttributeType::String, Computed, "Name of the attached VLAN"),
            "ip_addresses" => attribute(
                string_list_type(),
                OptionalComputed,
                "Addresses of the environment in the network",
            ),
            "cidr" => attribute(AttributeType::String, Required, "Address of the environment in CIDR notation"),
        };

        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Storage as a service environment of the Previder platform"),
                attributes: map! {
                    "id" => attribute(AttributeType::String, Computed, "Id of the STaaS environment"),
                    "name" => attribute(AttributeType::String, Required, "Name of the environment"),
                    "state" => attribute(AttributeType::String, Computed, "State of the environment"),
                    "windows" => attribute(AttributeType::Bool, OptionalComputed, "Serve Windows clients"),
                    "cluster" => attribute(AttributeType::String, Required, "Storage cluster of the environment"),
                    "type" => attribute(AttributeType::String, Required, "Type of the environment"),
                    "volumes" => attribute(
                        AttributeType::AttributeMap(volume),
                        Required,
                        "Volumes of the environment",
                    ),
                    "networks" => attribute(
                        AttributeType::AttributeMap(network),
                        Required,
                        "Networks the environment is attached to",
                    ),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for StaasEnvironmentState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        for (path, err) in self.checks(attr_path) {
            diags.error("Error in STaaS environment", err.to_string(), path);
        }
    }
}

fn cidr_checks(list: &ValueList<ValueString>, attr_path: AttributePath, failed: &mut Vec<(AttributePath, Error)>) {
    for (index, cidr) in list.iter().flatten().enumerate() {
        if let Some(cidr) = cidr.as_deref_option() {
            if parse_cidr(cidr).is_err() {
                failed.push((
                    attr_path.clone().index(index as i64),
                    Error::validation(format!("Invalid CIDR {cidr}")),
                ));
            }
        }
    }
}

impl<'a> StaasEnvironmentState<'a> {
    pub fn checks(&self, attr_path: AttributePath) -> Vec<(AttributePath, Error)> {
        let mut failed = Vec::new();

        if let Value::Value(volumes) = &self.volumes {
            let path = attr_path.clone().attribute("volumes");
            if let Err(err) = check_count("volumes", volumes.len(), 0, 16) {
                failed.push((path.clone(), err));
            }
            for (key, volume) in volumes {
                let Value::Value(volume) = volume else { continue };
                let path = path.clone().key(key.to_string());
                if let Err(err) = number::<u64>("size_mb", &volume.size_mb) {
                    failed.push((path.clone().attribute("size_mb"), err));
                }
                cidr_checks(&volume.allowed_ips_ro, path.clone().attribute("allowed_ips_ro"), &mut failed);
                cidr_checks(&volume.allowed_ips_rw, path.attribute("allowed_ips_rw"), &mut failed);
            }
        }
        if let Value::Value(networks) = &self.networks {
            let path = attr_path.attribute("networks");
            if let Err(err) = check_count("networks", networks.len(), 0, 16) {
                failed.push((path.clone(), err));
            }
            for (key, network) in networks {
                let Value::Value(network) = network else { continue };
                if let Some(cidr) = network.cidr.as_deref_option() {
                    if parse_cidr(cidr).is_err() {
                        failed.push((
                            path.clone().key(key.to_string()).attribute("cidr"),
                            Error::validation(format!("Invalid CIDR {cidr}")),
                        ));
                    }
                }
            }
        }

        failed
    }

    pub fn spec(&self) -> Result<EnvironmentSpec> {
        if let Some((_, err)) = self.checks(AttributePath::root()).into_iter().next() {
            return Err(err);
        }

        let mut volumes = BTreeMap::new();
        for volume in self.volumes.iter().flatten().filter_map(|(_, v)| v.as_ref_option()) {
            let name = volume.name.as_str().to_owned();
            let spec = VolumeSpec {
                name: name.clone(),
                size_mb: number("size_mb", &volume.size_mb)?,
                kind: volume.kind.as_str().to_owned(),
                allowed_ips_ro: strings(&volume.allowed_ips_ro),
                allowed_ips_rw: strings(&volume.allowed_ips_rw),
                synchronous_environment_id: volume.synchronous_environment_id.as_str().to_owned(),
            };
            if volumes.insert(name.clone(), spec).is_some() {
                return Err(Error::validation(format!("Volume {name} is declared twice")));
            }
        }

        let mut networks = BTreeMap::new();
        for network in self.networks.iter().flatten().filter_map(|(_, n)| n.as_ref_option()) {
            let network_id = network.network_id.as_str().to_owned();
            let spec = NetworkAttachmentSpec {
                network_id: network_id.clone(),
                cidr: network.cidr.as_str().to_owned(),
            };
            if networks.insert(network_id.clone(), spec).is_some() {
                return Err(Error::validation(format!("Network {network_id} is declared twice")));
            }
        }

        Ok(EnvironmentSpec {
            name: self.name.as_str().to_owned(),
            kind: self.kind.as_str().to_owned(),
            cluster: self.cluster.as_str().to_owned(),
            windows: self.windows.unwrap_or_default(),
            volumes,
            networks,
        })
    }

    /// Mark the values computed by the platform as unknown
    pub fn plan_computed(&mut self, prior: Option<&Self>) {
        match prior {
            None => {
                self.id = Value::Unknown;
                self.state = Value::Unknown;
                unknown_if_null(&mut self.windows);
            }
            Some(prior) if *self != *prior => self.state = Value::Unknown,
            Some(_) => (),
        }

        let prior_volumes = prior.and_then(|prior| prior.volumes.as_ref_option());
        for (key, volume) in self.volumes.iter_mut().flatten() {
            let Value::Value(volume) = volume else { continue };
            let prior_volume = prior_volumes
                .and_then(|volumes| volumes.get(key))
                .and_then(Value::as_ref_option)
                .filter(|prior| prior.name == volume.name);
            match prior_volume {
                Some(prior_volume) => {
                    volume.id = prior_volume.id.clone();
                    volume.state = if volume.size_mb == prior_volume.size_mb
                        && volume.allowed_ips_ro == prior_volume.allowed_ips_ro
                        && volume.allowed_ips_rw == prior_volume.allowed_ips_rw
                    {
                        prior_volume.state.clone()
                    } else {
                        Value::Unknown
                    };
                }
                None => {
                    volume.id = Value::Unknown;
                    volume.state = Value::Unknown;
                    unknown_if_null(&mut volume.synchronous_environment_id);
                    unknown_if_null(&mut volume.synchronous_environment_name);
                }
            }
        }

        let prior_networks = prior.and_then(|prior| prior.networks.as_ref_option());
        for (key, network) in self.networks.iter_mut().flatten() {
            let Value::Value(network) = network else { continue };
            let prior_network = prior_networks
                .and_then(|networks| networks.get(key))
                .and_then(Value::as_ref_option)
                .filter(|prior| prior.network_id == network.network_id);
            match prior_network {
                Some(prior_network) => {
                    network.id = prior_network.id.clone();
                    network.state = prior_network.state.clone();
                    network.network_name = prior_network.network_name.clone();
                }
                None => {
                    network.id = Value::Unknown;
                    network.state = Value::Unknown;
                    network.network_name = Value::Unknown;
                    unknown_if_null(&mut network.ip_addresses);
                }
            }
        }
    }

    pub fn refresh(&mut self, env: &StaasEnvironment) {
        self.id = owned(&env.id);
        self.name = owned(&env.name);
        self.state = owned(&env.state);
        self.windows = Value::Value(env.windows);
        self.cluster = remote_or(&self.cluster, &env.cluster);
        self.kind = remote_or(&self.kind, &env.kind);

        // Volumes are matched by name and networks by network id, keeping configured keys
        let volume_keys: HashMap<String, Cow<'a, str>> = self
            .volumes
            .iter()
            .flatten()
            .filter_map(|(key, volume)| Some((volume.as_ref_option()?.name.as_str().to_owned(), key.clone())))
            .collect();
        let configured_volumes = std::mem::take(&mut self.volumes);
        self.volumes = Value::Value(
            env.volumes
                .iter()
                .map(|volume| {
                    let key = volume_keys
                        .get(&volume.name)
                        .cloned()
                        .unwrap_or_else(|| Cow::Owned(volume.name.clone()));
                    let configured = configured_volumes
                        .as_ref_option()
                        .and_then(|volumes| volumes.get(&key))
                        .and_then(Value::as_ref_option);
                    let state = StaasVolumeState::from_remote(volume, configured);
                    (key, Value::Value(state))
                })
                .collect(),
        );

        let network_keys: HashMap<String, Cow<'a, str>> = self
            .networks
            .iter()
            .flatten()
            .filter_map(|(key, network)| {
                Some((network.as_ref_option()?.network_id.as_str().to_owned(), key.clone()))
            })
            .collect();
        let configured_networks = std::mem::take(&mut self.networks);
        self.networks = Value::Value(
            env.networks
                .iter()
                .map(|network| {
                    let key = network_keys
                        .get(&network.network_id)
                        .cloned()
                        .unwrap_or_else(|| Cow::Owned(network.network_id.clone()));
                    let configured = configured_networks
                        .as_ref_option()
                        .and_then(|networks| networks.get(&key))
                        .and_then(Value::as_ref_option);
                    let state = StaasNetworkState::from_remote(network, configured);
                    (key, Value::Value(state))
                })
                .collect(),
        );
    }

    /// State of an environment known only by its id
    pub fn created(id: &str, planned: &Self) -> Self {
        let mut state = planned.clone();
        state.id = non_empty(id);
        settle(&mut state.state);
        settle(&mut state.windows);
        for volume in state.volumes.iter_mut().flatten().map(|(_, volume)| volume) {
            if let Value::Value(volume) = volume {
                settle(&mut volume.id);
                settle(&mut volume.state);
                settle(&mut volume.synchronous_environment_id);
                settle(&mut volume.synchronous_environment_name);
            }
        }
        for network in state.networks.iter_mut().flatten().map(|(_, network)| network) {
            if let Value::Value(network) = network {
                settle(&mut network.id);
                settle(&mut network.state);
                settle(&mut network.network_name);
                settle(&mut network.ip_addresses);
            }
        }
        state
    }
}

fn address_list<'a>(configured: Option<&ValueList<ValueString>>, remote: &[String]) -> ValueList<ValueString<'a>> {
    if remote.is_empty() && configured.map_or(true, Value::is_null) {
        Value::Null
    } else {
        string_list(remote)
    }
}

impl StaasVolumeState<'_> {
    fn from_remote<'a>(volume: &StaasVolume, configured: Option<&Self>) -> StaasVolumeState<'a> {
        let mut synchronous_environment_id = remote_or(
            &configured.map(|c| c.synchronous_environment_id.clone()).unwrap_or_default(),
            &volume.synchronous_environment_id,
        );
        settle(&mut synchronous_environment_id);
        let mut synchronous_environment_name = remote_or(
            &configured.map(|c| c.synchronous_environment_name.clone()).unwrap_or_default(),
            &volume.synchronous_environment_name,
        );
        settle(&mut synchronous_environment_name);

        StaasVolumeState {
            id: owned(&volume.id),
            name: owned(&volume.name),
            size_mb: Value::Value(i64::try_from(volume.size_mb).unwrap_or(i64::MAX)),
            state: owned(&volume.state),
            kind: owned(&volume.kind),
            allowed_ips_ro: address_list(configured.map(|c| &c.allowed_ips_ro), &volume.allowed_ips_ro),
            allowed_ips_rw: address_list(configured.map(|c| &c.allowed_ips_rw), &volume.allowed_ips_rw),
            synchronous_environment_id,
            synchronous_environment_name,
        }
    }
}

impl StaasNetworkState<'_> {
    fn from_remote<'a>(network: &StaasNetwork, configured: Option<&Self>) -> StaasNetworkState<'a> {
        StaasNetworkState {
            id: owned(&network.id),
            state: owned(&network.state),
            network_id: owned(&network.network_id),
            network_name: owned(&network.network_name),
            ip_addresses: string_list(&network.ip_addresses),
            cidr: remote_or(
                &configured.map(|c| c.cidr.clone()).unwrap_or_default(),
                &network.cidr,
            ),
        }
    }
}
