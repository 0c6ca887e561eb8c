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

use serde::{Deserialize, Serialize};

use tf_provider::schema::{AttributeConstraint, AttributeType, Block, Description, Schema};
use tf_provider::value::{Value, ValueBool, ValueList, ValueNumber, ValueString};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::client::kubernetes::{KubernetesCluster, KubernetesClusterCreate, KubernetesClusterUpdate};
use crate::reconcile::{Error, Result};
use crate::utils::{
    attribute, non_empty, number, owned, reference, remote_or, sensitive, settle, string_list,
    string_list_type, strings, unknown_if_null, WithSchema, WithValidate,
};
use crate::validate::parse_ip;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct KubernetesClusterState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub state: ValueString<'a>,
    pub version: ValueString<'a>,
    pub vips: ValueList<ValueString<'a>>,
    pub endpoints: ValueList<ValueString<'a>>,
    pub minimal_nodes: ValueNumber,
    pub maximal_nodes: ValueNumber,
    pub auto_update: ValueBool,
    pub auto_scale_enabled: ValueBool,
    pub control_plane_cpu_cores: ValueNumber,
    pub control_plane_memory_gb: ValueNumber,
    pub control_plane_storage_gb: ValueNumber,
    pub node_cpu_cores: ValueNumber,
    pub node_memory_gb: ValueNumber,
    pub node_storage_gb: ValueNumber,
    pub compute_cluster: ValueString<'a>,
    pub cni: ValueString<'a>,
    pub high_available_control_plane: ValueBool,
    pub network: ValueString<'a>,
    pub reference: ValueString<'a>,
    pub kubeconfig: ValueString<'a>,
}

impl WithSchema for KubernetesClusterState<'_> {
    fn schema() -> Schema {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};
        use AttributeType::{Bool, Number, String};

        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Managed Kubernetes cluster of the Previder platform"),
                attributes: map! {
                    "id" => attribute(String, Computed, "Id of the Kubernetes cluster"),
                    "name" => attribute(String, Required, "Name of the cluster"),
                    "state" => attribute(String, Computed, "State of the cluster"),
                    "version" => attribute(String, OptionalComputed, "Kubernetes version"),
                    "vips" => attribute(
                        string_list_type(),
                        Required,
                        "Virtual IPs of the control plane, changing them replaces the cluster",
                    ),
                    "endpoints" => attribute(string_list_type(), Optional, "Public endpoints of the cluster"),
                    "minimal_nodes" => attribute(Number, Required, "Minimal number of nodes"),
                    "maximal_nodes" => attribute(Number, OptionalComputed, "Maximal number of nodes"),
                    "auto_update" => attribute(Bool, OptionalComputed, "Update Kubernetes automatically"),
                    "auto_scale_enabled" => attribute(Bool, OptionalComputed, "Scale the nodes automatically"),
                    "control_plane_cpu_cores" => attribute(Number, Required, "Cpu cores of a control plane node"),
                    "control_plane_memory_gb" => attribute(Number, Required, "Memory of a control plane node"),
                    "control_plane_storage_gb" => attribute(Number, Required, "Storage of a control plane node"),
                    "node_cpu_cores" => attribute(Number, Required, "Cpu cores of a worker node"),
                    "node_memory_gb" => attribute(Number, Required, "Memory of a worker node"),
                    "node_storage_gb" => attribute(Number, Required, "Storage of a worker node"),
                    "compute_cluster" => attribute(String, Required, "Compute cluster of the nodes"),
                    "cni" => attribute(
                        String,
                        OptionalComputed,
                        "Network plugin, changing it replaces the cluster",
                    ),
                    "high_available_control_plane" => attribute(
                        Bool,
                        Required,
                        "Run three control plane nodes",
                    ),
                    "network" => attribute(
                        String,
                        Required,
                        "Name or id of the network, changing it replaces the cluster",
                    ),
                    "reference" => attribute(String, Computed, "Reference of the cluster"),
                    "kubeconfig" => sensitive(attribute(String, Computed, "Kubeconfig of the cluster")),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for KubernetesClusterState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        for (path, err) in self.checks(attr_path) {
            diags.error("Invalid Kubernetes cluster", err.to_string(), path);
        }
    }
}

const COUNTS: [&str; 8] = [
    "minimal_nodes",
    "maximal_nodes",
    "control_plane_cpu_cores",
    "control_plane_memory_gb",
    "control_plane_storage_gb",
    "node_cpu_cores",
    "node_memory_gb",
    "node_storage_gb",
];

impl<'a> KubernetesClusterState<'a> {
    fn counts(&self) -> [&ValueNumber; 8] {
        [
            &self.minimal_nodes,
            &self.maximal_nodes,
            &self.control_plane_cpu_cores,
            &self.control_plane_memory_gb,
            &self.control_plane_storage_gb,
            &self.node_cpu_cores,
            &self.node_memory_gb,
            &self.node_storage_gb,
        ]
    }

    pub fn checks(&self, attr_path: AttributePath) -> Vec<(AttributePath, Error)> {
        let mut failed = Vec::new();

        for (name, value) in COUNTS.into_iter().zip(self.counts()) {
            if let Err(err) = number::<u32>(name, value) {
                failed.push((attr_path.clone().attribute(name), err));
            }
        }
        if let (Value::Value(minimal), Value::Value(maximal)) = (&self.minimal_nodes, &self.maximal_nodes) {
            if maximal < minimal {
                failed.push((
                    attr_path.clone().attribute("maximal_nodes"),
                    Error::validation("maximal_nodes cannot be lower than minimal_nodes"),
                ));
            }
        }

        for (name, list) in [("vips", &self.vips), ("endpoints", &self.endpoints)] {
            for (index, address) in list.iter().flatten().enumerate() {
                if let Some(address) = address.as_deref_option() {
                    if let Err(err) = parse_ip(address) {
                        failed.push((attr_path.clone().attribute(name).index(index as i64), err));
                    }
                }
            }
        }
        if let Value::Value(vips) = &self.vips {
            if vips.is_empty() {
                failed.push((
                    attr_path.clone().attribute("vips"),
                    Error::validation("at least one VIP is required"),
                ));
            }
        }

        failed
    }

    pub fn spec(&self) -> Result<KubernetesClusterCreate> {
        if let Some((_, err)) = self.checks(AttributePath::root()).into_iter().next() {
            return Err(err);
        }
        let mut counts = [0u32; 8];
        for ((count, name), value) in counts.iter_mut().zip(COUNTS).zip(self.counts()) {
            *count = number(name, value)?;
        }
        let [minimal_nodes, maximal_nodes, control_plane_cpu_cores, control_plane_memory_gb, control_plane_storage_gb, node_cpu_cores, node_memory_gb, node_storage_gb] =
            counts;

        Ok(KubernetesClusterCreate {
            settings: KubernetesClusterUpdate {
                name: self.name.as_str().to_owned(),
                version: self.version.as_str().to_owned(),
                minimal_nodes,
                maximal_nodes,
                auto_update: self.auto_update.unwrap_or_default(),
                auto_scale_enabled: self.auto_scale_enabled.unwrap_or_default(),
                control_plane_cpu_cores,
                control_plane_memory_gb,
                control_plane_storage_gb,
                node_cpu_cores,
                node_memory_gb,
                node_storage_gb,
                compute_cluster: self.compute_cluster.as_str().to_owned(),
                high_available_control_plane: self.high_available_control_plane.unwrap_or_default(),
            },
            cni: self.cni.as_str().to_owned(),
            network: self.network.as_str().to_owned(),
            vips: strings(&self.vips),
            endpoints: strings(&self.endpoints),
        })
    }

    /// Mark the values computed by the platform as unknown
    pub fn plan_computed(&mut self, prior: Option<&Self>) {
        match prior {
            None => {
                self.id = Value::Unknown;
                self.state = Value::Unknown;
                self.reference = Value::Unknown;
                self.kubeconfig = Value::Unknown;
                unknown_if_null(&mut self.version);
                unknown_if_null(&mut self.maximal_nodes);
                unknown_if_null(&mut self.auto_update);
                unknown_if_null(&mut self.auto_scale_enabled);
                unknown_if_null(&mut self.cni);
            }
            Some(prior) if *self != *prior => self.state = Value::Unknown,
            Some(_) => (),
        }
    }

    pub fn refresh(&mut self, cluster: &KubernetesCluster, kubeconfig: Option<&str>) {
        self.id = owned(&cluster.id);
        self.name = owned(&cluster.name);
        self.state = owned(&cluster.state);
        self.version = remote_or(&self.version, &cluster.version);
        settle(&mut self.version);
        self.vips = string_list(&cluster.vips);
        self.endpoints = if cluster.endpoints.is_empty() && self.endpoints.is_null() {
            Value::Null
        } else {
            string_list(&cluster.endpoints)
        };
        self.minimal_nodes = Value::Value(cluster.minimal_nodes.into());
        self.maximal_nodes = Value::Value(cluster.maximal_nodes.into());
        self.auto_update = Value::Value(cluster.auto_update);
        self.auto_scale_enabled = Value::Value(cluster.auto_scale_enabled);
        self.control_plane_cpu_cores = Value::Value(cluster.control_plane_cpu_cores.into());
        self.control_plane_memory_gb = Value::Value(cluster.control_plane_memory_gb.into());
        self.control_plane_storage_gb = Value::Value(cluster.control_plane_storage_gb.into());
        self.node_cpu_cores = Value::Value(cluster.node_cpu_cores.into());
        self.node_memory_gb = Value::Value(cluster.node_memory_gb.into());
        self.node_storage_gb = Value::Value(cluster.node_storage_gb.into());
        self.compute_cluster = remote_or(&self.compute_cluster, &cluster.compute_cluster);
        self.cni = remote_or(&self.cni, &cluster.cni);
        settle(&mut self.cni);
        self.high_available_control_plane = Value::Value(cluster.high_available_control_plane);
        self.network = reference(&self.network, &cluster.network, "");
        self.reference = non_empty(&cluster.reference);
        self.kubeconfig = kubeconfig.map_or(Value::Null, |config| owned(config));
    }

    /// State of a cluster known only by its id
    pub fn created(id: &str, planned: &Self) -> Self {
        let mut state = planned.clone();
        state.id = non_empty(id);
        settle(&mut state.state);
        settle(&mut state.reference);
        settle(&mut state.kubeconfig);
        settle(&mut state.version);
        settle(&mut state.maximal_nodes);
        settle(&mut state.auto_update);
        settle(&mut state.auto_scale_enabled);
        settle(&mut state.cni);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster<'a>() -> KubernetesClusterState<'a> {
        KubernetesClusterState {
            name: Value::from("k1"),
            vips: Value::Value(vec![Value::from("10.0.0.10")]),
            minimal_nodes: Value::Value(1),
            maximal_nodes: Value::Value(3),
            control_plane_cpu_cores: Value::Value(2),
            control_plane_memory_gb: Value::Value(4),
            control_plane_storage_gb: Value::Value(25),
            node_cpu_cores: Value::Value(4),
            node_memory_gb: Value::Value(8),
            node_storage_gb: Value::Value(50),
            compute_cluster: Value::from("express"),
            high_available_control_plane: Value::Value(false),
            network: Value::from("lan"),
            ..Default::default()
        }
    }

    #[test]
    fn counts_are_carried_in_order() {
        let spec = cluster().spec().unwrap();
        assert_eq!(spec.settings.minimal_nodes, 1);
        assert_eq!(spec.settings.maximal_nodes, 3);
        assert_eq!(spec.settings.control_plane_storage_gb, 25);
        assert_eq!(spec.settings.node_storage_gb, 50);
        assert_eq!(spec.vips, vec![String::from("10.0.0.10")]);
        assert!(spec.endpoints.is_empty());
    }

    #[test]
    fn invalid_addresses_and_node_bounds_are_reported() {
        let mut state = cluster();
        state.maximal_nodes = Value::Value(0);
        state.endpoints = Value::Value(vec![Value::from("10.0.0.20"), Value::from("nowhere")]);
        let paths: Vec<_> = state
            .checks(AttributePath::root())
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert_eq!(
            paths,
            vec![
                AttributePath::new("maximal_nodes"),
                AttributePath::new("endpoints").index(1),
            ]
        );
    }

    #[test]
    fn refresh_keeps_network_name_and_drops_missing_kubeconfig() {
        let remote = KubernetesCluster {
            id: String::from("k8s-1"),
            name: String::from("k1"),
            state: String::from("READY"),
            vips: vec![String::from("10.0.0.10")],
            network: String::from("5f1e5c6b7d8e9f0a1b2c3d4e"),
            cni: String::from("calico"),
            ..Default::default()
        };
        let mut state = cluster();
        state.refresh(&remote, None);
        assert_eq!(state.network, Value::from("lan"));
        assert_eq!(state.cni, Value::from("calico"));
        assert_eq!(state.kubeconfig, Value::Null);
        assert_eq!(state.endpoints, Value::Null);

        let mut imported = KubernetesClusterState::default();
        imported.refresh(&remote, Some("apiVersion: v1"));
        assert_eq!(imported.network, Value::from("5f1e5c6b7d8e9f0a1b2c3d4e"));
        assert_eq!(imported.kubeconfig, Value::from("apiVersion: v1"));
    }

    #[test]
    fn refresh_is_stable() {
        let remote = KubernetesCluster {
            id: String::from("k8s-1"),
            name: String::from("k1"),
            state: String::from("READY"),
            version: String::from("1.29"),
            vips: vec![String::from("10.0.0.10")],
            endpoints: vec![String::from("10.0.0.20")],
            minimal_nodes: 1,
            maximal_nodes: 3,
            network: String::from("5f1e5c6b7d8e9f0a1b2c3d4e"),
            reference: String::from("k1-ref"),
            ..Default::default()
        };
        let mut state = cluster();
        state.refresh(&remote, Some("apiVersion: v1"));
        assert_eq!(state.endpoints, Value::Value(vec![Value::from("10.0.0.20")]));

        let mut again = state.clone();
        again.refresh(&remote, Some("apiVersion: v1"));
        assert_eq!(again, state);
    }
}
