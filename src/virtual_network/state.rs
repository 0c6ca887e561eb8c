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
use tf_provider::value::ValueString;
use tf_provider::{map, AttributePath, Diagnostics};

use crate::client::virtual_network::VirtualNetwork;
use crate::utils::{attribute, non_empty, owned, reference, settle, WithSchema, WithValidate};

use super::reconcile::NetworkSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VirtualNetworkState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    #[serde(rename = "type")]
    pub kind: ValueString<'a>,
    pub group: ValueString<'a>,
}

impl WithSchema for VirtualNetworkState<'_> {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Virtual network of the Previder IaaS platform"),
                attributes: map! {
                    "id" => attribute(
                        AttributeType::String,
                        AttributeConstraint::Computed,
                        "Id of the virtual network",
                    ),
                    "name" => attribute(
                        AttributeType::String,
                        AttributeConstraint::Required,
                        "Name of the virtual network",
                    ),
                    "type" => attribute(
                        AttributeType::String,
                        AttributeConstraint::Required,
                        "Type of the virtual network, changing it replaces the network",
                    ),
                    "group" => attribute(
                        AttributeType::String,
                        AttributeConstraint::OptionalComputed,
                        "Name or id of the group of the virtual network",
                    ),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for VirtualNetworkState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        if matches!(self.name.as_deref_option(), Some("")) {
            diags.error_short("Name cannot be empty", attr_path.attribute("name"));
        }
    }
}

impl<'a> VirtualNetworkState<'a> {
    pub fn spec(&self) -> NetworkSpec {
        NetworkSpec {
            name: self.name.as_str().to_owned(),
            kind: self.kind.as_str().to_owned(),
            group: self.group.as_str().to_owned(),
        }
    }

    pub fn refresh(&mut self, remote: &VirtualNetwork) {
        self.id = owned(&remote.id);
        self.name = owned(&remote.name);
        self.kind = owned(&remote.kind);
        self.group = reference(&self.group, &remote.group, &remote.group_name);
    }

    /// State of a network known only by its id
    pub fn created(id: &str, planned: &Self) -> Self {
        let mut state = planned.clone();
        state.id = non_empty(id);
        settle(&mut state.group);
        state
    }
}

#[cfg(test)]
mod tests {
    use tf_provider::value::Value;

    use super::*;

    fn remote() -> VirtualNetwork {
        VirtualNetwork {
            id: String::from("net-1"),
            name: String::from("backend"),
            kind: String::from("VLAN"),
            group: String::from("5a8c0e2a9f1b2c3d4e5f6a7b"),
            group_name: String::from("web"),
            state: String::from("READY"),
        }
    }

    #[test]
    fn refresh_is_stable() {
        let mut state = VirtualNetworkState {
            name: Value::from("backend"),
            kind: Value::from("VLAN"),
            group: Value::from("web"),
            ..Default::default()
        };
        state.refresh(&remote());
        assert_eq!(state.id, Value::from("net-1"));
        assert_eq!(state.group, Value::from("web"));

        let mut again = state.clone();
        again.refresh(&remote());
        assert_eq!(again, state);
    }

    #[test]
    fn imported_network_takes_the_group_id() {
        let mut state = VirtualNetworkState::default();
        state.refresh(&remote());
        assert_eq!(state.group, Value::from("5a8c0e2a9f1b2c3d4e5f6a7b"));
        assert_eq!(state.spec().name, "backend");
    }

    #[test]
    fn created_network_settles_its_group() {
        let planned = VirtualNetworkState {
            name: Value::from("backend"),
            kind: Value::from("VLAN"),
            group: Value::Unknown,
            ..Default::default()
        };
        let state = VirtualNetworkState::created("net-1", &planned);
        assert_eq!(state.id, Value::from("net-1"));
        assert!(state.group.is_null());
    }
}
