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

use super::{PreviderClient, Result, Task};

pub const NETWORK_READY: &str = "READY";
pub const NETWORK_TYPE_VLAN: &str = "VLAN";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualNetwork {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub group: String,
    pub group_name: String,
    pub state: String,
}

/// Body of both the create and the update calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkUpdate {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
}

const PATH: &str = "v2/iaas/network";

impl PreviderClient {
    pub async fn get_virtual_network(&self, id: &str) -> Result<VirtualNetwork> {
        self.get(&format!("{PATH}/{id}")).await
    }

    pub async fn create_virtual_network(&self, create: &VirtualNetworkUpdate) -> Result<Task> {
        self.post(PATH, create).await
    }

    pub async fn update_virtual_network(
        &self,
        id: &str,
        update: &VirtualNetworkUpdate,
    ) -> Result<Task> {
        self.put(&format!("{PATH}/{id}"), update).await
    }

    pub async fn delete_virtual_network(&self, id: &str) -> Result<Task> {
        self.delete(&format!("{PATH}/{id}")).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::tests::client_for;

    #[tokio::test]
    async fn network_type_is_renamed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/iaas/network/net-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"id": "net-1", "name": "lan", "type": "VLAN", "state": "READY"}),
            ))
            .mount(&server)
            .await;

        let network = client_for(&server).get_virtual_network("net-1").await.unwrap();
        assert_eq!(network.kind, NETWORK_TYPE_VLAN);
        assert_eq!(network.state, NETWORK_READY);
    }

    #[tokio::test]
    async fn empty_group_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v2/iaas/network/net-1"))
            .and(body_json(json!({"name": "lan2", "type": "VLAN"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "t1", "state": "RUNNING"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .update_virtual_network(
                "net-1",
                &VirtualNetworkUpdate {
                    name: String::from("lan2"),
                    kind: String::from("VLAN"),
                    group: String::new(),
                },
            )
            .await
            .unwrap();
    }
}
