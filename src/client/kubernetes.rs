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

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use super::{PageRequest, PreviderClient, Reference, Result};

pub const CLUSTER_READY: &str = "READY";
pub const CLUSTER_PENDING_REMOVAL: &str = "PENDING_REMOVAL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesCluster {
    pub id: String,
    pub name: String,
    pub state: String,
    pub version: String,
    pub vips: Vec<String>,
    pub endpoints: Vec<String>,
    pub minimal_nodes: u32,
    pub maximal_nodes: u32,
    pub auto_update: bool,
    pub auto_scale_enabled: bool,
    pub control_plane_cpu_cores: u32,
    pub control_plane_memory_gb: u32,
    pub control_plane_storage_gb: u32,
    pub node_cpu_cores: u32,
    pub node_memory_gb: u32,
    pub node_storage_gb: u32,
    pub compute_cluster: String,
    pub cni: String,
    pub high_available_control_plane: bool,
    pub network: String,
    pub reference: String,
}

/// Fields accepted by both the create and the update calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesClusterUpdate {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    pub minimal_nodes: u32,
    pub maximal_nodes: u32,
    pub auto_update: bool,
    pub auto_scale_enabled: bool,
    pub control_plane_cpu_cores: u32,
    pub control_plane_memory_gb: u32,
    pub control_plane_storage_gb: u32,
    pub node_cpu_cores: u32,
    pub node_memory_gb: u32,
    pub node_storage_gb: u32,
    pub compute_cluster: String,
    pub high_available_control_plane: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesClusterCreate {
    #[serde(flatten)]
    pub settings: KubernetesClusterUpdate,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cni: String,
    pub network: String,
    pub vips: Vec<String>,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KubeConfig {
    pub config: String,
}

const PATH: &str = "v2/kubernetes/cluster";

impl PreviderClient {
    pub async fn get_kubernetes_cluster(&self, id: &str) -> Result<KubernetesCluster> {
        self.get(&format!("{PATH}/{id}")).await
    }

    /// First cluster carrying exactly `name`, searching every page
    pub async fn find_kubernetes_cluster_by_name(
        &self,
        name: &str,
    ) -> Result<Option<KubernetesCluster>> {
        let request = PageRequest {
            query: name.to_owned(),
            ..PageRequest::sorted(100, "+name")
        };
        let clusters: Vec<KubernetesCluster> = self.get_all_pages(PATH, request).await?;
        Ok(clusters.into_iter().find(|cluster| cluster.name == name))
    }

    pub async fn create_kubernetes_cluster(
        &self,
        create: &KubernetesClusterCreate,
    ) -> Result<Reference> {
        self.post(PATH, create).await
    }

    pub async fn update_kubernetes_cluster(
        &self,
        id: &str,
        update: &KubernetesClusterUpdate,
    ) -> Result<()> {
        self.put::<IgnoredAny, _>(&format!("{PATH}/{id}"), update).await.map(drop)
    }

    pub async fn delete_kubernetes_cluster(&self, id: &str) -> Result<()> {
        self.delete::<IgnoredAny>(&format!("{PATH}/{id}")).await.map(drop)
    }

    pub async fn get_kubeconfig(&self, id: &str, endpoint: &str) -> Result<KubeConfig> {
        self.get_query(&format!("{PATH}/{id}/kubeconfig"), &[("endpoint", endpoint)])
            .await
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
    async fn create_flattens_the_shared_settings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/kubernetes/cluster"))
            .and(body_json(json!({
                "name": "k1",
                "minimalNodes": 1,
                "maximalNodes": 3,
                "autoUpdate": false,
                "autoScaleEnabled": true,
                "controlPlaneCpuCores": 2,
                "controlPlaneMemoryGb": 4,
                "controlPlaneStorageGb": 25,
                "nodeCpuCores": 4,
                "nodeMemoryGb": 8,
                "nodeStorageGb": 50,
                "computeCluster": "express",
                "highAvailableControlPlane": false,
                "network": "lan",
                "vips": ["10.0.0.10"],
                "endpoints": []
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "k8s-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let reference = client_for(&server)
            .create_kubernetes_cluster(&KubernetesClusterCreate {
                settings: KubernetesClusterUpdate {
                    name: String::from("k1"),
                    minimal_nodes: 1,
                    maximal_nodes: 3,
                    auto_scale_enabled: true,
                    control_plane_cpu_cores: 2,
                    control_plane_memory_gb: 4,
                    control_plane_storage_gb: 25,
                    node_cpu_cores: 4,
                    node_memory_gb: 8,
                    node_storage_gb: 50,
                    compute_cluster: String::from("express"),
                    ..Default::default()
                },
                network: String::from("lan"),
                vips: vec![String::from("10.0.0.10")],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(reference.id, "k8s-1");
    }

    #[tokio::test]
    async fn kubeconfig_is_requested_for_an_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/kubernetes/cluster/k8s-1/kubeconfig"))
            .and(query_param("endpoint", "10.0.0.10"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"config": "apiVersion: v1"})),
            )
            .mount(&server)
            .await;

        let config = client_for(&server)
            .get_kubeconfig("k8s-1", "10.0.0.10")
            .await
            .unwrap();
        assert_eq!(config.config, "apiVersion: v1");
    }

    #[tokio::test]
    async fn search_by_name_requires_an_exact_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/kubernetes/cluster"))
            .and(query_param("query", "k1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"id": "a", "name": "k10"}, {"id": "b", "name": "k1"}],
                "totalElements": 2,
                "totalPages": 1
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let found = client.find_kubernetes_cluster_by_name("k1").await.unwrap();
        assert_eq!(found.map(|cluster| cluster.id).as_deref(), Some("b"));
    }
}
