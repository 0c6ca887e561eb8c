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

use super::{PreviderClient, Reference, Result};

pub mod staas_state {
    pub const READY: &str = "READY";
    pub const SYNCED: &str = "SYNCED";
    pub const PENDING_REMOVAL: &str = "PENDING_REMOVAL";
    pub const GRACE_TERMINATED: &str = "GRACE_TERMINATED";
    pub const FORCE_REMOVAL: &str = "FORCE_REMOVAL";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaasVolume {
    pub id: String,
    pub name: String,
    pub size_mb: u64,
    pub state: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub allowed_ips_ro: Vec<String>,
    pub allowed_ips_rw: Vec<String>,
    pub synchronous_environment_id: String,
    pub synchronous_environment_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaasNetwork {
    pub id: String,
    pub state: String,
    pub network_id: String,
    pub network_name: String,
    pub ip_addresses: Vec<String>,
    pub cidr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaasEnvironment {
    pub id: String,
    pub name: String,
    pub state: String,
    pub windows: bool,
    pub cluster: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub volumes: Vec<StaasVolume>,
    pub networks: Vec<StaasNetwork>,
}

impl StaasEnvironment {
    pub fn volume(&self, id: &str) -> Option<&StaasVolume> {
        self.volumes.iter().find(|volume| volume.id == id)
    }

    pub fn volume_named(&self, name: &str) -> Option<&StaasVolume> {
        self.volumes.iter().find(|volume| volume.name == name)
    }

    pub fn network(&self, id: &str) -> Option<&StaasNetwork> {
        self.networks.iter().find(|network| network.id == id)
    }

    pub fn network_for(&self, network_id: &str) -> Option<&StaasNetwork> {
        self.networks
            .iter()
            .find(|network| network.network_id == network_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaasEnvironmentCreate {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub cluster: String,
    pub windows: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaasEnvironmentUpdate {
    pub name: String,
    pub windows: bool,
}

/// Body of the volume create and update calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaasVolumeUpdate {
    pub name: String,
    pub size_mb: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub allowed_ips_ro: Vec<String>,
    pub allowed_ips_rw: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub synchronous_environment_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaasNetworkCreate {
    pub network: String,
    pub cidr: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForceDelete {
    pub force: bool,
}

const PATH: &str = "v2/staas/environment";

impl PreviderClient {
    pub async fn get_staas_environment(&self, id: &str) -> Result<StaasEnvironment> {
        self.get(&format!("{PATH}/{id}")).await
    }

    pub async fn create_staas_environment(
        &self,
        create: &StaasEnvironmentCreate,
    ) -> Result<Reference> {
        self.post(PATH, create).await
    }

    pub async fn update_staas_environment(
        &self,
        id: &str,
        update: &StaasEnvironmentUpdate,
    ) -> Result<()> {
        self.put::<IgnoredAny, _>(&format!("{PATH}/{id}"), update).await.map(drop)
    }

    pub async fn delete_staas_environment(&self, id: &str) -> Result<()> {
        self.delete_with::<IgnoredAny, _>(&format!("{PATH}/{id}"), &ForceDelete { force: true })
            .await
            .map(drop)
    }

    pub async fn create_staas_volume(&self, id: &str, volume: &StaasVolumeUpdate) -> Result<()> {
        self.post::<IgnoredAny, _>(&format!("{PATH}/{id}/volume"), volume).await.map(drop)
    }

    pub async fn update_staas_volume(
        &self,
        id: &str,
        volume_id: &str,
        volume: &StaasVolumeUpdate,
    ) -> Result<()> {
        self.put::<IgnoredAny, _>(&format!("{PATH}/{id}/volume/{volume_id}"), volume)
            .await
            .map(drop)
    }

    pub async fn delete_staas_volume(&self, id: &str, volume_id: &str) -> Result<()> {
        self.delete_with::<IgnoredAny, _>(
            &format!("{PATH}/{id}/volume/{volume_id}"),
            &ForceDelete { force: true },
        )
        .await
            .map(drop)
    }

    pub async fn create_staas_network(&self, id: &str, network: &StaasNetworkCreate) -> Result<()> {
        self.post::<IgnoredAny, _>(&format!("{PATH}/{id}/network"), network).await.map(drop)
    }

    pub async fn delete_staas_network(&self, id: &str, network_id: &str) -> Result<()> {
        self.delete::<IgnoredAny>(&format!("{PATH}/{id}/network/{network_id}"))
            .await
            .map(drop)
    }
}
