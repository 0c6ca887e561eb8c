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

pub mod vm_state {
    pub const POWERED_ON: &str = "POWEREDON";
    pub const POWERED_OFF: &str = "POWEREDOFF";
}

/// Power action sent to a virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmAction {
    PowerOn,
    PowerOff,
    Shutdown,
}

impl VmAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PowerOn => "POWERON",
            Self::PowerOff => "POWEROFF",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

impl std::fmt::Display for VmAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Disk {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub size: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkInterface {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub network: String,
    pub connected: bool,
    pub label: String,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing)]
    pub mac_address: String,
    #[serde(skip_serializing)]
    pub assigned_addresses: Vec<String>,
    #[serde(skip_serializing)]
    pub discovered_addresses: Vec<String>,
}

/// Virtual machine as returned by the API
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualMachine {
    pub id: String,
    pub name: String,
    pub group: String,
    pub compute_cluster: String,
    pub cpu_cores: u32,
    pub cpu_sockets: u32,
    pub memory: u64,
    pub template: String,
    pub guest_id: String,
    pub state: String,
    pub tags: Vec<String>,
    pub disks: Vec<Disk>,
    pub network_interfaces: Vec<NetworkInterface>,
    pub termination_protection_enabled: bool,
    pub initial_password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineCreate {
    pub name: String,
    pub compute_cluster: String,
    pub cpu_cores: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_sockets: Option<u32>,
    pub memory: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub template: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub guest_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_virtual_machine: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_data: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub provisioning_type: String,
    pub power_on_after_clone: bool,
    pub termination_protection_enabled: bool,
    pub tags: Vec<String>,
    pub disks: Vec<Disk>,
    pub network_interfaces: Vec<NetworkInterface>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUpdate {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub size: u64,
    pub label: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    pub delete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceUpdate {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub network: String,
    pub label: String,
    pub connected: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineUpdate {
    pub name: String,
    pub compute_cluster: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
    pub cpu_cores: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_sockets: Option<u32>,
    pub memory: u64,
    pub tags: Vec<String>,
    pub disks: Vec<DiskUpdate>,
    pub network_interfaces: Vec<NetworkInterfaceUpdate>,
    pub termination_protection_enabled: bool,
}

const PATH: &str = "v2/iaas/virtualmachine";

impl PreviderClient {
    pub async fn get_virtual_machine(&self, id: &str) -> Result<VirtualMachine> {
        self.get(&format!("{PATH}/{id}")).await
    }

    pub async fn create_virtual_machine(&self, create: &VirtualMachineCreate) -> Result<Task> {
        self.post(PATH, create).await
    }

    pub async fn update_virtual_machine(
        &self,
        id: &str,
        update: &VirtualMachineUpdate,
    ) -> Result<Task> {
        self.put(&format!("{PATH}/{id}"), update).await
    }

    pub async fn delete_virtual_machine(&self, id: &str) -> Result<Task> {
        self.delete(&format!("{PATH}/{id}")).await
    }

    pub async fn control_virtual_machine(&self, id: &str, action: VmAction) -> Result<Task> {
        self.post(&format!("{PATH}/{id}/action/{action}"), &()).await
    }
}
