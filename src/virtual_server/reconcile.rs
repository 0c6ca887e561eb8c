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

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use tf_provider::Diagnostics;
use tracing::{info, warn};

use crate::client::virtual_machine::{
    vm_state, Disk, DiskUpdate, NetworkInterface, NetworkInterfaceUpdate, VirtualMachine,
    VirtualMachineCreate, VirtualMachineUpdate, VmAction,
};
use crate::reconcile::{
    diff_by_key, Created, Error, Observed, OptionalExt, PartialContext, PollCondition, Reconciler, Result,
    Schedule,
};
use crate::validate::check_single_source;

pub(super) const KIND: &str = "virtual server";

const TASK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const POWER_SCHEDULE: Schedule = Schedule::constant(Duration::from_secs(5), 120);

impl Observed for VirtualMachine {
    fn observed_state(&self) -> Option<&str> {
        Some(&self.state)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskSpec {
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkInterfaceSpec {
    pub network: String,
    pub connected: bool,
    pub kind: String,
}

/// Desired configuration of a virtual server, disks and interfaces keyed by label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSpec {
    pub name: String,
    pub compute_cluster: String,
    pub cpu_cores: u32,
    pub cpu_sockets: Option<u32>,
    pub memory: u64,
    pub group: String,
    pub template: String,
    pub guest_id: String,
    pub source: String,
    pub user_data: String,
    pub provisioning_type: String,
    pub termination_protection: bool,
    pub tags: Vec<String>,
    pub disks: BTreeMap<String, DiskSpec>,
    pub network_interfaces: BTreeMap<String, NetworkInterfaceSpec>,
}

/// First assigned address of each family
pub fn first_addresses(addresses: &[String]) -> (Option<IpAddr>, Option<IpAddr>) {
    let parsed = addresses.iter().filter_map(|address| address.parse::<IpAddr>().ok());
    let mut ipv4 = None;
    let mut ipv6 = None;
    for ip in parsed {
        match ip {
            IpAddr::V4(_) if ipv4.is_none() => ipv4 = Some(ip),
            IpAddr::V6(_) if ipv6.is_none() => ipv6 = Some(ip),
            _ => (),
        }
    }
    (ipv4, ipv6)
}

/// Send the creation request
///
/// The id is known as soon as the task is started, the task itself is awaited
/// by [`provision`].
pub async fn create(rc: &Reconciler, spec: &ServerSpec) -> Result<Created> {
    check_single_source(&spec.template, &spec.guest_id, &spec.source)?;
    let client = rc.client();

    let source_disks = if spec.source.is_empty() {
        Vec::new()
    } else {
        client.get_virtual_machine(&spec.source).await?.disks
    };

    // Planned disks reuse the source disk at the same position
    let mut disks = Vec::with_capacity(spec.disks.len());
    for (index, (label, disk)) in spec.disks.iter().enumerate() {
        let id = match source_disks.get(index) {
            Some(source) if disk.size < source.size => {
                return Err(Error::validation(format!(
                    "Disks cannot be smaller when cloning: disk {label} is smaller than source virtual server disk"
                )));
            }
            Some(source) => source.id.clone(),
            None => String::new(),
        };
        disks.push(Disk {
            id,
            size: disk.size,
            uuid: String::new(),
            label: label.clone(),
        });
    }

    let request = VirtualMachineCreate {
        name: spec.name.clone(),
        compute_cluster: spec.compute_cluster.clone(),
        cpu_cores: spec.cpu_cores,
        cpu_sockets: spec.cpu_sockets,
        memory: spec.memory,
        group: spec.group.clone(),
        template: spec.template.clone(),
        guest_id: spec.guest_id.clone(),
        source_virtual_machine: spec.source.clone(),
        user_data: spec.user_data.clone(),
        provisioning_type: spec.provisioning_type.clone(),
        power_on_after_clone: true,
        termination_protection_enabled: spec.termination_protection,
        tags: spec.tags.clone(),
        disks,
        network_interfaces: spec
            .network_interfaces
            .iter()
            .map(|(label, nic)| NetworkInterface {
                network: nic.network.clone(),
                connected: nic.connected,
                label: label.clone(),
                kind: nic.kind.clone(),
                ..Default::default()
            })
            .collect(),
    };

    let task = client.create_virtual_machine(&request).await?;
    info!(name = %spec.name, task = %task.id, "Creating virtual server");
    rc.created_by(task, TASK_TIMEOUT, KIND, &spec.name, |task| {
        task.virtual_machine.as_str()
    })
    .await
}

/// Wait for the creation task, then for the new server to settle
pub async fn provision(rc: &Reconciler, created: &Created) -> Result<VirtualMachine> {
    let id = created.id.as_str();
    created.settle(rc, KIND, TASK_TIMEOUT).await?;
    wait_ready(rc, id).await.in_step(KIND, id, "wait for power state")
}

/// Powered on when built from a template, else powered off
async fn wait_ready(rc: &Reconciler, id: &str) -> Result<VirtualMachine> {
    let vm = rc.client().get_virtual_machine(id).await?;
    let target = if vm.template.is_empty() {
        vm_state::POWERED_OFF
    } else {
        vm_state::POWERED_ON
    };
    wait_power_state(rc, id, target).await
}

pub async fn read(rc: &Reconciler, id: &str) -> Result<Option<VirtualMachine>> {
    rc.client().get_virtual_machine(id).await.optional()
}

/// Update the server, powering it off first when its cpu or memory changes
pub async fn update(
    rc: &Reconciler,
    id: &str,
    spec: &ServerSpec,
    diags: &mut Diagnostics,
) -> Result<VirtualMachine> {
    let client = rc.client();
    let vm = client.get_virtual_machine(id).await?;

    let mut powered_off = false;
    if vm.cpu_cores != spec.cpu_cores || vm.memory != spec.memory {
        diags.root_warning(
            "Virtual server shutdown",
            format!("Virtual server shutdown to alter cpu cores or memory quantity {id}"),
        );
        powered_off = shut_down(rc, &vm, diags).await?;
    }

    let request = VirtualMachineUpdate {
        name: spec.name.clone(),
        compute_cluster: spec.compute_cluster.clone(),
        group: spec.group.clone(),
        cpu_cores: spec.cpu_cores,
        cpu_sockets: spec.cpu_sockets,
        memory: spec.memory,
        tags: spec.tags.clone(),
        disks: disk_updates(&vm, spec, diags),
        network_interfaces: network_interface_updates(&vm, spec, diags),
        termination_protection_enabled: spec.termination_protection,
    };
    let task = client.update_virtual_machine(id, &request).await?;
    info!(%id, task = %task.id, "Updating virtual server");
    rc.wait_for_task(&task, TASK_TIMEOUT).await?;

    if powered_off {
        let task = client.control_virtual_machine(id, VmAction::PowerOn).await?;
        rc.wait_for_task(&task, TASK_TIMEOUT).await?;
        diags.root_warning(
            "Virtual server powered on",
            format!("Virtual server powered on after altering cpu cores or memory quantity {id}"),
        );
        wait_power_state(rc, id, vm_state::POWERED_ON).await?;
    }

    Ok(client.get_virtual_machine(id).await?)
}

/// Delete the server unless it is protected against termination
pub async fn delete(rc: &Reconciler, id: &str) -> Result<()> {
    let client = rc.client();
    let Some(vm) = client.get_virtual_machine(id).await.optional()? else {
        return Ok(());
    };
    if vm.termination_protection_enabled {
        return Err(Error::Failed {
            kind: KIND,
            id: id.to_owned(),
            message: String::from("Virtual Server is locked, skipping status check and retrying"),
        });
    }

    let task = client.delete_virtual_machine(id).await?;
    info!(%id, task = %task.id, "Deleting virtual server");
    rc.wait_for_task(&task, DELETE_TIMEOUT).await?;
    Ok(())
}

async fn wait_power_state(rc: &Reconciler, id: &str, target: &'static str) -> Result<VirtualMachine> {
    let client = rc.client();
    rc.poller(KIND, id, POWER_SCHEDULE)
        .wait_for(PollCondition::Equals(target), || client.get_virtual_machine(id))
        .await
}

/// Power the server off, returns whether it was running
async fn shut_down(rc: &Reconciler, vm: &VirtualMachine, diags: &mut Diagnostics) -> Result<bool> {
    if vm.state == vm_state::POWERED_OFF {
        return Ok(false);
    }
    let client = rc.client();

    let task = match client.control_virtual_machine(&vm.id, VmAction::Shutdown).await {
        Ok(task) => task,
        Err(err) => {
            warn!(id = %vm.id, %err, "Shutdown refused, powering off");
            diags.root_warning(
                "Virtual server not shutting down",
                format!("Virtual Server is not shutting down after shutdown command, powering off: {err}"),
            );
            client
                .control_virtual_machine(&vm.id, VmAction::PowerOff)
                .await?
        }
    };
    rc.wait_for_task(&task, TASK_TIMEOUT).await?;
    wait_power_state(rc, &vm.id, vm_state::POWERED_OFF).await?;
    Ok(true)
}

fn disk_updates(vm: &VirtualMachine, spec: &ServerSpec, diags: &mut Diagnostics) -> Vec<DiskUpdate> {
    let observed: BTreeMap<&str, &Disk> =
        vm.disks.iter().map(|disk| (disk.label.as_str(), disk)).collect();
    let desired: BTreeMap<&str, &DiskSpec> =
        spec.disks.iter().map(|(label, disk)| (label.as_str(), disk)).collect();
    let changes = diff_by_key(&observed, &desired, |have, want| have.size == want.size, |_| false);

    let mut updates: Vec<DiskUpdate> = desired
        .iter()
        .map(|(label, want)| {
            let have = observed.get(label);
            DiskUpdate {
                id: have.map(|disk| disk.id.clone()).unwrap_or_default(),
                size: want.size,
                label: (*label).to_owned(),
                uuid: have.map(|disk| disk.uuid.clone()).unwrap_or_default(),
                delete: false,
            }
        })
        .collect();
    for label in changes.to_delete {
        if let Some(disk) = observed.get(label) {
            diags.root_warning(
                "removing disk from virtual server",
                format!("Removing disk with label {label}"),
            );
            updates.push(DiskUpdate {
                id: disk.id.clone(),
                size: disk.size,
                label: disk.label.clone(),
                uuid: disk.uuid.clone(),
                delete: true,
            });
        }
    }
    updates
}

fn network_interface_updates(
    vm: &VirtualMachine,
    spec: &ServerSpec,
    diags: &mut Diagnostics,
) -> Vec<NetworkInterfaceUpdate> {
    let observed: BTreeMap<&str, &NetworkInterface> = vm
        .network_interfaces
        .iter()
        .map(|nic| (nic.label.as_str(), nic))
        .collect();
    let desired: BTreeMap<&str, &NetworkInterfaceSpec> = spec
        .network_interfaces
        .iter()
        .map(|(label, nic)| (label.as_str(), nic))
        .collect();
    let changes = diff_by_key(
        &observed,
        &desired,
        |have, want| have.network == want.network && have.connected == want.connected,
        |_| false,
    );

    let mut updates: Vec<NetworkInterfaceUpdate> = desired
        .iter()
        .map(|(label, want)| NetworkInterfaceUpdate {
            id: observed
                .get(label)
                .map(|nic| nic.id.clone())
                .unwrap_or_default(),
            network: want.network.clone(),
            label: (*label).to_owned(),
            connected: want.connected,
            deleted: false,
        })
        .collect();
    for label in changes.to_delete {
        if let Some(nic) = observed.get(label) {
            diags.root_warning(
                "removing network interface from virtual server",
                format!("Removing network interface with label {label}"),
            );
            updates.push(NetworkInterfaceUpdate {
                id: nic.id.clone(),
                network: nic.network.clone(),
                label: nic.label.clone(),
                connected: nic.connected,
                deleted: true,
            });
        }
    }
    updates
}
