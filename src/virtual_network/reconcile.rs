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

use std::time::Duration;

use tracing::info;

use crate::client::virtual_network::{VirtualNetwork, VirtualNetworkUpdate, NETWORK_READY};
use crate::reconcile::{
    Created, Observed, OptionalExt, PartialContext, PollCondition, Reconciler, Result, Schedule,
};

pub(super) const KIND: &str = "virtual network";

const TASK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const READY_SCHEDULE: Schedule = Schedule::constant(Duration::from_secs(5), 30);

impl Observed for VirtualNetwork {
    fn observed_state(&self) -> Option<&str> {
        Some(&self.state)
    }
}

/// Desired configuration of a virtual network
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub kind: String,
    pub group: String,
}

impl NetworkSpec {
    fn request(&self) -> VirtualNetworkUpdate {
        VirtualNetworkUpdate {
            name: self.name.clone(),
            kind: self.kind.clone(),
            group: self.group.clone(),
        }
    }
}

/// Send the creation request, the task is awaited by [`provision`]
pub async fn create(rc: &Reconciler, spec: &NetworkSpec) -> Result<Created> {
    let task = rc.client().create_virtual_network(&spec.request()).await?;
    info!(name = %spec.name, task = %task.id, "Creating virtual network");
    rc.created_by(task, TASK_TIMEOUT, KIND, &spec.name, |task| {
        task.virtual_network.as_str()
    })
    .await
}

pub async fn provision(rc: &Reconciler, created: &Created) -> Result<VirtualNetwork> {
    let client = rc.client();
    let id = created.id.as_str();
    created.settle(rc, KIND, TASK_TIMEOUT).await?;
    rc.poller(KIND, id, READY_SCHEDULE)
        .wait_for(PollCondition::Equals(NETWORK_READY), || {
            client.get_virtual_network(id)
        })
        .await
        .in_step(KIND, id, "wait for network")
}

pub async fn read(rc: &Reconciler, id: &str) -> Result<Option<VirtualNetwork>> {
    rc.client().get_virtual_network(id).await.optional()
}

pub async fn update(rc: &Reconciler, id: &str, spec: &NetworkSpec) -> Result<VirtualNetwork> {
    let task = rc.client().update_virtual_network(id, &spec.request()).await?;
    info!(%id, task = %task.id, "Updating virtual network");
    rc.wait_for_task(&task, TASK_TIMEOUT).await?;
    Ok(rc.client().get_virtual_network(id).await?)
}

/// Delete the network, a network already gone counts as deleted
pub async fn delete(rc: &Reconciler, id: &str) -> Result<()> {
    let task = match rc.client().delete_virtual_network(id).await.optional()? {
        Some(task) => task,
        None => return Ok(()),
    };
    info!(%id, task = %task.id, "Deleting virtual network");
    rc.wait_for_task(&task, DELETE_TIMEOUT).await?;
    Ok(())
}
