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

use tracing::{info, warn};

use crate::client::kubernetes::{
    KubernetesCluster, KubernetesClusterCreate, CLUSTER_PENDING_REMOVAL, CLUSTER_READY,
};
use crate::reconcile::{Error, Observed, OptionalExt, PollCondition, Reconciler, Result, Schedule};
use crate::utils::DisplayJoinable;

pub(super) const KIND: &str = "Kubernetes cluster";

const READY_SCHEDULE: Schedule = Schedule::constant(Duration::from_secs(10), 180);
const REMOVAL_SCHEDULE: Schedule = Schedule::constant(Duration::from_secs(10), 120);

impl Observed for KubernetesCluster {
    fn observed_state(&self) -> Option<&str> {
        Some(&self.state)
    }
}

/// Remote cluster with the kubeconfig of its first address, when it could be fetched
pub type Snapshot = (KubernetesCluster, Option<String>);

/// Fields that cannot change once the cluster exists
pub fn immutable_changes(prior: &KubernetesClusterCreate, desired: &KubernetesClusterCreate) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if prior.cni != desired.cni {
        changed.push("cni");
    }
    if prior.network != desired.network {
        changed.push("network");
    }
    if prior.vips != desired.vips {
        changed.push("vips");
    }
    if prior.endpoints != desired.endpoints {
        changed.push("endpoints");
    }
    changed
}

/// Create the cluster, returns its id
///
/// When the API does not return the id, the cluster is searched by name.
pub async fn create(rc: &Reconciler, spec: &KubernetesClusterCreate) -> Result<String> {
    let client = rc.client();
    let reference = client.create_kubernetes_cluster(spec).await?;
    let name = &spec.settings.name;
    info!(%name, id = %reference.id, "Creating Kubernetes cluster");
    if !reference.id.is_empty() {
        return Ok(reference.id);
    }

    warn!(%name, "No id returned for the new Kubernetes cluster, searching it by name");
    match client.find_kubernetes_cluster_by_name(name).await? {
        Some(cluster) if !cluster.id.is_empty() => Ok(cluster.id),
        _ => Err(Error::Failed {
            kind: KIND,
            id: name.clone(),
            message: String::from("cluster is not found after creation"),
        }),
    }
}

pub async fn wait_ready(rc: &Reconciler, id: &str) -> Result<Snapshot> {
    let client = rc.client();
    let cluster = rc
        .poller(KIND, id, READY_SCHEDULE)
        .wait_for(PollCondition::Equals(CLUSTER_READY), || {
            client.get_kubernetes_cluster(id)
        })
        .await?;
    let kubeconfig = kubeconfig(rc, &cluster).await;
    Ok((cluster, kubeconfig))
}

pub async fn read(rc: &Reconciler, id: &str) -> Result<Option<Snapshot>> {
    let Some(cluster) = rc.client().get_kubernetes_cluster(id).await.optional()? else {
        return Ok(None);
    };
    let kubeconfig = kubeconfig(rc, &cluster).await;
    Ok(Some((cluster, kubeconfig)))
}

pub async fn update(
    rc: &Reconciler,
    id: &str,
    prior: &KubernetesClusterCreate,
    spec: &KubernetesClusterCreate,
) -> Result<Snapshot> {
    let changed = immutable_changes(prior, spec);
    if !changed.is_empty() {
        return Err(Error::validation(format!(
            "Fields {} cannot be updated after creation",
            changed.iter().join_with(", ")
        )));
    }

    rc.client()
        .update_kubernetes_cluster(id, &spec.settings)
        .await?;
    info!(%id, "Updating Kubernetes cluster");
    wait_ready(rc, id).await
}

/// Delete the cluster and wait until it is gone
pub async fn delete(rc: &Reconciler, id: &str) -> Result<()> {
    let client = rc.client();
    if client.delete_kubernetes_cluster(id).await.optional()?.is_none() {
        return Ok(());
    }
    info!(%id, "Deleting Kubernetes cluster");
    rc.poller(KIND, id, REMOVAL_SCHEDULE)
        .wait_until_gone(PollCondition::Equals(CLUSTER_PENDING_REMOVAL), || {
            client.get_kubernetes_cluster(id)
        })
        .await
}

/// Kubeconfig served for the first endpoint, else the first VIP
async fn kubeconfig(rc: &Reconciler, cluster: &KubernetesCluster) -> Option<String> {
    let address = cluster.endpoints.first().or(cluster.vips.first())?;
    match rc.client().get_kubeconfig(&cluster.id, address).await {
        Ok(config) => Some(config.config),
        Err(err) => {
            warn!(id = %cluster.id, %address, %err, "Kubeconfig unavailable");
            None
        }
    }
}
