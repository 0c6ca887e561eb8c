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
use std::time::Duration;

use tracing::{debug, info};

use crate::client::staas::{
    staas_state, StaasEnvironment, StaasEnvironmentCreate, StaasEnvironmentUpdate, StaasNetwork,
    StaasNetworkCreate, StaasVolume, StaasVolumeUpdate,
};
use crate::client::virtual_network::NETWORK_TYPE_VLAN;
use crate::client::{ApiError, PreviderClient};
use crate::reconcile::{
    diff_by_key, Error, Observed, OptionalExt, PartialContext, PollCondition, Reconciler, Result,
    Schedule,
};
use crate::validate::parse_cidr;

pub(super) const KIND: &str = "STaaS environment";

const READY_SCHEDULE: Schedule = Schedule::constant(Duration::from_secs(10), 180);
const REMOVAL_SCHEDULE: Schedule = Schedule::constant(Duration::from_secs(10), 120);

const VOLUME_GONE: PollCondition = PollCondition::Except(&[staas_state::GRACE_TERMINATED]);
const NETWORK_UP: PollCondition = PollCondition::OneOf(&[staas_state::READY, staas_state::SYNCED]);

impl Observed for StaasEnvironment {
    fn observed_state(&self) -> Option<&str> {
        Some(&self.state)
    }
}

impl Observed for StaasVolume {
    fn observed_state(&self) -> Option<&str> {
        Some(&self.state)
    }
}

impl Observed for StaasNetwork {
    fn observed_state(&self) -> Option<&str> {
        Some(&self.state)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeSpec {
    pub name: String,
    pub size_mb: u64,
    pub kind: String,
    pub allowed_ips_ro: Vec<String>,
    pub allowed_ips_rw: Vec<String>,
    pub synchronous_environment_id: String,
}

impl VolumeSpec {
    fn request(&self) -> StaasVolumeUpdate {
        StaasVolumeUpdate {
            name: self.name.clone(),
            size_mb: self.size_mb,
            kind: self.kind.clone(),
            allowed_ips_ro: self.allowed_ips_ro.clone(),
            allowed_ips_rw: self.allowed_ips_rw.clone(),
            synchronous_environment_id: self.synchronous_environment_id.clone(),
        }
    }

    fn matches(&self, volume: &StaasVolume) -> bool {
        self.size_mb == volume.size_mb
            && self.allowed_ips_ro == volume.allowed_ips_ro
            && self.allowed_ips_rw == volume.allowed_ips_rw
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkAttachmentSpec {
    pub network_id: String,
    pub cidr: String,
}

/// Desired environment, volumes keyed by name and networks by network id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSpec {
    pub name: String,
    pub kind: String,
    pub cluster: String,
    pub windows: bool,
    pub volumes: BTreeMap<String, VolumeSpec>,
    pub networks: BTreeMap<String, NetworkAttachmentSpec>,
}

/// Checks run before any mutation
///
/// Every CIDR must parse and every attached network must be an existing VLAN.
pub async fn check(rc: &Reconciler, spec: &EnvironmentSpec) -> Result<()> {
    for volume in spec.volumes.values() {
        for cidr in volume.allowed_ips_ro.iter().chain(&volume.allowed_ips_rw) {
            parse_cidr(cidr)?;
        }
    }
    for (network_id, network) in &spec.networks {
        parse_cidr(&network.cidr)?;
        let Some(remote) = rc.client().get_virtual_network(network_id).await.optional()? else {
            return Err(Error::validation(format!("Network {network_id} does not exist")));
        };
        if remote.kind != NETWORK_TYPE_VLAN {
            return Err(Error::validation(format!("Network {network_id} is not of type VLAN")));
        }
    }
    Ok(())
}

/// Create the bare environment, returns its id
pub async fn create(rc: &Reconciler, spec: &EnvironmentSpec) -> Result<String> {
    check(rc, spec).await?;

    let request = StaasEnvironmentCreate {
        name: spec.name.clone(),
        kind: spec.kind.clone(),
        cluster: spec.cluster.clone(),
        windows: spec.windows,
    };
    let reference = rc.client().create_staas_environment(&request).await?;
    info!(name = %spec.name, id = %reference.id, "Creating STaaS environment");
    if reference.id.is_empty() {
        return Err(Error::Failed {
            kind: KIND,
            id: spec.name.clone(),
            message: String::from("An invalid (empty) id was returned after creation"),
        });
    }
    Ok(reference.id)
}

/// Bring a new environment up with its volumes and networks
///
/// Steps already applied are kept when a later one fails.
pub async fn provision(rc: &Reconciler, id: &str, spec: &EnvironmentSpec) -> Result<StaasEnvironment> {
    wait_ready(rc, id).await.in_step(KIND, id, "wait for environment")?;
    for volume in spec.volumes.values() {
        create_volume(rc, id, volume)
            .await
            .in_step(KIND, id, format!("create volume {}", volume.name))?;
    }
    for network in spec.networks.values() {
        create_network(rc, id, network)
            .await
            .in_step(KIND, id, format!("attach network {}", network.network_id))?;
    }
    rc.client()
        .get_staas_environment(id)
        .await
        .map_err(Error::from)
        .in_step(KIND, id, "read environment")
}

pub async fn read(rc: &Reconciler, id: &str) -> Result<Option<StaasEnvironment>> {
    rc.client().get_staas_environment(id).await.optional()
}

pub async fn update(rc: &Reconciler, id: &str, spec: &EnvironmentSpec) -> Result<StaasEnvironment> {
    check(rc, spec).await?;
    let client = rc.client();
    let env = client.get_staas_environment(id).await?;

    if env.name != spec.name || env.windows != spec.windows {
        let request = StaasEnvironmentUpdate {
            name: spec.name.clone(),
            windows: spec.windows,
        };
        client.update_staas_environment(id, &request).await?;
        info!(%id, "Updating STaaS environment");
    }

    let volumes: BTreeMap<&str, &StaasVolume> = env
        .volumes
        .iter()
        .map(|volume| (volume.name.as_str(), volume))
        .collect();
    let desired_volumes: BTreeMap<&str, &VolumeSpec> = spec
        .volumes
        .values()
        .map(|volume| (volume.name.as_str(), volume))
        .collect();
    let volume_changes = diff_by_key(
        &volumes,
        &desired_volumes,
        |have, want| want.matches(have),
        |have| have.state == staas_state::GRACE_TERMINATED,
    );

    let networks: BTreeMap<&str, &StaasNetwork> = env
        .networks
        .iter()
        .map(|network| (network.network_id.as_str(), network))
        .collect();
    let desired_networks: BTreeMap<&str, &NetworkAttachmentSpec> = spec
        .networks
        .iter()
        .map(|(network_id, network)| (network_id.as_str(), network))
        .collect();
    // Attachments are never updated in place
    let network_changes = diff_by_key(&networks, &desired_networks, |_, _| true, |_| false);
    debug!(%id, ?volume_changes, ?network_changes, "STaaS environment changes");

    // Changes already applied are kept when a later one fails
    for name in &volume_changes.to_update {
        let (Some(have), Some(want)) = (volumes.get(name), desired_volumes.get(name)) else {
            continue;
        };
        update_volume(rc, id, have, want)
            .await
            .in_step(KIND, id, format!("update volume {name}"))?;
    }
    for name in &volume_changes.to_create {
        if let Some(want) = desired_volumes.get(name) {
            create_volume(rc, id, want)
                .await
                .in_step(KIND, id, format!("create volume {name}"))?;
        }
    }
    for network_id in &network_changes.to_create {
        if let Some(want) = desired_networks.get(network_id) {
            create_network(rc, id, want)
                .await
                .in_step(KIND, id, format!("attach network {network_id}"))?;
        }
    }

    for name in &volume_changes.to_delete {
        if let Some(have) = volumes.get(name) {
            delete_volume(rc, id, have)
                .await
                .in_step(KIND, id, format!("delete volume {name}"))?;
        }
    }
    for network_id in &network_changes.to_delete {
        if let Some(have) = networks.get(network_id) {
            delete_network(rc, id, have)
                .await
                .in_step(KIND, id, format!("detach network {network_id}"))?;
        }
    }

    wait_ready(rc, id).await.in_step(KIND, id, "wait for environment")
}

/// Force the deletion of the environment and wait until it is gone
pub async fn delete(rc: &Reconciler, id: &str) -> Result<()> {
    let client = rc.client();
    if client.delete_staas_environment(id).await.optional()?.is_none() {
        return Ok(());
    }
    info!(%id, "Deleting STaaS environment");
    rc.poller(KIND, id, REMOVAL_SCHEDULE)
        .wait_until_gone(PollCondition::Equals(staas_state::FORCE_REMOVAL), || {
            client.get_staas_environment(id)
        })
        .await
}

async fn wait_ready(rc: &Reconciler, id: &str) -> Result<StaasEnvironment> {
    let client = rc.client();
    rc.poller(KIND, id, READY_SCHEDULE)
        .wait_for(PollCondition::Equals(staas_state::READY), || {
            client.get_staas_environment(id)
        })
        .await
}

async fn volume_of(
    client: &PreviderClient,
    id: &str,
    volume_id: &str,
) -> Result<Option<StaasVolume>, ApiError> {
    Ok(client.get_staas_environment(id).await?.volume(volume_id).cloned())
}

async fn network_of(
    client: &PreviderClient,
    id: &str,
    network_id: &str,
) -> Result<Option<StaasNetwork>, ApiError> {
    Ok(client.get_staas_environment(id).await?.network(network_id).cloned())
}

async fn wait_volume(rc: &Reconciler, id: &str, volume_id: &str, condition: PollCondition) -> Result<()> {
    let client = rc.client();
    rc.poller("STaaS volume", volume_id, READY_SCHEDULE)
        .wait_for(condition, || volume_of(client, id, volume_id))
        .await
        .map(drop)
}

async fn update_volume(rc: &Reconciler, id: &str, have: &StaasVolume, want: &VolumeSpec) -> Result<()> {
    rc.client()
        .update_staas_volume(id, &have.id, &want.request())
        .await?;
    info!(%id, volume = %want.name, "Updating STaaS volume");
    wait_volume(rc, id, &have.id, PollCondition::Equals(staas_state::READY)).await
}

/// Force delete a volume, it is gone once absent or grace terminated
async fn delete_volume(rc: &Reconciler, id: &str, have: &StaasVolume) -> Result<()> {
    let client = rc.client();
    client.delete_staas_volume(id, &have.id).await?;
    info!(%id, volume = %have.name, "Deleting STaaS volume");
    rc.poller("STaaS volume", &have.id, READY_SCHEDULE)
        .wait_until_gone(VOLUME_GONE, || volume_of(client, id, &have.id))
        .await
}

async fn delete_network(rc: &Reconciler, id: &str, have: &StaasNetwork) -> Result<()> {
    let client = rc.client();
    client.delete_staas_network(id, &have.id).await?;
    info!(%id, network = %have.network_id, "Detaching STaaS network");
    rc.poller("STaaS network", &have.id, REMOVAL_SCHEDULE)
        .wait_until_gone(PollCondition::Equals(staas_state::PENDING_REMOVAL), || {
            network_of(client, id, &have.id)
        })
        .await
}

/// Create a volume then wait for it, the volume is found back by name
async fn create_volume(rc: &Reconciler, id: &str, volume: &VolumeSpec) -> Result<()> {
    let client = rc.client();
    client.create_staas_volume(id, &volume.request()).await?;
    info!(%id, volume = %volume.name, "Creating STaaS volume");

    let env = client.get_staas_environment(id).await?;
    let Some(created) = env.volume_named(&volume.name) else {
        return Err(Error::Failed {
            kind: "STaaS volume",
            id: volume.name.clone(),
            message: String::from("volume not found after creation"),
        });
    };
    wait_volume(rc, id, &created.id, PollCondition::Equals(staas_state::READY)).await
}

/// Attach a network then wait for it, the attachment is found back by network id
async fn create_network(rc: &Reconciler, id: &str, network: &NetworkAttachmentSpec) -> Result<()> {
    let client = rc.client();
    let request = StaasNetworkCreate {
        network: network.network_id.clone(),
        cidr: network.cidr.clone(),
    };
    client.create_staas_network(id, &request).await?;
    info!(%id, network = %network.network_id, "Attaching STaaS network");

    let env = client.get_staas_environment(id).await?;
    let Some(created) = env.network_for(&network.network_id) else {
        return Err(Error::Failed {
            kind: "STaaS network",
            id: network.network_id.clone(),
            message: String::from("network not found after creation"),
        });
    };
    let attachment = created.id.clone();
    rc.poller("STaaS network", &attachment, READY_SCHEDULE)
        .wait_for(NETWORK_UP, || network_of(client, id, &attachment))
        .await
        .map(drop)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{any, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::reconcile::tests::reconciler_for;

    fn spec() -> EnvironmentSpec {
        EnvironmentSpec {
            name: String::from("files"),
            kind: String::from("NFS"),
            cluster: String::from("cluster-1"),
            windows: false,
            volumes: BTreeMap::from([(
                String::from("data"),
                VolumeSpec {
                    name: String::from("data"),
                    size_mb: 1024,
                    kind: String::from("NFS"),
                    allowed_ips_rw: vec![String::from("10.0.0.0/24")],
                    ..Default::default()
                },
            )]),
            networks: BTreeMap::from([(
                String::from("net-1"),
                NetworkAttachmentSpec {
                    network_id: String::from("net-1"),
                    cidr: String::from("10.0.0.2/24"),
                },
            )]),
        }
    }

    fn environment(data_state: &str) -> serde_json::Value {
        json!({
            "id": "env-1", "name": "files", "state": "READY", "type": "NFS", "cluster": "cluster-1",
            "volumes": [
                {"id": "v1", "name": "data", "sizeMb": 1024, "state": data_state, "type": "NFS",
                 "allowedIpsRw": ["10.0.0.0/24"]}
            ],
            "networks": [
                {"id": "n1", "networkId": "net-1", "state": "SYNCED", "cidr": "10.0.0.2/24"}
            ]
        })
    }

    async fn mount_vlan(server: &MockServer, kind: &str) {
        Mock::given(method("GET"))
            .and(path("/v2/iaas/network/net-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "net-1", "type": kind})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn invalid_cidr_is_rejected_before_any_call() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let mut spec = spec();
        if let Some(volume) = spec.volumes.get_mut("data") {
            volume.allowed_ips_ro = vec![String::from("10.0.0.300/24")];
        }
        let err = create(&reconciler_for(&server), &spec).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn network_must_be_a_vlan() {
        let server = MockServer::start().await;
        mount_vlan(&server, "WAN").await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = create(&reconciler_for(&server), &spec()).await.unwrap_err();
        assert_eq!(err.to_string(), "Network net-1 is not of type VLAN");
    }

    #[tokio::test]
    async fn create_then_provision_volumes_and_networks() {
        let server = MockServer::start().await;
        mount_vlan(&server, "VLAN").await;
        Mock::given(method("POST"))
            .and(path("/v2/staas/environment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "env-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/staas/environment/env-1/volume"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/staas/environment/env-1/network"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/staas/environment/env-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(environment("READY")))
            .mount(&server)
            .await;

        let rc = reconciler_for(&server);
        let id = create(&rc, &spec()).await.unwrap();
        assert_eq!(id, "env-1");
        let env = provision(&rc, &id, &spec()).await.unwrap();
        assert_eq!(env.volumes.len(), 1);
        assert_eq!(env.networks[0].id, "n1");
    }

    #[tokio::test]
    async fn failed_volume_leaves_a_partial_environment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/staas/environment/env-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(environment("READY")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/staas/environment/env-1/volume"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"message": "quota exceeded"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/staas/environment/env-1/network"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = provision(&reconciler_for(&server), "env-1", &spec())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Partial { ref step, .. } if step == "create volume data"));
        assert!(err.to_string().ends_with("quota exceeded"));
    }

    #[tokio::test]
    async fn update_resizes_and_removes_volumes() {
        let server = MockServer::start().await;
        mount_vlan(&server, "VLAN").await;
        let before = json!({
            "id": "env-1", "name": "files", "state": "READY",
            "volumes": [
                {"id": "v1", "name": "data", "sizeMb": 1024, "state": "READY",
                 "allowedIpsRw": ["10.0.0.0/24"]},
                {"id": "v2", "name": "old", "sizeMb": 512, "state": "READY"},
                {"id": "v3", "name": "gone", "sizeMb": 512, "state": "GRACE_TERMINATED"}
            ],
            "networks": [{"id": "n1", "networkId": "net-1", "state": "SYNCED"}]
        });
        let after = json!({
            "id": "env-1", "name": "files", "state": "READY",
            "volumes": [
                {"id": "v1", "name": "data", "sizeMb": 2048, "state": "READY",
                 "allowedIpsRw": ["10.0.0.0/24"]},
                {"id": "v2", "name": "old", "sizeMb": 512, "state": "GRACE_TERMINATED"},
                {"id": "v3", "name": "gone", "sizeMb": 512, "state": "GRACE_TERMINATED"}
            ],
            "networks": [{"id": "n1", "networkId": "net-1", "state": "SYNCED"}]
        });
        Mock::given(method("GET"))
            .and(path("/v2/staas/environment/env-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(before))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/staas/environment/env-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(after))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v2/staas/environment/env-1/volume/v1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v2/staas/environment/env-1/volume/v2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v2/staas/environment/env-1/volume/v3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v2/staas/environment/env-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut spec = spec();
        if let Some(volume) = spec.volumes.get_mut("data") {
            volume.size_mb = 2048;
        }
        let env = update(&reconciler_for(&server), "env-1", &spec).await.unwrap();
        assert_eq!(env.volume("v1").map(|volume| volume.size_mb), Some(2048));
    }

    #[tokio::test]
    async fn update_failure_after_a_resize_names_the_step() {
        let server = MockServer::start().await;
        mount_vlan(&server, "VLAN").await;
        Mock::given(method("GET"))
            .and(path("/v2/staas/environment/env-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(environment("READY")))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v2/staas/environment/env-1/volume/v1"))
            .and(body_partial_json(json!({"sizeMb": 2048})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/staas/environment/env-1/volume"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"message": "quota exceeded"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut spec = spec();
        if let Some(volume) = spec.volumes.get_mut("data") {
            volume.size_mb = 2048;
        }
        spec.volumes.insert(
            String::from("more"),
            VolumeSpec {
                name: String::from("more"),
                size_mb: 4096,
                kind: String::from("NFS"),
                ..Default::default()
            },
        );

        let err = update(&reconciler_for(&server), "env-1", &spec).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Partial { ref id, ref step, .. } if id == "env-1" && step == "create volume more"
        ));
        assert!(err.to_string().ends_with("quota exceeded"));
    }

    #[tokio::test]
    async fn delete_is_forced_and_awaited() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v2/staas/environment/env-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/staas/environment/env-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        delete(&reconciler_for(&server), "env-1").await.unwrap();
    }
}
