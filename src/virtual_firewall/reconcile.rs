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

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::virtual_firewall::{
    NatRule, NatRuleCreate, VirtualFirewall, VirtualFirewallUpdate, FIREWALL_PENDING_REMOVAL,
    FIREWALL_READY,
};
use crate::reconcile::{
    diff_by_key, Error, Observed, OptionalExt, PartialContext, PollCondition, Reconciler, Result,
    Schedule,
};

pub(super) const KIND: &str = "virtual firewall";

const READY_SCHEDULE: Schedule = Schedule::exponential(180);
const REMOVAL_SCHEDULE: Schedule = Schedule::constant(Duration::from_secs(10), 120);

impl Observed for VirtualFirewall {
    fn observed_state(&self) -> Option<&str> {
        Some(&self.state)
    }
}

/// Desired configuration of a virtual firewall
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirewallSpec {
    pub name: String,
    pub kind: String,
    pub group: String,
    pub network: String,
    pub lan_address: String,
    pub dhcp_enabled: bool,
    pub dhcp_range: Option<(IpAddr, IpAddr)>,
    pub local_domain_name: String,
    pub dns_enabled: bool,
    pub nameservers: Vec<IpAddr>,
    pub termination_protected: bool,
    pub icmp_wan_enabled: bool,
    pub icmp_lan_enabled: bool,
    /// NAT rules keyed by description
    pub nat_rules: BTreeMap<String, NatRuleCreate>,
}

impl FirewallSpec {
    fn request(&self, with_kind: bool) -> VirtualFirewallUpdate {
        let (dhcp_range_start, dhcp_range_end) = match (self.dhcp_enabled, self.dhcp_range) {
            (true, Some((start, end))) => (Some(start), Some(end)),
            _ => (None, None),
        };
        VirtualFirewallUpdate {
            name: self.name.clone(),
            kind: with_kind.then(|| self.kind.clone()),
            group: self.group.clone(),
            network: self.network.clone(),
            lan_address: self.lan_address.clone(),
            dhcp_enabled: self.dhcp_enabled,
            dhcp_range_start,
            dhcp_range_end,
            local_domain_name: if self.dhcp_enabled {
                self.local_domain_name.clone()
            } else {
                String::new()
            },
            dns_enabled: self.dns_enabled,
            nameservers: if self.dns_enabled {
                self.nameservers.clone()
            } else {
                Vec::new()
            },
            termination_protected: self.termination_protected,
            icmp_wan_enabled: self.icmp_wan_enabled,
            icmp_lan_enabled: self.icmp_lan_enabled,
        }
    }
}

/// Remote firewall with its NAT rules
pub type Snapshot = (VirtualFirewall, Vec<NatRule>);

/// Create the firewall, returns its id
pub async fn create(rc: &Reconciler, spec: &FirewallSpec) -> Result<String> {
    let created = rc.client().create_virtual_firewall(&spec.request(true)).await?;
    if created.id.is_empty() {
        return Err(Error::Failed {
            kind: KIND,
            id: spec.name.clone(),
            message: String::from("an invalid (empty) id was returned after creation"),
        });
    }
    info!(id = %created.id, name = %spec.name, "Created virtual firewall");
    Ok(created.id)
}

/// Wait for a new firewall to be ready, then create its NAT rules
pub async fn provision(rc: &Reconciler, id: &str, spec: &FirewallSpec) -> Result<Snapshot> {
    wait_ready(rc, id)
        .await
        .in_step(KIND, id, "wait for firewall")?;
    sync_nat_rules(rc, id, &[], &spec.nat_rules).await?;
    fetch(rc, id).await
}

pub async fn read(rc: &Reconciler, id: &str) -> Result<Option<Snapshot>> {
    fetch(rc, id).await.map(Some).or_else(|err| {
        if err.is_not_found() {
            Ok(None)
        } else {
            Err(err)
        }
    })
}

/// The network of a firewall cannot be changed in place
pub async fn update(
    rc: &Reconciler,
    id: &str,
    prior_network: &str,
    spec: &FirewallSpec,
) -> Result<Snapshot> {
    if prior_network != spec.network {
        return Err(Error::validation(
            "Fields network cannot be updated after creation",
        ));
    }

    rc.client()
        .update_virtual_firewall(id, &spec.request(false))
        .await?;
    info!(%id, "Updated virtual firewall");
    wait_ready(rc, id).await?;

    let observed = rc.client().list_nat_rules(id).await?;
    sync_nat_rules(rc, id, &observed, &spec.nat_rules).await?;
    fetch(rc, id).await
}

pub async fn delete(rc: &Reconciler, id: &str) -> Result<()> {
    if rc
        .client()
        .delete_virtual_firewall(id)
        .await
        .optional()?
        .is_none()
    {
        return Ok(());
    }
    info!(%id, "Deleting virtual firewall");
    let client = rc.client();
    rc.poller(KIND, id, REMOVAL_SCHEDULE)
        .wait_until_gone(PollCondition::Equals(FIREWALL_PENDING_REMOVAL), || {
            client.get_virtual_firewall(id)
        })
        .await
}

async fn wait_ready(rc: &Reconciler, id: &str) -> Result<VirtualFirewall> {
    let client = rc.client();
    rc.poller(KIND, id, READY_SCHEDULE)
        .wait_for(PollCondition::Equals(FIREWALL_READY), || {
            client.get_virtual_firewall(id)
        })
        .await
}

async fn fetch(rc: &Reconciler, id: &str) -> Result<Snapshot> {
    let client = rc.client();
    let snapshot = futures::try_join!(client.get_virtual_firewall(id), client.list_nat_rules(id))?;
    Ok(snapshot)
}

fn same_rule(have: &NatRule, want: &NatRuleCreate) -> bool {
    have.port == want.port
        && have.protocol == want.protocol
        && have.active == want.active
        && have.nat_destination == want.nat_destination
        && have.nat_port == want.nat_port
        && (want.source.is_empty() || have.source == want.source)
}

/// Converge the NAT rules by description: updates and creates, then deletes.
/// Remote rules sharing a description with an earlier one are deleted.
async fn sync_nat_rules(
    rc: &Reconciler,
    id: &str,
    observed: &[NatRule],
    desired: &BTreeMap<String, NatRuleCreate>,
) -> Result<()> {
    let client = rc.client();
    let mut by_description: BTreeMap<String, &NatRule> = BTreeMap::new();
    let mut duplicates = Vec::new();
    for rule in observed {
        match by_description.entry(rule.description.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(rule);
            }
            Entry::Occupied(_) => {
                warn!(%id, rule = %rule.id, description = %rule.description, "Duplicate NAT rule");
                duplicates.push(rule);
            }
        }
    }
    let changes = diff_by_key(
        &by_description,
        desired,
        |have, want| same_rule(have, want),
        |_| false,
    );
    if changes.is_empty() && duplicates.is_empty() {
        return Ok(());
    }
    debug!(
        %id,
        create = changes.to_create.len(),
        update = changes.to_update.len(),
        delete = changes.to_delete.len(),
        duplicates = duplicates.len(),
        "NAT rule changes"
    );

    // Rules already converged are kept when a later one fails
    for key in &changes.to_update {
        if let (Some(have), Some(want)) = (by_description.get(key), desired.get(key)) {
            client
                .update_nat_rule(id, &have.id, want)
                .await
                .map_err(Error::from)
                .in_step(KIND, id, format!("update NAT rule {key}"))?;
        }
    }
    for key in &changes.to_create {
        if let Some(want) = desired.get(key) {
            client
                .create_nat_rule(id, want)
                .await
                .map_err(Error::from)
                .in_step(KIND, id, format!("create NAT rule {key}"))?;
        }
    }
    let removed = changes
        .to_delete
        .iter()
        .filter_map(|key| by_description.get(key).copied())
        .chain(duplicates);
    for have in removed {
        client
            .delete_nat_rule(id, &have.id)
            .await
            .map_err(Error::from)
            .in_step(KIND, id, format!("delete NAT rule {}", have.description))?;
    }
    Ok(())
}
