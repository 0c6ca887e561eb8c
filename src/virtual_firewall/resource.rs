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

use async_trait::async_trait;

use tf_provider::schema::Schema;
use tf_provider::value::{Value, ValueEmpty};
use tf_provider::{AttributePath, Diagnostics, Resource};

use crate::previder_provider::ProviderData;
use crate::utils::{report, WithNormalize, WithSchema, WithValidate};

use super::reconcile;
use super::state::VirtualFirewallState;

#[derive(Debug, Clone)]
pub struct VirtualFirewallResource {
    data: ProviderData,
}

impl VirtualFirewallResource {
    pub fn new(data: ProviderData) -> Self {
        Self { data }
    }
}

#[async_trait]
impl Resource for VirtualFirewallResource {
    type State<'a> = VirtualFirewallState<'a>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(VirtualFirewallState::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        config.validate(diags, AttributePath::root());
        if diags.errors.is_empty() {
            Some(())
        } else {
            None
        }
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let Some(rc) = self.data.reconciler_or_report(diags).await else {
            return Some((state, private_state));
        };

        let fetched = reconcile::read(&rc, state.id.as_str()).await;
        match fetched {
            Ok(Some((firewall, rules))) => {
                let mut state = state;
                state.refresh(&firewall, &rules);
                Some((state, private_state))
            }
            Ok(None) => None,
            Err(err) => {
                report(diags, "Failed to read virtual firewall", &err, AttributePath::new("id"));
                Some((state, private_state))
            }
        }
    }

    async fn plan_create<'a>(
        &self,
        diags: &mut Diagnostics,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state = proposed_state;
        state.normalize(diags);
        state.plan_computed(None);

        Some((state, Default::default()))
    }

    async fn plan_update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        proposed_state: Self::State<'a>,
        config_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>, Vec<AttributePath>)> {
        let mut trigger_replace = Vec::new();
        // Only a configured network change replaces the firewall
        if !config_state.network.is_null() && config_state.network != prior_state.network {
            trigger_replace.push(AttributePath::new("network"));
        }

        let mut state = proposed_state;
        state.normalize(diags);
        state.plan_computed(Some(&prior_state));
        if state != prior_state {
            state.state = Value::Unknown;
        }

        Some((state, prior_private_state, trigger_replace))
    }

    async fn plan_destroy<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::PrivateState<'a>> {
        Some(prior_private_state)
    }

    async fn create<'a>(
        &self,
        diags: &mut Diagnostics,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let spec = match planned_state.spec() {
            Ok(spec) => spec,
            Err(err) => {
                report(diags, "Error creating Virtual Firewall", &err, AttributePath::root());
                return None;
            }
        };
        let rc = self.data.reconciler_or_report(diags).await?;

        let id = match reconcile::create(&rc, &spec).await {
            Ok(id) => id,
            Err(err) => {
                report(diags, "Error creating Virtual Firewall", &err, AttributePath::root());
                return None;
            }
        };

        let mut state = planned_state.clone();
        match reconcile::provision(&rc, &id, &spec).await {
            Ok((firewall, rules)) => state.refresh(&firewall, &rules),
            Err(err) => {
                report(diags, "Error provisioning Virtual Firewall", &err, AttributePath::root());
                state = VirtualFirewallState::created(&id, &planned_state);
            }
        }

        Some((state, private_state))
    }

    async fn update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let spec = match planned_state.spec() {
            Ok(spec) => spec,
            Err(err) => {
                report(diags, "Error updating Virtual Firewall", &err, AttributePath::root());
                return None;
            }
        };
        let rc = self.data.reconciler_or_report(diags).await?;

        let updated = reconcile::update(
            &rc,
            prior_state.id.as_str(),
            prior_state.network.as_str(),
            &spec,
        )
        .await;
        match updated {
            Ok((firewall, rules)) => {
                let mut state = planned_state;
                state.refresh(&firewall, &rules);
                Some((state, private_state))
            }
            Err(err) => {
                let path = if err.is_validation() {
                    AttributePath::new("network")
                } else {
                    AttributePath::root()
                };
                report(diags, "Error updating Virtual Firewall", &err, path);
                None
            }
        }
    }

    async fn destroy<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        _private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<()> {
        let rc = self.data.reconciler_or_report(diags).await?;

        if let Err(err) = reconcile::delete(&rc, state.id.as_str()).await {
            report(diags, "Error deleting Virtual Firewall", &err, AttributePath::root());
            return None;
        }
        Some(())
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let rc = self.data.reconciler_or_report(diags).await?;

        match reconcile::read(&rc, &id).await {
            Ok(Some((firewall, rules))) => {
                let mut state = VirtualFirewallState::default();
                state.refresh(&firewall, &rules);
                Some((state, Value::Null))
            }
            Ok(None) => {
                diags.root_error("Virtual firewall not found", format!("No virtual firewall with id {id}"));
                None
            }
            Err(err) => {
                report(diags, "Failed to import virtual firewall", &err, AttributePath::root());
                None
            }
        }
    }
}
