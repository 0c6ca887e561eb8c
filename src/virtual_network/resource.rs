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
use tf_provider::value::{Value, ValueEmpty, ValueString};
use tf_provider::{AttributePath, Diagnostics, Resource};

use crate::previder_provider::ProviderData;
use crate::utils::{report, unknown_if_null, WithSchema, WithValidate};

use super::reconcile;
use super::state::VirtualNetworkState;

#[derive(Debug, Clone)]
pub struct VirtualNetworkResource {
    data: ProviderData,
}

impl VirtualNetworkResource {
    pub fn new(data: ProviderData) -> Self {
        Self { data }
    }
}

#[async_trait]
impl Resource for VirtualNetworkResource {
    type State<'a> = VirtualNetworkState<'a>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(VirtualNetworkState::schema())
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
            Ok(Some(network)) => {
                let mut state = state;
                state.refresh(&network);
                Some((state, private_state))
            }
            Ok(None) => None,
            Err(err) => {
                report(diags, "Failed to read virtual network", &err, AttributePath::new("id"));
                Some((state, private_state))
            }
        }
    }

    async fn plan_create<'a>(
        &self,
        _diags: &mut Diagnostics,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state = proposed_state;
        state.id = ValueString::Unknown;
        unknown_if_null(&mut state.group);

        Some((state, Default::default()))
    }

    async fn plan_update<'a>(
        &self,
        _diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>, Vec<AttributePath>)> {
        let mut trigger_replace = Vec::new();
        if proposed_state.kind != prior_state.kind {
            trigger_replace.push(AttributePath::new("type"));
        }

        let mut state = proposed_state;
        state.id = prior_state.id;
        if state.group.is_null() {
            state.group = prior_state.group;
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
        let rc = self.data.reconciler_or_report(diags).await?;

        let created = match reconcile::create(&rc, &planned_state.spec()).await {
            Ok(created) => created,
            Err(err) => {
                report(diags, "Failed to create virtual network", &err, AttributePath::root());
                return None;
            }
        };

        let mut state = planned_state.clone();
        match reconcile::provision(&rc, &created).await {
            Ok(network) => state.refresh(&network),
            Err(err) => {
                report(diags, "Virtual network did not become ready", &err, AttributePath::root());
                state = VirtualNetworkState::created(&created.id, &planned_state);
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
        let rc = self.data.reconciler_or_report(diags).await?;

        let updated = reconcile::update(&rc, prior_state.id.as_str(), &planned_state.spec()).await;
        match updated {
            Ok(network) => {
                let mut state = planned_state;
                state.refresh(&network);
                Some((state, private_state))
            }
            Err(err) => {
                report(diags, "Failed to update virtual network", &err, AttributePath::root());
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
            report(diags, "Failed to delete virtual network", &err, AttributePath::root());
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
            Ok(Some(network)) => {
                let mut state = VirtualNetworkState::default();
                state.refresh(&network);
                Some((state, Value::Null))
            }
            Ok(None) => {
                diags.root_error("Virtual network not found", format!("No virtual network with id {id}"));
                None
            }
            Err(err) => {
                report(diags, "Failed to import virtual network", &err, AttributePath::root());
                None
            }
        }
    }
}
