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
use crate::utils::{report, WithSchema, WithValidate};

use super::reconcile;
use super::state::StaasEnvironmentState;

#[derive(Debug, Clone)]
pub struct StaasEnvironmentResource {
    data: ProviderData,
}

impl StaasEnvironmentResource {
    pub fn new(data: ProviderData) -> Self {
        Self { data }
    }
}

#[async_trait]
impl Resource for StaasEnvironmentResource {
    type State<'a> = StaasEnvironmentState<'a>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(StaasEnvironmentState::schema())
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

        match reconcile::read(&rc, state.id.as_str()).await {
            Ok(Some(env)) => {
                let mut state = state;
                state.refresh(&env);
                Some((state, private_state))
            }
            Ok(None) => None,
            Err(err) => {
                report(diags, "Failed to read STaaS environment", &err, AttributePath::new("id"));
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
        state.plan_computed(None);

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
        // The platform has no call to move an environment to another cluster or type
        let trigger_replace = [
            ("cluster", &proposed_state.cluster, &prior_state.cluster),
            ("type", &proposed_state.kind, &prior_state.kind),
        ]
        .into_iter()
        .filter(|(_, proposed, prior)| proposed.is_value() && proposed != prior)
        .map(|(name, _, _)| AttributePath::new(name))
        .collect();

        let mut state = proposed_state;
        state.plan_computed(Some(&prior_state));

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
                report(diags, "Error creating STaaS environment", &err, AttributePath::root());
                return None;
            }
        };
        let rc = self.data.reconciler_or_report(diags).await?;

        let id = match reconcile::create(&rc, &spec).await {
            Ok(id) => id,
            Err(err) => {
                report(diags, "Error creating STaaS environment", &err, AttributePath::root());
                return None;
            }
        };

        let mut state = planned_state.clone();
        match reconcile::provision(&rc, &id, &spec).await {
            Ok(env) => state.refresh(&env),
            Err(err) => {
                report(diags, "Error provisioning STaaS environment", &err, AttributePath::root());
                state = StaasEnvironmentState::created(&id, &planned_state);
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
                report(diags, "Error updating STaaS environment", &err, AttributePath::root());
                return None;
            }
        };
        let rc = self.data.reconciler_or_report(diags).await?;

        match reconcile::update(&rc, prior_state.id.as_str(), &spec).await {
            Ok(env) => {
                let mut state = planned_state;
                state.refresh(&env);
                Some((state, private_state))
            }
            Err(err) => {
                report(diags, "Error updating STaaS environment", &err, AttributePath::root());
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
            report(diags, "Error deleting STaaS environment", &err, AttributePath::root());
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
            Ok(Some(env)) => {
                let mut state = StaasEnvironmentState::default();
                state.refresh(&env);
                Some((state, Value::Null))
            }
            Ok(None) => {
                diags.root_error("STaaS environment not found", format!("No STaaS environment with id {id}"));
                None
            }
            Err(err) => {
                report(diags, "Failed to import STaaS environment", &err, AttributePath::root());
                None
            }
        }
    }
}
