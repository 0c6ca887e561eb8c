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

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tf_provider::schema::{AttributeConstraint, AttributeType, Block, Description, Schema};
use tf_provider::value::{ValueEmpty, ValueString};
use tf_provider::{map, AttributePath, Diagnostics, DynamicDataSource, DynamicResource, Provider};

use crate::client::{ClientConfig, PreviderClient};
use crate::kubernetes_cluster::KubernetesClusterResource;
use crate::reconcile::{Error, Reconciler, Result};
use crate::staas_environment::StaasEnvironmentResource;
use crate::utils::{attribute, sensitive, WithSchema};
use crate::virtual_firewall::VirtualFirewallResource;
use crate::virtual_network::VirtualNetworkResource;
use crate::virtual_server::VirtualServerResource;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig<'a> {
    #[serde(borrow = "'a")]
    pub token: ValueString<'a>,
    pub url: ValueString<'a>,
    pub customer: ValueString<'a>,
}

impl WithSchema for ProviderConfig<'_> {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Previder platform"),
                attributes: map! {
                    "token" => sensitive(attribute(
                        AttributeType::String,
                        AttributeConstraint::Optional,
                        "API token, defaults to the PREVIDER_TOKEN environment variable",
                    )),
                    "url" => attribute(
                        AttributeType::String,
                        AttributeConstraint::Optional,
                        "API base URL, overridden by the PREVIDER_URL environment variable",
                    ),
                    "customer" => attribute(
                        AttributeType::String,
                        AttributeConstraint::Optional,
                        "Id of the sub-customer to act for",
                    ),
                },
                ..Default::default()
            },
        }
    }
}

/// Client slot shared by the provider and every resource
///
/// Resources are instantiated before the provider is configured, the slot
/// is filled by `configure`.
#[derive(Debug, Clone)]
pub struct ProviderData {
    client: Arc<RwLock<Option<Arc<PreviderClient>>>>,
    cancel: CancellationToken,
}

impl ProviderData {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            client: Default::default(),
            cancel,
        }
    }

    pub async fn set_client(&self, client: PreviderClient) {
        *self.client.write().await = Some(Arc::new(client));
    }

    pub async fn reconciler(&self) -> Result<Reconciler> {
        let client = self.client.read().await.clone().ok_or(Error::NotConfigured)?;
        Ok(Reconciler::new(client, self.cancel.clone()))
    }

    /// Reconciler of a resource operation, reported as a diagnostic when missing
    pub async fn reconciler_or_report(&self, diags: &mut Diagnostics) -> Option<Reconciler> {
        match self.reconciler().await {
            Ok(reconciler) => Some(reconciler),
            Err(err) => {
                diags.root_error(
                    err.summary(),
                    "The provider must be configured before managing resources",
                );
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreviderProvider {
    data: ProviderData,
}

impl PreviderProvider {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            data: ProviderData::new(cancel),
        }
    }
}

#[async_trait]
impl Provider for PreviderProvider {
    type Config<'a> = ProviderConfig<'a>;
    type MetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(ProviderConfig::schema())
    }

    async fn validate<'a>(&self, _diags: &mut Diagnostics, _config: Self::Config<'a>) -> Option<()> {
        Some(())
    }

    async fn configure<'a>(
        &self,
        diags: &mut Diagnostics,
        terraform_version: String,
        config: Self::Config<'a>,
    ) -> Option<()> {
        let resolved = match ClientConfig::resolve(
            config.token.as_deref_option(),
            config.url.as_deref_option(),
            config.customer.as_deref_option(),
        ) {
            Ok(resolved) => resolved,
            Err(err) => {
                diags.error("Invalid client or token", err, AttributePath::new("token"));
                return None;
            }
        };

        let client = match PreviderClient::new(resolved) {
            Ok(client) => client,
            Err(err) => {
                diags.error(
                    "Invalid client or token",
                    err.to_string(),
                    AttributePath::new("url"),
                );
                return None;
            }
        };

        match client.api_info().await {
            Ok(api) => {
                info!(
                    version = %api.version,
                    url = %client.base_url(),
                    terraform = %terraform_version,
                    "Connected to the Previder API"
                );
            }
            Err(err) => {
                diags.root_error(
                    "Invalid client or token",
                    format!("API could not be queried: {err}"),
                );
                return None;
            }
        }

        self.data.set_client(client).await;
        Some(())
    }

    fn get_resources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<HashMap<String, Box<dyn DynamicResource>>> {
        Some(map! {
            "virtual_server"     => VirtualServerResource::new(self.data.clone()),
            "virtual_network"    => VirtualNetworkResource::new(self.data.clone()),
            "virtual_firewall"   => VirtualFirewallResource::new(self.data.clone()),
            "kubernetes_cluster" => KubernetesClusterResource::new(self.data.clone()),
            "staas_environment"  => StaasEnvironmentResource::new(self.data.clone()),
        })
    }

    fn get_data_sources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<HashMap<String, Box<dyn DynamicDataSource>>> {
        Some(HashMap::new())
    }
}
