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

use tf_provider::serve;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod client;
mod kubernetes_cluster;
mod previder_provider;
mod reconcile;
mod staas_environment;
mod utils;
mod validate;
mod virtual_firewall;
mod virtual_network;
mod virtual_server;

use previder_provider::PreviderProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // Pending polls stop at their next tick when Terraform interrupts the plugin
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, cancelling pending operations");
                cancel.cancel();
            }
        }
    });

    serve("previder", PreviderProvider::new(cancel)).await
}
