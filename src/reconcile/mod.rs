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

//! Convergence of remote objects towards a desired configuration
//!
//! Every mutation of the Previder API is asynchronous: the reconcilers issue
//! a command, then poll the remote object until it reaches the expected state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::client::PreviderClient;

pub mod diff;
mod error;
pub mod poll;
pub mod task;

pub use diff::diff_by_key;
pub use error::{Error, OptionalExt, PartialContext, Result};
pub use poll::{Observed, PollCondition, Poller, Schedule};
pub use task::Created;

/// Shared context of every reconcile operation
#[derive(Debug, Clone)]
pub struct Reconciler {
    client: Arc<PreviderClient>,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(client: Arc<PreviderClient>, cancel: CancellationToken) -> Self {
        Self { client, cancel }
    }

    pub fn client(&self) -> &PreviderClient {
        &self.client
    }

    pub fn poller<'a>(&'a self, kind: &'static str, id: &'a str, schedule: Schedule) -> Poller<'a> {
        Poller::new(kind, id, schedule, &self.cancel)
    }
}
