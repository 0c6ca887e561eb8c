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

use crate::client::{task_state, Task};

use super::{Error, Observed, PartialContext, PollCondition, Reconciler, Result, Schedule};

/// Interval between two fetches of a task
pub const TASK_INTERVAL: Duration = Duration::from_secs(5);

/// Object accepted by the platform, its creation task may still be running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub id: String,
    pub task: Option<Task>,
}

impl Created {
    /// Wait for the creation task when it was still running at creation
    pub async fn settle(&self, rc: &Reconciler, kind: &'static str, timeout: Duration) -> Result<()> {
        if let Some(task) = &self.task {
            rc.wait_for_task(task, timeout)
                .await
                .in_step(kind, &self.id, "wait for creation task")?;
        }
        Ok(())
    }
}

impl Observed for Task {
    fn observed_state(&self) -> Option<&str> {
        Some(&self.state)
    }
    fn failure(&self) -> Option<String> {
        if self.state != task_state::FAILED {
            return None;
        }
        Some(if self.message.is_empty() {
            String::from("task failed")
        } else {
            self.message.clone()
        })
    }
}

impl Reconciler {
    /// Wait for an asynchronous task to complete within `timeout`
    pub async fn wait_for_task(&self, task: &Task, timeout: Duration) -> Result<Task> {
        if task.id.is_empty() {
            return Err(Error::Failed {
                kind: "task",
                id: String::new(),
                message: String::from("the API did not return a task"),
            });
        }
        let attempts = u32::try_from(timeout.as_secs() / TASK_INTERVAL.as_secs())
            .unwrap_or(u32::MAX)
            .max(1);
        self.wait_for_task_with(task, Schedule::constant(TASK_INTERVAL, attempts))
            .await
    }

    /// Id of the object created by `task`
    ///
    /// Taken from the started task when it carries it, so the object is tracked
    /// even if the task never completes. Otherwise the task is awaited first.
    pub async fn created_by(
        &self,
        task: Task,
        timeout: Duration,
        kind: &'static str,
        name: &str,
        id_of: fn(&Task) -> &str,
    ) -> Result<Created> {
        if !id_of(&task).is_empty() {
            return Ok(Created {
                id: id_of(&task).to_owned(),
                task: Some(task),
            });
        }

        let done = self.wait_for_task(&task, timeout).await?;
        let id = id_of(&done);
        if id.is_empty() {
            return Err(Error::Failed {
                kind,
                id: name.to_owned(),
                message: format!("the API did not return the id of the {kind}"),
            });
        }
        Ok(Created {
            id: id.to_owned(),
            task: None,
        })
    }

    pub(crate) async fn wait_for_task_with(&self, task: &Task, schedule: Schedule) -> Result<Task> {
        let client = self.client();
        let done = self
            .poller("task", &task.id, schedule)
            .wait_for(PollCondition::Equals(task_state::COMPLETED), || {
                client.get_task(&task.id)
            })
            .await?;
        info!(task = %done.id, "Task completed");
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::reconcile::tests::reconciler_for;

    fn started(id: &str) -> Task {
        Task {
            id: id.to_owned(),
            state: String::from("RUNNING"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn completed_task_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/task/t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"id": "t1", "state": "COMPLETED", "virtualMachine": "vm-1"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let rc = reconciler_for(&server);
        let task = rc
            .wait_for_task(&started("t1"), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(task.virtual_machine, "vm-1");
    }

    #[tokio::test]
    async fn failed_task_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/task/t2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"id": "t2", "state": "FAILED", "message": "no capacity"}),
            ))
            .mount(&server)
            .await;

        let rc = reconciler_for(&server);
        let err = rc
            .wait_for_task(&started("t2"), Duration::from_secs(300))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "task t2 failed: no capacity");
    }

    #[tokio::test]
    async fn running_task_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/task/t3"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "t3", "state": "RUNNING"})),
            )
            .expect(3)
            .mount(&server)
            .await;

        let rc = reconciler_for(&server);
        let err = rc
            .wait_for_task_with(&started("t3"), Schedule::constant(Duration::ZERO, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { ref last_state, .. } if last_state == "RUNNING"));
    }

    #[tokio::test]
    async fn created_id_comes_from_the_started_task() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/task/t4"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let rc = reconciler_for(&server);
        let task = Task {
            virtual_network: String::from("net-1"),
            ..started("t4")
        };
        let created = rc
            .created_by(task, Duration::from_secs(300), "virtual network", "lan", |t| {
                t.virtual_network.as_str()
            })
            .await
            .unwrap();
        assert_eq!(created.id, "net-1");
        assert!(created.task.is_some());
    }

    #[tokio::test]
    async fn created_id_waits_for_the_task_when_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/task/t5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"id": "t5", "state": "COMPLETED", "virtualNetwork": "net-2"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let rc = reconciler_for(&server);
        let created = rc
            .created_by(started("t5"), Duration::from_secs(300), "virtual network", "lan", |t| {
                t.virtual_network.as_str()
            })
            .await
            .unwrap();
        assert_eq!(
            created,
            Created {
                id: String::from("net-2"),
                task: None
            }
        );
        created.settle(&rc, "virtual network", Duration::from_secs(300)).await.unwrap();
    }

    #[tokio::test]
    async fn missing_task_id_is_rejected() {
        let server = MockServer::start().await;
        let rc = reconciler_for(&server);
        let err = rc
            .wait_for_task(&Task::default(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Failed { .. }));
    }
}
