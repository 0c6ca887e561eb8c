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

use thiserror::Error;

use crate::client::ApiError;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected before any remote call
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The poll budget was exhausted before the condition held
    #[error("timed out waiting for {kind} {id}, last observed state: {last_state}")]
    Timeout {
        kind: &'static str,
        id: String,
        last_state: String,
    },
    /// The remote platform reported the operation as failed
    #[error("{kind} {id} failed: {message}")]
    Failed {
        kind: &'static str,
        id: String,
        message: String,
    },
    /// A step of a multi-step provisioning failed after earlier steps were applied
    #[error("{kind} {id} is partially provisioned, step `{step}` failed: {source}")]
    Partial {
        kind: &'static str,
        id: String,
        step: String,
        #[source]
        source: Box<Error>,
    },
    #[error("cancelled while waiting for {kind} {id}")]
    Cancelled { kind: &'static str, id: String },
    #[error("Provider not configured")]
    NotConfigured,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api(err) => err.is_not_found(),
            _ => false,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Summary line used for the Terraform diagnostic
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Invalid configuration",
            Self::Api(_) => "Previder API error",
            Self::Timeout { .. } => "Timed out waiting for the remote state",
            Self::Failed { .. } => "Remote operation failed",
            Self::Partial { .. } => "Resource partially provisioned",
            Self::Cancelled { .. } => "Operation cancelled",
            Self::NotConfigured => "Provider not configured",
        }
    }
}

/// Map a not-found API error to `None`
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, ApiError> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Attach the failing step to an error raised after earlier steps succeeded
pub trait PartialContext<T> {
    fn in_step(self, kind: &'static str, id: &str, step: impl Into<String>) -> Result<T>;
}

impl<T> PartialContext<T> for Result<T> {
    fn in_step(self, kind: &'static str, id: &str, step: impl Into<String>) -> Result<T> {
        self.map_err(|source| match source {
            // Cancellation stays distinguishable
            err @ Error::Cancelled { .. } => err,
            source => Error::Partial {
                kind,
                id: id.to_owned(),
                step: step.into(),
                source: Box::new(source),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_names_the_failing_step() {
        let res: Result<()> = Err(Error::validation("boom"));
        let err = res
            .in_step("STaaS environment", "env-1", "create volume data")
            .unwrap_err();
        assert!(matches!(err, Error::Partial { ref step, .. } if step == "create volume data"));
        assert_eq!(
            err.to_string(),
            "STaaS environment env-1 is partially provisioned, step `create volume data` failed: boom"
        );
    }

    #[test]
    fn not_found_becomes_none() {
        use reqwest::StatusCode;

        let gone: std::result::Result<u32, _> =
            Err(ApiError::from_response(StatusCode::NOT_FOUND, ""));
        assert_eq!(gone.optional().unwrap(), None);

        let broken: std::result::Result<u32, _> =
            Err(ApiError::from_response(StatusCode::INTERNAL_SERVER_ERROR, "oops"));
        assert!(matches!(broken.optional(), Err(Error::Api(_))));
    }

    #[test]
    fn cancellation_is_not_wrapped() {
        let res: Result<()> = Err(Error::Cancelled {
            kind: "volume",
            id: String::from("v1"),
        });
        let err = res.in_step("STaaS environment", "env-1", "wait").unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }
}
