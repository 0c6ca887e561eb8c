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

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Error returned by the Previder REST API client
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API answered with a non-success status
    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },
    /// The request could not be sent or the response could not be read
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The request URL could not be built from the base URL
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    /// The response body is not what the endpoint should return
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ApiError {
    /// Build the error for a failed response from its status and raw body
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| body.trim().to_owned());
        Self::Status { status, message }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }

    /// Whether the remote object does not exist (anymore)
    pub fn is_not_found(&self) -> bool {
        if self.status() == Some(StatusCode::NOT_FOUND) {
            return true;
        }
        match self {
            Self::Status { .. } => {
                let text = self.to_string().to_lowercase();
                text.contains("404") && text.contains("not found")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_taken_from_json_body() {
        let err = ApiError::from_response(
            StatusCode::BAD_REQUEST,
            r#"{"message": "name is mandatory"}"#,
        );
        assert_eq!(err.to_string(), "400 Bad Request: name is mandatory");
        assert!(!err.is_not_found());
    }

    #[test]
    fn raw_body_is_kept_when_not_json() {
        let err = ApiError::from_response(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(err.to_string(), "502 Bad Gateway: upstream down");
    }

    #[test]
    fn not_found_is_classified_by_status() {
        let err = ApiError::from_response(StatusCode::NOT_FOUND, "");
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("404 Not Found"));
    }

    #[test]
    fn not_found_is_classified_by_message() {
        let err = ApiError::from_response(
            StatusCode::BAD_REQUEST,
            r#"{"message": "backend said 404, object not found"}"#,
        );
        assert!(err.is_not_found());
    }
}
