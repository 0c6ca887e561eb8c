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

use reqwest::{Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use url::Url;

mod error;
pub mod kubernetes;
pub mod staas;
pub mod virtual_firewall;
pub mod virtual_machine;
pub mod virtual_network;

pub use error::{ApiError, Result};

pub const DEFAULT_URL: &str = "https://portal.previder.nl/api/";
pub const URL_ENV: &str = "PREVIDER_URL";
pub const TOKEN_ENV: &str = "PREVIDER_TOKEN";

const TOKEN_HEADER: &str = "X-Auth-Token";
const CUSTOMER_HEADER: &str = "X-CustomerId";

/// Connection settings of the API client, after defaults and environment
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub url: String,
    pub token: String,
    pub customer: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("customer", &self.customer)
            .finish()
    }
}

impl ClientConfig {
    /// Resolve the settings from the provider attributes and the process environment
    pub fn resolve(
        token: Option<&str>,
        url: Option<&str>,
        customer: Option<&str>,
    ) -> std::result::Result<Self, String> {
        Self::resolve_with(token, url, customer, |name| std::env::var(name).ok())
    }

    /// Resolve the settings with a custom environment lookup
    pub fn resolve_with(
        token: Option<&str>,
        url: Option<&str>,
        customer: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, String> {
        let non_empty = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_owned);

        let mut url = non_empty(url).unwrap_or_else(|| DEFAULT_URL.to_owned());
        if let Some(env_url) = non_empty(env(URL_ENV).as_deref()) {
            url = env_url;
        }
        if !url.ends_with('/') {
            url.push('/');
        }

        let token = non_empty(token)
            .or_else(|| non_empty(env(TOKEN_ENV).as_deref()))
            .ok_or_else(|| String::from("no Previder token found"))?;

        Ok(Self {
            url,
            token,
            customer: non_empty(customer),
        })
    }
}

/// Reference to a freshly created object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reference {
    pub id: String,
}

/// Asynchronous operation started by a mutating call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Task {
    pub id: String,
    pub state: String,
    pub virtual_machine: String,
    pub virtual_network: String,
    pub message: String,
}

pub mod task_state {
    pub const COMPLETED: &str = "COMPLETED";
    pub const FAILED: &str = "FAILED";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiInfo {
    pub version: String,
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub page: u64,
    pub size: u64,
    pub sort: String,
    pub query: String,
}

impl PageRequest {
    pub fn sorted(size: u64, sort: &str) -> Self {
        Self {
            page: 0,
            size,
            sort: sort.to_owned(),
            query: String::new(),
        }
    }
}

/// Client of the Previder REST API
#[derive(Clone)]
pub struct PreviderClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    customer: Option<String>,
}

impl std::fmt::Debug for PreviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviderClient")
            .field("base_url", &self.base_url.as_str())
            .field("customer", &self.customer)
            .finish_non_exhaustive()
    }
}

impl PreviderClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("terraform-provider-previder/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: Url::parse(&config.url)?,
            token: config.token,
            customer: config.customer,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the API information, used to check the connection settings
    pub async fn api_info(&self) -> Result<ApiInfo> {
        self.get("v2/info").await
    }

    pub async fn get_task(&self, id: &str) -> Result<Task> {
        self.get(&format!("v2/task/{id}")).await
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(path)?;
        debug!(%method, %url, "Previder API request");
        let mut request = self
            .http
            .request(method, url)
            .header(TOKEN_HEADER, &self.token)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(customer) = &self.customer {
            request = request.header(CUSTOMER_HEADER, customer);
        }
        Ok(request)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_response(status, &body));
        }
        // Empty bodies decode as unit or None
        let body = if body.trim().is_empty() { "null" } else { &body };
        Ok(serde_json::from_str(body)?)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::GET, path)?).await
    }

    pub(crate) async fn get_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.send(self.request(Method::GET, path)?.query(query))
            .await
    }

    pub(crate) async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(self.request(Method::POST, path)?.json(body)).await
    }

    pub(crate) async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(self.request(Method::PUT, path)?.json(body)).await
    }

    pub(crate) async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::DELETE, path)?).await
    }

    pub(crate) async fn delete_with<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(self.request(Method::DELETE, path)?.json(body))
            .await
    }

    /// Collect every element of a paged listing
    pub(crate) async fn get_all_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        mut request: PageRequest,
    ) -> Result<Vec<T>> {
        let mut all = Vec::new();
        loop {
            let page: Page<T> = self.get_query(path, &request).await?;
            let received = page.content.len();
            all.extend(page.content);
            request.page += 1;
            if received == 0 || request.page >= page.total_pages {
                return Ok(all);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn client_for(server: &MockServer) -> PreviderClient {
        PreviderClient::new(ClientConfig {
            url: format!("{}/", server.uri()),
            token: String::from("secret"),
            customer: None,
        })
        .expect("client")
    }

    #[test]
    fn resolve_defaults_url_and_requires_token() {
        let config = ClientConfig::resolve_with(Some("abc"), None, Some(""), |_| None).unwrap();
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.token, "abc");
        assert_eq!(config.customer, None);

        let err = ClientConfig::resolve_with(None, None, None, |_| None).unwrap_err();
        assert_eq!(err, "no Previder token found");
    }

    #[test]
    fn resolve_prefers_environment_url_and_falls_back_to_environment_token() {
        let env = |name: &str| match name {
            URL_ENV => Some(String::from("https://env.example/api")),
            TOKEN_ENV => Some(String::from("from-env")),
            _ => None,
        };
        let config =
            ClientConfig::resolve_with(None, Some("https://attr.example/"), Some("c1"), env)
                .unwrap();
        assert_eq!(config.url, "https://env.example/api/");
        assert_eq!(config.token, "from-env");
        assert_eq!(config.customer.as_deref(), Some("c1"));

        let config = ClientConfig::resolve_with(Some("attr"), None, None, env).unwrap();
        assert_eq!(config.token, "attr");
    }

    #[test]
    fn debug_output_hides_the_token() {
        let config = ClientConfig {
            url: DEFAULT_URL.to_owned(),
            token: String::from("very-secret"),
            customer: None,
        };
        assert!(!format!("{config:?}").contains("very-secret"));
    }

    #[tokio::test]
    async fn requests_carry_token_and_customer_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/info"))
            .and(header("X-Auth-Token", "secret"))
            .and(header("X-CustomerId", "customer-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "2.4"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = PreviderClient::new(ClientConfig {
            url: format!("{}/", server.uri()),
            token: String::from("secret"),
            customer: Some(String::from("customer-1")),
        })
        .unwrap();

        let info = client.api_info().await.unwrap();
        assert_eq!(info.version, "2.4");
    }

    #[tokio::test]
    async fn error_status_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/task/t1"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "task not found"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).get_task("t1").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "404 Not Found: task not found");
    }

    #[tokio::test]
    async fn empty_body_decodes_as_unit() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v2/thing/1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let () = client_for(&server).delete("v2/thing/1").await.unwrap();
    }

    #[tokio::test]
    async fn all_pages_are_collected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/items"))
            .and(query_param("page", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"content": [1, 2], "totalElements": 3, "totalPages": 2}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/items"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"content": [3], "totalElements": 3, "totalPages": 2}),
            ))
            .mount(&server)
            .await;

        let items: Vec<u32> = client_for(&server)
            .get_all_pages("v2/items", PageRequest::sorted(2, "+id"))
            .await
            .unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }
}
