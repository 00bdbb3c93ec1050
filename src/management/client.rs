/* Licensed to the Apache Software Foundation (ASF) under one
 * or more contributor license agreements.  See the NOTICE file
 * distributed with this work for additional information
 * regarding copyright ownership.  The ASF licenses this file
 * to you under the Apache License, Version 2.0 (the
 * "License"); you may not use this file except in compliance
 * with the License.  You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing,
 * software distributed under the License is distributed on an
 * "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
 * KIND, either express or implied.  See the License for the
 * specific language governing permissions and limitations
 * under the License.
 */

use crate::config::Credentials;
use crate::error::ManagementError;
use crate::management::request::{ContextRoot, JolokiaRequest};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const HTTP_OK: u16 = 200;
const HTTP_NOT_FOUND: u16 = 404;

#[derive(Debug, Clone, PartialEq)]
pub struct ManagementResponse {
    pub status: u16,
    /// Decoded JSON body, or the raw text when the body is not JSON.
    pub body: Value,
}

impl ManagementResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        self.status == HTTP_OK
    }

    /// The Jolokia `value` field.
    pub fn value(&self) -> Option<&Value> {
        self.body.get("value").filter(|value| !value.is_null())
    }

    pub fn error(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<ManagementResponse, ManagementError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<ManagementResponse, ManagementError> {
        let response = self
            .client
            .get(url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .timeout(timeout)
            .send()
            .await
            .map_err(|error| {
                if error.is_builder() {
                    ManagementError::InvalidRequest {
                        url: url.to_string(),
                        reason: error.to_string(),
                    }
                } else {
                    ManagementError::ConnectionFailure {
                        url: url.to_string(),
                        reason: error.to_string(),
                    }
                }
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|error| ManagementError::InvalidResponse {
                url: url.to_string(),
                reason: error.to_string(),
            })?;
        let body = serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text));
        Ok(ManagementResponse { status, body })
    }
}

/// Read-only access to a broker's management API.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManagementApi: Send + Sync {
    async fn read(
        &self,
        request: &JolokiaRequest,
        credentials: &Credentials,
    ) -> Result<ManagementResponse, ManagementError>;
}

#[derive(Debug, Clone)]
pub struct JolokiaClient<T = ReqwestTransport> {
    transport: T,
    context_root: ContextRoot,
    timeout: Duration,
}

impl JolokiaClient<ReqwestTransport> {
    pub fn new(timeout: Duration) -> Self {
        Self::with_transport(ReqwestTransport::new(), timeout)
    }
}

impl<T: HttpTransport> JolokiaClient<T> {
    pub fn with_transport(transport: T, timeout: Duration) -> Self {
        Self {
            transport,
            context_root: ContextRoot::default(),
            timeout,
        }
    }

    pub fn context_root(mut self, context_root: ContextRoot) -> Self {
        self.context_root = context_root;
        self
    }
}

#[async_trait]
impl<T: HttpTransport> ManagementApi for JolokiaClient<T> {
    async fn read(
        &self,
        request: &JolokiaRequest,
        credentials: &Credentials,
    ) -> Result<ManagementResponse, ManagementError> {
        let url = request.url(self.context_root);
        debug!("Jolokia read: {url}");
        let response = self.transport.get(&url, credentials, self.timeout).await?;
        if response.status != HTTP_NOT_FOUND {
            if !response.is_success() {
                warn!("Jolokia request {url} returned status {}", response.status);
            }
            return Ok(response);
        }

        let alternate = self.context_root.alternate();
        warn!(
            "Context root '{}' not found on {}:{}, trying '{alternate}'",
            self.context_root, request.host, request.port
        );
        let url = request.url(alternate);
        let response = self.transport.get(&url, credentials, self.timeout).await?;
        if !response.is_success() {
            warn!("Jolokia request {url} returned status {}", response.status);
        }
        Ok(response)
    }
}
