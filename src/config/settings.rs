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

use crate::error::ConfigError;
use crate::retry::RetryBudget;
use bon::Builder;
use std::env;
use std::time::Duration;
use tracing::debug;

pub const RUN_AS_USER_ENV: &str = "IQA_RUN_AS_USER";
pub const HTTP_TIMEOUT_ENV: &str = "IQA_HTTP_TIMEOUT";
pub const PING_TIMEOUT_ENV: &str = "IQA_PING_TIMEOUT";
pub const COMMAND_TIMEOUT_ENV: &str = "IQA_COMMAND_TIMEOUT";

pub const DEFAULT_RUN_AS_USER: &str = "jamq";
pub const START_RETRY: RetryBudget = RetryBudget::new(60, Duration::from_secs(120));
pub const TOPOLOGY_RETRY: RetryBudget = RetryBudget::new(10, Duration::from_secs(40));
pub const LIVENESS_RETRY: RetryBudget = RetryBudget::new(15, Duration::from_secs(50));
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(5);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Timing and identity knobs shared by every broker and cluster of a run.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct HarnessSettings {
    #[builder(default = START_RETRY)]
    pub start_retry: RetryBudget,
    #[builder(default = TOPOLOGY_RETRY)]
    pub topology_retry: RetryBudget,
    #[builder(default = LIVENESS_RETRY)]
    pub liveness_retry: RetryBudget,
    /// Pause after the backup side of a failover lost its connections.
    #[builder(default = DEFAULT_SETTLE)]
    pub liveness_settle: Duration,
    /// Pause after an HA broker became accessible.
    #[builder(default = DEFAULT_SETTLE)]
    pub ha_start_settle: Duration,
    #[builder(default = DEFAULT_HTTP_TIMEOUT)]
    pub http_timeout: Duration,
    #[builder(default = DEFAULT_PING_TIMEOUT)]
    pub ping_timeout: Duration,
    /// Limit for every command run on a broker node.
    #[builder(default = DEFAULT_COMMAND_TIMEOUT)]
    pub command_timeout: Duration,
    #[builder(into, default = DEFAULT_RUN_AS_USER.to_string())]
    pub run_as_user: String,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl HarnessSettings {
    /// Defaults overridden by `IQA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Ok(user) = env::var(RUN_AS_USER_ENV) {
            debug!("Using {RUN_AS_USER_ENV}={user}");
            settings.run_as_user = user;
        }
        if let Some(timeout) = duration_from_env(HTTP_TIMEOUT_ENV)? {
            settings.http_timeout = timeout;
        }
        if let Some(timeout) = duration_from_env(PING_TIMEOUT_ENV)? {
            settings.ping_timeout = timeout;
        }
        if let Some(timeout) = duration_from_env(COMMAND_TIMEOUT_ENV)? {
            settings.command_timeout = timeout;
        }
        Ok(settings)
    }
}

fn duration_from_env(key: &str) -> Result<Option<Duration>, ConfigError> {
    let Ok(raw) = env::var(key) else {
        return Ok(None);
    };
    humantime::parse_duration(raw.trim())
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        })
}
