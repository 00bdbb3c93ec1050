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

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure to run a command on a node.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Command '{command}' did not complete within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("IO error")]
    Io(#[from] io::Error),
}

/// Failure of a management (Jolokia) read.
#[derive(Debug, Error)]
pub enum ManagementError {
    /// The broker could not be reached at all. Callers treat this as "unknown".
    #[error("Unable to connect to {url}: {reason}")]
    ConnectionFailure { url: String, reason: String },
    #[error("Invalid management request {url}: {reason}")]
    InvalidRequest { url: String, reason: String },
    #[error("Invalid management response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

impl ManagementError {
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, ManagementError::ConnectionFailure { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported configuration format: {0:?}")]
    UnsupportedFormat(PathBuf),
    #[error("Missing required field '{field}' for server '{server_id}'")]
    MissingField { server_id: String, field: String },
    #[error("Unknown server type '{kind}' for server '{server_id}'")]
    UnknownServerType { server_id: String, kind: String },
    #[error("Invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },
    #[error("Environment variable {0} is not set")]
    MissingEnv(String),
}

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Capability absent for this broker variant. Never a runtime fault.
    #[error("Operation '{operation}' is not supported by broker '{broker}'")]
    Unsupported {
        operation: &'static str,
        broker: String,
    },
    #[error("Broker '{0}' is not running")]
    NotRunning(String),
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),
    #[error("Management error: {0}")]
    Management(#[from] ManagementError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Broker '{0}' is already a member of the cluster")]
    DuplicateBroker(String),
    #[error("Broker '{0}' is not a member of the cluster")]
    UnknownBroker(String),
    #[error("Cluster has no default broker")]
    NoDefaultBroker,
    /// Terminal: the cluster could not be brought back and the run should abort.
    #[error("Unable to restore initial topology, brokers not started: {failed:?}")]
    RestoreTopology { failed: Vec<String> },
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Management error: {0}")]
    Management(#[from] ManagementError),
}
