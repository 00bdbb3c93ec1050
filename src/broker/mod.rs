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

pub mod operable;

use crate::config::{BrokerConfig, Credentials, HarnessSettings, User};
use crate::error::{BrokerError, ManagementError};
use crate::management::{JolokiaRequest, ManagementApi, ManagementResponse};
use crate::net::service_ping;
use crate::node::Node;
use crate::retry::Retry;
use chrono::Local;
use operable::{Operability, ServiceControl};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::convert::Infallible;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use strum::{Display, EnumString};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Exit code reported when a signal could not be sent because the pid is unknown.
pub const NO_PROCESS_EXIT_CODE: i32 = 1;

const STARTED_ATTRIBUTE: &str = "/Started";
const TOPOLOGY_ATTRIBUTE: &str = "Topology";
const NODES_ATTRIBUTE: &str = "Nodes";

/// Tag used to pick a broker variant from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BrokerKind {
    /// Observed only, never started or stopped by the harness.
    External,
    /// Controlled through the instance service script.
    Operable,
}

/// Role a broker plays in an HA pair, as last seen by a topology update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HaState {
    pub is_master: bool,
    pub master_broker: Option<String>,
    pub slave_broker: Option<String>,
}

impl HaState {
    pub fn reset(&mut self) {
        *self = HaState::default();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerDirs {
    pub base_dir: String,
    pub instance_dir: String,
    pub config_dir: String,
}

/// What a messaging client needs to talk to this broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub host: String,
    pub ports: BTreeMap<String, u16>,
    pub broker_name: String,
    pub username: String,
    pub password: String,
}

pub struct Broker {
    config: BrokerConfig,
    node: Node,
    management: Arc<dyn ManagementApi>,
    operability: Operability,
    settings: Arc<HarnessSettings>,
    pid: Option<u32>,
    associated_nodes: HashMap<String, String>,
    ha: HaState,
}

impl Debug for Broker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("server_id", &self.config.server_id)
            .field("node", &self.node)
            .field("operability", &self.operability)
            .field("pid", &self.pid)
            .field("ha", &self.ha)
            .finish()
    }
}

impl Broker {
    pub fn new(
        config: BrokerConfig,
        node: Node,
        management: Arc<dyn ManagementApi>,
        operability: Operability,
        settings: Arc<HarnessSettings>,
    ) -> Self {
        let ha = HaState {
            is_master: config.ha_policy().is_some_and(|policy| policy.is_master),
            ..HaState::default()
        };
        let node = node.with_command_timeout(settings.command_timeout);
        Self {
            config,
            node,
            management,
            operability,
            settings,
            pid: None,
            associated_nodes: HashMap::new(),
            ha,
        }
    }

    pub fn external(
        config: BrokerConfig,
        node: Node,
        management: Arc<dyn ManagementApi>,
        settings: Arc<HarnessSettings>,
    ) -> Self {
        Self::new(config, node, management, Operability::Unmanaged, settings)
    }

    pub fn operable(
        config: BrokerConfig,
        node: Node,
        management: Arc<dyn ManagementApi>,
        settings: Arc<HarnessSettings>,
    ) -> Self {
        let control = ServiceControl::new(&settings.run_as_user);
        Self::new(config, node, management, Operability::Service(control), settings)
    }

    pub fn from_kind(
        kind: BrokerKind,
        config: BrokerConfig,
        node: Node,
        management: Arc<dyn ManagementApi>,
        settings: Arc<HarnessSettings>,
    ) -> Self {
        match kind {
            BrokerKind::External => Self::external(config, node, management, settings),
            BrokerKind::Operable => Self::operable(config, node, management, settings),
        }
    }

    /// Like [`Broker::from_kind`], with the node built from the broker definition.
    pub fn from_config(
        kind: BrokerKind,
        config: BrokerConfig,
        management: Arc<dyn ManagementApi>,
        settings: Arc<HarnessSettings>,
    ) -> Self {
        let node = Node::from_spec(&config.server_id, &config.external_address, &config.node);
        Self::from_kind(kind, config, node, management, settings)
    }

    pub fn id(&self) -> &str {
        &self.config.server_id
    }

    pub fn kind(&self) -> BrokerKind {
        match self.operability {
            Operability::Unmanaged => BrokerKind::External,
            Operability::Service(_) => BrokerKind::Operable,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn ha(&self) -> &HaState {
        &self.ha
    }

    pub(crate) fn ha_mut(&mut self) -> &mut HaState {
        &mut self.ha
    }

    pub fn is_master(&self) -> bool {
        self.ha.is_master
    }

    pub fn master_broker(&self) -> Option<&str> {
        self.ha.master_broker.as_deref()
    }

    pub fn slave_broker(&self) -> Option<&str> {
        self.ha.slave_broker.as_deref()
    }

    /// Forgets the role and pair seen by the last topology update.
    pub fn reset_topology(&mut self) {
        self.ha.reset();
    }

    pub fn cached_pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn credentials(&self) -> Credentials {
        self.config.admin_credentials()
    }

    pub fn port(&self, name: &str) -> Option<u16> {
        self.config.port(name)
    }

    /// The primary port only, or every configured port once.
    pub fn ports(&self, preferred_only: bool) -> Vec<u16> {
        if preferred_only {
            return self.config.primary_port().into_iter().collect();
        }
        self.config
            .ports
            .values()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn annotated_ports(&self) -> &BTreeMap<String, u16> {
        &self.config.ports
    }

    pub fn urls(&self) -> &str {
        &self.config.external_address
    }

    pub fn url(&self, port_name: &str) -> Option<String> {
        self.port(port_name)
            .map(|port| format!("{}:{port}", self.config.external_address))
    }

    pub fn annotated_users(&self) -> &[User] {
        &self.config.users
    }

    pub fn dirs(&self) -> BrokerDirs {
        BrokerDirs {
            base_dir: self.config.home_dir.clone(),
            instance_dir: self.config.instance_dir.clone(),
            config_dir: self.config.instance_conf_dir(),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        let credentials = self.credentials();
        ClientOptions {
            host: self.config.external_address.clone(),
            ports: self.config.ports.clone(),
            broker_name: self.config.instance_name.clone(),
            username: credentials.username,
            password: credentials.password,
        }
    }

    pub async fn read(&self, request: &JolokiaRequest) -> Result<ManagementResponse, ManagementError> {
        self.management.read(request, &self.credentials()).await
    }

    /// Whether the management API reports the broker as started. With
    /// `check_messaging`, the primary acceptor must also take TCP connections,
    /// unless the broker is currently a slave of an HA pair.
    pub async fn is_accessible(&self, check_messaging: bool) -> bool {
        let request = JolokiaRequest::for_broker(&self.config, STARTED_ATTRIBUTE);
        let started = match self.read(&request).await {
            Ok(response) => response.value().and_then(Value::as_bool).unwrap_or(false),
            Err(error) => {
                debug!(broker = %self.id(), "Broker is not accessible: {error}");
                false
            }
        };
        if !started || !check_messaging || !self.probes_messaging() {
            return started;
        }

        match self.config.primary_port() {
            Some(port) => {
                service_ping(&self.config.external_address, port, self.settings.ping_timeout).await
            }
            None => {
                warn!(broker = %self.id(), "No primary acceptor configured, messaging is not reachable");
                false
            }
        }
    }

    fn probes_messaging(&self) -> bool {
        self.config.ha_policy().is_none() || self.ha.is_master
    }

    /// Raw topology string of the given cluster connection, `None` when the broker
    /// did not report one.
    pub async fn read_topology(&self, connection_name: &str) -> Result<Option<String>, ManagementError> {
        let request =
            JolokiaRequest::for_cluster_connection(&self.config, connection_name, TOPOLOGY_ATTRIBUTE);
        let response = self.read(&request).await?;
        Ok(response.value().and_then(Value::as_str).map(str::to_string))
    }

    pub fn associated_nodes(&self) -> &HashMap<String, String> {
        &self.associated_nodes
    }

    /// Reads the cluster connection's node map and caches it. An unreachable
    /// broker yields an empty map and keeps the previous cache.
    pub async fn refresh_associated_nodes(&mut self) -> HashMap<String, String> {
        let Some(connection_name) = self.config.cluster_connection_name() else {
            debug!(broker = %self.id(), "No cluster connection configured");
            return HashMap::new();
        };
        let request =
            JolokiaRequest::for_cluster_connection(&self.config, connection_name, NODES_ATTRIBUTE);
        let response = match self.read(&request).await {
            Ok(response) => response,
            Err(error) => {
                debug!(broker = %self.id(), "Unable to read associated nodes: {error}");
                return HashMap::new();
            }
        };

        let nodes: HashMap<String, String> = response
            .value()
            .and_then(Value::as_object)
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|(id, address)| {
                        address.as_str().map(|address| (id.clone(), address.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.associated_nodes = nodes.clone();
        nodes
    }

    fn unsupported(&self, operation: &'static str) -> BrokerError {
        BrokerError::Unsupported {
            operation,
            broker: self.id().to_string(),
        }
    }

    fn service_control(&self, operation: &'static str) -> Result<&ServiceControl, BrokerError> {
        self.operability
            .service()
            .ok_or_else(|| self.unsupported(operation))
    }

    pub async fn start(&mut self, wait_for_accessible: bool) -> Result<bool, BrokerError> {
        self.start_with(wait_for_accessible, false).await
    }

    /// Starts the broker service. `force_messaging_check` makes HA slaves wait
    /// for their acceptor as well.
    pub async fn start_with(
        &mut self,
        wait_for_accessible: bool,
        force_messaging_check: bool,
    ) -> Result<bool, BrokerError> {
        let command = self.service_control("start")?.start_command(&self.config);
        info!(broker = %self.id(), "Starting broker");
        let result = self.node.execute(&command).await?;
        if !result.success() {
            warn!(broker = %self.id(), "Start command exited with {}", result.exit_code);
        }
        self.pid = None;
        self.refresh_pid().await?;

        if !wait_for_accessible {
            return self.is_running().await;
        }
        Ok(self.wait_until_accessible(force_messaging_check).await)
    }

    async fn wait_until_accessible(&self, force_messaging_check: bool) -> bool {
        let is_ha = self.config.ha_policy().is_some();
        let check_messaging = !is_ha || force_messaging_check || self.ha.is_master;
        let this = self;
        let accessible = Retry::<Infallible>::new(self.settings.start_retry)
            .run_until_eq(
                move || async move { Ok(this.is_accessible(check_messaging).await) },
                true,
            )
            .await
            .is_ok_and(|outcome| outcome.succeeded);

        if !accessible {
            warn!(broker = %self.id(), "Broker did not become accessible");
        } else if is_ha {
            debug!(broker = %self.id(), "Waiting for the pair to pick up topology");
            sleep(self.settings.ha_start_settle).await;
        }
        accessible
    }

    /// Signal `0` asks the service script for a graceful stop, any other signal
    /// is sent to the broker process.
    pub async fn stop(&mut self, signal: i32) -> Result<i32, BrokerError> {
        self.service_control("stop")?;
        if signal == 0 {
            return self.graceful_stop().await;
        }

        let pid = self.pid().await?;
        self.pid = None;
        let Some(pid) = pid else {
            warn!(broker = %self.id(), "Unable to send signal {signal}, pid is unknown");
            return Ok(NO_PROCESS_EXIT_CODE);
        };
        info!(broker = %self.id(), "Sending signal {signal} to pid {pid}");
        let result = self
            .node
            .execute(&ServiceControl::kill_command(signal, pid))
            .await?;
        Ok(result.exit_code)
    }

    pub async fn graceful_stop(&mut self) -> Result<i32, BrokerError> {
        let command = self.service_control("graceful_stop")?.stop_command(&self.config);
        info!(broker = %self.id(), "Stopping broker");
        let result = self.node.execute(&command).await?;
        self.pid = None;
        Ok(result.exit_code)
    }

    pub async fn restart(&mut self) -> Result<bool, BrokerError> {
        self.service_control("restart")?;
        self.graceful_stop().await?;
        self.start(true).await
    }

    /// Cached pid, read from the instance pid file on first use.
    pub async fn pid(&mut self) -> Result<Option<u32>, BrokerError> {
        if self.operability.service().is_none() {
            return Ok(None);
        }
        if self.pid.is_none() {
            self.refresh_pid().await?;
        }
        Ok(self.pid)
    }

    async fn refresh_pid(&mut self) -> Result<(), BrokerError> {
        let result = self
            .node
            .execute(&ServiceControl::pid_command(&self.config))
            .await?;
        self.pid = if result.success() {
            ServiceControl::parse_pid(&result.stdout)
        } else {
            debug!(broker = %self.id(), "Pid file is not readable");
            None
        };
        Ok(())
    }

    pub async fn is_running(&mut self) -> Result<bool, BrokerError> {
        if self.operability.service().is_none() {
            return Ok(true);
        }
        let Some(pid) = self.pid().await? else {
            return Ok(false);
        };
        let result = self
            .node
            .execute(&ServiceControl::probe_command(pid))
            .await?;
        Ok(result.success())
    }

    pub async fn status(&mut self) -> Result<bool, BrokerError> {
        if self.operability.service().is_none() {
            return Ok(true);
        }
        match self.pid().await? {
            Some(_) => Ok(self.is_accessible(true).await),
            None => Ok(false),
        }
    }

    /// Writes a `jstack` dump into the instance log directory and returns its path.
    pub async fn generate_thread_dump(&mut self, print: bool) -> Result<String, BrokerError> {
        let control = self.service_control("generate_thread_dump")?.clone();
        let pid = self
            .pid()
            .await?
            .ok_or_else(|| BrokerError::NotRunning(self.id().to_string()))?;
        let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
        let path = ServiceControl::thread_dump_path(&self.config, &timestamp);

        let result = self
            .node
            .execute(&control.thread_dump_command(pid, &path))
            .await?;
        if !result.success() {
            warn!(broker = %self.id(), "Thread dump exited with {}", result.exit_code);
        }
        if print {
            info!(broker = %self.id(), "Thread dump:\n{}", result.stdout.join("\n"));
        }
        Ok(path)
    }

    pub fn cfg_apply(&self) -> Result<(), BrokerError> {
        Err(self.unsupported("cfg_apply"))
    }

    pub fn cfg_apply_dynamic(&self) -> Result<(), BrokerError> {
        Err(self.unsupported("cfg_apply_dynamic"))
    }

    pub fn cfg_revert(&self) -> Result<(), BrokerError> {
        Err(self.unsupported("cfg_revert"))
    }
}
