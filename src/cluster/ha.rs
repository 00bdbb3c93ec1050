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

use crate::broker::operable::SIGKILL;
use crate::broker::{Broker, BrokerKind};
use crate::cluster::liveness::{ConnectorProbe, TcpConnectorProbe};
use crate::cluster::topology::parse_topology;
use crate::cluster::{build_brokers, BrokerCluster};
use crate::config::{BrokerConfig, HarnessSettings};
use crate::error::{ClusterError, ConfigError, ManagementError};
use crate::retry::Retry;
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use strum::Display;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// A live/backup pair by broker id. A side the topology did not resolve is `None`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HaPair {
    pub master: Option<String>,
    pub slave: Option<String>,
}

impl HaPair {
    pub fn new(master: Option<&str>, slave: Option<&str>) -> Self {
        Self {
            master: master.map(str::to_string),
            slave: slave.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum TopologyState {
    #[default]
    Unknown,
    Consistent,
    Drifted,
}

/// Broker cluster made of live/backup pairs.
///
/// Roles are learnt from the brokers themselves: every running member is asked
/// for its cluster connection topology and the answers are merged. Masters and
/// slaves never overlap, and the default broker is the first master whenever
/// one is known.
pub struct HaBrokerCluster {
    cluster: BrokerCluster,
    masters: Vec<String>,
    slaves: Vec<String>,
    pairs: BTreeSet<HaPair>,
    state: TopologyState,
    settings: Arc<HarnessSettings>,
    connector: Arc<dyn ConnectorProbe>,
}

impl Debug for HaBrokerCluster {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaBrokerCluster")
            .field("cluster", &self.cluster)
            .field("masters", &self.masters)
            .field("slaves", &self.slaves)
            .field("pairs", &self.pairs)
            .field("state", &self.state)
            .finish()
    }
}

impl HaBrokerCluster {
    pub fn new(settings: Arc<HarnessSettings>) -> Self {
        let connector = Arc::new(TcpConnectorProbe::new(settings.ping_timeout));
        Self {
            cluster: BrokerCluster::new(),
            masters: Vec::new(),
            slaves: Vec::new(),
            pairs: BTreeSet::new(),
            state: TopologyState::Unknown,
            settings,
            connector,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn ConnectorProbe>) -> Self {
        self.connector = connector;
        self
    }

    pub async fn with_brokers(
        brokers: Vec<Broker>,
        settings: Arc<HarnessSettings>,
    ) -> Result<Self, ClusterError> {
        let mut cluster = Self::new(settings);
        for broker in brokers {
            cluster.add_broker(broker).await?;
        }
        Ok(cluster)
    }

    /// Builds the cluster from broker definitions. Every member needs a cluster
    /// connection to be queried for topology.
    pub async fn from_configs(
        kind: BrokerKind,
        configs: Vec<BrokerConfig>,
        settings: Arc<HarnessSettings>,
    ) -> Result<Self, ClusterError> {
        if let Some(config) = configs
            .iter()
            .find(|config| config.cluster_connection_name().is_none())
        {
            return Err(missing_cluster_connection(&config.server_id));
        }
        let brokers = build_brokers(kind, configs, settings.clone());
        Self::with_brokers(brokers, settings).await
    }

    pub fn cluster(&self) -> &BrokerCluster {
        &self.cluster
    }

    pub fn brokers(&self) -> &[Broker] {
        self.cluster.brokers()
    }

    pub fn broker(&self, id: &str) -> Option<&Broker> {
        self.cluster.broker(id)
    }

    pub fn broker_mut(&mut self, id: &str) -> Option<&mut Broker> {
        self.cluster.broker_mut(id)
    }

    pub fn masters(&self) -> &[String] {
        &self.masters
    }

    pub fn slaves(&self) -> &[String] {
        &self.slaves
    }

    pub fn master_slave_pairs(&self) -> &BTreeSet<HaPair> {
        &self.pairs
    }

    pub fn state(&self) -> TopologyState {
        self.state
    }

    pub fn default_broker(&self) -> Option<&Broker> {
        self.cluster.default_broker()
    }

    pub fn default_broker_id(&self) -> Option<&str> {
        self.cluster.default_broker_id()
    }

    pub async fn running_brokers(&mut self) -> Vec<String> {
        self.cluster.running_brokers().await
    }

    /// Adds `broker`, taking its role from the configured HA policy until the
    /// next topology update.
    pub async fn add_broker(&mut self, broker: Broker) -> Result<(), ClusterError> {
        let is_master = broker.config().ha_policy().map(|policy| policy.is_master);
        let id = self.cluster.push(broker)?;
        match is_master {
            Some(true) => self.masters.push(id.clone()),
            Some(false) => self.slaves.push(id.clone()),
            None => debug!(broker = %id, "No HA policy configured"),
        }
        self.select_default_broker();
        self.cluster.refresh_associated_nodes(&id).await?;
        Ok(())
    }

    fn select_default_broker(&mut self) {
        if let Some(master) = self.masters.first() {
            let master = master.clone();
            self.cluster.set_default_broker(Some(master));
        } else if self.cluster.len() == 1 {
            let sole = self.cluster.brokers()[0].id().to_string();
            self.cluster.set_default_broker(Some(sole));
        }
    }

    pub fn reset_topology(&mut self) {
        self.masters.clear();
        self.slaves.clear();
        self.pairs.clear();
        for broker in self.cluster.brokers_mut() {
            broker.reset_topology();
        }
        self.state = TopologyState::Unknown;
    }

    /// Rebuilds roles and pairs from the topology reported by every running
    /// member. A member that does not answer is skipped.
    pub async fn update_topology(&mut self) -> Result<TopologyState, ClusterError> {
        self.reset_topology();
        let running = self.cluster.running_brokers().await;

        let mut responses = Vec::new();
        for id in &running {
            let broker = self.cluster.require(id)?;
            let connection_name = broker
                .config()
                .cluster_connection_name()
                .ok_or_else(|| missing_cluster_connection(id))?;
            let outcome = Retry::new(self.settings.topology_retry)
                .expect_failure(|_: &ManagementError| true)
                .run(
                    move || async move { broker.read_topology(connection_name).await },
                    |topology| matches!(topology, Some(Some(_))),
                )
                .await?;
            match outcome.last_value.flatten() {
                Some(topology) => {
                    debug!(broker = %id, "Topology: {topology}");
                    responses.push(topology);
                }
                None => warn!(broker = %id, "Unable to contact broker for topology update"),
            }
        }

        for topology in &responses {
            self.reconcile(topology);
        }
        self.select_default_broker();

        self.state = if responses.is_empty() {
            warn!("Topology is unknown, no running broker reported it");
            TopologyState::Unknown
        } else {
            TopologyState::Consistent
        };
        Ok(self.state)
    }

    fn reconcile(&mut self, topology: &str) {
        for member in parse_topology(topology) {
            let master = member
                .master
                .as_deref()
                .and_then(|address| self.resolve(address))
                .filter(|id| {
                    let conflict = self.slaves.contains(id);
                    if conflict {
                        warn!(broker = %id, "Broker reported as master is already a slave");
                    }
                    !conflict
                });
            let slave = member
                .slave
                .as_deref()
                .and_then(|address| self.resolve(address))
                .filter(|id| {
                    let conflict = self.masters.contains(id) || master.as_ref() == Some(id);
                    if conflict {
                        warn!(broker = %id, "Broker reported as slave is already a master");
                    }
                    !conflict
                });
            if master.is_none() && slave.is_none() {
                continue;
            }
            if self.linked_elsewhere(master.as_deref(), slave.as_deref()) {
                warn!(
                    "Ignoring pair ({master:?}, {slave:?}), a member is already paired differently"
                );
                continue;
            }

            if let Some(id) = &master {
                self.assign_role(id, true);
            }
            if let Some(id) = &slave {
                self.assign_role(id, false);
            }
            if let (Some(master), Some(slave)) = (&master, &slave) {
                self.link(master, slave);
            }
            self.pairs.insert(HaPair { master, slave });
        }
    }

    /// Whether either side already has a pair link to some other broker.
    /// The first link seen is kept.
    fn linked_elsewhere(&self, master: Option<&str>, slave: Option<&str>) -> bool {
        let master_link = master
            .and_then(|id| self.cluster.broker(id))
            .and_then(Broker::slave_broker);
        let slave_link = slave
            .and_then(|id| self.cluster.broker(id))
            .and_then(Broker::master_broker);
        master_link.is_some_and(|linked| Some(linked) != slave)
            || slave_link.is_some_and(|linked| Some(linked) != master)
    }

    fn resolve(&self, address: &str) -> Option<String> {
        let id = self
            .cluster
            .brokers()
            .iter()
            .find(|broker| broker.config().internal_address() == address)
            .map(|broker| broker.id().to_string());
        if id.is_none() {
            warn!("Topology host {address} does not match any broker");
        }
        id
    }

    fn assign_role(&mut self, id: &str, is_master: bool) {
        if let Some(broker) = self.cluster.broker_mut(id) {
            broker.ha_mut().is_master = is_master;
        }
        let members = if is_master {
            &mut self.masters
        } else {
            &mut self.slaves
        };
        if !members.iter().any(|member| member == id) {
            members.push(id.to_string());
        }
    }

    fn link(&mut self, master: &str, slave: &str) {
        if let Some(broker) = self.cluster.broker_mut(master) {
            broker.ha_mut().slave_broker = Some(slave.to_string());
        }
        if let Some(broker) = self.cluster.broker_mut(slave) {
            broker.ha_mut().master_broker = Some(master.to_string());
        }
    }

    pub async fn update_topology_and_log(&mut self) -> Result<TopologyState, ClusterError> {
        let state = self.update_topology().await?;
        self.log_masters();
        self.log_slaves();
        info!("Master/slave pairs: {:?}", self.pairs);
        Ok(state)
    }

    pub fn log_masters(&self) {
        info!("Masters: {:?}", self.masters);
    }

    pub fn log_slaves(&self) {
        info!("Slaves: {:?}", self.slaves);
    }

    /// Compares the current pairs with `expected`. On mismatch the cluster is
    /// restored with a kill -9 and restart of every member.
    pub async fn check_initial_topology_preserved(
        &mut self,
        expected: &BTreeSet<HaPair>,
    ) -> Result<bool, ClusterError> {
        if &self.pairs == expected {
            debug!("Initial topology preserved");
            return Ok(true);
        }
        warn!(
            "Topology drifted, expected {:?} but found {:?}",
            expected, self.pairs
        );
        self.state = TopologyState::Drifted;
        self.restore_initial_topology().await?;
        Ok(false)
    }

    /// Kills and restarts every member, then rebuilds the topology. Fails when
    /// any member does not come back.
    pub async fn restore_initial_topology(&mut self) -> Result<BTreeSet<HaPair>, ClusterError> {
        for broker in self.cluster.brokers() {
            if !broker.is_accessible(true).await {
                error!(broker = %broker.id(), "Broker is unexpectedly inaccessible");
            }
        }
        warn!("Current topology: {:?}", self.pairs);
        warn!("Restoring initial topology with a kill -9 and restart of every broker");

        for broker in self.cluster.brokers_mut() {
            if let Err(error) = broker.stop(SIGKILL).await {
                warn!(broker = %broker.id(), "Unable to kill broker: {error}");
            }
        }

        let mut failed = Vec::new();
        for broker in self.cluster.brokers_mut() {
            match broker.start(true).await {
                Ok(true) => info!(broker = %broker.id(), "Broker started"),
                Ok(false) => failed.push(broker.id().to_string()),
                Err(error) => {
                    warn!(broker = %broker.id(), "Unable to start broker: {error}");
                    failed.push(broker.id().to_string());
                }
            }
        }

        self.update_topology().await?;
        if !failed.is_empty() {
            error!("Unable to restore initial topology, brokers not started: {failed:?}");
            return Err(ClusterError::RestoreTopology { failed });
        }
        Ok(self.pairs.clone())
    }

    /// Waits until clients can connect to `live` and, with a `backup`, until
    /// clients can no longer connect to it.
    pub async fn wait_for_liveness(
        &self,
        live: &str,
        backup: Option<&str>,
    ) -> Result<bool, ClusterError> {
        let live_broker = self.cluster.require(live)?;
        let connector = self.connector.as_ref();
        info!(broker = %live, "Waiting for broker to become live");
        let outcome = Retry::<ClusterError>::new(self.settings.liveness_retry)
            .run(
                move || async move { Ok(connector.connect(live_broker).await) },
                |report| report.is_some_and(|report| report.opened > 0),
            )
            .await?;
        if outcome.succeeded {
            info!(broker = %live, "Connection to newly live broker succeeded");
        } else {
            warn!(broker = %live, "Broker did not become live");
        }

        let Some(backup) = backup else {
            return Ok(outcome.succeeded);
        };
        let backup_broker = self.cluster.require(backup)?;
        let backup_outcome = Retry::<ClusterError>::new(self.settings.liveness_retry)
            .run(
                move || async move { Ok(connector.connect(backup_broker).await) },
                |report| report.is_some_and(|report| report.not_opened > 0),
            )
            .await?;
        if backup_outcome.succeeded {
            info!(broker = %backup, "Backup broker is not accessible anymore");
        } else {
            warn!(broker = %backup, "Backup broker still accepts connections");
        }
        debug!("Waiting {:?} for the pair to settle", self.settings.liveness_settle);
        sleep(self.settings.liveness_settle).await;
        Ok(outcome.succeeded && backup_outcome.succeeded)
    }

    pub async fn kill(&mut self, signal: i32, id: &str) -> Result<i32, ClusterError> {
        let exit_code = self.cluster.require_mut(id)?.stop(signal).await?;
        self.select_default_broker();
        Ok(exit_code)
    }
}

fn missing_cluster_connection(server_id: &str) -> ClusterError {
    ClusterError::Config(ConfigError::MissingField {
        server_id: server_id.to_string(),
        field: "broker_xml/cluster_connections".to_string(),
    })
}
