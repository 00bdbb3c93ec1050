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

pub mod ha;
pub mod liveness;
pub mod topology;

use crate::broker::{Broker, BrokerKind};
use crate::config::{BrokerConfig, HarnessSettings};
use crate::error::{ClusterError, ConfigError};
use crate::management::{JolokiaClient, ManagementApi};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Brokers built from definitions, sharing one management client.
pub fn build_brokers(
    kind: BrokerKind,
    configs: Vec<BrokerConfig>,
    settings: Arc<HarnessSettings>,
) -> Vec<Broker> {
    let management: Arc<dyn ManagementApi> = Arc::new(JolokiaClient::new(settings.http_timeout));
    configs
        .into_iter()
        .map(|config| Broker::from_config(kind, config, management.clone(), settings.clone()))
        .collect()
}

/// Ordered set of brokers with a designated default member.
#[derive(Debug, Default)]
pub struct BrokerCluster {
    brokers: Vec<Broker>,
    default_broker: Option<String>,
}

impl BrokerCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_brokers(brokers: Vec<Broker>) -> Result<Self, ClusterError> {
        let mut cluster = Self::new();
        for broker in brokers {
            cluster.add_broker(broker).await?;
        }
        Ok(cluster)
    }

    pub fn brokers(&self) -> &[Broker] {
        &self.brokers
    }

    pub fn len(&self) -> usize {
        self.brokers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.brokers.iter().map(|broker| broker.id().to_string()).collect()
    }

    pub fn broker(&self, id: &str) -> Option<&Broker> {
        self.brokers.iter().find(|broker| broker.id() == id)
    }

    pub fn broker_mut(&mut self, id: &str) -> Option<&mut Broker> {
        self.brokers.iter_mut().find(|broker| broker.id() == id)
    }

    pub(crate) fn brokers_mut(&mut self) -> &mut [Broker] {
        &mut self.brokers
    }

    pub fn require(&self, id: &str) -> Result<&Broker, ClusterError> {
        self.broker(id)
            .ok_or_else(|| ClusterError::UnknownBroker(id.to_string()))
    }

    pub fn require_mut(&mut self, id: &str) -> Result<&mut Broker, ClusterError> {
        self.broker_mut(id)
            .ok_or_else(|| ClusterError::UnknownBroker(id.to_string()))
    }

    pub fn default_broker(&self) -> Option<&Broker> {
        self.default_broker
            .as_deref()
            .and_then(|id| self.broker(id))
    }

    pub fn default_broker_id(&self) -> Option<&str> {
        self.default_broker.as_deref()
    }

    pub(crate) fn set_default_broker(&mut self, id: Option<String>) {
        if self.default_broker != id {
            debug!("Default broker: {:?} -> {:?}", self.default_broker, id);
        }
        self.default_broker = id;
    }

    fn require_default(&self) -> Result<&Broker, ClusterError> {
        self.default_broker().ok_or(ClusterError::NoDefaultBroker)
    }

    /// Appends `broker`, refreshes the default broker and the new member's
    /// associated nodes.
    pub async fn add_broker(&mut self, broker: Broker) -> Result<(), ClusterError> {
        let id = self.push(broker)?;
        self.select_default_broker().await;
        self.refresh_associated_nodes(&id).await?;
        Ok(())
    }

    pub(crate) fn push(&mut self, broker: Broker) -> Result<String, ClusterError> {
        let id = broker.id().to_string();
        if self.broker(&id).is_some() {
            return Err(ClusterError::DuplicateBroker(id));
        }
        info!(broker = %id, "Adding broker to cluster");
        self.brokers.push(broker);
        Ok(id)
    }

    /// A single member is the default, otherwise the first running member.
    /// Nothing changes when no member runs.
    pub async fn select_default_broker(&mut self) {
        if self.default_broker.is_none() && self.brokers.len() == 1 {
            let id = self.brokers[0].id().to_string();
            self.set_default_broker(Some(id));
            return;
        }
        let mut first_running = None;
        for broker in &mut self.brokers {
            if is_running(broker).await {
                first_running = Some(broker.id().to_string());
                break;
            }
        }
        if first_running.is_some() {
            self.set_default_broker(first_running);
        }
    }

    /// Ids of running members, in membership order.
    pub async fn running_brokers(&mut self) -> Vec<String> {
        let mut running = Vec::new();
        for broker in &mut self.brokers {
            if is_running(broker).await {
                running.push(broker.id().to_string());
            }
        }
        running
    }

    pub async fn kill(&mut self, signal: i32, id: &str) -> Result<i32, ClusterError> {
        let exit_code = self.require_mut(id)?.stop(signal).await?;
        self.select_default_broker().await;
        Ok(exit_code)
    }

    pub async fn refresh_associated_nodes(
        &mut self,
        id: &str,
    ) -> Result<HashMap<String, String>, ClusterError> {
        Ok(self.require_mut(id)?.refresh_associated_nodes().await)
    }

    /// Cluster connection name of the default broker.
    pub fn cluster_group_name(&self) -> Result<&str, ClusterError> {
        let broker = self.require_default()?;
        broker.config().cluster_connection_name().ok_or_else(|| {
            ClusterError::Config(ConfigError::MissingField {
                server_id: broker.id().to_string(),
                field: "broker_xml/cluster_connections".to_string(),
            })
        })
    }

    pub fn annotated_ports(&self) -> Result<&BTreeMap<String, u16>, ClusterError> {
        Ok(self.require_default()?.annotated_ports())
    }

    pub fn urls(&self) -> Result<&str, ClusterError> {
        Ok(self.require_default()?.urls())
    }

    pub async fn log_running_brokers(&mut self) {
        let running = self.running_brokers().await;
        info!("Running brokers: {running:?}");
    }
}

/// A failed liveness probe counts as not running.
async fn is_running(broker: &mut Broker) -> bool {
    match broker.is_running().await {
        Ok(running) => running,
        Err(error) => {
            warn!(broker = %broker.id(), "Unable to check if broker is running: {error}");
            false
        }
    }
}
