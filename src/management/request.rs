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

use crate::config::BrokerConfig;
use strum::{Display, EnumString};

pub const READ_OPERATION: &str = "read";
pub const ARTEMIS_DOMAIN: &str = "org.apache.activemq.artemis";

/// Web context the Jolokia agent is mounted under. Older brokers use `hawtio`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ContextRoot {
    #[default]
    Console,
    Hawtio,
}

impl ContextRoot {
    pub fn alternate(self) -> Self {
        match self {
            ContextRoot::Console => ContextRoot::Hawtio,
            ContextRoot::Hawtio => ContextRoot::Console,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JolokiaRequest {
    pub host: String,
    pub port: u16,
    pub broker_name: String,
    pub query_operation: String,
    pub component: String,
    pub subcomponent: String,
    pub operation: String,
}

impl JolokiaRequest {
    pub fn read(
        host: impl Into<String>,
        port: u16,
        broker_name: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            broker_name: broker_name.into(),
            query_operation: READ_OPERATION.to_string(),
            component: String::new(),
            subcomponent: String::new(),
            operation: operation.into(),
        }
    }

    /// Broker-level attribute read, e.g. `/Started`.
    pub fn for_broker(config: &BrokerConfig, operation: impl Into<String>) -> Self {
        Self::read(
            &config.external_address,
            config.web_port(),
            &config.instance_name,
            operation,
        )
    }

    /// Attribute read scoped to one cluster connection, e.g. `Topology`.
    pub fn for_cluster_connection(
        config: &BrokerConfig,
        connection_name: &str,
        attribute: &str,
    ) -> Self {
        Self::for_broker(config, format!("/{attribute}"))
            .with_component(format!(",component=cluster-connections,name=\"{connection_name}\""))
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    pub fn with_subcomponent(mut self, subcomponent: impl Into<String>) -> Self {
        self.subcomponent = subcomponent.into();
        self
    }

    pub fn url(&self, root: ContextRoot) -> String {
        format!(
            "http://{}:{}/{}/jolokia/{}/{}:broker=\"{}\"{}{}{}",
            self.host,
            self.port,
            root,
            self.query_operation,
            ARTEMIS_DOMAIN,
            self.broker_name,
            self.component,
            self.subcomponent,
            self.operation
        )
    }
}
