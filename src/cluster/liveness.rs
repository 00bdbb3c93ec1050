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

use crate::broker::Broker;
use crate::net::service_ping;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::time::Duration;
use tracing::debug;

/// Result of one round of client connection attempts against a broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionReport {
    pub opened: usize,
    pub not_opened: usize,
}

/// Tries to open client connections to a broker's messaging acceptor.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConnectorProbe: Send + Sync {
    async fn connect(&self, broker: &Broker) -> ConnectionReport;
}

#[derive(Debug, Clone)]
pub struct TcpConnectorProbe {
    timeout: Duration,
}

impl TcpConnectorProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ConnectorProbe for TcpConnectorProbe {
    async fn connect(&self, broker: &Broker) -> ConnectionReport {
        let config = broker.config();
        let opened = match config.primary_port() {
            Some(port) => service_ping(&config.external_address, port, self.timeout).await,
            None => false,
        };
        debug!(broker = %broker.id(), "Connector probe opened={opened}");
        if opened {
            ConnectionReport {
                opened: 1,
                not_opened: 0,
            }
        } else {
            ConnectionReport {
                opened: 0,
                not_opened: 1,
            }
        }
    }
}
