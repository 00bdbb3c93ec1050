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

mod default_broker;
mod fakes;
mod ha_failover;

use fakes::{BrokerFarm, FarmExecutor, FarmManagement};
use iqa_harness::broker::Broker;
use iqa_harness::config::{BrokerConfig, HaPolicy, HarnessSettings, TopologyPolicy};
use iqa_harness::node::Node;
use iqa_harness::retry::RetryBudget;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn settings() -> Arc<HarnessSettings> {
    Arc::new(
        HarnessSettings::builder()
            .start_retry(RetryBudget::new(3, Duration::ZERO))
            .topology_retry(RetryBudget::new(3, Duration::ZERO))
            .liveness_retry(RetryBudget::new(3, Duration::ZERO))
            .liveness_settle(Duration::ZERO)
            .ha_start_settle(Duration::ZERO)
            .ping_timeout(Duration::from_secs(1))
            .build(),
    )
}

/// Operable broker living in `farm`. Its acceptor is `primary_port` on the
/// loopback interface, `internal_address` is what the topology reports.
fn farm_broker(
    farm: &Arc<BrokerFarm>,
    id: &str,
    internal_address: &str,
    primary_port: u16,
    ha_policy: Option<HaPolicy>,
) -> Broker {
    farm.register(id, internal_address);
    let config = BrokerConfig::builder()
        .server_id(id)
        .external_address("127.0.0.1")
        .internal_address(internal_address)
        .ports(BTreeMap::from([
            ("artemis".to_string(), primary_port),
            ("web".to_string(), 8161),
        ]))
        .topology(TopologyPolicy {
            cluster_connection_name: Some("my-cluster".to_string()),
            ha_policy,
        })
        .build();
    let node = Node::new(
        id,
        "127.0.0.1",
        Arc::new(FarmExecutor {
            farm: farm.clone(),
            id: id.to_string(),
        }),
    );
    let management = Arc::new(FarmManagement {
        farm: farm.clone(),
        id: id.to_string(),
    });
    Broker::operable(config, node, management, settings())
}
