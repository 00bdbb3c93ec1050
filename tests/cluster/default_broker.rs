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

use crate::cluster::farm_broker;
use crate::cluster::fakes::BrokerFarm;
use iqa_harness::broker::operable::SIGKILL;
use iqa_harness::error::{BrokerError, ClusterError};
use iqa_harness::BrokerCluster;

#[tokio::test]
async fn default_broker_should_move_to_next_running_member_on_kill() {
    let farm = BrokerFarm::new();
    let mut cluster = BrokerCluster::with_brokers(vec![
        farm_broker(&farm, "amq0", "10.0.0.1", 61616, None),
        farm_broker(&farm, "amq1", "10.0.0.2", 61616, None),
        farm_broker(&farm, "amq2", "10.0.0.3", 61616, None),
    ])
    .await
    .unwrap();
    assert_eq!(cluster.default_broker_id(), Some("amq0"));

    for id in ["amq1", "amq2"] {
        assert!(cluster.broker_mut(id).unwrap().start(false).await.unwrap());
    }
    cluster.select_default_broker().await;
    assert_eq!(cluster.default_broker_id(), Some("amq1"));
    assert_eq!(cluster.running_brokers().await, vec!["amq1", "amq2"]);

    let exit_code = cluster.kill(SIGKILL, "amq1").await.unwrap();

    assert_eq!(exit_code, 0);
    assert_eq!(cluster.default_broker_id(), Some("amq2"));
    assert_eq!(cluster.running_brokers().await, vec!["amq2"]);
}

#[tokio::test]
async fn graceful_stop_should_clear_pid() {
    let farm = BrokerFarm::new();
    let mut cluster = BrokerCluster::with_brokers(vec![farm_broker(
        &farm, "amq0", "10.0.0.1", 61616, None,
    )])
    .await
    .unwrap();
    let broker = cluster.broker_mut("amq0").unwrap();
    assert!(broker.start(false).await.unwrap());
    assert!(broker.cached_pid().is_some());

    assert_eq!(broker.stop(0).await.unwrap(), 0);

    assert_eq!(broker.cached_pid(), None);
    assert!(!broker.is_running().await.unwrap());
    assert!(!farm.is_running("amq0"));
}

#[tokio::test]
async fn configuration_changes_should_be_unsupported() {
    let farm = BrokerFarm::new();
    let cluster = BrokerCluster::with_brokers(vec![farm_broker(
        &farm, "amq0", "10.0.0.1", 61616, None,
    )])
    .await
    .unwrap();
    let broker = cluster.default_broker().unwrap();

    assert!(matches!(
        broker.cfg_apply(),
        Err(BrokerError::Unsupported { operation: "cfg_apply", .. })
    ));
    assert!(matches!(
        cluster.cluster_group_name(),
        Ok("my-cluster")
    ));
    assert!(matches!(
        BrokerCluster::new().urls(),
        Err(ClusterError::NoDefaultBroker)
    ));
}
