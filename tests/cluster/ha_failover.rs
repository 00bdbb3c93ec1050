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

use crate::cluster::fakes::{BrokerFarm, FarmConnector};
use crate::cluster::{farm_broker, settings};
use iqa_harness::broker::operable::SIGKILL;
use iqa_harness::config::HaPolicy;
use iqa_harness::{HaBrokerCluster, HaPair, TopologyState};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::net::TcpListener;

async fn started_pair(farm: &Arc<BrokerFarm>, port: u16) -> HaBrokerCluster {
    let mut cluster = HaBrokerCluster::with_brokers(
        vec![
            farm_broker(farm, "amq-m", "10.0.0.1", port, Some(HaPolicy::master())),
            farm_broker(farm, "amq-s", "10.0.0.2", port, Some(HaPolicy::slave())),
        ],
        settings(),
    )
    .await
    .unwrap()
    .with_connector(Arc::new(FarmConnector { farm: farm.clone() }));

    for id in ["amq-m", "amq-s"] {
        let started = cluster.broker_mut(id).unwrap().start(true).await.unwrap();
        assert!(started, "{id} did not start");
    }
    cluster
}

fn initial_pairs() -> BTreeSet<HaPair> {
    BTreeSet::from([HaPair::new(Some("amq-m"), Some("amq-s"))])
}

#[tokio::test]
async fn topology_should_follow_failover_and_be_restored() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let farm = BrokerFarm::new();
    let mut cluster = started_pair(&farm, port).await;

    assert_eq!(
        cluster.update_topology().await.unwrap(),
        TopologyState::Consistent
    );
    assert_eq!(cluster.master_slave_pairs(), &initial_pairs());
    assert_eq!(cluster.default_broker_id(), Some("amq-m"));

    cluster.kill(SIGKILL, "amq-m").await.unwrap();
    assert!(!farm.is_running("amq-m"));
    assert!(cluster
        .wait_for_liveness("amq-s", Some("amq-m"))
        .await
        .unwrap());

    cluster.update_topology_and_log().await.unwrap();
    assert_eq!(cluster.masters(), ["amq-s"]);
    assert!(cluster.slaves().is_empty());
    assert_eq!(
        cluster.master_slave_pairs(),
        &BTreeSet::from([HaPair::new(Some("amq-s"), None)])
    );
    assert_eq!(cluster.default_broker_id(), Some("amq-s"));

    let preserved = cluster
        .check_initial_topology_preserved(&initial_pairs())
        .await
        .unwrap();

    assert!(!preserved);
    assert_eq!(cluster.state(), TopologyState::Consistent);
    assert_eq!(cluster.master_slave_pairs(), &initial_pairs());
    assert_eq!(cluster.masters(), ["amq-m"]);
    assert_eq!(cluster.slaves(), ["amq-s"]);
    assert_eq!(cluster.default_broker_id(), Some("amq-m"));
    assert!(farm.is_running("amq-m"));
    assert!(farm.is_running("amq-s"));
}

#[tokio::test]
async fn restore_should_kill_every_member_before_starting_any() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let farm = BrokerFarm::new();
    let mut cluster = started_pair(&farm, port).await;
    let before = farm.commands().len();

    let pairs = cluster.restore_initial_topology().await.unwrap();

    assert_eq!(pairs, initial_pairs());
    let commands = &farm.commands()[before..];
    let kills: Vec<_> = commands
        .iter()
        .enumerate()
        .filter(|(_, line)| line.contains("kill -s 9"))
        .map(|(index, _)| index)
        .collect();
    let starts: Vec<_> = commands
        .iter()
        .enumerate()
        .filter(|(_, line)| line.ends_with("artemis-service start"))
        .map(|(index, _)| index)
        .collect();
    assert_eq!(kills.len(), 2);
    assert_eq!(starts.len(), 2);
    assert!(kills.iter().max() < starts.iter().min());
}

#[tokio::test]
async fn liveness_should_time_out_when_nothing_takes_over() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let farm = BrokerFarm::new();
    let mut cluster = started_pair(&farm, port).await;

    cluster.kill(SIGKILL, "amq-m").await.unwrap();
    cluster.kill(SIGKILL, "amq-s").await.unwrap();

    assert!(!cluster.wait_for_liveness("amq-s", None).await.unwrap());
    assert_eq!(
        cluster.update_topology().await.unwrap(),
        TopologyState::Unknown
    );
}
