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

use iqa_harness::broker::BrokerKind;
use iqa_harness::config::broker::{DEFAULT_HOME, DEFAULT_INSTANCE_NAME};
use iqa_harness::config::loader::BROKERS_CONFIG_ENV;
use iqa_harness::config::{load_configuration, load_from_env, HarnessSettings};
use iqa_harness::error::{ClusterError, ConfigError};
use iqa_harness::node::executor::ExecutorKind;
use iqa_harness::HaBrokerCluster;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const BROKERS_YAML: &str = r#"
amq-live:
  render:
    template: artemis-ha.xml.j2
  artemis_profile:
    home: /opt/amq-7.9
    instance: /var/lib/amq/live
  broker_xml:
    name: live
    acceptors:
      - name: artemis
        port: 61616
      - name: amqp
        port: 5672
    cluster_connections:
      name: my-cluster
    ha_policy:
      policy: replication
      role: live
  artemis_users:
    admin:
      password: secret
      role: amq
  node_information:
    default_address: amq-live.example.com
    executor: ansible
    inventory: /etc/ansible/hosts
    addresses:
      internal: 172.16.0.10
      default_ssh: 10.8.0.10
amq-backup:
  render:
    template: artemis-ha.xml.j2
  broker_xml:
    acceptors:
      - name: artemis
        port: 61616
    ha_policy:
      - policy: replication
        role: backup
  node_information:
    default_address: amq-backup.example.com
qdr:
  render:
    template: interconnect.conf.j2
"#;

fn config_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn should_load_brokers_from_yaml_file() {
    let file = config_file(".yaml", BROKERS_YAML);

    let brokers = load_configuration(file.path()).unwrap();

    assert_eq!(brokers.len(), 2);
    let live = &brokers[0];
    assert_eq!(live.server_id, "amq-live");
    assert_eq!(live.home_dir, "/opt/amq-7.9");
    assert_eq!(live.instance_conf_dir(), "/var/lib/amq/live/etc");
    assert_eq!(live.internal_address(), "172.16.0.10");
    assert_eq!(live.admin_credentials().password, "secret");
    assert_eq!(live.users.len(), 1);
    assert_eq!(live.node.executor, ExecutorKind::Ansible);
    assert_eq!(live.node.ssh_address.as_deref(), Some("10.8.0.10"));
    assert_eq!(live.node.inventory.as_deref(), Some("/etc/ansible/hosts"));
    assert!(live.ha_policy().unwrap().is_master);

    let backup = &brokers[1];
    assert_eq!(backup.home_dir, DEFAULT_HOME);
    assert_eq!(backup.instance_name, DEFAULT_INSTANCE_NAME);
    assert_eq!(backup.cluster_connection_name(), None);
    assert!(!backup.ha_policy().unwrap().is_master);
    assert_eq!(backup.node.executor, ExecutorKind::Ssh);
}

#[test]
fn should_load_brokers_from_json_file() {
    let file = config_file(
        ".json",
        r#"{
            "amq1": {
                "type": "ArtemisBroker",
                "broker": {"broker_xml": {"acceptors": [{"name": "artemis", "port": 61616}]}},
                "node_information": {"default_address": "10.0.0.2"}
            },
            "amq0": {
                "type": "ArtemisBroker",
                "broker": {"broker_xml": {"acceptors": [{"name": "artemis", "port": 61616}]}},
                "node_information": {"default_address": "10.0.0.1"}
            }
        }"#,
    );

    let brokers = load_configuration(file.path()).unwrap();

    let ids: Vec<_> = brokers.iter().map(|broker| broker.server_id.as_str()).collect();
    assert_eq!(ids, vec!["amq1", "amq0"]);
    assert_eq!(brokers[1].external_address, "10.0.0.1");
}

#[test]
fn should_reject_unknown_file_format() {
    let file = config_file(".toml", "[amq0]\n");

    assert!(matches!(
        load_configuration(file.path()),
        Err(ConfigError::UnsupportedFormat(_))
    ));
}

#[test]
fn should_report_unreadable_file() {
    let directory = tempfile::tempdir().unwrap();

    assert!(matches!(
        load_configuration(&directory.path().join("missing.yaml")),
        Err(ConfigError::Io { .. })
    ));
}

#[test]
#[serial]
fn should_load_file_named_by_environment() {
    let file = config_file(".yml", BROKERS_YAML);
    env::set_var(BROKERS_CONFIG_ENV, file.path());

    let brokers = load_from_env();
    env::remove_var(BROKERS_CONFIG_ENV);

    assert_eq!(brokers.unwrap().len(), 2);
}

#[test]
#[serial]
fn should_require_environment_variable() {
    env::remove_var(BROKERS_CONFIG_ENV);

    assert!(matches!(load_from_env(), Err(ConfigError::MissingEnv(_))));
}

#[tokio::test]
async fn ha_cluster_should_require_cluster_connections() {
    let file = config_file(".yaml", BROKERS_YAML);
    let brokers = load_configuration(file.path()).unwrap();

    let result = HaBrokerCluster::from_configs(
        BrokerKind::Operable,
        brokers,
        Arc::new(HarnessSettings::default()),
    )
    .await;

    assert!(matches!(
        result,
        Err(ClusterError::Config(ConfigError::MissingField { ref server_id, .. })) if server_id == "amq-backup"
    ));
}
