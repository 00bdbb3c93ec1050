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

//! Broker definitions from YAML or JSON inventory files.
//!
//! Both formats describe a map of `server_id -> definition`. Entries are kept
//! in file order. Router (interconnect) entries are recognized and skipped.

use crate::config::broker::{
    default_users, BrokerConfig, HaPolicy, NodeSpec, TopologyPolicy, User, DEFAULT_HOME,
    DEFAULT_INSTANCE_HOME, DEFAULT_INSTANCE_NAME, DEFAULT_JMX_PORT, DEFAULT_WEB_PORT,
    JMX_PORT_NAME, WEB_PORT_NAME,
};
use crate::error::ConfigError;
use crate::node::executor::ExecutorKind;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const BROKERS_CONFIG_ENV: &str = "IQA_BROKERS_CONFIG";

const ARTEMIS_TEMPLATE: &str = "artemis";
const INTERCONNECT_TEMPLATE: &str = "interconnect";
const ARTEMIS_TYPE: &str = "ArtemisBroker";
const INTERCONNECT_TYPE: &str = "Interconnect";
const MASTER_ROLES: [&str; 3] = ["master", "live", "primary"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_first(self) -> Option<T> {
        match self {
            OneOrMany::Many(items) => items.into_iter().next(),
            OneOrMany::One(item) => Some(item),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRender {
    template: String,
}

#[derive(Debug, Deserialize)]
struct RawRendered {
    render: Option<RawRender>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProfile {
    home: Option<String>,
    instance: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAcceptor {
    name: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct RawClusterConnection {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRole {
    Flag(bool),
    Name(String),
}

#[derive(Debug, Deserialize)]
struct RawHaPolicy {
    policy: Option<String>,
    role: Option<RawRole>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBrokerXml {
    name: Option<String>,
    acceptors: Option<Vec<RawAcceptor>>,
    cluster_connections: Option<OneOrMany<RawClusterConnection>>,
    ha_policy: Option<OneOrMany<RawHaPolicy>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawManagementXml {
    connector_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    password: String,
    role: Option<String>,
}

/// `username -> user` map, kept in file order. The first admin listed is the
/// one used for management reads.
#[derive(Debug, Default)]
struct RawUsers(Vec<(String, RawUser)>);

impl<'de> Deserialize<'de> for RawUsers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{MapAccess, Visitor};
        use std::fmt;

        struct RawUsersVisitor;

        impl<'de> Visitor<'de> for RawUsersVisitor {
            type Value = RawUsers;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of users")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut users = Vec::with_capacity(map.size_hint().unwrap_or_default());
                while let Some(entry) = map.next_entry::<String, RawUser>()? {
                    users.push(entry);
                }
                Ok(RawUsers(users))
            }
        }

        deserializer.deserialize_map(RawUsersVisitor)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawAddresses {
    internal: Option<String>,
    default_ssh: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNodeInformation {
    default_address: Option<String>,
    #[serde(default)]
    addresses: RawAddresses,
    executor: Option<String>,
    ssh_user: Option<String>,
    container: Option<String>,
    inventory: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBroker {
    #[serde(default)]
    artemis_profile: RawProfile,
    #[serde(default)]
    broker_xml: RawBrokerXml,
    #[serde(default)]
    management_xml: RawManagementXml,
    artemis_users: Option<RawUsers>,
    #[serde(default)]
    artemis_roles: BTreeMap<String, Vec<String>>,
    node_information: Option<RawNodeInformation>,
}

#[derive(Debug, Deserialize)]
struct RawJsonServer {
    #[serde(rename = "type")]
    kind: String,
    broker: Option<RawBroker>,
    node_information: Option<RawNodeInformation>,
}

/// Loads broker definitions, picking the format from the file extension.
pub fn load_configuration(path: &Path) -> Result<Vec<BrokerConfig>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);
    let brokers = match extension.as_deref() {
        Some("yaml") | Some("yml") => parse_yaml(&content)?,
        Some("json") => parse_json(&content)?,
        _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    };
    info!(
        "Loaded {} broker definition(s) from {}",
        brokers.len(),
        path.display()
    );
    Ok(brokers)
}

/// Loads the file named by `IQA_BROKERS_CONFIG`.
pub fn load_from_env() -> Result<Vec<BrokerConfig>, ConfigError> {
    let path = std::env::var(BROKERS_CONFIG_ENV)
        .map_err(|_| ConfigError::MissingEnv(BROKERS_CONFIG_ENV.to_string()))?;
    load_configuration(Path::new(&path))
}

pub fn parse_yaml(content: &str) -> Result<Vec<BrokerConfig>, ConfigError> {
    let servers: serde_yaml::Mapping = serde_yaml::from_str(content)?;
    let mut brokers = Vec::new();
    for (key, value) in servers {
        let server_id = key
            .as_str()
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "server_id".to_string(),
                value: format!("{key:?}"),
            })?
            .to_string();
        let rendered: RawRendered = serde_yaml::from_value(value.clone())?;
        let template = rendered
            .render
            .map(|render| render.template)
            .ok_or_else(|| missing(&server_id, "render/template"))?;

        if template.contains(ARTEMIS_TEMPLATE) {
            let raw: RawBroker = serde_yaml::from_value(value)?;
            brokers.push(build_broker(server_id, raw, None)?);
        } else if template.contains(INTERCONNECT_TEMPLATE) {
            info!("Skipping router definition '{server_id}'");
        } else {
            return Err(ConfigError::UnknownServerType {
                server_id,
                kind: template,
            });
        }
    }
    Ok(brokers)
}

pub fn parse_json(content: &str) -> Result<Vec<BrokerConfig>, ConfigError> {
    let servers: serde_json::Map<String, serde_json::Value> = serde_json::from_str(content)?;
    let mut brokers = Vec::new();
    for (server_id, value) in servers {
        let raw: RawJsonServer = serde_json::from_value(value)?;
        match raw.kind.as_str() {
            ARTEMIS_TYPE => {
                let broker = raw.broker.ok_or_else(|| missing(&server_id, "broker"))?;
                brokers.push(build_broker(server_id, broker, raw.node_information)?);
            }
            INTERCONNECT_TYPE => info!("Skipping router definition '{server_id}'"),
            _ => {
                return Err(ConfigError::UnknownServerType {
                    server_id,
                    kind: raw.kind,
                })
            }
        }
    }
    Ok(brokers)
}

fn build_broker(
    server_id: String,
    raw: RawBroker,
    node_fallback: Option<RawNodeInformation>,
) -> Result<BrokerConfig, ConfigError> {
    let acceptors = raw
        .broker_xml
        .acceptors
        .ok_or_else(|| missing(&server_id, "broker_xml/acceptors"))?;
    let mut ports: BTreeMap<String, u16> = acceptors
        .into_iter()
        .map(|acceptor| (acceptor.name, acceptor.port))
        .collect();
    ports.insert(
        JMX_PORT_NAME.to_string(),
        raw.management_xml.connector_port.unwrap_or(DEFAULT_JMX_PORT),
    );
    ports.insert(WEB_PORT_NAME.to_string(), DEFAULT_WEB_PORT);

    let users = assign_users(raw.artemis_users, &raw.artemis_roles);

    let node_information = raw
        .node_information
        .or(node_fallback)
        .ok_or_else(|| missing(&server_id, "node_information"))?;
    let external_address = node_information
        .default_address
        .clone()
        .ok_or_else(|| missing(&server_id, "node_information/default_address"))?;
    let node = node_spec(&node_information)?;

    let topology = TopologyPolicy {
        cluster_connection_name: raw
            .broker_xml
            .cluster_connections
            .and_then(OneOrMany::into_first)
            .and_then(|connection| connection.name),
        ha_policy: raw
            .broker_xml
            .ha_policy
            .and_then(OneOrMany::into_first)
            .map(ha_policy),
    };

    let config = BrokerConfig::builder()
        .server_id(server_id)
        .home_dir(raw.artemis_profile.home.unwrap_or_else(|| DEFAULT_HOME.to_string()))
        .instance_dir(
            raw.artemis_profile
                .instance
                .unwrap_or_else(|| DEFAULT_INSTANCE_HOME.to_string()),
        )
        .instance_name(
            raw.broker_xml
                .name
                .unwrap_or_else(|| DEFAULT_INSTANCE_NAME.to_string()),
        )
        .ports(ports)
        .users(users)
        .external_address(external_address)
        .maybe_internal_address(node_information.addresses.internal)
        .topology(topology)
        .node(node)
        .build();
    debug!("Loaded broker configuration: {config}");
    Ok(config)
}

fn assign_users(
    raw_users: Option<RawUsers>,
    roles: &BTreeMap<String, Vec<String>>,
) -> Vec<User> {
    let mut users = match raw_users {
        Some(RawUsers(raw_users)) => raw_users
            .into_iter()
            .map(|(username, raw)| {
                let user = User::new(username, raw.password);
                match raw.role {
                    Some(role) => user.with_role(role),
                    None => user,
                }
            })
            .collect(),
        None => default_users(),
    };

    for (role, members) in roles {
        for member in members {
            match users.iter_mut().find(|user| &user.username == member) {
                Some(user) => user.add_role(role.as_str()),
                None => warn!("Role '{role}' references unknown user '{member}'"),
            }
        }
    }
    users
}

fn ha_policy(raw: RawHaPolicy) -> HaPolicy {
    let is_master = match raw.role {
        Some(RawRole::Flag(flag)) => flag,
        Some(RawRole::Name(name)) => MASTER_ROLES
            .iter()
            .any(|role| name.eq_ignore_ascii_case(role)),
        None => false,
    };
    HaPolicy {
        policy: raw.policy,
        is_master,
    }
}

fn node_spec(raw: &RawNodeInformation) -> Result<NodeSpec, ConfigError> {
    let executor = match raw.executor.as_deref() {
        Some(kind) => ExecutorKind::from_str(kind).map_err(|_| ConfigError::InvalidValue {
            key: "node_information/executor".to_string(),
            value: kind.to_string(),
        })?,
        None => ExecutorKind::default(),
    };
    Ok(NodeSpec {
        executor,
        ssh_address: raw.addresses.default_ssh.clone(),
        ssh_user: raw.ssh_user.clone(),
        container: raw.container.clone(),
        inventory: raw.inventory.clone(),
    })
}

fn missing(server_id: &str, field: &str) -> ConfigError {
    ConfigError::MissingField {
        server_id: server_id.to_string(),
        field: field.to_string(),
    }
}
