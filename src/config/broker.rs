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

use crate::node::executor::ExecutorKind;
use bon::bon;
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_HOME: &str = "/opt/jboss-amq-7";
pub const DEFAULT_INSTANCE_HOME: &str = "/opt/jboss-amq-7-i0";
pub const DEFAULT_INSTANCE_NAME: &str = "amq";
pub const DEFAULT_PRIMARY_PORT: u16 = 61616;
pub const DEFAULT_WEB_PORT: u16 = 8161;
pub const DEFAULT_JMX_PORT: u16 = 1099;

/// Acceptor carrying the broker's own (core) protocol.
pub const PRIMARY_ACCEPTOR: &str = "artemis";
pub const WEB_PORT_NAME: &str = "web";
pub const JMX_PORT_NAME: &str = "jmx";
pub const ADMIN_ROLE: &str = "amq";

const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub password: String,
    pub roles: BTreeSet<String>,
}

impl User {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.add_role(role);
        self
    }

    pub fn add_role(&mut self, role: impl Into<String>) {
        self.roles.insert(role.into());
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HaPolicy {
    pub policy: Option<String>,
    pub is_master: bool,
}

impl HaPolicy {
    pub fn master() -> Self {
        Self {
            policy: None,
            is_master: true,
        }
    }

    pub fn slave() -> Self {
        Self {
            policy: None,
            is_master: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyPolicy {
    pub cluster_connection_name: Option<String>,
    pub ha_policy: Option<HaPolicy>,
}

/// How the host running a broker is reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSpec {
    pub executor: ExecutorKind,
    /// Address commands are sent to, when it differs from the broker address.
    pub ssh_address: Option<String>,
    pub ssh_user: Option<String>,
    pub container: Option<String>,
    pub inventory: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub server_id: String,
    pub home_dir: String,
    pub instance_dir: String,
    pub instance_name: String,
    /// Acceptor ports by name, always including `web` and `jmx`.
    pub ports: BTreeMap<String, u16>,
    /// In definition order. The first admin is used for management reads.
    pub users: Vec<User>,
    pub external_address: String,
    pub internal_address: Option<String>,
    pub topology: TopologyPolicy,
    pub node: NodeSpec,
}

#[bon]
impl BrokerConfig {
    /// Ports missing a `web` or `jmx` entry get the default management ports.
    #[builder]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        #[builder(into)] server_id: String,
        #[builder(into, default = DEFAULT_HOME.to_string())] home_dir: String,
        #[builder(into, default = DEFAULT_INSTANCE_HOME.to_string())] instance_dir: String,
        #[builder(into, default = DEFAULT_INSTANCE_NAME.to_string())] instance_name: String,
        #[builder(default = default_ports())] ports: BTreeMap<String, u16>,
        #[builder(default = default_users())] users: Vec<User>,
        #[builder(into)] external_address: String,
        #[builder(into)] internal_address: Option<String>,
        #[builder(default)] topology: TopologyPolicy,
        #[builder(default)] node: NodeSpec,
    ) -> Self {
        let mut ports = ports;
        ports
            .entry(WEB_PORT_NAME.to_string())
            .or_insert(DEFAULT_WEB_PORT);
        ports
            .entry(JMX_PORT_NAME.to_string())
            .or_insert(DEFAULT_JMX_PORT);
        Self {
            server_id,
            home_dir,
            instance_dir,
            instance_name,
            ports,
            users,
            external_address,
            internal_address,
            topology,
            node,
        }
    }
}

impl BrokerConfig {
    /// Address other cluster members use for this broker. Falls back to the external one.
    pub fn internal_address(&self) -> &str {
        self.internal_address
            .as_deref()
            .unwrap_or(&self.external_address)
    }

    pub fn instance_conf_dir(&self) -> String {
        posix_join(&self.instance_dir, "etc")
    }

    pub fn instance_bin_dir(&self) -> String {
        posix_join(&self.instance_dir, "bin")
    }

    pub fn instance_log_dir(&self) -> String {
        posix_join(&self.instance_dir, "log")
    }

    pub fn instance_data_dir(&self) -> String {
        posix_join(&self.instance_dir, "data")
    }

    pub fn port(&self, name: &str) -> Option<u16> {
        self.ports.get(name).copied()
    }

    pub fn primary_port(&self) -> Option<u16> {
        self.port(PRIMARY_ACCEPTOR)
    }

    pub fn web_port(&self) -> u16 {
        self.port(WEB_PORT_NAME).unwrap_or(DEFAULT_WEB_PORT)
    }

    /// First user holding the admin role.
    pub fn admin_user(&self) -> Option<&User> {
        self.users.iter().find(|user| user.has_role(ADMIN_ROLE))
    }

    pub fn admin_credentials(&self) -> Credentials {
        match self.admin_user() {
            Some(user) => Credentials::new(&user.username, &user.password),
            None => Credentials::new(DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD),
        }
    }

    pub fn cluster_connection_name(&self) -> Option<&str> {
        self.topology.cluster_connection_name.as_deref()
    }

    pub fn ha_policy(&self) -> Option<&HaPolicy> {
        self.topology.ha_policy.as_ref()
    }
}

impl std::fmt::Display for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "server_id={}, home={}, instance={}, ports={:?}, default_addr={}",
            self.server_id, self.home_dir, self.instance_name, self.ports, self.external_address
        )
    }
}

pub fn default_ports() -> BTreeMap<String, u16> {
    BTreeMap::from([
        (PRIMARY_ACCEPTOR.to_string(), DEFAULT_PRIMARY_PORT),
        (WEB_PORT_NAME.to_string(), DEFAULT_WEB_PORT),
        (JMX_PORT_NAME.to_string(), DEFAULT_JMX_PORT),
    ])
}

pub fn default_users() -> Vec<User> {
    ["admin", "tckuser", "superuser", "administrator", "nobody"]
        .into_iter()
        .map(|name| User::new(name, name).with_role(ADMIN_ROLE))
        .collect()
}

fn posix_join(base: &str, leaf: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), leaf)
}
