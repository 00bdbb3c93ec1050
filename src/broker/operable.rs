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
use tracing::warn;

pub const SIGKILL: i32 = 9;
pub const PID_FILE: &str = "artemis.pid";
const SERVICE_SCRIPT: &str = "artemis-service";

/// How a broker's process can be controlled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operability {
    /// Lifecycle is owned by someone else, only observed.
    Unmanaged,
    Service(ServiceControl),
}

impl Operability {
    pub fn service(&self) -> Option<&ServiceControl> {
        match self {
            Operability::Unmanaged => None,
            Operability::Service(control) => Some(control),
        }
    }
}

/// Command lines driving the instance service script as `run_as`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceControl {
    run_as: String,
}

impl ServiceControl {
    pub fn new(run_as: impl Into<String>) -> Self {
        Self {
            run_as: run_as.into(),
        }
    }

    pub fn run_as(&self) -> &str {
        &self.run_as
    }

    pub fn start_command(&self, config: &BrokerConfig) -> String {
        self.service_command(config, "start")
    }

    pub fn stop_command(&self, config: &BrokerConfig) -> String {
        self.service_command(config, "stop")
    }

    fn service_command(&self, config: &BrokerConfig, action: &str) -> String {
        format!(
            "runuser -l {} {}/{SERVICE_SCRIPT} {action}",
            self.run_as,
            config.instance_bin_dir()
        )
    }

    pub fn thread_dump_command(&self, pid: u32, path: &str) -> String {
        format!(
            "runuser -l {} -c 'jstack -l {pid} | tee {path}'",
            self.run_as
        )
    }

    pub fn kill_command(signal: i32, pid: u32) -> String {
        format!("kill -s {signal} {pid}")
    }

    pub fn probe_command(pid: u32) -> String {
        Self::kill_command(0, pid)
    }

    pub fn pid_command(config: &BrokerConfig) -> String {
        format!("cat {}/{PID_FILE}", config.instance_data_dir())
    }

    pub fn thread_dump_path(config: &BrokerConfig, timestamp: &str) -> String {
        format!("{}/thread_dump_{timestamp}.log", config.instance_log_dir())
    }

    /// PID from the pid file contents. Empty or garbled contents mean "unknown".
    pub fn parse_pid(stdout: &[String]) -> Option<u32> {
        let raw = stdout.iter().map(|line| line.trim()).find(|line| !line.is_empty())?;
        match raw.parse() {
            Ok(pid) => Some(pid),
            Err(_) => {
                warn!("Ignoring unreadable pid '{raw}'");
                None
            }
        }
    }
}
