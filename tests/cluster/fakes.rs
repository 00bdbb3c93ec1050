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

use async_trait::async_trait;
use iqa_harness::broker::Broker;
use iqa_harness::cluster::liveness::{ConnectionReport, ConnectorProbe};
use iqa_harness::config::Credentials;
use iqa_harness::error::{ExecutorError, ManagementError};
use iqa_harness::management::{JolokiaRequest, ManagementApi, ManagementResponse};
use iqa_harness::node::executor::{CommandSpec, Execution, ExecutionResult, Executor};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct FakeProcess {
    address: String,
    running: bool,
    pid: Option<u32>,
}

/// In-memory stand-in for the hosts of one live/backup pair.
///
/// The member registered first is the configured master. While both members
/// run they report each other as a pair. A member running alone reports
/// itself as a live broker without backup.
#[derive(Debug, Default)]
pub struct BrokerFarm {
    processes: Mutex<BTreeMap<String, FakeProcess>>,
    order: Mutex<Vec<String>>,
    next_pid: Mutex<u32>,
    commands: Mutex<Vec<String>>,
}

impl BrokerFarm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: Mutex::new(1000),
            ..Self::default()
        })
    }

    pub fn register(&self, id: &str, address: &str) {
        self.processes.lock().unwrap().insert(
            id.to_string(),
            FakeProcess {
                address: address.to_string(),
                running: false,
                pid: None,
            },
        );
        self.order.lock().unwrap().push(id.to_string());
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.processes
            .lock()
            .unwrap()
            .get(id)
            .is_some_and(|process| process.running)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn run(&self, id: &str, line: &str) -> ExecutionResult {
        self.commands.lock().unwrap().push(format!("{id}: {line}"));
        let mut processes = self.processes.lock().unwrap();
        let Some(process) = processes.get_mut(id) else {
            return ExecutionResult::new(127, Vec::new());
        };

        if line.ends_with("artemis-service start") {
            if !process.running {
                let mut next_pid = self.next_pid.lock().unwrap();
                *next_pid += 1;
                process.pid = Some(*next_pid);
                process.running = true;
            }
            return ExecutionResult::new(0, Vec::new());
        }
        if line.ends_with("artemis-service stop") {
            process.running = false;
            process.pid = None;
            return ExecutionResult::new(0, Vec::new());
        }
        if line.starts_with("cat ") {
            return match process.pid {
                Some(pid) => ExecutionResult::new(0, vec![pid.to_string()]),
                None => ExecutionResult::new(1, Vec::new()),
            };
        }
        if let Some(args) = line.strip_prefix("kill -s ") {
            let mut args = args.split_whitespace();
            let signal = args.next().unwrap_or_default();
            let pid = args.next().and_then(|pid| pid.parse::<u32>().ok());
            if pid.is_none() || pid != process.pid || !process.running {
                return ExecutionResult::new(1, Vec::new());
            }
            if signal != "0" {
                process.running = false;
                process.pid = None;
            }
            return ExecutionResult::new(0, Vec::new());
        }
        ExecutionResult::new(127, Vec::new())
    }

    fn topology(&self) -> Option<String> {
        let processes = self.processes.lock().unwrap();
        let running: Vec<&FakeProcess> = self
            .order
            .lock()
            .unwrap()
            .iter()
            .filter_map(|id| processes.get(id))
            .filter(|process| process.running)
            .collect();
        match running.as_slice() {
            [live, backup] => Some(format!(
                "\tn1 => TopologyMember[id = n1, connector=Pair[a=TransportConfiguration(name=artemis) ?port=61616&host={}, b=TransportConfiguration(name=artemis) ?port=61616&host={}], backupGroupName=null]",
                host(live),
                host(backup)
            )),
            [live] => Some(format!(
                "\tn1 => TopologyMember[id = n1, connector=Pair[a=TransportConfiguration(name=artemis) ?port=61616&host={}, b=null], backupGroupName=null]",
                host(live)
            )),
            _ => None,
        }
    }
}

fn host(process: &FakeProcess) -> String {
    process.address.replace('.', "-")
}

#[derive(Debug)]
pub struct FarmExecutor {
    pub farm: Arc<BrokerFarm>,
    pub id: String,
}

#[async_trait]
impl Executor for FarmExecutor {
    async fn execute(&self, command: &CommandSpec) -> Result<Execution, ExecutorError> {
        let result = self.farm.run(&self.id, &command.line);
        Ok(Execution::completed(command.line.clone(), result))
    }
}

#[derive(Debug)]
pub struct FarmManagement {
    pub farm: Arc<BrokerFarm>,
    pub id: String,
}

#[async_trait]
impl ManagementApi for FarmManagement {
    async fn read(
        &self,
        request: &JolokiaRequest,
        _credentials: &Credentials,
    ) -> Result<ManagementResponse, ManagementError> {
        if !self.farm.is_running(&self.id) {
            return Err(ManagementError::ConnectionFailure {
                url: request.url(Default::default()),
                reason: "connection refused".to_string(),
            });
        }
        let value = match request.operation.as_str() {
            "/Started" => json!(true),
            "/Topology" => self.farm.topology().map(Value::String).unwrap_or(Value::Null),
            "/Nodes" => json!({}),
            _ => Value::Null,
        };
        Ok(ManagementResponse::new(200, json!({ "value": value })))
    }
}

#[derive(Debug)]
pub struct FarmConnector {
    pub farm: Arc<BrokerFarm>,
}

#[async_trait]
impl ConnectorProbe for FarmConnector {
    async fn connect(&self, broker: &Broker) -> ConnectionReport {
        if self.farm.is_running(broker.id()) {
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
