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

pub mod executor;

use crate::config::broker::NodeSpec;
use crate::error::ExecutorError;
use executor::{
    AnsibleExecutor, CommandSpec, DockerExecutor, ExecutionResult, Executor, ExecutorKind,
    LocalExecutor, SshExecutor,
};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Host a broker runs on, together with the way commands reach it.
#[derive(Clone)]
pub struct Node {
    name: String,
    address: String,
    executor: Arc<dyn Executor>,
    command_timeout: Option<Duration>,
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            executor,
            command_timeout: None,
        }
    }

    /// Limit applied by [`Node::execute`] to every command line.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn from_spec(name: &str, address: &str, spec: &NodeSpec) -> Self {
        let target = spec.ssh_address.as_deref().unwrap_or(address);
        let executor: Arc<dyn Executor> = match spec.executor {
            ExecutorKind::Local => Arc::new(LocalExecutor),
            ExecutorKind::Ssh => Arc::new(SshExecutor::new(target, spec.ssh_user.clone())),
            ExecutorKind::Docker => Arc::new(DockerExecutor::new(
                spec.container.clone().unwrap_or_else(|| name.to_string()),
            )),
            ExecutorKind::Ansible => {
                Arc::new(AnsibleExecutor::new(target, spec.inventory.clone()))
            }
        };
        debug!("Node '{name}' at {address} uses the {} executor", spec.executor);
        Self::new(name, address, executor)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Runs `line` and waits for it to finish, within the node's command timeout.
    pub async fn execute(&self, line: &str) -> Result<ExecutionResult, ExecutorError> {
        let command = match self.command_timeout {
            Some(timeout) => CommandSpec::new(line).with_timeout(timeout),
            None => CommandSpec::new(line),
        };
        self.execute_command(&command).await
    }

    pub async fn execute_command(
        &self,
        command: &CommandSpec,
    ) -> Result<ExecutionResult, ExecutorError> {
        debug!("[{}] {command}", self.name);
        let execution = self.executor.execute(command).await?;
        execution.wait_for_completion().await
    }
}
