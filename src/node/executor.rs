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

use crate::error::ExecutorError;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};
use std::process::{Output, Stdio};
use std::time::Duration;
use strum::{Display as StrumDisplay, EnumString};
use tokio::process::{Child, Command};
use tracing::{debug, trace};

static ANSIBLE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\|\s*\w+\s*\|\s*rc=(-?\d+)\s*>>").expect("valid ansible header regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExecutorKind {
    Local,
    #[default]
    Ssh,
    Docker,
    Ansible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub line: String,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.line)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl ExecutionResult {
    pub fn new(exit_code: i32, stdout: Vec<String>) -> Self {
        Self {
            exit_code,
            stdout,
            stderr: Vec::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Raw,
    /// `host | CHANGED | rc=0 >>` followed by the remote output.
    AnsibleAdHoc,
}

#[derive(Debug)]
enum ExecutionState {
    Running {
        child: Child,
        timeout: Option<Duration>,
        format: OutputFormat,
    },
    Completed(ExecutionResult),
}

/// A command handed to an executor.
#[derive(Debug)]
pub struct Execution {
    command: String,
    state: ExecutionState,
}

impl Execution {
    /// An execution whose outcome is already known.
    pub fn completed(command: impl Into<String>, result: ExecutionResult) -> Self {
        Self {
            command: command.into(),
            state: ExecutionState::Completed(result),
        }
    }

    fn spawned(command: String, child: Child, timeout: Option<Duration>, format: OutputFormat) -> Self {
        Self {
            command,
            state: ExecutionState::Running {
                child,
                timeout,
                format,
            },
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub async fn wait_for_completion(self) -> Result<ExecutionResult, ExecutorError> {
        let (child, timeout, format) = match self.state {
            ExecutionState::Completed(result) => return Ok(result),
            ExecutionState::Running {
                child,
                timeout,
                format,
            } => (child, timeout, format),
        };

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ExecutorError::Timeout {
                    command: self.command.clone(),
                    timeout: limit,
                })??,
            None => child.wait_with_output().await?,
        };
        let result = collect(output, format);
        trace!(
            "Command '{}' finished with exit code {}",
            self.command,
            result.exit_code
        );
        Ok(result)
    }
}

fn collect(output: Output, format: OutputFormat) -> ExecutionResult {
    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = lines(&output.stdout);
    let stderr = lines(&output.stderr);
    match format {
        OutputFormat::Raw => ExecutionResult {
            exit_code,
            stdout,
            stderr,
        },
        OutputFormat::AnsibleAdHoc => strip_ansible_header(exit_code, stdout, stderr),
    }
}

fn strip_ansible_header(exit_code: i32, stdout: Vec<String>, stderr: Vec<String>) -> ExecutionResult {
    let mut stdout = stdout.into_iter();
    let remote_code = stdout
        .next()
        .and_then(|header| {
            ANSIBLE_HEADER
                .captures(&header)
                .and_then(|captures| captures[1].parse::<i32>().ok())
        })
        .unwrap_or(exit_code);
    ExecutionResult {
        exit_code: remote_code,
        stdout: stdout.collect(),
        stderr,
    }
}

fn lines(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Runs shell command lines on a node.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, command: &CommandSpec) -> Result<Execution, ExecutorError>;
}

fn spawn(
    program: &str,
    args: &[&str],
    command: &CommandSpec,
    format: OutputFormat,
) -> Result<Execution, ExecutorError> {
    debug!("Executing: {program} {}", args.join(" "));
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecutorError::Spawn {
            command: command.line.clone(),
            source,
        })?;
    Ok(Execution::spawned(
        command.line.clone(),
        child,
        command.timeout,
        format,
    ))
}

/// Runs commands on the local host through `sh -c`.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

#[async_trait]
impl Executor for LocalExecutor {
    async fn execute(&self, command: &CommandSpec) -> Result<Execution, ExecutorError> {
        spawn("sh", &["-c", &command.line], command, OutputFormat::Raw)
    }
}

#[derive(Debug, Clone)]
pub struct SshExecutor {
    host: String,
    user: Option<String>,
}

impl SshExecutor {
    pub fn new(host: impl Into<String>, user: Option<String>) -> Self {
        Self {
            host: host.into(),
            user,
        }
    }

    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

#[async_trait]
impl Executor for SshExecutor {
    async fn execute(&self, command: &CommandSpec) -> Result<Execution, ExecutorError> {
        let destination = self.destination();
        spawn(
            "ssh",
            &[
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=no",
                &destination,
                &command.line,
            ],
            command,
            OutputFormat::Raw,
        )
    }
}

#[derive(Debug, Clone)]
pub struct DockerExecutor {
    container: String,
}

impl DockerExecutor {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
        }
    }
}

#[async_trait]
impl Executor for DockerExecutor {
    async fn execute(&self, command: &CommandSpec) -> Result<Execution, ExecutorError> {
        spawn(
            "docker",
            &["exec", &self.container, "sh", "-c", &command.line],
            command,
            OutputFormat::Raw,
        )
    }
}

/// Runs commands through the `ansible` ad-hoc shell module.
#[derive(Debug, Clone)]
pub struct AnsibleExecutor {
    host: String,
    inventory: Option<String>,
}

impl AnsibleExecutor {
    pub fn new(host: impl Into<String>, inventory: Option<String>) -> Self {
        Self {
            host: host.into(),
            inventory,
        }
    }
}

#[async_trait]
impl Executor for AnsibleExecutor {
    async fn execute(&self, command: &CommandSpec) -> Result<Execution, ExecutorError> {
        let mut args = vec![self.host.as_str()];
        if let Some(inventory) = &self.inventory {
            args.extend(["-i", inventory.as_str()]);
        }
        args.extend(["-m", "shell", "-a", command.line.as_str()]);
        spawn("ansible", &args, command, OutputFormat::AnsibleAdHoc)
    }
}
