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

//! Lifecycle and HA topology management for externally deployed Artemis
//! broker clusters, for use by interoperability test suites.

pub mod broker;
pub mod cluster;
pub mod config;
pub mod error;
pub mod logging;
pub mod management;
pub mod net;
pub mod node;
pub mod retry;

pub use broker::{Broker, BrokerKind, HaState};
pub use cluster::ha::{HaBrokerCluster, HaPair, TopologyState};
pub use cluster::BrokerCluster;
pub use config::{BrokerConfig, HarnessSettings};
pub use error::{BrokerError, ClusterError, ConfigError, ExecutorError, ManagementError};
pub use retry::{Retry, RetryBudget, RetryOutcome};
