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

//! Parsing of the cluster connection `Topology` attribute.
//!
//! A live/backup pair is reported as one `TopologyMember[...]` line carrying the
//! connector of each side:
//!
//! ```text
//! TopologyMember[id=..., connector=Pair[a=TransportConfiguration(...) ?port=61616&host=10-0-0-1, b=TransportConfiguration(...) ?port=61616&host=10-0-0-2], ...]
//! ```
//!
//! A backup that lost its live broker reports no member at all, only its own
//! connector in the topology header.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static TOPOLOGY_MEMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"TopologyMember.*\]").expect("valid topology member regex"));
static PSEUDO_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"host=(.*?)[,\]&]").expect("valid topology host regex"));

/// One pair as reported by a broker, by address. Never empty on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyMember {
    pub master: Option<String>,
    pub slave: Option<String>,
}

pub fn parse_topology(topology: &str) -> Vec<TopologyMember> {
    let segments: Vec<&str> = TOPOLOGY_MEMBER
        .find_iter(topology)
        .map(|segment| segment.as_str())
        .collect();

    if segments.is_empty() {
        let mut hosts = hosts(topology).into_iter();
        let Some(slave) = hosts.next() else {
            return Vec::new();
        };
        if hosts.next().is_some() {
            warn!("Isolated broker reported more than one host, using {slave}");
        }
        return vec![TopologyMember {
            master: None,
            slave: Some(slave),
        }];
    }

    segments
        .into_iter()
        .filter_map(|segment| {
            let mut hosts = hosts(segment).into_iter();
            let master = hosts.next()?;
            let slave = hosts.next();
            if hosts.next().is_some() {
                warn!("Topology member lists more than two hosts: {segment}");
            }
            Some(TopologyMember {
                master: Some(master),
                slave,
            })
        })
        .collect()
}

fn hosts(text: &str) -> Vec<String> {
    PSEUDO_HOST
        .captures_iter(text)
        .map(|captures| captures[1].replace('-', "."))
        .collect()
}
