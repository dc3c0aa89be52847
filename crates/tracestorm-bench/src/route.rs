// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Route files and call trees.
//!
//! A route file is a JSON array of hops describing one request's path through
//! a system. Each hop names a service operation and the calls it makes;
//! outgoing calls cross a service boundary, in-process calls stay inside the
//! caller's service. The first hop is the entry point. Resolving the call ids
//! yields a call tree, one node per span to synthesize.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("failed to read route file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse route: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("route has no hops")]
    Empty,

    #[error("call references unknown hop id {0}")]
    UnknownHop(u32),

    #[error("route contains a call cycle through hop id {0}")]
    Cycle(u32),
}

/// A call made by a hop. `outgoing` calls cross into the callee's service.
#[derive(Debug, Clone, Deserialize)]
pub struct Call {
    pub id: u32,
    #[serde(default)]
    pub outgoing: bool,
}

/// One operation in the route.
#[derive(Debug, Clone, Deserialize)]
pub struct Hop {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub calls: Vec<Call>,
}

/// One node of the resolved call tree.
#[derive(Debug, Clone)]
pub struct CallNode {
    pub id: u32,
    pub service: String,
    pub name: String,
    pub action: String,
    pub status: String,
    pub message: String,
    pub children: Vec<CallNode>,
}

impl CallNode {
    /// Number of nodes in this subtree, one per span to synthesize.
    pub fn span_count(&self) -> usize {
        1 + self.children.iter().map(CallNode::span_count).sum::<usize>()
    }
}

pub fn load_route(path: &Path) -> Result<Vec<Hop>, RouteError> {
    let bytes = std::fs::read(path).map_err(|source| RouteError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Resolves the route's call ids into a tree rooted at the first hop.
///
/// A call referencing a hop already on the path from the root is a cycle and
/// an error, as is a call referencing an id the route never defines.
pub fn build_tree(route: &[Hop]) -> Result<CallNode, RouteError> {
    let root = route.first().ok_or(RouteError::Empty)?;
    let mut path = Vec::new();
    build_node(route, root, None, &mut path)
}

fn build_node(
    route: &[Hop],
    hop: &Hop,
    caller_service: Option<&str>,
    path: &mut Vec<u32>,
) -> Result<CallNode, RouteError> {
    if path.contains(&hop.id) {
        return Err(RouteError::Cycle(hop.id));
    }
    path.push(hop.id);

    // an outgoing call lands in the callee's own service, an in-process call
    // stays in the caller's
    let service = caller_service.unwrap_or(&hop.name).to_string();

    let mut children = Vec::with_capacity(hop.calls.len());
    for call in &hop.calls {
        let callee = route
            .iter()
            .find(|h| h.id == call.id)
            .ok_or(RouteError::UnknownHop(call.id))?;
        let child_service = if call.outgoing {
            None
        } else {
            Some(service.as_str())
        };
        children.push(build_node(route, callee, child_service, path)?);
    }

    path.pop();
    Ok(CallNode {
        id: hop.id,
        service,
        name: hop.name.clone(),
        action: hop.action.clone(),
        status: hop.status.clone(),
        message: hop.message.clone(),
        children,
    })
}
