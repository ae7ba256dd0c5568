//! Node/edge graph exchanged between extraction and query synthesis.
//!
//! Edges reference their endpoints by matcher (labels + properties), not by
//! position, so a [`Graph`] is only usable once [`Graph::validate`] has confirmed
//! that every endpoint resolves to exactly one declared node.

use crate::error::{ErrorCode, RagraphError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Property names treated as a node's identity, in priority order.
pub const IDENTITY_KEYS: [&str; 2] = ["id", "name"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Integer(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

pub type Properties = BTreeMap<String, Scalar>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GraphNode {
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl GraphNode {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The first [`IDENTITY_KEYS`] entry carried by this node.
    pub fn identity_key(&self) -> Option<&'static str> {
        IDENTITY_KEYS
            .iter()
            .copied()
            .find(|key| self.properties.contains_key(*key))
    }

    /// Properties that identify this node in a merge pattern. Falls back to every
    /// property when no identity key is present.
    pub fn identity(&self) -> Properties {
        match self.identity_key() {
            Some(key) => self
                .properties
                .get_key_value(key)
                .map(|(k, v)| (k.clone(), v.clone()))
                .into_iter()
                .collect(),
            None => self.properties.clone(),
        }
    }

    /// A matcher that resolves back to this node.
    pub fn reference(&self) -> NodeRef {
        NodeRef {
            labels: self.labels.clone(),
            properties: self.identity(),
        }
    }
}

/// Edge endpoint matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NodeRef {
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl NodeRef {
    pub fn matches(&self, node: &GraphNode) -> bool {
        self.labels.is_subset(&node.labels)
            && self
                .properties
                .iter()
                .all(|(key, value)| node.properties.get(key) == Some(value))
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for label in &self.labels {
            write!(f, ":{label}")?;
        }
        if !self.properties.is_empty() {
            let props: Vec<String> = self
                .properties
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect();
            write!(f, " {{{}}}", props.join(", "))?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: NodeRef,
    pub target: NodeRef,
    #[serde(rename = "type")]
    pub edge_type: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Target,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Source => write!(f, "source"),
            Endpoint::Target => write!(f, "target"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphValidationError {
    #[error("node {0} has no labels")]
    NodeWithoutLabels(usize),
    #[error("node {0} has an empty label")]
    EmptyNodeLabel(usize),
    #[error("edge {0} has an empty type")]
    EmptyEdgeType(usize),
    #[error("edge {edge} {endpoint} must carry at least one label and one property")]
    UnderspecifiedEndpoint { edge: usize, endpoint: Endpoint },
    #[error("edge {edge} {endpoint} {reference} does not match any declared node")]
    DanglingEndpoint {
        edge: usize,
        endpoint: Endpoint,
        reference: String,
    },
    #[error("edge {edge} {endpoint} {reference} matches {matches} declared nodes")]
    AmbiguousEndpoint {
        edge: usize,
        endpoint: Endpoint,
        reference: String,
        matches: usize,
    },
}

impl RagraphError for GraphValidationError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::InvalidArgument
    }
}

impl Graph {
    pub fn validate(&self) -> Result<(), GraphValidationError> {
        for (i, node) in self.nodes.iter().enumerate() {
            if node.labels.is_empty() {
                return Err(GraphValidationError::NodeWithoutLabels(i));
            }
            if node.labels.iter().any(|label| label.trim().is_empty()) {
                return Err(GraphValidationError::EmptyNodeLabel(i));
            }
        }

        for (i, edge) in self.edges.iter().enumerate() {
            if edge.edge_type.trim().is_empty() {
                return Err(GraphValidationError::EmptyEdgeType(i));
            }
            self.resolve_endpoint(i, Endpoint::Source, &edge.source)?;
            self.resolve_endpoint(i, Endpoint::Target, &edge.target)?;
        }

        Ok(())
    }

    /// Index of the declared node an endpoint refers to.
    pub fn resolve(&self, reference: &NodeRef) -> Option<usize> {
        let mut hits = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| reference.matches(node))
            .map(|(i, _)| i);
        match (hits.next(), hits.next()) {
            (Some(i), None) => Some(i),
            _ => None,
        }
    }

    fn resolve_endpoint(
        &self,
        edge: usize,
        endpoint: Endpoint,
        reference: &NodeRef,
    ) -> Result<usize, GraphValidationError> {
        if reference.labels.is_empty() || reference.properties.is_empty() {
            return Err(GraphValidationError::UnderspecifiedEndpoint { edge, endpoint });
        }

        let hits: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| reference.matches(node))
            .map(|(i, _)| i)
            .collect();

        match hits.as_slice() {
            [only] => Ok(*only),
            [] => Err(GraphValidationError::DanglingEndpoint {
                edge,
                endpoint,
                reference: reference.to_string(),
            }),
            many => Err(GraphValidationError::AmbiguousEndpoint {
                edge,
                endpoint,
                reference: reference.to_string(),
                matches: many.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice_acme() -> Graph {
        let alice = GraphNode::new(["Person"]).with_property("name", "Alice");
        let acme = GraphNode::new(["Company"]).with_property("name", "Acme");
        Graph {
            edges: vec![GraphEdge {
                source: alice.reference(),
                target: acme.reference(),
                edge_type: "WORKS_FOR".to_string(),
                properties: Properties::new(),
            }],
            nodes: vec![alice, acme],
        }
    }

    #[test]
    fn resolvable_graph_is_accepted() {
        let graph = alice_acme();
        assert!(graph.validate().is_ok());
        assert_eq!(graph.resolve(&graph.edges[0].target), Some(1));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let mut graph = alice_acme();
        graph.edges[0].target = GraphNode::new(["Company"])
            .with_property("name", "Globex")
            .reference();

        let err = graph.validate().unwrap_err();
        assert!(matches!(
            err,
            GraphValidationError::DanglingEndpoint {
                edge: 0,
                endpoint: Endpoint::Target,
                ..
            }
        ));
    }

    #[test]
    fn ambiguous_endpoint_is_rejected() {
        let mut graph = alice_acme();
        graph
            .nodes
            .push(GraphNode::new(["Person"]).with_property("name", "Alice"));
        assert!(matches!(
            graph.validate(),
            Err(GraphValidationError::AmbiguousEndpoint { matches: 2, .. })
        ));
    }

    #[test]
    fn decodes_extraction_payload_shape() {
        let raw = r#"{
            "nodes": [
                {"labels": ["Person"], "properties": {"name": "Alice", "age": 41}},
                {"labels": ["Company"], "properties": {"name": "TechCorp"}}
            ],
            "edges": [{
                "source": {"labels": ["Person"], "properties": {"name": "Alice"}},
                "target": {"labels": ["Company"], "properties": {"name": "TechCorp"}},
                "type": "WORKS_AS",
                "properties": {"role": "CEO"}
            }]
        }"#;

        let graph: Graph = serde_json::from_str(raw).unwrap();
        assert_eq!(graph.nodes[0].properties["age"], Scalar::Integer(41));
        assert_eq!(graph.edges[0].edge_type, "WORKS_AS");
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn nested_property_values_do_not_decode() {
        let raw = r#"{"nodes": [{"labels": ["X"], "properties": {"tags": {"a": 1}}}], "edges": []}"#;
        assert!(serde_json::from_str::<Graph>(raw).is_err());
    }
}
