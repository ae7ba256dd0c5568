use crate::cypher::format_scalar;
use crate::script::GraphScript;
use crate::statement::{parse_statement, Assignment, NodePattern, ParseError, SetClauses, Statement};
use dashmap::DashMap;
use ragraph_core::error::{ErrorCode, RagraphError};
use ragraph_core::graph::{Properties, Scalar};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoryGraphError {
    #[error("statement {index}: {source}")]
    Parse {
        index: usize,
        #[source]
        source: ParseError,
    },
    #[error("statement {index}: variable {var} is not bound")]
    UnboundVariable { index: usize, var: String },
    #[error("statement {index}: uniqueness constraint on :{label}({property}) violated by {value}")]
    ConstraintViolation {
        index: usize,
        label: String,
        property: String,
        value: String,
    },
    #[error("script is not valid openCypher: {0}")]
    Syntax(#[from] crate::cypher::CypherSyntaxError),
}

impl RagraphError for MemoryGraphError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::InvalidArgument
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub labels: BTreeSet<String>,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEdge {
    pub source: usize,
    pub target: usize,
    pub edge_type: String,
    pub properties: Properties,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub nodes_created: usize,
    pub relationships_created: usize,
    pub properties_set: usize,
    pub constraints_added: usize,
}

#[derive(Debug, Clone, Default)]
struct GraphData {
    nodes: Vec<StoredNode>,
    edges: Vec<StoredEdge>,
    // node index -> indices of its outgoing edges
    adjacency: HashMap<usize, Vec<usize>>,
    constraints: BTreeSet<(String, String)>,
}

fn pattern_matches(pattern: &NodePattern, node: &StoredNode) -> bool {
    pattern.labels.is_subset(&node.labels)
        && pattern
            .properties
            .iter()
            .all(|(key, value)| node.properties.get(key) == Some(value))
}

fn props_match(required: &Properties, actual: &Properties) -> bool {
    required
        .iter()
        .all(|(key, value)| actual.get(key) == Some(value))
}

/// Applies assignments bound to `var`. Returns the number of properties written.
fn apply_assignments(
    index: usize,
    var: &str,
    assignments: &[Assignment],
    properties: &mut Properties,
) -> Result<usize, MemoryGraphError> {
    let mut written = 0;
    for assignment in assignments {
        if assignment.var() != var {
            return Err(MemoryGraphError::UnboundVariable {
                index,
                var: assignment.var().to_string(),
            });
        }
        match assignment {
            Assignment::Merge { properties: map, .. } => {
                for (key, value) in map {
                    properties.insert(key.clone(), value.clone());
                    written += 1;
                }
            }
            Assignment::Property { key, value, .. } => {
                properties.insert(key.clone(), value.clone());
                written += 1;
            }
        }
    }
    Ok(written)
}

fn apply_sets(
    index: usize,
    var: Option<&str>,
    sets: &SetClauses,
    created: bool,
    properties: &mut Properties,
) -> Result<usize, MemoryGraphError> {
    let phase = if created { &sets.on_create } else { &sets.on_match };
    let all: Vec<Assignment> = phase.iter().chain(sets.always.iter()).cloned().collect();
    if all.is_empty() {
        return Ok(0);
    }
    let Some(var) = var else {
        return Err(MemoryGraphError::UnboundVariable {
            index,
            var: all[0].var().to_string(),
        });
    };
    apply_assignments(index, var, &all, properties)
}

impl GraphData {
    fn add_edge(&mut self, edge: StoredEdge) -> usize {
        let id = self.edges.len();
        self.adjacency.entry(edge.source).or_default().push(id);
        self.edges.push(edge);
        id
    }

    fn outgoing(&self, source: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency
            .get(&source)
            .into_iter()
            .flat_map(|ids| ids.iter().copied())
    }

    fn check_constraints(&self, index: usize) -> Result<(), MemoryGraphError> {
        for (label, property) in &self.constraints {
            let mut seen: Vec<&Scalar> = Vec::new();
            for node in self.nodes.iter().filter(|n| n.labels.contains(label)) {
                if let Some(value) = node.properties.get(property) {
                    if seen.contains(&value) {
                        return Err(MemoryGraphError::ConstraintViolation {
                            index,
                            label: label.clone(),
                            property: property.clone(),
                            value: format_scalar(value),
                        });
                    }
                    seen.push(value);
                }
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        index: usize,
        statement: &Statement,
        stats: &mut ExecutionStats,
    ) -> Result<(), MemoryGraphError> {
        match statement {
            Statement::Constraint { label, property } => {
                if self.constraints.insert((label.clone(), property.clone())) {
                    stats.constraints_added += 1;
                }
            }
            Statement::Index { .. } => {}
            Statement::MergeNode { pattern, sets } => {
                let matched: Vec<usize> = (0..self.nodes.len())
                    .filter(|&i| pattern_matches(pattern, &self.nodes[i]))
                    .collect();

                if matched.is_empty() {
                    let mut node = StoredNode {
                        labels: pattern.labels.clone(),
                        properties: pattern.properties.clone(),
                    };
                    stats.properties_set += node.properties.len();
                    stats.properties_set +=
                        apply_sets(index, pattern.var.as_deref(), sets, true, &mut node.properties)?;
                    self.nodes.push(node);
                    stats.nodes_created += 1;
                } else {
                    for i in matched {
                        stats.properties_set += apply_sets(
                            index,
                            pattern.var.as_deref(),
                            sets,
                            false,
                            &mut self.nodes[i].properties,
                        )?;
                    }
                }
            }
            Statement::MergeEdge { matches, rel, sets } => {
                let mut bound: HashMap<&str, Vec<usize>> = HashMap::new();
                for pattern in matches {
                    let candidates: Vec<usize> = (0..self.nodes.len())
                        .filter(|&i| pattern_matches(pattern, &self.nodes[i]))
                        .collect();
                    if let Some(var) = pattern.var.as_deref() {
                        bound.insert(var, candidates.clone());
                    }
                    if candidates.is_empty() {
                        // MATCH produced no rows.
                        return Ok(());
                    }
                }

                let unbound = |var: &str| MemoryGraphError::UnboundVariable {
                    index,
                    var: var.to_string(),
                };
                let sources = bound.get(rel.from.as_str()).ok_or_else(|| unbound(&rel.from))?;
                let targets = bound.get(rel.to.as_str()).ok_or_else(|| unbound(&rel.to))?;

                let pairs: Vec<(usize, usize)> = sources
                    .iter()
                    .flat_map(|&s| targets.iter().map(move |&t| (s, t)))
                    .collect();

                for (source, target) in pairs {
                    let existing: Vec<usize> = self
                        .outgoing(source)
                        .filter(|&e| {
                            let edge = &self.edges[e];
                            edge.target == target
                                && edge.edge_type == rel.edge_type
                                && props_match(&rel.properties, &edge.properties)
                        })
                        .collect();

                    if existing.is_empty() {
                        let mut edge = StoredEdge {
                            source,
                            target,
                            edge_type: rel.edge_type.clone(),
                            properties: rel.properties.clone(),
                        };
                        stats.properties_set += edge.properties.len();
                        stats.properties_set +=
                            apply_sets(index, rel.var.as_deref(), sets, true, &mut edge.properties)?;
                        self.add_edge(edge);
                        stats.relationships_created += 1;
                    } else {
                        for e in existing {
                            stats.properties_set += apply_sets(
                                index,
                                rel.var.as_deref(),
                                sets,
                                false,
                                &mut self.edges[e].properties,
                            )?;
                        }
                    }
                }
            }
        }
        self.check_constraints(index)
    }
}

/// A process-local property graph that executes merge-dialect scripts. A
/// script is applied all-or-nothing.
#[derive(Default)]
pub struct InMemoryGraphStore {
    data: RwLock<GraphData>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn execute(&self, script: &GraphScript) -> Result<ExecutionStats, MemoryGraphError> {
        let statements = script
            .statements()?
            .iter()
            .enumerate()
            .map(|(index, text)| {
                parse_statement(text).map_err(|source| MemoryGraphError::Parse { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut data = self.data.write().await;
        let mut working = data.clone();
        let mut stats = ExecutionStats::default();
        for (index, statement) in statements.iter().enumerate() {
            working.apply(index, statement, &mut stats)?;
        }
        *data = working;
        Ok(stats)
    }

    pub async fn node_count(&self) -> usize {
        self.data.read().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.data.read().await.edges.len()
    }

    pub async fn nodes(&self) -> Vec<StoredNode> {
        self.data.read().await.nodes.clone()
    }

    pub async fn edges(&self) -> Vec<StoredEdge> {
        self.data.read().await.edges.clone()
    }
}

/// Named in-memory graphs, created on first use.
#[derive(Default)]
pub struct MemoryGraphRegistry {
    graphs: DashMap<String, Arc<InMemoryGraphStore>>,
}

impl MemoryGraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, name: &str) -> Arc<InMemoryGraphStore> {
        Arc::clone(
            self.graphs
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(InMemoryGraphStore::new()))
                .value(),
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<InMemoryGraphStore>> {
        self.graphs.get(name).map(|graph| Arc::clone(graph.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "CREATE CONSTRAINT IF NOT EXISTS FOR (n:Person) REQUIRE n.name IS UNIQUE;\n\
        MERGE (n:Person {name: 'Alice'}) SET n += {age: 41};\n\
        MERGE (n:Company {name: 'Acme'});\n\
        MATCH (a:Person {name: 'Alice'}), (b:Company {name: 'Acme'}) MERGE (a)-[r:WORKS_FOR]->(b);\n";

    #[tokio::test]
    async fn second_run_changes_nothing() {
        let store = InMemoryGraphStore::new();
        let script = GraphScript::new(SCRIPT);

        let first = store.execute(&script).await.unwrap();
        assert_eq!(first.nodes_created, 2);
        assert_eq!(first.relationships_created, 1);

        let second = store.execute(&script).await.unwrap();
        assert_eq!(second.nodes_created, 0);
        assert_eq!(second.relationships_created, 0);
        assert_eq!(store.node_count().await, 2);
        assert_eq!(store.edge_count().await, 1);
    }

    #[tokio::test]
    async fn unmatched_relationship_endpoints_write_nothing() {
        let store = InMemoryGraphStore::new();
        let script = GraphScript::new(
            "MATCH (a:Person {name: 'Nobody'}), (b:Company {name: 'Acme'}) MERGE (a)-[:KNOWS]->(b);",
        );
        let stats = store.execute(&script).await.unwrap();
        assert_eq!(stats, ExecutionStats::default());
    }

    #[tokio::test]
    async fn failing_statement_rolls_back_whole_script() {
        let store = InMemoryGraphStore::new();
        let script = GraphScript::new(
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:Person) REQUIRE n.name IS UNIQUE;\n\
             MERGE (n:Person {name: 'Alice', age: 1});\n\
             MERGE (n:Person {name: 'Alice', age: 2});",
        );
        let err = store.execute(&script).await.unwrap_err();
        assert!(matches!(err, MemoryGraphError::ConstraintViolation { index: 2, .. }));
        assert_eq!(store.node_count().await, 0);
    }

    #[tokio::test]
    async fn set_on_foreign_variable_is_rejected() {
        let store = InMemoryGraphStore::new();
        let script = GraphScript::new("MERGE (n:A {id: 1}) SET m.x = 2;");
        assert!(matches!(
            store.execute(&script).await,
            Err(MemoryGraphError::UnboundVariable { .. })
        ));
    }

    #[test]
    fn registry_returns_the_same_graph_by_name() {
        let registry = MemoryGraphRegistry::new();
        let a = registry.get_or_create("g");
        let b = registry.get_or_create("g");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.get("other").is_none());
    }
}
