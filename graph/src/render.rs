use crate::cypher::{format_map, format_name, format_pattern};
use crate::script::GraphScript;
use ragraph_core::graph::{Graph, GraphValidationError, Properties};
use std::collections::BTreeSet;

/// Renders a merge-only script for `graph`: uniqueness constraints for identity
/// properties, one `MERGE` per node and one `MATCH ... MERGE` per edge.
/// Running the script twice leaves the graph unchanged after the first run.
pub fn render_merge_script(graph: &Graph) -> Result<GraphScript, GraphValidationError> {
    graph.validate()?;

    let mut lines = Vec::new();

    let constraints: BTreeSet<(&str, &str)> = graph
        .nodes
        .iter()
        .filter_map(|node| node.identity_key().map(|key| (node, key)))
        .flat_map(|(node, key)| node.labels.iter().map(move |label| (label.as_str(), key)))
        .collect();
    for (label, key) in constraints {
        lines.push(format!(
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE;",
            format_name(label),
            format_name(key)
        ));
    }

    for node in &graph.nodes {
        let identity = node.identity();
        let rest: Properties = node
            .properties
            .iter()
            .filter(|(key, _)| !identity.contains_key(*key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut line = format!("MERGE {}", format_pattern("n", &node.labels, &identity));
        if !rest.is_empty() {
            line.push_str(&format!(" SET n += {}", format_map(&rest)));
        }
        line.push(';');
        lines.push(line);
    }

    for edge in &graph.edges {
        // validate() guarantees both endpoints resolve.
        let (Some(source), Some(target)) = (graph.resolve(&edge.source), graph.resolve(&edge.target))
        else {
            continue;
        };
        let source = &graph.nodes[source];
        let target = &graph.nodes[target];

        let mut line = format!(
            "MATCH {}, {} MERGE (a)-[r:{}]->(b)",
            format_pattern("a", &source.labels, &source.identity()),
            format_pattern("b", &target.labels, &target.identity()),
            format_name(&edge.edge_type)
        );
        if !edge.properties.is_empty() {
            line.push_str(&format!(" SET r += {}", format_map(&edge.properties)));
        }
        line.push(';');
        lines.push(line);
    }

    let mut text = lines.join("\n");
    text.push('\n');
    Ok(GraphScript::new(text))
}
