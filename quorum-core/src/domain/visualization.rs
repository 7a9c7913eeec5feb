//! Graph visualization for a `WorkflowDef` (SPEC_FULL §B.5 "Graph
//! visualisation"): debugging aid only, no UI attached.
//!
//! Grounded on the teacher's `graph::visualization::{generate_dot,
//! generate_text}`, adapted from a generic `CompiledStateGraph<S>` to the
//! fixed `WorkflowDef` phase graph this core runs.

use std::fmt::Write;

use super::workflow_def::WorkflowDef;

/// Generate a Graphviz DOT representation of a workflow's phase graph.
/// Router phases fan out to every phase with no incoming static edge, since
/// their destination is decided at runtime (§4.6 "router").
pub fn generate_dot(workflow: &WorkflowDef) -> String {
    let mut dot = String::from("digraph {\n");
    dot.push_str("  rankdir=LR;\n");
    dot.push_str("  node [shape=box];\n\n");

    dot.push_str("  \"__start__\" [label=\"START\", style=bold, fillcolor=lightgreen];\n");
    dot.push_str("  \"__end__\" [label=\"END\", style=bold, fillcolor=lightcoral];\n\n");

    for phase in &workflow.phases {
        dot.push_str(&format!(
            "  \"{}\" [label=\"{} ({:?})\"];\n",
            phase.id, phase.id, phase.pattern_type
        ));
    }
    dot.push('\n');

    if let Some(entry) = workflow.entry() {
        dot.push_str(&format!("  \"__start__\" -> \"{}\";\n", entry.id));
    }

    let has_outgoing: std::collections::HashSet<&str> =
        workflow.edges.iter().map(|(from, _)| from.as_str()).collect();

    for (from, to) in &workflow.edges {
        dot.push_str(&format!("  \"{}\" -> \"{}\";\n", from, to));
    }
    for phase in &workflow.phases {
        if !has_outgoing.contains(phase.id.as_str()) {
            dot.push_str(&format!("  \"{}\" -> \"__end__\";\n", phase.id));
        }
    }

    dot.push_str("}\n");
    dot
}

/// Generate a plain-text rendering of a workflow's phase order, for logs and
/// terminals that can't render DOT.
pub fn generate_text(workflow: &WorkflowDef) -> String {
    let mut text = String::new();
    writeln!(text, "Workflow: {} ({})", workflow.name, workflow.id).unwrap();
    writeln!(text, "Phases: {}", workflow.phases.len()).unwrap();
    writeln!(text).unwrap();

    for phase in &workflow.phases {
        writeln!(
            text,
            "  {} [{:?}, gate={:?}, participants={}]",
            phase.id,
            phase.pattern_type,
            phase.gate,
            phase.participants.join(", ")
        )
        .unwrap();
        if let Some(to) = workflow.next_after(&phase.id) {
            writeln!(text, "    -> {}", to).unwrap();
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GateKind, Phase, PatternType};

    fn sample() -> WorkflowDef {
        WorkflowDef::new(
            "w1",
            "Sequential review",
            vec![
                Phase::new("a", PatternType::Solo, vec!["alpha".into()], GateKind::Always),
                Phase::new("b", PatternType::Solo, vec!["beta".into()], GateKind::Always),
            ],
        )
        .with_edge("a", "b")
    }

    #[test]
    fn dot_contains_nodes_and_edges() {
        let dot = generate_dot(&sample());
        assert!(dot.contains("digraph"));
        assert!(dot.contains("\"a\""));
        assert!(dot.contains("\"b\""));
        assert!(dot.contains("\"a\" -> \"b\""));
        assert!(dot.contains("\"__start__\" -> \"a\""));
        assert!(dot.contains("\"b\" -> \"__end__\""));
    }

    #[test]
    fn text_lists_phases_in_order() {
        let text = generate_text(&sample());
        assert!(text.contains("Workflow: Sequential review"));
        assert!(text.contains("a [Solo"));
        assert!(text.contains("-> b"));
    }
}
