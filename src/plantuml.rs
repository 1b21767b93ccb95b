//! PlantUML diagram generation

use std::fmt::Write;

use crate::state::{HistoryMode, StateIndex, StateRegistry};
use crate::{EventArgs, EventId, StateId, StateMachineDefinition};

/// Generate a PlantUML state diagram from a definition, highlighting `current`
pub fn generate<S, E, CTX, A>(
    definition: &StateMachineDefinition<S, E, CTX, A>,
    current: Option<&S>,
) -> String
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    let registry = definition.registry();
    let mut out = String::from("@startuml\n");
    let _ = writeln!(out, "title {}", definition.name());
    out.push_str("skinparam state {\n  BackgroundColor<<Current>> YellowGreen\n}\n\n");

    if let Some(initial) = definition.initial_state() {
        let _ = writeln!(out, "[*] --> {:?}", initial);
    }

    // Nested state blocks, top level states in creation order.
    for (index, node) in registry.iter() {
        if node.parent().is_none() {
            write_state(&mut out, registry, index, 0);
        }
    }
    out.push('\n');

    for (index, node) in registry.iter() {
        for (event, transitions) in node.transitions().iter() {
            for transition in transitions {
                let guard = if transition.is_guarded() { " [guarded]" } else { "" };
                match transition.target() {
                    Some(target) => {
                        let _ = writeln!(
                            out,
                            "{:?} --> {:?} : {:?}{}",
                            registry.id(index),
                            registry.id(target),
                            event,
                            guard
                        );
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "{:?} : {:?}{} / internal",
                            registry.id(index),
                            event,
                            guard
                        );
                    }
                }
            }
        }
    }

    if let Some(current) = current {
        let _ = writeln!(out, "state {:?} <<Current>>", current);
    }

    out.push_str("@enduml\n");
    out
}

fn write_state<S, E, CTX, A>(
    out: &mut String,
    registry: &StateRegistry<S, E, CTX, A>,
    index: StateIndex,
    depth: usize,
) where
    S: StateId,
    E: EventId,
{
    let indent = "  ".repeat(depth);
    let node = registry.node(index);
    if !node.is_composite() {
        let _ = writeln!(out, "{indent}state {:?}", node.id());
        return;
    }

    let _ = writeln!(out, "{indent}state {:?} {{", node.id());
    if let Some(initial) = node.initial_child() {
        let _ = writeln!(out, "{indent}  [*] --> {:?}", registry.id(initial));
    }
    match node.history_mode() {
        HistoryMode::None => {}
        HistoryMode::Shallow => {
            let _ = writeln!(out, "{indent}  state \"H\" as {}_history", alias(node.id()));
        }
        HistoryMode::Deep => {
            let _ = writeln!(out, "{indent}  state \"H*\" as {}_history", alias(node.id()));
        }
    }
    for &child in node.children() {
        write_state(out, registry, child, depth + 1);
    }
    let _ = writeln!(out, "{indent}}}");
}

// Debug output reduced to characters allowed in a PlantUML alias.
fn alias<S: StateId>(id: &S) -> String {
    format!("{id:?}")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}
