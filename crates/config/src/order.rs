//! Processing order of section plugins.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashSet},
    sync::Arc,
};

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    error::{ConfigurationError, ROOT},
    plugin::SectionPlugin,
};

/// Build a topologically ordered plugin list.
///
/// `before`/`after` constraints refer to section names. Among plugins whose
/// constraints are satisfied, the one declared first is processed first.
/// Constraints naming a section no plugin claims are ignored.
///
/// Returns an error for duplicate sections, self references, or cycles.
pub fn order_plugins(plugins: &[Arc<SectionPlugin>]) -> Result<Vec<Arc<SectionPlugin>>, ConfigurationError> {
    let mut lookup: IndexMap<&str, usize> = IndexMap::new();
    for (index, plugin) in plugins.iter().enumerate() {
        if lookup.insert(plugin.section(), index).is_some() {
            return Err(ConfigurationError::msg(format!("multiple plugins for section '{}'", plugin.section())).at(ROOT));
        }
    }

    let mut in_degrees = vec![0_usize; plugins.len()];
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); plugins.len()];
    let mut seen_edges = HashSet::new();
    let mut add_edge = |from: usize, to: usize| {
        if seen_edges.insert((from, to)) {
            in_degrees[to] += 1;
            adjacency[from].push(to);
        }
    };

    for (index, plugin) in plugins.iter().enumerate() {
        let constraints = plugin
            .runs_before()
            .iter()
            .map(|other| (other, true))
            .chain(plugin.runs_after().iter().map(|other| (other, false)));
        for (other, before) in constraints {
            let Some(&other_index) = lookup.get(other.as_str()) else {
                debug!(section = %plugin.section(), other = %other, "ignoring constraint on unclaimed section");
                continue;
            };
            if other_index == index {
                return Err(
                    ConfigurationError::msg(format!("section '{}' cannot be ordered relative to itself", plugin.section())).at(ROOT),
                );
            }
            if before {
                add_edge(index, other_index);
            } else {
                add_edge(other_index, index);
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..plugins.len())
        .filter(|index| in_degrees[*index] == 0)
        .map(Reverse)
        .collect();

    let mut ordered = Vec::with_capacity(plugins.len());
    while let Some(Reverse(index)) = ready.pop() {
        ordered.push(index);
        for &child in &adjacency[index] {
            in_degrees[child] -= 1;
            if in_degrees[child] == 0 {
                ready.push(Reverse(child));
            }
        }
    }

    if ordered.len() != plugins.len() {
        let remaining: Vec<&str> = plugins
            .iter()
            .enumerate()
            .filter(|(index, _)| in_degrees[*index] > 0)
            .map(|(_, plugin)| plugin.section())
            .collect();
        return Err(ConfigurationError::msg(format!(
            "cyclic section ordering involving: {}",
            remaining.join(", ")
        ))
        .at(ROOT));
    }

    Ok(ordered.into_iter().map(|index| Arc::clone(&plugins[index])).collect())
}
