//! Loading a configuration document through its section plugins.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    error::{ConfigurationError, ROOT},
    logging,
    node::{Mapping, Node},
    order::order_plugins,
    plugin::SectionPlugin,
};

/// Top-level section applied to the logging system before any plugin runs.
pub const LOGGING_SECTION: &str = "logging";

/// Values retained by section plugins, keyed by plugin identity.
#[derive(Debug, Default, Clone)]
pub struct Retained {
    entries: Vec<(Arc<SectionPlugin>, Node)>,
}

impl Retained {
    /// The value retained by `plugin`, if it retained anything.
    pub fn get(&self, plugin: &Arc<SectionPlugin>) -> Option<&Node> {
        self.entries
            .iter()
            .find(|(owner, _)| Arc::ptr_eq(owner, plugin))
            .map(|(_, value)| value)
    }

    pub fn contains(&self, plugin: &Arc<SectionPlugin>) -> bool {
        self.get(plugin).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained values in processing order.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<SectionPlugin>, &Node)> {
        self.entries.iter().map(|(plugin, value)| (plugin, value))
    }

    fn insert(&mut self, plugin: Arc<SectionPlugin>, value: Node) {
        self.entries.push((plugin, value));
    }
}

/// Load a configuration document using section plugins.
///
/// The `logging` section, if present, is applied first. Every other top-level
/// section must be claimed by a plugin. Plugins are processed in an order
/// honouring their `before`/`after` constraints.
///
/// # Errors
///
/// Unknown sections, missing required sections, ordering conflicts, and any
/// failure while digesting a section abort loading; nothing after the failing
/// section is processed.
pub fn load_configuration(document: Node, plugins: &[Arc<SectionPlugin>]) -> Result<Retained, ConfigurationError> {
    let mut sections = match document {
        Node::Mapping(mapping) => mapping,
        Node::Null => Mapping::new(),
        other => {
            return Err(
                ConfigurationError::msg(format!("expected a mapping of sections, found {}", other.kind())).at(ROOT)
            );
        }
    };

    if let Some(section) = sections.shift_remove(LOGGING_SECTION) {
        logging::configure_logging(section)
            .map_err(|error| ConfigurationError::attribute(error, LOGGING_SECTION))?;
    }

    let unknown: Vec<&str> = sections
        .keys()
        .map(String::as_str)
        .filter(|name| !plugins.iter().any(|plugin| plugin.section() == *name))
        .collect();
    if !unknown.is_empty() {
        return Err(ConfigurationError::msg(format!("unknown config sections {}", unknown.join(", "))).at(ROOT));
    }

    let mut retained = Retained::default();
    for plugin in order_plugins(plugins)? {
        let Some(data) = sections.shift_remove(plugin.section()) else {
            if plugin.is_required() {
                return Err(ConfigurationError::msg(format!("missing section '{}'", plugin.section())).at(ROOT));
            }
            debug!(section = %plugin.section(), "skipping absent optional section");
            continue;
        };
        info!(section = %plugin.section(), "loading configuration section");
        let outcome = plugin
            .digest(data)
            .map_err(|error| ConfigurationError::attribute(error, plugin.section()))?;
        if let Some(value) = outcome {
            retained.insert(plugin, value);
        }
    }
    Ok(retained)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_mapping_documents() {
        let error = load_configuration(Node::from("plain"), &[]).expect_err("scalar root");
        assert_eq!(error.location(), Some(ROOT));
        assert!(error.what().to_string().contains("found string"));
    }

    #[test]
    fn empty_document_loads_nothing() {
        let retained = load_configuration(Node::Null, &[]).expect("empty document");
        assert!(retained.is_empty());
    }
}
