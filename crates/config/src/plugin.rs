//! Plugins digesting one top-level configuration section each.

use std::{collections::BTreeSet, fmt, sync::Arc};

use crate::{error::ConfigurationError, node::Node};

/// Function consuming a section; `None` signals there is nothing to retain.
pub type Digest = Arc<dyn Fn(Node) -> anyhow::Result<Option<Node>> + Send + Sync>;

/// Plugin to digest a top-level configuration section.
///
/// Plugins are identified by identity rather than by section name; the
/// orchestrator keys its output by the plugin's `Arc`.
#[derive(Clone)]
pub struct SectionPlugin {
    section: String,
    digest: Digest,
    required: bool,
    before: BTreeSet<String>,
    after: BTreeSet<String>,
}

impl SectionPlugin {
    /// Create an optional plugin without ordering constraints.
    pub fn new<F>(section: impl Into<String>, digest: F) -> Self
    where
        F: Fn(Node) -> anyhow::Result<Option<Node>> + Send + Sync + 'static,
    {
        Self {
            section: section.into(),
            digest: Arc::new(digest),
            required: false,
            before: BTreeSet::new(),
            after: BTreeSet::new(),
        }
    }

    /// Create a plugin from discovery option strings.
    ///
    /// Recognised options:
    /// - `required`: the section must be present.
    /// - `before=<other>`: this plugin is processed before section `other`.
    /// - `after=<other>`: this plugin is processed after section `other`.
    ///
    /// # Errors
    ///
    /// Any other option is rejected.
    pub fn from_options<F, S>(section: impl Into<String>, digest: F, options: &[S]) -> Result<Self, ConfigurationError>
    where
        F: Fn(Node) -> anyhow::Result<Option<Node>> + Send + Sync + 'static,
        S: AsRef<str>,
    {
        let mut plugin = Self::new(section, digest);
        for option in options {
            let option = option.as_ref().trim();
            if option == "required" {
                plugin.required = true;
                continue;
            }
            let (key, value) = option.split_once('=').unwrap_or((option, ""));
            let (key, value) = (key.trim(), value.trim());
            match key {
                "before" if !value.is_empty() => {
                    plugin.before.insert(value.to_string());
                }
                "after" if !value.is_empty() => {
                    plugin.after.insert(value.to_string());
                }
                _ => {
                    return Err(ConfigurationError::msg(format!(
                        "unrecognized config section option '{option}' for section plugin '{}'",
                        plugin.section
                    )));
                }
            }
        }
        Ok(plugin)
    }

    /// Mark the section as mandatory.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Process this plugin before the plugin for `section`.
    pub fn before(mut self, section: impl Into<String>) -> Self {
        self.before.insert(section.into());
        self
    }

    /// Process this plugin after the plugin for `section`.
    pub fn after(mut self, section: impl Into<String>) -> Self {
        self.after.insert(section.into());
        self
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn runs_before(&self) -> &BTreeSet<String> {
        &self.before
    }

    pub fn runs_after(&self) -> &BTreeSet<String> {
        &self.after
    }

    /// Invoke the digest on the section's data.
    pub fn digest(&self, data: Node) -> anyhow::Result<Option<Node>> {
        (self.digest)(data)
    }

    /// Wrap into the shared handle used as the plugin's identity.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl fmt::Debug for SectionPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionPlugin")
            .field("section", &self.section)
            .field("required", &self.required)
            .field("before", &self.before)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}
