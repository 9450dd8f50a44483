//! Reading configuration documents from YAML or JSON.

use std::{fs, path::Path};

use anyhow::Context;

use crate::{error::ConfigurationError, node::Node};

/// Parse a YAML document.
pub fn parse_yaml(text: &str) -> anyhow::Result<Node> {
    serde_yaml::from_str(text).context("malformed YAML document")
}

/// Parse a JSON document.
pub fn parse_json(text: &str) -> anyhow::Result<Node> {
    serde_json::from_str(text).context("malformed JSON document")
}

/// Read the document at `path`.
///
/// Files with a `.json` extension are parsed as JSON, everything else as
/// YAML. Failures are located at the file path.
pub fn load_document(path: impl AsRef<Path>) -> Result<Node, ConfigurationError> {
    let path = path.as_ref();
    let location = path.display().to_string();
    let read = || -> anyhow::Result<Node> {
        let text = fs::read_to_string(path).with_context(|| format!("cannot read {location}"))?;
        let is_json = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
        if is_json { parse_json(&text) } else { parse_yaml(&text) }
    };
    read().map_err(|error| ConfigurationError::new(error).at(location.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_and_json_produce_the_same_tree() {
        let yaml = parse_yaml("pipeline:\n  - __type__: a.B\n    rate: 1.5\n    enabled: true\n").expect("yaml");
        let json = parse_json(r#"{"pipeline": [{"__type__": "a.B", "rate": 1.5, "enabled": true}]}"#).expect("json");

        assert_eq!(yaml, json);
        let pipeline = yaml.as_mapping().and_then(|root| root.get("pipeline")).expect("pipeline");
        assert_eq!(pipeline.as_sequence().map(<[Node]>::len), Some(1));
    }

    #[test]
    fn scalars_keep_their_kind() {
        let node = parse_yaml("[1, 2.5, text, null, false]").expect("yaml");
        let kinds: Vec<&str> = node.as_sequence().expect("sequence").iter().map(Node::kind).collect();
        assert_eq!(kinds, vec!["integer", "float", "string", "null", "bool"]);
    }

    #[test]
    fn missing_file_is_located_at_its_path() {
        let error = load_document("/nonexistent/loadtide.yaml").expect_err("missing file");
        assert_eq!(error.location(), Some("/nonexistent/loadtide.yaml"));
    }
}
