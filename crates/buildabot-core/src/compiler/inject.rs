//! Template variable injection.
//!
//! For every entity with a registered [`VariableBuilder`], each text file in
//! that entity's subtree is rewritten by substituting `${key}` placeholders.
//! An entity whose files reference an unknown key fails as a whole and its
//! files stay untouched; sibling entities are unaffected.

use std::collections::BTreeMap;

use buildabot_types::definition::DeploymentRecord;
use buildabot_types::error::CompileError;
use buildabot_types::tree::{VirtualTree, file_name, file_stem};

use super::plugins::{OVERLAY_FILE_NAME, PluginRegistry, VariableBuilder};

/// File stem of the per-entity variable builder (`variables.toml`, ...).
pub const VARIABLES_FILE_STEM: &str = "variables";

/// Substitute variables for every entity that has a builder.
///
/// Returns the failures keyed by entity name.
pub fn inject_variables(
    tree: &mut VirtualTree,
    plugins: &PluginRegistry,
) -> BTreeMap<String, CompileError> {
    let mut failures = BTreeMap::new();

    for entity in tree.entity_names() {
        let Some(builder) = plugins.variables_for(&entity) else {
            continue;
        };

        match render_entity(tree, &entity, builder) {
            Ok(rewritten) => {
                tracing::debug!(entity = %entity, files = rewritten.len(), "Injected template variables");
                tree.commit(rewritten);
            }
            Err(err) => {
                tracing::warn!(entity = %entity, error = %err, "Template injection failed");
                failures.insert(entity, err);
            }
        }
    }

    failures
}

/// Render every file of one entity without touching the tree.
fn render_entity(
    tree: &VirtualTree,
    entity: &str,
    builder: &dyn VariableBuilder,
) -> Result<BTreeMap<String, String>, CompileError> {
    let variables = builder.variables().map_err(|reason| CompileError::Plugin {
        entity: entity.to_string(),
        reason,
    })?;

    let entity_dir = tree.entity_path(entity, "");
    let mut rewritten = BTreeMap::new();

    for (path, content) in tree.entity_files(entity) {
        if is_build_input(&entity_dir, path) {
            continue;
        }
        let rendered = substitute(content, &variables).map_err(|key| {
            CompileError::UndefinedVariable {
                entity: entity.to_string(),
                path: path.clone(),
                key,
            }
        })?;
        if rendered != *content {
            rewritten.insert(path.clone(), rendered);
        }
    }

    Ok(rewritten)
}

/// The builder file and the deployment record sit directly in the entity
/// directory and are never templated.
fn is_build_input(entity_dir: &str, path: &str) -> bool {
    let Some(rest) = path.strip_prefix(entity_dir).and_then(|r| r.strip_prefix('/')) else {
        return false;
    };
    if rest.contains('/') {
        return false;
    }
    let name = file_name(rest);
    name == DeploymentRecord::FILE_NAME
        || name == OVERLAY_FILE_NAME
        || file_stem(rest) == VARIABLES_FILE_STEM
}

/// Replace `${key}` placeholders in `text`.
///
/// - `$${key}` is an escape and renders a literal `${key}`.
/// - Whitespace inside the braces is ignored (`${ key }`).
/// - Anything that is not a well-formed placeholder (`{search}`, `$5`,
///   `${not a key}`) is copied through unchanged.
///
/// Returns the first referenced key that has no value.
pub fn substitute(text: &str, variables: &BTreeMap<String, String>) -> Result<String, String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(idx) = rest.find('$') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        if let Some(escaped) = tail.strip_prefix("$${") {
            out.push_str("${");
            rest = escaped;
            continue;
        }

        if let Some(body) = tail.strip_prefix("${") {
            if let Some(end) = body.find('}') {
                let key = body[..end].trim();
                if is_key(key) {
                    let value = variables.get(key).ok_or_else(|| key.to_string())?;
                    out.push_str(value);
                    rest = &body[end + 1..];
                    continue;
                }
            }
        }

        out.push('$');
        rest = &tail[1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn is_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::plugins::StaticVariables;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitute_replaces_known_keys() {
        let out = substitute("Hello ${name}, from ${ company }!", &vars(&[("name", "Ada"), ("company", "Acme")]));
        assert_eq!(out.unwrap(), "Hello Ada, from Acme!");
    }

    #[test]
    fn test_substitute_reports_missing_key() {
        let err = substitute("Hi ${missing}", &vars(&[])).unwrap_err();
        assert_eq!(err, "missing");
    }

    #[test]
    fn test_substitute_leaves_search_token_and_dollars() {
        let text = "Use: {search} for $5 or ${not a key} and $";
        assert_eq!(substitute(text, &vars(&[])).unwrap(), text);
    }

    #[test]
    fn test_substitute_escape() {
        let out = substitute("literal $${name} and ${name}", &vars(&[("name", "Ada")]));
        assert_eq!(out.unwrap(), "literal ${name} and Ada");
    }

    #[test]
    fn test_substitute_unterminated_placeholder_passes_through() {
        assert_eq!(substitute("${name", &vars(&[])).unwrap(), "${name");
    }

    #[test]
    fn test_inject_fails_only_offending_entity() {
        let mut tree = VirtualTree::from_relative(
            "/defs",
            [
                ("support/identity/backstory.txt", "You work at ${company}."),
                ("support/variables.toml", "company = \"${company}\""),
                ("sales/identity/backstory.txt", "You sell for ${company} in ${region}."),
                ("plain/identity/backstory.txt", "Untouched ${company}"),
            ],
        );
        let mut plugins = PluginRegistry::new();
        plugins.register_variables("support", [("company", "Acme")].into_iter().collect::<StaticVariables>());
        plugins.register_variables("sales", [("company", "Acme")].into_iter().collect::<StaticVariables>());

        let failures = inject_variables(&mut tree, &plugins);

        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures["sales"],
            CompileError::UndefinedVariable { key, .. } if key == "region"
        ));
        assert_eq!(
            tree.get("/defs/support/identity/backstory.txt"),
            Some("You work at Acme.")
        );
        // failed entity keeps its original text
        assert_eq!(
            tree.get("/defs/sales/identity/backstory.txt"),
            Some("You sell for ${company} in ${region}.")
        );
        // entity without a builder is not templated
        assert_eq!(
            tree.get("/defs/plain/identity/backstory.txt"),
            Some("Untouched ${company}")
        );
        // the builder file itself is not templated
        assert_eq!(
            tree.get("/defs/support/variables.toml"),
            Some("company = \"${company}\"")
        );
    }

    #[test]
    fn test_builder_error_is_plugin_failure() {
        struct Broken;
        impl VariableBuilder for Broken {
            fn variables(&self) -> Result<BTreeMap<String, String>, String> {
                Err("env var SECRET is not set".to_string())
            }
        }

        let mut tree = VirtualTree::from_relative("/defs", [("support/identity/backstory.txt", "x")]);
        let mut plugins = PluginRegistry::new();
        plugins.register_variables("support", Broken);

        let failures = inject_variables(&mut tree, &plugins);
        assert!(matches!(&failures["support"], CompileError::Plugin { reason, .. } if reason.contains("SECRET")));
    }
}
