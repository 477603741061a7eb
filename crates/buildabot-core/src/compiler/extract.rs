//! Tree extraction: abilities, dataset files and identity per entity.
//!
//! Each pass is independent and tolerant of a missing subtree (the slice is
//! `None`). Structural problems inside a subtree that does exist are fatal
//! for the entity.

use std::collections::BTreeMap;

use buildabot_types::definition::{Ability, DatasetFile, Identity, PartialDefinition};
use buildabot_types::error::CompileError;
use buildabot_types::tree::{VirtualTree, file_stem};

pub const ABILITIES_DIR: &str = "abilities";
pub const DATASET_DIR: &str = "dataset";
pub const IDENTITY_DIR: &str = "identity";

const ABILITY_FILES: [&str; 2] = ["description", "instruction"];
const IDENTITY_FILES: [&str; 3] = ["backstory", "matched", "mismatched"];

/// Run all three passes for one entity and merge the slices.
pub fn extract_entity(tree: &VirtualTree, entity: &str) -> Result<PartialDefinition, CompileError> {
    Ok(PartialDefinition {
        abilities: extract_abilities(tree, entity)?,
        dataset_files: extract_dataset(tree, entity),
        identity: extract_identity(tree, entity)?,
    })
}

/// Group `<entity>/abilities/<ability>/*` into [`Ability`] entries.
pub fn extract_abilities(
    tree: &VirtualTree,
    entity: &str,
) -> Result<Option<Vec<Ability>>, CompileError> {
    let dir = tree.entity_path(entity, ABILITIES_DIR);
    let prefix = format!("{dir}/");

    // ability name -> (relative file name -> content)
    let mut groups: BTreeMap<&str, BTreeMap<&str, &str>> = BTreeMap::new();
    for (path, content) in tree.files_under(&dir) {
        let rest = &path[prefix.len()..];
        let Some((ability, file)) = rest.split_once('/') else {
            return Err(CompileError::MalformedAbility {
                entity: entity.to_string(),
                dir: dir.clone(),
                found: rest.to_string(),
            });
        };
        groups.entry(ability).or_default().insert(file, content.as_str());
    }

    if groups.is_empty() {
        return Ok(None);
    }

    let mut abilities = Vec::with_capacity(groups.len());
    for (name, files) in groups {
        let ability_dir = format!("{dir}/{name}");
        let slots = exact_slots(&files, &ABILITY_FILES).ok_or_else(|| {
            CompileError::MalformedAbility {
                entity: entity.to_string(),
                dir: ability_dir.clone(),
                found: listing(&files),
            }
        })?;
        abilities.push(Ability {
            name: name.to_string(),
            description: slots["description"].to_string(),
            instruction: slots["instruction"].to_string(),
        });
    }

    Ok(Some(abilities))
}

/// Every file under `<entity>/dataset/`, in path order.
pub fn extract_dataset(tree: &VirtualTree, entity: &str) -> Option<Vec<DatasetFile>> {
    let dir = tree.entity_path(entity, DATASET_DIR);
    let files: Vec<DatasetFile> = tree
        .files_under(&dir)
        .map(|(path, content)| DatasetFile {
            file_path: path.clone(),
            contents: content.clone(),
        })
        .collect();

    (!files.is_empty()).then_some(files)
}

/// Read `<entity>/identity/{backstory,matched,mismatched}`.
pub fn extract_identity(
    tree: &VirtualTree,
    entity: &str,
) -> Result<Option<Identity>, CompileError> {
    let dir = tree.entity_path(entity, IDENTITY_DIR);
    let prefix = format!("{dir}/");

    let files: BTreeMap<&str, &str> = tree
        .files_under(&dir)
        .map(|(path, content)| (&path[prefix.len()..], content.as_str()))
        .collect();

    if files.is_empty() {
        return Ok(None);
    }

    let slots = exact_slots(&files, &IDENTITY_FILES).ok_or_else(|| {
        CompileError::MalformedIdentity {
            entity: entity.to_string(),
            dir: dir.clone(),
            found: listing(&files),
        }
    })?;

    Ok(Some(Identity {
        backstory: slots["backstory"].to_string(),
        matched: slots["matched"].to_string(),
        mismatched: slots["mismatched"].to_string(),
    }))
}

/// Map file stems to contents when `files` holds exactly one flat file per
/// expected stem and nothing else.
fn exact_slots<'a>(
    files: &BTreeMap<&'a str, &'a str>,
    expected: &[&'a str],
) -> Option<BTreeMap<&'a str, &'a str>> {
    if files.len() != expected.len() {
        return None;
    }
    let mut slots = BTreeMap::new();
    for (name, content) in files {
        if name.contains('/') {
            return None;
        }
        let stem = file_stem(name);
        let slot = expected.iter().find(|e| **e == stem)?;
        if slots.insert(*slot, *content).is_some() {
            return None;
        }
    }
    Some(slots)
}

fn listing(files: &BTreeMap<&str, &str>) -> String {
    if files.is_empty() {
        return "nothing".to_string();
    }
    files.keys().copied().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(entries: &[(&str, &str)]) -> VirtualTree {
        VirtualTree::from_relative("/defs", entries.iter().copied())
    }

    #[test]
    fn test_extracts_all_slices() {
        let tree = tree(&[
            ("support/abilities/greet/instruction.txt", "Say hi"),
            ("support/abilities/greet/description.txt", "Greets"),
            ("support/dataset/faq.txt", "Answer: {search}"),
            ("support/identity/backstory.txt", "You help."),
            ("support/identity/matched.txt", "Use: {search}"),
            ("support/identity/mismatched.txt", "None: {search}"),
        ]);

        let partial = extract_entity(&tree, "support").unwrap();
        let abilities = partial.abilities.unwrap();
        assert_eq!(abilities.len(), 1);
        assert_eq!(abilities[0].name, "greet");
        assert_eq!(abilities[0].instruction, "Say hi");
        assert_eq!(abilities[0].description, "Greets");

        let files = partial.dataset_files.unwrap();
        assert_eq!(files[0].file_path, "/defs/support/dataset/faq.txt");

        let identity = partial.identity.unwrap();
        assert_eq!(identity.matched, "Use: {search}");
    }

    #[test]
    fn test_missing_subtrees_contribute_nothing() {
        let tree = tree(&[("support/dataset/faq.txt", "x")]);
        let partial = extract_entity(&tree, "support").unwrap();
        assert!(partial.abilities.is_none());
        assert!(partial.identity.is_none());
        assert_eq!(partial.dataset_files.map(|f| f.len()), Some(1));
    }

    #[test]
    fn test_ability_with_three_files_is_malformed() {
        let tree = tree(&[
            ("support/abilities/greet/instruction.txt", "a"),
            ("support/abilities/greet/description.txt", "b"),
            ("support/abilities/greet/notes.txt", "c"),
        ]);
        let err = extract_abilities(&tree, "support").unwrap_err();
        match err {
            CompileError::MalformedAbility { dir, found, .. } => {
                assert_eq!(dir, "/defs/support/abilities/greet");
                assert!(found.contains("notes.txt"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_ability_missing_description_is_malformed() {
        let tree = tree(&[("support/abilities/greet/instruction.txt", "a")]);
        assert!(matches!(
            extract_abilities(&tree, "support"),
            Err(CompileError::MalformedAbility { .. })
        ));
    }

    #[test]
    fn test_ability_with_duplicate_stem_is_malformed() {
        let tree = tree(&[
            ("support/abilities/greet/instruction.txt", "a"),
            ("support/abilities/greet/instruction.md", "b"),
        ]);
        assert!(extract_abilities(&tree, "support").is_err());
    }

    #[test]
    fn test_stray_file_under_abilities_is_malformed() {
        let tree = tree(&[("support/abilities/readme.txt", "a")]);
        assert!(matches!(
            extract_abilities(&tree, "support"),
            Err(CompileError::MalformedAbility { dir, .. }) if dir == "/defs/support/abilities"
        ));
    }

    #[test]
    fn test_identity_with_extra_file_is_malformed() {
        let tree = tree(&[
            ("support/identity/backstory.txt", "a"),
            ("support/identity/matched.txt", "{search}"),
            ("support/identity/mismatched.txt", "{search}"),
            ("support/identity/extra.txt", "x"),
        ]);
        assert!(matches!(
            extract_identity(&tree, "support"),
            Err(CompileError::MalformedIdentity { .. })
        ));
    }

    #[test]
    fn test_identity_missing_file_is_malformed() {
        let tree = tree(&[
            ("support/identity/backstory.txt", "a"),
            ("support/identity/matched.txt", "{search}"),
        ]);
        assert!(extract_identity(&tree, "support").is_err());
    }

    #[test]
    fn test_abilities_are_sorted_by_name() {
        let tree = tree(&[
            ("support/abilities/zeta/instruction.txt", "z"),
            ("support/abilities/zeta/description.txt", "z"),
            ("support/abilities/alpha/instruction.txt", "a"),
            ("support/abilities/alpha/description.txt", "a"),
        ]);
        let names: Vec<String> = extract_abilities(&tree, "support")
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
