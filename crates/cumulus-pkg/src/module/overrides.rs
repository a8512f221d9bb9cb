/*
 * module/overrides.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Merging caller attributes into module resources.
 */

use cumulus_yaml::Node;

use super::config::ModuleConfig;
use super::resolve::ReferenceContext;
use super::{InlineMode, MODULE_EXTENSION};
use crate::{PackageError, Result};

/// Blocks merged key by key, the caller's value replacing the module's.
const PROPERTY_LIKE: [&str; 4] = ["Properties", "CreationPolicy", "Metadata", "UpdatePolicy"];

/// Attributes where a caller value replaces the module value outright.
const SCALAR_ATTRIBUTES: [&str; 3] = ["DeletionPolicy", "UpdateReplacePolicy", "Condition"];

const DEPENDS_ON: &str = "DependsOn";

/// Check that every override names a module resource and leaves module
/// parameters alone.
pub(crate) fn validate(module: &Node, config: &ModuleConfig, mode: InlineMode) -> Result<()> {
    let Some(overrides) = &config.overrides else {
        return Ok(());
    };
    let entries = overrides.as_mapping().ok_or_else(|| {
        PackageError::structural(format!("{} Overrides must be a mapping", config.name))
    })?;
    let resources = module.get("Resources");
    let params = module.get("Parameters");

    for entry in entries {
        let target = entry.key_str();
        if mode == InlineMode::Extension && target == MODULE_EXTENSION {
            return Err(PackageError::validation(format!(
                "{} cannot override {}; set its attributes on the resource itself",
                config.name, MODULE_EXTENSION
            )));
        }
        if !resources.is_some_and(|r| r.contains_key(target)) {
            return Err(PackageError::validation(format!(
                "{} override not found: {}",
                config.name, target
            )));
        }
        let Some(props) = entry.value.get("Properties") else {
            continue;
        };
        if let Some(param) = props.keys().find(|key| params.is_some_and(|p| p.contains_key(key))) {
            return Err(PackageError::validation(format!(
                "cannot override module parameter {}",
                param
            )));
        }
    }
    Ok(())
}

/// Merge the caller's attribute blocks into `resource`.
///
/// Within a property-like block each caller key replaces the module's value
/// for that key wholesale. `Properties` keys naming module parameters bind
/// those parameters and are not copied.
pub(crate) fn merge_blocks(resource: &mut Node, caller: &Node, ctx: &ReferenceContext) {
    for block in PROPERTY_LIKE {
        let Some(entries) = caller.get(block).and_then(Node::as_mapping) else {
            continue;
        };
        if !resource.get(block).is_some_and(Node::is_mapping) {
            resource.insert(block, Node::empty_mapping());
        }
        let Some(target) = resource.get_mut(block) else {
            continue;
        };
        for entry in entries {
            let key = entry.key_str();
            if block == "Properties" && ctx.is_param(key) {
                continue;
            }
            target.insert(key, entry.value.clone());
        }
    }

    for attribute in SCALAR_ATTRIBUTES {
        if let Some(value) = caller.get(attribute) {
            resource.insert(attribute, value.clone());
        }
    }
}

/// Combine module and caller `DependsOn` lists.
///
/// Module entries naming module resources are renamed; caller entries are
/// in the parent's scope and pass through. Duplicates are kept.
pub(crate) fn merge_depends_on(resource: &mut Node, caller: Option<&Node>, ctx: &ReferenceContext) {
    let mut names: Vec<String> = dependency_names(resource.get(DEPENDS_ON))
        .into_iter()
        .map(|name| ctx.rename(&name).unwrap_or(name))
        .collect();
    names.extend(dependency_names(caller));

    let mut seen = std::collections::HashSet::new();
    for name in &names {
        if !seen.insert(name.as_str()) {
            tracing::warn!(dependency = %name, "Duplicate DependsOn entry after inlining");
        }
    }

    match names.len() {
        0 => {
            resource.remove(DEPENDS_ON);
        }
        1 => {
            resource.insert(DEPENDS_ON, Node::scalar(names.remove(0)));
        }
        _ => {
            resource.insert(
                DEPENDS_ON,
                Node::sequence(names.into_iter().map(Node::scalar).collect()),
            );
        }
    }
}

/// A scalar may list several names separated by spaces.
fn dependency_names(node: Option<&Node>) -> Vec<String> {
    let Some(node) = node else {
        return Vec::new();
    };
    if let Some(text) = node.as_str() {
        return text.split_whitespace().map(str::to_string).collect();
    }
    node.as_sequence()
        .unwrap_or(&[])
        .iter()
        .filter_map(Node::as_str)
        .map(str::to_string)
        .collect()
}
