//! `Rain::Module` resources and their `Map` attribute.

use cumulus_yaml::{MapEntry, Node, NodePath, PathSegment, Pattern};

use crate::directive::{DirectiveContext, DirectiveHandler};
use crate::intrinsics::is_call;
use crate::iteration::{self, MAP};
use crate::module::config::ModuleConfig;
use crate::module::{InlineMode, Placement, emit, inline, load_module, outputs};
use crate::{PackageError, Result};

pub const MODULE: &str = "Rain::Module";

/// The logical id of the resource at `path`, if `path` is `Resources/<id>`
/// followed by exactly `rest`.
fn resource_id<'p>(path: &'p NodePath, rest: &[&str]) -> Option<&'p str> {
    let segments = path.segments();
    if segments.len() != 2 + rest.len() || path.key_at(0) != Some("Resources") {
        return None;
    }
    let tail_matches = segments[2..]
        .iter()
        .zip(rest)
        .all(|(segment, key)| matches!(segment, PathSegment::Key(k) if k.as_str() == *key));
    if !tail_matches {
        return None;
    }
    path.key_at(1)
}

/// Expands a module resource with a `Map` attribute into one copy per key
/// and inlines each copy.
pub struct MapDirective {
    pattern: Pattern,
}

impl MapDirective {
    pub fn new() -> Self {
        Self {
            pattern: Pattern::parse(&format!("Resources/*|{}", MAP)),
        }
    }
}

impl Default for MapDirective {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveHandler for MapDirective {
    fn name(&self) -> &str {
        MAP
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, root: &mut Node, path: &NodePath, ctx: &DirectiveContext) -> Result<bool> {
        let Some(id) = resource_id(path, &[]).map(str::to_string) else {
            return Ok(false);
        };
        let Some(resource) = root.get_path(path) else {
            return Ok(false);
        };
        // Map on anything but a module reference is not ours.
        if !resource.get("Type").is_some_and(|t| is_call(t, MODULE)) {
            return Ok(false);
        }
        let Some(map) = resource.get(MAP) else {
            return Ok(false);
        };

        let keys = iteration::map_keys(map, root, ctx.frame())?;
        let copies = iteration::expand(&id, resource, &keys);
        let configs = mapped_configs(&id, &copies, &keys)?;

        let Some(resources) = root
            .unwrap_document_mut()
            .get_mut("Resources")
            .and_then(Node::as_mapping_mut)
        else {
            return Ok(false);
        };
        let Some(mut at) = resources.iter().position(|e| e.key_str() == id) else {
            return Ok(false);
        };
        resources.remove(at);
        for copy in copies {
            if resources.iter().any(|e| e.key_str() == copy.key_str()) {
                return Err(PackageError::validation(format!(
                    "Map over {} produces resource {}, which already exists",
                    id,
                    copy.key_str()
                )));
            }
            resources.insert(at, copy);
            at += 1;
        }

        outputs::expand_mapped_references(root, &id, keys.len());
        tracing::debug!(resource = %id, copies = keys.len(), "Expanded Map");
        for config in &configs {
            inline_resource(root, ctx, config)?;
        }
        Ok(true)
    }
}

/// One config per `Map` copy, each remembering where it came from.
fn mapped_configs(
    original: &str,
    copies: &[MapEntry],
    keys: &[String],
) -> Result<Vec<ModuleConfig>> {
    copies
        .iter()
        .zip(keys)
        .enumerate()
        .map(|(index, (copy, key))| {
            ModuleConfig::from_resource(copy.key_str(), &copy.value)
                .map(|config| config.mapped(original, index, key))
        })
        .collect()
}

/// Load the module `config` names and put it in place of its resource.
fn inline_resource(root: &mut Node, ctx: &DirectiveContext, config: &ModuleConfig) -> Result<()> {
    if !ctx.options().modules_enabled {
        return Err(PackageError::validation(format!(
            "resource {} uses {} but modules are disabled",
            config.name, MODULE
        )));
    }
    let module =
        load_module(ctx, config).map_err(|e| PackageError::in_module(config.source.clone(), e))?;
    let inlined = inline(&module, config, InlineMode::Extension)
        .map_err(|e| PackageError::in_module(config.source.clone(), e))?;
    emit(root, config, inlined, Placement::Replace)
}

/// Inlines a resource whose `Type` is `{Rain::Module: source}`.
pub struct ModuleDirective {
    pattern: Pattern,
}

impl ModuleDirective {
    pub fn new() -> Self {
        Self {
            pattern: super::call_pattern(MODULE),
        }
    }
}

impl Default for ModuleDirective {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveHandler for ModuleDirective {
    fn name(&self) -> &str {
        MODULE
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, root: &mut Node, path: &NodePath, ctx: &DirectiveContext) -> Result<bool> {
        let Some(id) = resource_id(path, &["Type"]).map(str::to_string) else {
            tracing::warn!(path = %path, "{} is only valid as a resource Type", MODULE);
            return Ok(false);
        };
        let Some(resource) = path.parent().and_then(|p| root.get_path(&p)) else {
            return Ok(false);
        };
        // Expanded by MapDirective first.
        if resource.contains_key(MAP) {
            return Ok(false);
        }

        let config = ModuleConfig::from_resource(&id, resource)?;
        inline_resource(root, ctx, &config)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrinsics::normalize_tags;
    use cumulus_yaml::parse;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mapped_configs_remember_origin() {
        let mut doc = parse("Type: !Rain::Module topic.yaml\nMap: [red, green]\nProperties:\n  Name: $MapValue\n").unwrap();
        normalize_tags(&mut doc);
        let resource = doc.into_root();
        let keys = vec!["red".to_string(), "green".to_string()];
        let copies = iteration::expand("Topic", &resource, &keys);

        let configs = mapped_configs("Topic", &copies, &keys).unwrap();
        let summary: Vec<_> = configs
            .iter()
            .map(|c| {
                (
                    c.name.as_str(),
                    c.original_name.as_deref(),
                    c.map_index,
                    c.map_key.as_deref(),
                    c.property("Name").and_then(Node::as_str),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Topic0", Some("Topic"), Some(0), Some("red"), Some("red")),
                ("Topic1", Some("Topic"), Some(1), Some("green"), Some("green")),
            ]
        );
        // Map is consumed by the expansion.
        assert!(!configs[0].blocks.contains_key(MAP));
    }

    #[test]
    fn test_resource_id() {
        let type_path: NodePath = ["Resources", "Logs", "Type"].into_iter().collect();
        assert_eq!(resource_id(&type_path, &["Type"]), Some("Logs"));
        assert_eq!(resource_id(&type_path, &[]), None);

        let nested: NodePath = ["Outputs", "Logs", "Type"].into_iter().collect();
        assert_eq!(resource_id(&nested, &["Type"]), None);

        let resource: NodePath = ["Resources", "Logs"].into_iter().collect();
        assert_eq!(resource_id(&resource, &[]), Some("Logs"));
    }
}
