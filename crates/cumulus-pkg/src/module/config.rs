/*
 * module/config.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * One module inlining request.
 */

use cumulus_yaml::Node;

use crate::directive::ModuleFrame;
use crate::directives::MODULE;
use crate::intrinsics::call_arg;
use crate::iteration::MAP;
use crate::{PackageError, Result};

pub(crate) const OVERRIDES: &str = "Overrides";

/// What the caller asked for when it referenced a module.
#[derive(Debug, Clone)]
pub(crate) struct ModuleConfig {
    /// Caller logical id, also the prefix for renamed resources
    pub name: String,
    pub source: String,
    pub properties: Option<Node>,
    pub overrides: Option<Node>,
    /// Caller resource attributes applied to the extension point
    pub blocks: Node,
    /// Set on copies produced by `Map`
    pub original_name: Option<String>,
    pub map_index: Option<usize>,
    pub map_key: Option<String>,
}

impl ModuleConfig {
    /// From a resource whose `Type` is `{Rain::Module: source}`.
    pub fn from_resource(name: &str, resource: &Node) -> Result<ModuleConfig> {
        let source = resource
            .get("Type")
            .and_then(|t| call_arg(t, MODULE))
            .and_then(Node::as_str)
            .ok_or_else(|| {
                PackageError::structural(format!(
                    "resource {} must have Type {{{}: source}}{}",
                    name,
                    MODULE,
                    crate::error::at(&resource.source_info)
                ))
            })?;

        let mut blocks = resource.clone();
        for key in ["Type", OVERRIDES, MAP] {
            blocks.remove(key);
        }

        Ok(ModuleConfig {
            name: name.to_string(),
            source: source.to_string(),
            properties: resource.get("Properties").cloned(),
            overrides: resource.get(OVERRIDES).cloned(),
            blocks,
            original_name: None,
            map_index: None,
            map_key: None,
        })
    }

    /// From an entry of the top-level `Modules` section.
    pub fn from_section_entry(name: &str, entry: &Node) -> Result<ModuleConfig> {
        let source = entry.get_str("Source").ok_or_else(|| {
            PackageError::structural(format!(
                "module {} has no Source{}",
                name,
                crate::error::at(&entry.source_info)
            ))
        })?;
        Ok(ModuleConfig {
            name: name.to_string(),
            source: source.to_string(),
            properties: entry.get("Properties").cloned(),
            overrides: entry.get(OVERRIDES).cloned(),
            blocks: Node::empty_mapping(),
            original_name: None,
            map_index: None,
            map_key: None,
        })
    }

    /// Mark this config as copy `index` of a `Map` over `original`.
    pub fn mapped(mut self, original: &str, index: usize, key: &str) -> ModuleConfig {
        self.original_name = Some(original.to_string());
        self.map_index = Some(index);
        self.map_key = Some(key.to_string());
        self
    }

    pub fn property(&self, name: &str) -> Option<&Node> {
        self.properties.as_ref()?.get(name)
    }

    /// Whether the caller set `name` to something non-empty.
    pub fn has_property(&self, name: &str) -> bool {
        match self.property(name) {
            None => false,
            Some(value) => match value.as_str() {
                Some(text) => !text.is_empty(),
                None => !value.is_null() && !value.is_empty(),
            },
        }
    }

    /// The caller's override blocks for inner resource `inner`.
    pub fn resource_overrides(&self, inner: &str) -> Option<&Node> {
        self.overrides.as_ref()?.get(inner)
    }

    pub fn frame(&self) -> ModuleFrame {
        ModuleFrame {
            name: self.name.clone(),
            properties: self.properties.clone(),
        }
    }
}
