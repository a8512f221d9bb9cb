/*
 * module/mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Module loading and inlining.
 */

//! The module resolver.
//!
//! A module is a template whose resources are spliced into the caller:
//!
//! ```yaml
//! # bucket.yaml
//! Parameters:
//!   Name:
//!     Type: String
//! Resources:
//!   ModuleExtension:
//!     Type: AWS::S3::Bucket
//!     Properties:
//!       BucketName: !Ref Name
//!   Policy:
//!     Type: AWS::S3::BucketPolicy
//!     Properties:
//!       Bucket: !Ref ModuleExtension
//!
//! # template.yaml
//! Resources:
//!   Logs:
//!     Type: !Rain::Module bucket.yaml
//!     Properties:
//!       Name: logs
//! ```
//!
//! produces `Logs` (the extension point, an `AWS::S3::Bucket` named `logs`)
//! and `LogsPolicy`, whose `Bucket` is `!Ref Logs`.

pub(crate) mod config;
pub(crate) mod outputs;
mod overrides;
mod resolve;
pub(crate) mod section;

use cumulus_yaml::{MapEntry, Node, flatten_aliases, parse_file};

use crate::conditions::{
    ConditionTable, Disposition, apply_condition_attribute, export_unresolved, merge_into_parent,
    select_branches,
};
use crate::directive::DirectiveContext;
use crate::driver::process_document;
use crate::{PackageError, Result};

use config::ModuleConfig;
use resolve::ReferenceContext;

/// The module resource that takes the caller's place.
pub(crate) const MODULE_EXTENSION: &str = "ModuleExtension";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InlineMode {
    /// A resource typed `Rain::Module`: `ModuleExtension` keeps the caller's
    /// id, everything else is prefixed.
    Extension,
    /// An entry of the `Modules` section: every resource is prefixed.
    Section,
}

/// A module rewritten into the caller's scope, ready to splice.
#[derive(Debug, Default)]
pub(crate) struct Inlined {
    pub resources: Vec<MapEntry>,
    pub conditions: Vec<MapEntry>,
    pub outputs: Option<Node>,
}

/// Fetch, parse and fully transform the module `config` names.
pub(crate) fn load_module(ctx: &DirectiveContext, config: &ModuleConfig) -> Result<Node> {
    let (source, package) = match ctx.scope().resolve_source(&config.source) {
        Some((source, package)) => (source, Some(package)),
        None => (config.source.clone(), None),
    };
    let depth = ctx.check_depth("module")?;
    let content = ctx.source().resolve(&source, ctx.base())?;
    if let Some(package) = package {
        package.verify(&content.bytes)?;
    }

    let mut doc = parse_file(content.text()?, &content.location)?;
    let frame = config.frame();
    process_document(ctx.session, &mut doc, &content.base, depth, None, Some(&frame))?;
    flatten_aliases(&mut doc)?;

    if !doc.unwrap_document().is_mapping() {
        return Err(PackageError::structural(format!(
            "module {} is not a mapping",
            content.location
        )));
    }
    tracing::debug!(
        module = %config.name,
        source = %content.location,
        depth,
        "Loaded module"
    );
    Ok(doc)
}

/// Rewrite `module` into the caller's scope.
pub(crate) fn inline(module: &Node, config: &ModuleConfig, mode: InlineMode) -> Result<Inlined> {
    let root = module.unwrap_document();
    let resources = root
        .get("Resources")
        .and_then(Node::as_mapping)
        .ok_or_else(|| {
            PackageError::structural(format!("module {} has no Resources", config.source))
        })?;
    let params = root.get("Parameters");
    overrides::validate(root, config, mode)?;

    let extension = match mode {
        InlineMode::Extension => {
            if !root.get("Resources").is_some_and(|r| r.contains_key(MODULE_EXTENSION)) {
                return Err(PackageError::structural(format!(
                    "module {} has no {} resource",
                    config.source, MODULE_EXTENSION
                )));
            }
            Some(MODULE_EXTENSION)
        }
        InlineMode::Section => None,
    };
    let ctx = ReferenceContext::new(
        &config.name,
        params,
        config.properties.as_ref(),
        resources.iter().map(|entry| entry.key_str().to_string()),
        extension,
    );

    let mut conditions = root.get("Conditions").cloned();
    let table = match &mut conditions {
        Some(section) => {
            ctx.resolve(section)?;
            ConditionTable::evaluate(section)?
        }
        None => ConditionTable::default(),
    };
    let prefix = config.name.as_str();

    let mut inlined = Inlined::default();
    for entry in resources {
        let id = entry.key_str();
        let mut resource = entry.value.clone();
        if omit_for_params(&mut resource, config) {
            tracing::debug!(module = %config.name, resource = id, "Omitted by IfParam/IfNotParam");
            continue;
        }

        ctx.resolve(&mut resource)?;
        if apply_condition_attribute(&mut resource, &table, prefix) == Disposition::Drop {
            tracing::debug!(module = %config.name, resource = id, "Omitted by condition");
            continue;
        }
        select_branches(&mut resource, &table, prefix)?;

        let is_extension = extension == Some(id);
        let caller = if is_extension {
            Some(&config.blocks)
        } else {
            config.resource_overrides(id)
        };
        overrides::merge_depends_on(&mut resource, caller.and_then(|c| c.get("DependsOn")), &ctx);
        if let Some(caller) = caller {
            overrides::merge_blocks(&mut resource, caller, &ctx);
        }

        let name = if is_extension {
            finish_extension(&mut resource, config)?;
            config.name.clone()
        } else {
            format!("{}{}", prefix, id)
        };
        inlined.resources.push(MapEntry::new(name, resource));
    }

    if let Some(mut outputs) = root.get("Outputs").cloned() {
        ctx.resolve(&mut outputs)?;
        select_branches(&mut outputs, &table, prefix)?;
        inlined.outputs = Some(outputs);
    }
    if let Some(section) = &conditions {
        inlined.conditions = export_unresolved(section, &table, prefix);
    }
    Ok(inlined)
}

/// Apply `Metadata.Rain.IfParam`/`IfNotParam`. Returns true when the
/// resource is to be omitted; otherwise strips the markers.
fn omit_for_params(resource: &mut Node, config: &ModuleConfig) -> bool {
    let Some(rain) = resource.get("Metadata").and_then(|m| m.get("Rain")) else {
        return false;
    };
    if let Some(param) = rain.get_str("IfParam") {
        if !config.has_property(param) {
            return true;
        }
    }
    if let Some(param) = rain.get_str("IfNotParam") {
        if config.has_property(param) {
            return true;
        }
    }

    let Some(metadata) = resource.get_mut("Metadata") else {
        return false;
    };
    if let Some(rain) = metadata.get_mut("Rain") {
        rain.remove("IfParam");
        rain.remove("IfNotParam");
        if rain.is_empty() {
            metadata.remove("Rain");
        }
    }
    if metadata.is_empty() {
        resource.remove("Metadata");
    }
    false
}

/// Give the extension point its final `Type`, taken from
/// `Metadata.Extends` when the module leaves `Type` out.
fn finish_extension(resource: &mut Node, config: &ModuleConfig) -> Result<()> {
    if resource.get_str("Type").is_some() {
        return Ok(());
    }
    let extends = resource
        .get_mut("Metadata")
        .and_then(|m| m.remove("Extends"))
        .ok_or_else(|| {
            PackageError::structural(format!(
                "{} in module {} declares no Type",
                MODULE_EXTENSION, config.source
            ))
        })?;
    if resource.get("Metadata").is_some_and(Node::is_empty) {
        resource.remove("Metadata");
    }
    resource.remove("Type");
    if let Some(entries) = resource.as_mapping_mut() {
        entries.insert(0, MapEntry::new("Type", extends));
    }
    Ok(())
}

/// Where inlined resources go in the parent's `Resources`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Take the place of the module-reference entry
    Replace,
    Append,
}

/// Splice an inlined module into the parent document `root`.
pub(crate) fn emit(
    root: &mut Node,
    config: &ModuleConfig,
    inlined: Inlined,
    placement: Placement,
) -> Result<()> {
    let doc = root.unwrap_document_mut();
    if !doc.get("Resources").is_some_and(Node::is_mapping) {
        doc.insert("Resources", Node::empty_mapping());
    }
    let Some(entries) = doc.get_mut("Resources").and_then(Node::as_mapping_mut) else {
        return Ok(());
    };

    let mut at = match placement {
        Placement::Replace => match entries.iter().position(|e| e.key_str() == config.name) {
            Some(index) => {
                entries.remove(index);
                index
            }
            None => entries.len(),
        },
        Placement::Append => entries.len(),
    };
    let count = inlined.resources.len();
    for entry in inlined.resources {
        if entries.iter().any(|e| e.key_str() == entry.key_str()) {
            return Err(PackageError::validation(format!(
                "module {} produces resource {}, which already exists",
                config.name,
                entry.key_str()
            )));
        }
        entries.insert(at, entry);
        at += 1;
    }

    merge_into_parent(root, inlined.conditions, &config.name)?;
    outputs::substitute_outputs(root, &config.name, inlined.outputs.as_ref())?;
    tracing::debug!(
        module = %config.name,
        source = %config.source,
        mapped_from = ?config.original_name,
        index = ?config.map_index,
        key = ?config.map_key,
        resources = count,
        "Inlined module"
    );
    Ok(())
}
