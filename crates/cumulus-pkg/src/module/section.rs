/*
 * module/section.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The top-level Modules section.
 */

//! ```yaml
//! Modules:
//!   Logs:
//!     Source: bucket.yaml
//!     Properties:
//!       Name: logs
//!     Overrides:
//!       Policy:
//!         DeletionPolicy: Retain
//! ```
//!
//! Every module resource is emitted as `Logs<Id>` and appended to
//! `Resources`. The section itself is removed.

use cumulus_yaml::Node;

use super::config::ModuleConfig;
use super::{InlineMode, Placement, emit, inline, load_module, outputs};
use crate::directive::DirectiveContext;
use crate::iteration::{self, MAP};
use crate::{PackageError, Result};

pub(crate) const MODULES_SECTION: &str = "Modules";

/// Inline every entry of the `Modules` section. Returns whether there was
/// one.
pub(crate) fn process_modules_section(ctx: &DirectiveContext, doc: &mut Node) -> Result<bool> {
    let Some(section) = doc.unwrap_document_mut().remove(MODULES_SECTION) else {
        return Ok(false);
    };
    if !ctx.options().modules_enabled {
        return Err(PackageError::validation(
            "the Modules section requires modules to be enabled",
        ));
    }
    let entries = section
        .as_mapping()
        .ok_or_else(|| PackageError::structural("the Modules section must be a mapping"))?;

    let mut configs = Vec::new();
    for entry in entries {
        let name = entry.key_str();
        match entry.value.get(MAP) {
            Some(map) => {
                let keys = iteration::map_keys(map, doc, ctx.frame())?;
                for (index, copy) in iteration::expand(name, &entry.value, &keys).iter().enumerate() {
                    configs.push(
                        ModuleConfig::from_section_entry(copy.key_str(), &copy.value)?
                            .mapped(name, index, &keys[index]),
                    );
                }
                outputs::expand_mapped_references(doc, name, keys.len());
            }
            None => configs.push(ModuleConfig::from_section_entry(name, &entry.value)?),
        }
    }

    for config in &configs {
        let module = load_module(ctx, config)
            .map_err(|e| PackageError::in_module(config.source.clone(), e))?;
        let inlined = inline(&module, config, InlineMode::Section)
            .map_err(|e| PackageError::in_module(config.source.clone(), e))?;
        emit(doc, config, inlined, Placement::Append)?;
    }
    Ok(true)
}
