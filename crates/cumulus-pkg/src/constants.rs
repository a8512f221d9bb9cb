/*
 * constants.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Template constants and package aliases.
 */

//! Constants and package aliases.
//!
//! A template can declare named constants and module package aliases, either
//! under a `Rain` section or as top-level `Constants` and `Packages`
//! sections. Both are consumed before directives run and never appear in
//! the output.
//!
//! ```yaml
//! Rain:
//!   Constants:
//!     Prefix: app
//!     BucketName: ${Rain::Prefix}-bucket
//!   Packages:
//!     shared:
//!       Location: ./modules
//! ```

use cumulus_yaml::{Node, NodeKind, visit_mut};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::intrinsics::{self, REF, SUB};
use crate::sub::{self, Token};
use crate::{PackageError, Result};

pub const RAIN_SECTION: &str = "Rain";
pub const CONSTANTS_SECTION: &str = "Constants";
pub const PACKAGES_SECTION: &str = "Packages";

/// A module package: `alias/path` resolves to `<location>/path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageAlias {
    pub alias: String,
    pub location: String,
    /// Hex SHA-256 of the module content, when pinned
    pub hash: Option<String>,
}

impl PackageAlias {
    /// Check fetched module content against the pinned hash, if any.
    pub fn verify(&self, content: &[u8]) -> Result<()> {
        let Some(expected) = &self.hash else {
            return Ok(());
        };
        let actual = hex::encode(Sha256::digest(content));
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(PackageError::validation(format!(
                "hash mismatch for package {}: expected {}, got {}",
                self.alias, expected, actual
            )));
        }
        Ok(())
    }
}

/// Names in scope for one document: its constants and package aliases.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    constants: IndexMap<String, Node>,
    packages: IndexMap<String, PackageAlias>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove the `Rain`, `Constants` and `Packages` sections from a
    /// template root and collect what they declare.
    pub fn extract(root: &mut Node) -> Result<Scope> {
        let mut scope = Scope::default();
        if !root.is_mapping() {
            return Ok(scope);
        }

        let rain = root.remove(RAIN_SECTION);
        if let Some(packages) = root.remove(PACKAGES_SECTION) {
            scope.read_packages(&packages, "Source")?;
        }
        if let Some(packages) = rain.as_ref().and_then(|r| r.get(PACKAGES_SECTION)) {
            scope.read_packages(packages, "Location")?;
        }
        if let Some(constants) = rain.as_ref().and_then(|r| r.get(CONSTANTS_SECTION)) {
            scope.read_constants(constants)?;
        }
        if let Some(constants) = root.remove(CONSTANTS_SECTION) {
            scope.read_constants(&constants)?;
        }

        if !scope.constants.is_empty() || !scope.packages.is_empty() {
            tracing::debug!(
                constants = scope.constants.len(),
                packages = scope.packages.len(),
                "Collected template scope"
            );
        }
        Ok(scope)
    }

    pub fn constant(&self, name: &str) -> Option<&Node> {
        self.constants.get(name)
    }

    pub fn package(&self, alias: &str) -> Option<&PackageAlias> {
        self.packages.get(alias)
    }

    /// Define a constant. Scalars inside `value` may refer to constants
    /// defined earlier with `${Rain::Name}` or `${Const::Name}`.
    pub fn define_constant(&mut self, name: impl Into<String>, mut value: Node) -> Result<()> {
        substitute_in_scalars(&mut value, self)?;
        substitute_constants(&mut value, self)?;
        self.constants.insert(name.into(), value);
        Ok(())
    }

    pub fn add_package(&mut self, package: PackageAlias) {
        self.packages.insert(package.alias.clone(), package);
    }

    fn read_constants(&mut self, section: &Node) -> Result<()> {
        let entries = section.as_mapping().ok_or_else(|| {
            PackageError::structural("the Constants section must be a mapping")
        })?;
        for entry in entries {
            self.define_constant(entry.key_str(), entry.value.clone())?;
        }
        Ok(())
    }

    fn read_packages(&mut self, section: &Node, location_key: &str) -> Result<()> {
        let entries = section.as_mapping().ok_or_else(|| {
            PackageError::structural("the Packages section must be a mapping")
        })?;
        for entry in entries {
            let alias = entry.key_str();
            let location = entry
                .value
                .get_str(location_key)
                .or_else(|| entry.value.get_str("Location"))
                .or_else(|| entry.value.get_str("Source"))
                .ok_or_else(|| {
                    PackageError::structural(format!(
                        "package {} has no {}",
                        alias, location_key
                    ))
                })?;
            self.add_package(PackageAlias {
                alias: alias.to_string(),
                location: location.to_string(),
                hash: entry.value.get_str("Hash").map(str::to_string),
            });
        }
        Ok(())
    }

    /// Rewrite a module source written `$alias/path` or `alias/path`.
    ///
    /// Returns the rewritten source and the package it came from, or `None`
    /// when the source does not start with a known alias.
    pub fn resolve_source(&self, source: &str) -> Option<(String, &PackageAlias)> {
        let trimmed = source.strip_prefix('$').unwrap_or(source);
        let (alias, path) = trimmed.split_once('/')?;
        let package = self.packages.get(alias)?;
        let location = package.location.trim_end_matches('/');
        Some((format!("{}/{}", location, path), package))
    }

    /// Turn the resource shorthand `Type: $alias/module.yaml` into
    /// `Type: {Rain::Module: alias/module.yaml}`.
    pub fn rewrite_module_types(&self, root: &mut Node) {
        let Some(resources) = root.get_mut("Resources").and_then(Node::as_mapping_mut) else {
            return;
        };
        for entry in resources {
            let Some(type_node) = entry.value.get_mut("Type") else {
                continue;
            };
            let Some(source) = type_node
                .as_str()
                .and_then(|text| text.strip_prefix('$'))
                .map(str::to_string)
            else {
                continue;
            };
            let source_info = type_node.source_info.clone();
            *type_node =
                Node::call(crate::directives::MODULE, Node::scalar(source)).with_source_info(source_info);
        }
    }
}

fn constant_name(reference: &str) -> Option<&str> {
    reference
        .strip_prefix("Rain::")
        .or_else(|| reference.strip_prefix("Const::"))
}

/// The text a constant contributes to an interpolation string.
fn constant_text<'s>(scope: &'s Scope, name: &str) -> Result<&'s str> {
    let value = scope
        .constant(name)
        .ok_or_else(|| PackageError::resolution(format!("constant {} not found", name)))?;
    value.as_str().ok_or_else(|| {
        PackageError::resolution(format!(
            "constant {} is not a scalar and cannot be interpolated",
            name
        ))
    })
}

/// Replace constant tokens, returning `None` when `text` has none.
fn replace_tokens(text: &str, scope: &Scope) -> Result<Option<Vec<Token>>> {
    let tokens = sub::tokenize(text)?;
    if !tokens.iter().any(|t| matches!(t, Token::Constant(_))) {
        return Ok(None);
    }
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Constant(name) => {
                out.push(Token::Literal(constant_text(scope, &name)?.to_string()))
            }
            other => out.push(other),
        }
    }
    Ok(Some(out))
}

/// Constant values interpolate in plain scalars too, not only in `Fn::Sub`.
fn substitute_in_scalars(value: &mut Node, scope: &Scope) -> Result<()> {
    let mut error = None;
    visit_mut(value, |node, ctl| {
        let NodeKind::Scalar(text) = &mut node.kind else {
            return;
        };
        // Scalars that do not parse as interpolation strings are plain text.
        let Ok(tokens) = sub::tokenize(text) else {
            return;
        };
        if !tokens.iter().any(|t| matches!(t, Token::Constant(_))) {
            return;
        }
        let mut out = String::new();
        for token in &tokens {
            // Literals are re-escaped so a `${!X}` survives the rewrite.
            match token {
                Token::Constant(name) => match constant_text(scope, name) {
                    Ok(text) => out.push_str(text),
                    Err(e) => {
                        error = Some(e);
                        ctl.stop();
                        return;
                    }
                },
                other => out.push_str(&sub::render(std::slice::from_ref(other))),
            }
        }
        *text = out;
    });
    error.map_or(Ok(()), Err)
}

/// Replace `${Rain::X}`/`${Const::X}` inside every `Fn::Sub`, and
/// `{Ref: Rain::X}`/`{Ref: Const::X}` with a copy of the constant.
pub fn substitute_constants(root: &mut Node, scope: &Scope) -> Result<()> {
    let mut error = None;
    visit_mut(root, |node, ctl| {
        let result = substitute_node(node, scope);
        if let Err(e) = result {
            error = Some(e);
            ctl.stop();
        }
    });
    error.map_or(Ok(()), Err)
}

fn substitute_node(node: &mut Node, scope: &Scope) -> Result<()> {
    if let Some(name) = intrinsics::call_arg(node, REF)
        .and_then(Node::as_str)
        .and_then(constant_name)
    {
        let value = scope.constant(name).ok_or_else(|| {
            PackageError::resolution(format!(
                "constant {} not found{}",
                name,
                crate::error::at(&node.source_info)
            ))
        })?;
        let source_info = node.source_info.clone();
        *node = value.clone().with_source_info(source_info);
        return Ok(());
    }

    let source_info = node.source_info.clone();
    let Some((SUB, arg)) = node.as_call_mut() else {
        return Ok(());
    };
    let replacement = match &mut arg.kind {
        NodeKind::Scalar(text) => replace_tokens(text, scope)?
            .map(|tokens| intrinsics::make_sub(sub::render(&tokens))),
        NodeKind::Sequence(items) => {
            if let Some(NodeKind::Scalar(text)) = items.first_mut().map(|n| &mut n.kind) {
                if let Some(tokens) = replace_tokens(text, scope)? {
                    *text = sub::render(&tokens);
                }
            }
            None
        }
        _ => None,
    };
    if let Some(replacement) = replacement {
        *node = replacement.with_source_info(source_info);
    }
    Ok(())
}
