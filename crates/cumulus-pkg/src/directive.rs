/*
 * directive.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Directive handler trait and registry.
 */

//! Directive handlers.
//!
//! A directive is a node the packager knows how to rewrite, found by a path
//! pattern such as `**/*|Rain::Embed` (any mapping holding a `Rain::Embed`
//! key). The driver runs every registered handler over the document, in
//! registration order, until a full pass changes nothing.
//!
//! Handlers receive the document root and the path of the match, and
//! substitute content at that slot, so no reference into the tree outlives
//! a single application.
//!
//! # Example
//!
//! ```ignore
//! struct Upper { pattern: Pattern }
//!
//! impl DirectiveHandler for Upper {
//!     fn name(&self) -> &str { "Upper" }
//!     fn pattern(&self) -> &Pattern { &self.pattern }
//!     fn apply(&self, root: &mut Node, path: &NodePath, _: &DirectiveContext) -> Result<bool> {
//!         // rewrite root.get_path_mut(path)
//!         Ok(true)
//!     }
//! }
//!
//! let mut registry = DirectiveRegistry::builtin();
//! registry.push(Box::new(Upper { pattern: Pattern::parse("**/*|Upper") }));
//! ```

use cumulus_yaml::{Node, NodePath, Pattern};

use crate::artifact::{ArtifactLocation, UploadRequest};
use crate::constants::Scope;
use crate::directives::{
    ConstantDirective, EmbedDirective, EnvDirective, IncludeDirective, MapDirective,
    ModuleDirective, S3Directive, S3HttpDirective,
};
use crate::driver::Session;
use crate::options::PackageOptions;
use crate::source::{ModuleBase, ModuleSource};
use crate::{PackageError, Result};

/// A rewrite rule for one kind of directive node.
pub trait DirectiveHandler: Send + Sync {
    /// Directive name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Pattern selecting the nodes this handler rewrites.
    fn pattern(&self) -> &Pattern;

    /// Rewrite the node at `path`. Returns whether the tree changed.
    ///
    /// The node at `path` may have been replaced by an earlier application
    /// in the same pass, so handlers re-check its shape and return
    /// `Ok(false)` when it no longer applies.
    fn apply(&self, root: &mut Node, path: &NodePath, ctx: &DirectiveContext) -> Result<bool>;
}

/// Caller information visible while a module's own directives run.
#[derive(Debug, Clone, Default)]
pub struct ModuleFrame {
    /// Logical id the module is being inlined under
    pub name: String,
    /// Properties the caller set on the module
    pub properties: Option<Node>,
}

/// Everything a handler may consult while rewriting one document.
pub struct DirectiveContext<'a> {
    pub(crate) session: &'a Session<'a>,
    pub(crate) base: &'a ModuleBase,
    pub(crate) scope: &'a Scope,
    pub(crate) depth: usize,
    pub(crate) frame: Option<&'a ModuleFrame>,
}

impl<'a> DirectiveContext<'a> {
    /// Location relative paths in this document resolve against.
    pub fn base(&self) -> &ModuleBase {
        self.base
    }

    /// Constants and package aliases of this document.
    pub fn scope(&self) -> &Scope {
        self.scope
    }

    /// Module nesting depth; the top-level template is 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn options(&self) -> &PackageOptions {
        self.session.options
    }

    pub fn source(&self) -> &dyn ModuleSource {
        self.session.source
    }

    /// The module this document is being inlined for, if any.
    pub fn frame(&self) -> Option<&ModuleFrame> {
        self.frame
    }

    pub fn env(&self, name: &str) -> Option<String> {
        (self.session.env)(name)
    }

    /// Upload through the configured artifact store, reusing the result of
    /// an identical earlier request in this transform call.
    pub fn upload(&self, directive: &str, request: UploadRequest) -> Result<ArtifactLocation> {
        let store = self.session.store.ok_or_else(|| {
            PackageError::validation(format!("{} requires an artifact store", directive))
        })?;
        Ok(self.session.uploads.upload(store, request)?)
    }

    /// Guard against runaway module or include nesting.
    pub(crate) fn check_depth(&self, what: &str) -> Result<usize> {
        let depth = self.depth + 1;
        let limit = self.session.options.max_module_depth;
        if depth > limit {
            return Err(PackageError::structural(format!(
                "{} nesting exceeds {} levels",
                what, limit
            )));
        }
        Ok(depth)
    }
}

/// The ordered set of handlers a transform runs.
#[derive(Default)]
pub struct DirectiveRegistry {
    handlers: Vec<Box<dyn DirectiveHandler>>,
}

impl DirectiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard directives, in the order they run within a pass.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.push(Box::new(ConstantDirective::new()));
        registry.push(Box::new(EmbedDirective::new()));
        registry.push(Box::new(IncludeDirective::new()));
        registry.push(Box::new(EnvDirective::new()));
        registry.push(Box::new(S3HttpDirective::new()));
        registry.push(Box::new(S3Directive::new()));
        registry.push(Box::new(MapDirective::new()));
        registry.push(Box::new(ModuleDirective::new()));
        registry
    }

    pub fn push(&mut self, handler: Box<dyn DirectiveHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn DirectiveHandler> {
        self.handlers.iter().map(|h| h.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }
}

impl std::fmt::Debug for DirectiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// The argument of the `name` call at `path`, if the node there still is one.
pub(crate) fn call_at<'n>(root: &'n Node, path: &NodePath, name: &str) -> Option<&'n Node> {
    let node = root.get_path(path)?;
    crate::intrinsics::call_arg(node, name)
}

/// Scalar argument of the `name` call at `path`.
pub(crate) fn scalar_arg(root: &Node, path: &NodePath, name: &str) -> Result<Option<String>> {
    let Some(arg) = call_at(root, path, name) else {
        return Ok(None);
    };
    match arg.as_str() {
        Some(text) => Ok(Some(text.to_string())),
        None => Err(PackageError::structural(format!(
            "{} expects a scalar argument{}",
            name,
            crate::error::at(&arg.source_info)
        ))),
    }
}

/// Replace the node at `path`, keeping its source position.
pub(crate) fn replace_at(root: &mut Node, path: &NodePath, replacement: Node) -> Result<()> {
    let slot = root.get_path_mut(path).ok_or_else(|| {
        PackageError::structural(format!("directive target {} disappeared", path))
    })?;
    let source_info = slot.source_info.clone();
    *slot = replacement.with_source_info(source_info);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order() {
        let registry = DirectiveRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec![
                "Rain::Constant",
                "Rain::Embed",
                "Rain::Include",
                "Rain::Env",
                "Rain::S3Http",
                "Rain::S3",
                "Map",
                "Rain::Module",
            ]
        );
    }

    #[test]
    fn test_scalar_arg_shape() {
        let root = cumulus_yaml::parse("a:\n  Rain::Env: [x]\nb:\n  Rain::Env: HOME\n").unwrap();
        let a: NodePath = ["a"].into_iter().collect();
        let b: NodePath = ["b"].into_iter().collect();
        assert!(scalar_arg(&root, &a, "Rain::Env").is_err());
        assert_eq!(
            scalar_arg(&root, &b, "Rain::Env").unwrap().as_deref(),
            Some("HOME")
        );
        assert_eq!(scalar_arg(&root, &b, "Rain::Embed").unwrap(), None);
    }
}
