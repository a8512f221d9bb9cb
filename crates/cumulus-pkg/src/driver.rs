/*
 * driver.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Packaging entry point and fixpoint driver.
 */

//! The transformation driver.
//!
//! [`Packager::transform`] runs one document through the pipeline:
//!
//! 1. Normalize short-form tags (`!Ref`, `!Rain::Embed`, ...) into mappings
//! 2. Consume the `Rain`/`Constants`/`Packages` sections and substitute
//!    constants
//! 3. Inline the `Modules` section
//! 4. Apply directive handlers until a full pass changes nothing, bounded
//!    by `max-passes`
//! 5. Flatten anchors and aliases into plain copies
//!
//! Modules and included files go through the same pipeline, recursively,
//! before they are spliced into their parent.

use std::path::Path;

use cumulus_yaml::{Node, flatten_aliases, parse_file, query_paths};

use crate::artifact::{ArtifactStore, UploadCache};
use crate::constants::{Scope, substitute_constants};
use crate::directive::{DirectiveContext, DirectiveRegistry, ModuleFrame};
use crate::intrinsics::normalize_tags;
use crate::module::section::process_modules_section;
use crate::options::PackageOptions;
use crate::source::{FileModuleSource, ModuleBase, ModuleSource};
use crate::{PackageError, Result};

type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Services shared by every document processed in one transform call.
pub(crate) struct Session<'p> {
    pub(crate) options: &'p PackageOptions,
    pub(crate) source: &'p dyn ModuleSource,
    pub(crate) store: Option<&'p dyn ArtifactStore>,
    pub(crate) env: &'p EnvLookup,
    pub(crate) registry: &'p DirectiveRegistry,
    pub(crate) uploads: UploadCache,
}

/// A configured template packager.
///
/// ```ignore
/// let packager = Packager::builder()
///     .source(MemoryModuleSource::new().with_file("bucket.yaml", MODULE))
///     .build()?;
/// let output = packager.transform(parse(TEMPLATE)?, &ModuleBase::Dir(".".into()))?;
/// ```
pub struct Packager {
    options: PackageOptions,
    source: Box<dyn ModuleSource>,
    store: Option<Box<dyn ArtifactStore>>,
    env: Box<EnvLookup>,
    registry: DirectiveRegistry,
}

impl std::fmt::Debug for Packager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packager")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

/// Builder for [`Packager`].
pub struct PackagerBuilder {
    options: PackageOptions,
    source: Option<Box<dyn ModuleSource>>,
    store: Option<Box<dyn ArtifactStore>>,
    env: Option<Box<EnvLookup>>,
    registry: Option<DirectiveRegistry>,
}

impl PackagerBuilder {
    pub fn options(mut self, options: PackageOptions) -> Self {
        self.options = options;
        self
    }

    pub fn source(mut self, source: impl ModuleSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn store(mut self, store: impl ArtifactStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Override environment lookup for `Rain::Env`.
    pub fn env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Some(Box::new(lookup));
        self
    }

    pub fn registry(mut self, registry: DirectiveRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<Packager> {
        self.options.validate()?;
        Ok(Packager {
            options: self.options,
            source: self.source.unwrap_or_else(|| Box::new(FileModuleSource)),
            store: self.store,
            env: self
                .env
                .unwrap_or_else(|| Box::new(|name: &str| std::env::var(name).ok())),
            registry: self.registry.unwrap_or_else(DirectiveRegistry::builtin),
        })
    }
}

impl Packager {
    pub fn builder() -> PackagerBuilder {
        PackagerBuilder {
            options: PackageOptions::default(),
            source: None,
            store: None,
            env: None,
            registry: None,
        }
    }

    pub fn options(&self) -> &PackageOptions {
        &self.options
    }

    /// Rewrite `root` into an equivalent directive-free document.
    ///
    /// Relative paths resolve against `base`. Re-running on the output is a
    /// no-op.
    pub fn transform(&self, mut root: Node, base: &ModuleBase) -> Result<Node> {
        let session = Session {
            options: &self.options,
            source: self.source.as_ref(),
            store: self.store.as_deref(),
            env: self.env.as_ref(),
            registry: &self.registry,
            uploads: UploadCache::default(),
        };
        process_document(&session, &mut root, base, 0, None, None)?;
        if self.options.flatten_aliases {
            flatten_aliases(&mut root)?;
        }
        Ok(root)
    }

    /// Read, parse and transform a template file.
    pub fn package_file(&self, path: &Path) -> Result<Node> {
        let text = std::fs::read_to_string(path)?;
        let root = parse_file(&text, &path.display().to_string())?;
        let base = ModuleBase::Dir(path.parent().map(Path::to_path_buf).unwrap_or_default());
        self.transform(root, &base)
    }
}

/// Transform `root` with default options and the given module source.
pub fn transform(
    root: Node,
    base: &ModuleBase,
    source: impl ModuleSource + 'static,
) -> Result<Node> {
    Packager::builder().source(source).build()?.transform(root, base)
}

/// Run the whole pipeline over one document.
///
/// An included file passes its includer's scope as `inherited` and keeps
/// any `Rain` section it has as plain content; templates and modules
/// collect their own.
pub(crate) fn process_document(
    session: &Session<'_>,
    doc: &mut Node,
    base: &ModuleBase,
    depth: usize,
    inherited: Option<&Scope>,
    frame: Option<&ModuleFrame>,
) -> Result<()> {
    normalize_tags(doc);

    let scope = match inherited {
        Some(scope) => scope.clone(),
        None => {
            let root = doc.unwrap_document_mut();
            let scope = Scope::extract(root)?;
            scope.rewrite_module_types(root);
            scope
        }
    };
    substitute_constants(doc, &scope)?;

    let ctx = DirectiveContext {
        session,
        base,
        scope: &scope,
        depth,
        frame,
    };
    if inherited.is_none() {
        process_modules_section(&ctx, doc)?;
    }
    let passes = run_to_fixpoint(&ctx, doc)?;
    tracing::debug!(depth, passes, base = %base.describe(), "Document transformed");
    Ok(())
}

/// Apply every handler until a full pass makes no change.
///
/// Matches are re-collected from scratch for each handler on every pass,
/// since earlier applications reshape the tree.
fn run_to_fixpoint(ctx: &DirectiveContext, root: &mut Node) -> Result<usize> {
    let max_passes = ctx.session.options.max_passes;
    for pass in 1..=max_passes {
        let mut changed = false;
        for handler in ctx.session.registry.iter() {
            for path in query_paths(root, handler.pattern()) {
                if handler.apply(root, &path, ctx)? {
                    tracing::debug!(directive = handler.name(), path = %path, "Applied directive");
                    changed = true;
                }
            }
        }
        tracing::debug!(pass, changed, "Finished pass");
        if !changed {
            return Ok(pass);
        }
    }
    Err(PackageError::Convergence { passes: max_passes })
}
