/*
 * directives/include.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Rain::Include and Rain::Embed.
 */

//! File inclusion directives.
//!
//! - `Rain::Include: path` replaces the node with the parsed content of the
//!   file, itself transformed relative to the file's own directory.
//! - `Rain::Embed: path` replaces the node with the file's text, trimmed.

use cumulus_yaml::{Node, NodePath, Pattern, flatten_aliases, parse_file};

use crate::directive::{DirectiveContext, DirectiveHandler, replace_at, scalar_arg};
use crate::driver::process_document;
use crate::Result;

pub const INCLUDE: &str = "Rain::Include";
pub const EMBED: &str = "Rain::Embed";

pub struct IncludeDirective {
    pattern: Pattern,
}

impl IncludeDirective {
    pub fn new() -> Self {
        Self {
            pattern: super::call_pattern(INCLUDE),
        }
    }
}

impl Default for IncludeDirective {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveHandler for IncludeDirective {
    fn name(&self) -> &str {
        INCLUDE
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, root: &mut Node, path: &NodePath, ctx: &DirectiveContext) -> Result<bool> {
        let Some(uri) = scalar_arg(root, path, INCLUDE)? else {
            return Ok(false);
        };
        let depth = ctx.check_depth("include")?;
        let content = ctx.source().resolve(&uri, ctx.base())?;
        let mut doc = parse_file(content.text()?, &content.location)?;

        process_document(
            ctx.session,
            &mut doc,
            &content.base,
            depth,
            Some(ctx.scope()),
            ctx.frame(),
        )?;
        // Anchor names are only unique within the file they came from.
        flatten_aliases(&mut doc)?;

        tracing::debug!(file = %content.location, "Included file");
        replace_at(root, path, doc.into_root())?;
        Ok(true)
    }
}

pub struct EmbedDirective {
    pattern: Pattern,
}

impl EmbedDirective {
    pub fn new() -> Self {
        Self {
            pattern: super::call_pattern(EMBED),
        }
    }
}

impl Default for EmbedDirective {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveHandler for EmbedDirective {
    fn name(&self) -> &str {
        EMBED
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, root: &mut Node, path: &NodePath, ctx: &DirectiveContext) -> Result<bool> {
        let Some(uri) = scalar_arg(root, path, EMBED)? else {
            return Ok(false);
        };
        let content = ctx.source().resolve(&uri, ctx.base())?;
        let text = content.text()?.trim().to_string();
        tracing::debug!(file = %content.location, bytes = text.len(), "Embedded file");
        replace_at(root, path, Node::string(text))?;
        Ok(true)
    }
}
