//! `Rain::Constant`: a copy of a named constant, which may be a structure.

use cumulus_yaml::{Node, NodePath, Pattern};

use crate::directive::{DirectiveContext, DirectiveHandler, replace_at, scalar_arg};
use crate::{PackageError, Result};

pub const CONSTANT: &str = "Rain::Constant";

pub struct ConstantDirective {
    pattern: Pattern,
}

impl ConstantDirective {
    pub fn new() -> Self {
        Self {
            pattern: super::call_pattern(CONSTANT),
        }
    }
}

impl Default for ConstantDirective {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveHandler for ConstantDirective {
    fn name(&self) -> &str {
        CONSTANT
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, root: &mut Node, path: &NodePath, ctx: &DirectiveContext) -> Result<bool> {
        let Some(name) = scalar_arg(root, path, CONSTANT)? else {
            return Ok(false);
        };
        let value = ctx
            .scope()
            .constant(&name)
            .cloned()
            .ok_or_else(|| PackageError::resolution(format!("rain constant {} not found", name)))?;
        replace_at(root, path, value)?;
        Ok(true)
    }
}
