//! `Rain::Env`: the value of an environment variable.

use cumulus_yaml::{Node, NodePath, Pattern};

use crate::directive::{DirectiveContext, DirectiveHandler, replace_at, scalar_arg};
use crate::{PackageError, Result};

pub const ENV: &str = "Rain::Env";

pub struct EnvDirective {
    pattern: Pattern,
}

impl EnvDirective {
    pub fn new() -> Self {
        Self {
            pattern: super::call_pattern(ENV),
        }
    }
}

impl Default for EnvDirective {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveHandler for EnvDirective {
    fn name(&self) -> &str {
        ENV
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, root: &mut Node, path: &NodePath, ctx: &DirectiveContext) -> Result<bool> {
        let Some(name) = scalar_arg(root, path, ENV)? else {
            return Ok(false);
        };
        let value = ctx.env(&name).ok_or_else(|| {
            PackageError::resolution(format!("environment variable {} is not set", name))
        })?;
        replace_at(root, path, Node::string(value))?;
        Ok(true)
    }
}
