//! Custom handlers and the pass limit.

use cumulus_pkg::{
    DirectiveContext, DirectiveHandler, DirectiveRegistry, ErrorCategory, MemoryModuleSource,
    ModuleBase, PackageError, PackageOptions, Packager, Result,
};
use cumulus_yaml::{Node, NodePath, Pattern, parse};

/// Replaces `{from: x}` with `{to: x}`.
struct Swap {
    from: &'static str,
    to: &'static str,
    pattern: Pattern,
}

impl Swap {
    fn new(from: &'static str, to: &'static str) -> Self {
        Self {
            from,
            to,
            pattern: Pattern::parse(&format!("**/*|{}", from)),
        }
    }
}

impl DirectiveHandler for Swap {
    fn name(&self) -> &str {
        self.from
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, root: &mut Node, path: &NodePath, _: &DirectiveContext) -> Result<bool> {
        let Some(node) = root.get_path_mut(path) else {
            return Ok(false);
        };
        let Some(arg) = node.remove(self.from) else {
            return Ok(false);
        };
        *node = Node::call(self.to, arg);
        Ok(true)
    }
}

/// Upper-cases the argument of `{Upper: text}`.
struct Upper {
    pattern: Pattern,
}

impl DirectiveHandler for Upper {
    fn name(&self) -> &str {
        "Upper"
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, root: &mut Node, path: &NodePath, _: &DirectiveContext) -> Result<bool> {
        let Some(node) = root.get_path_mut(path) else {
            return Ok(false);
        };
        let Some(text) = node.get_str("Upper").map(str::to_uppercase) else {
            return Err(PackageError::structural("Upper takes a string"));
        };
        *node = Node::string(text);
        Ok(true)
    }
}

#[test]
fn test_oscillating_handlers_hit_pass_limit() {
    let mut registry = DirectiveRegistry::new();
    registry.push(Box::new(Swap::new("Ping", "Pong")));
    registry.push(Box::new(Swap::new("Pong", "Ping")));
    let packager = Packager::builder()
        .options(PackageOptions::default().with_max_passes(5))
        .registry(registry)
        .build()
        .unwrap();

    let err = packager
        .transform(
            parse("Outputs:\n  Ball:\n    Value:\n      Ping: served\n").unwrap(),
            &ModuleBase::Dir(".".into()),
        )
        .unwrap_err();

    assert!(matches!(err, PackageError::Convergence { passes: 5 }));
    assert_eq!(err.category(), ErrorCategory::Convergence);
}

#[test]
fn test_custom_handler_runs_after_builtins() {
    let mut registry = DirectiveRegistry::builtin();
    registry.push(Box::new(Upper {
        pattern: Pattern::parse("**/*|Upper"),
    }));
    let packager = Packager::builder()
        .source(MemoryModuleSource::new().with_file("name.txt", "orders\n"))
        .registry(registry)
        .build()
        .unwrap();

    // The embedded text is only visible to Upper once Embed has run.
    let output = packager
        .transform(
            parse("Outputs:\n  Name:\n    Value:\n      Upper: !Rain::Embed name.txt\n").unwrap(),
            &ModuleBase::Dir(".".into()),
        )
        .unwrap();

    let value = output
        .get_path(&"Outputs/Name/Value".split('/').collect())
        .and_then(Node::as_str);
    assert_eq!(value, Some("ORDERS"));
}
