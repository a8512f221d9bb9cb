/*
 * directives/mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Built-in directive handlers.
 */

//! Built-in directive handlers.
//!
//! | Directive        | Handler               |
//! |------------------|-----------------------|
//! | `Rain::Constant` | [`ConstantDirective`] |
//! | `Rain::Embed`    | [`EmbedDirective`]    |
//! | `Rain::Include`  | [`IncludeDirective`]  |
//! | `Rain::Env`      | [`EnvDirective`]      |
//! | `Rain::S3Http`   | [`S3HttpDirective`]   |
//! | `Rain::S3`       | [`S3Directive`]       |
//! | `Map`            | [`MapDirective`]      |
//! | `Rain::Module`   | [`ModuleDirective`]   |

mod asset;
mod constant;
mod env;
mod include;
mod module;

pub use asset::{S3, S3_HTTP, S3Directive, S3HttpDirective};
pub use constant::{CONSTANT, ConstantDirective};
pub use env::{ENV, EnvDirective};
pub use include::{EMBED, EmbedDirective, INCLUDE, IncludeDirective};
pub use module::{MODULE, MapDirective, ModuleDirective};

/// `**/*|<name>`: any mapping that holds `name` as a key.
fn call_pattern(name: &str) -> cumulus_yaml::Pattern {
    cumulus_yaml::Pattern::parse(&format!("**/*|{}", name))
}
