/*
 * directives/asset.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Asset upload directives: Rain::S3 and Rain::S3Http.
 */

//! Asset upload directives.
//!
//! ```yaml
//! Code: !Rain::S3 lambda/            # s3://bucket/key
//! Url: !Rain::S3Http site/index.html # https://bucket.s3.region.amazonaws.com/key
//! Code: !Rain::S3
//!   Path: lambda/
//!   Zip: true
//!   BucketProperty: S3Bucket
//!   KeyProperty: S3Key             # {S3Bucket: bucket, S3Key: key}
//! ```
//!
//! Inside a module, `Path: !Ref Name` takes the path from the caller's
//! `Name` property, or from the parameter's default when it is unset.

use std::path::PathBuf;

use cumulus_yaml::{MapEntry, Node, NodePath, Pattern, to_yaml_string};
use serde::Deserialize;

use crate::artifact::{ArtifactLocation, UploadRequest};
use crate::directive::{DirectiveContext, DirectiveHandler, call_at, replace_at, scalar_arg};
use crate::intrinsics::{REF, call_arg};
use crate::source::ModuleBase;
use crate::{PackageError, Result};

pub const S3: &str = "Rain::S3";
pub const S3_HTTP: &str = "Rain::S3Http";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
enum S3Format {
    #[serde(rename = "URI")]
    Uri,
    Http,
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct S3Options {
    path: String,
    #[serde(default)]
    bucket_property: Option<String>,
    #[serde(default)]
    key_property: Option<String>,
    #[serde(default)]
    zip: bool,
    #[serde(default)]
    format: Option<S3Format>,
}

impl S3Options {
    fn from_node(node: &Node) -> Result<Self> {
        let text = to_yaml_string(node)?;
        serde_yaml::from_str(&text).map_err(|e| {
            PackageError::structural(format!(
                "invalid {} options: {}{}",
                S3,
                e,
                crate::error::at(&node.source_info)
            ))
        })
    }

    /// `Object` when both property names are given, else `URI`.
    fn format(&self) -> S3Format {
        self.format.unwrap_or(
            if self.bucket_property.is_some() && self.key_property.is_some() {
                S3Format::Object
            } else {
                S3Format::Uri
            },
        )
    }

    fn render(&self, location: &ArtifactLocation) -> Result<Node> {
        match self.format() {
            S3Format::Uri => Ok(Node::string(location.uri())),
            S3Format::Http => Ok(Node::string(location.http_url())),
            S3Format::Object => {
                let (Some(bucket), Some(key)) = (&self.bucket_property, &self.key_property) else {
                    return Err(PackageError::structural(format!(
                        "{} Object format needs BucketProperty and KeyProperty",
                        S3
                    )));
                };
                Ok(Node::mapping(vec![
                    MapEntry::new(bucket.clone(), Node::string(location.bucket.clone())),
                    MapEntry::new(key.clone(), Node::string(location.key.clone())),
                ]))
            }
        }
    }
}

/// Local path of an asset named relative to the current document.
fn asset_path(ctx: &DirectiveContext, path: &str, directive: &str) -> Result<PathBuf> {
    match ctx.base() {
        ModuleBase::Dir(dir) => Ok(dir.join(path)),
        ModuleBase::Uri(uri) => Err(PackageError::structural(format!(
            "{} cannot upload {} from remote module {}",
            directive, path, uri
        ))),
    }
}

/// Replace a `!Ref` path with the module property it names.
fn resolve_path_ref(module: &Node, arg: &mut Node, ctx: &DirectiveContext) -> Result<()> {
    let slot = if arg.is_mapping() {
        match arg.get_mut("Path") {
            Some(slot) => slot,
            None => return Ok(()),
        }
    } else {
        arg
    };
    let Some(name) = call_arg(slot, REF).and_then(Node::as_str).map(str::to_string) else {
        return Ok(());
    };
    let Some(frame) = ctx.frame() else {
        return Err(PackageError::structural(format!(
            "{} Path !Ref {} is only allowed inside a module{}",
            S3,
            name,
            crate::error::at(&slot.source_info)
        )));
    };
    let given = frame.properties.as_ref().and_then(|props| props.get(&name));
    let default = module
        .unwrap_document()
        .get("Parameters")
        .and_then(|params| params.get(&name))
        .and_then(|param| param.get("Default"));
    let value = given.or(default).ok_or_else(|| {
        PackageError::resolution(format!(
            "{} Path refers to {}, which module {} was not given{}",
            S3,
            name,
            frame.name,
            crate::error::at(&slot.source_info)
        ))
    })?;
    tracing::debug!(
        module = %frame.name,
        property = %name,
        "Resolved asset path from module property"
    );
    *slot = value.clone();
    Ok(())
}

pub struct S3Directive {
    pattern: Pattern,
}

impl S3Directive {
    pub fn new() -> Self {
        Self {
            pattern: super::call_pattern(S3),
        }
    }
}

impl Default for S3Directive {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveHandler for S3Directive {
    fn name(&self) -> &str {
        S3
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, root: &mut Node, path: &NodePath, ctx: &DirectiveContext) -> Result<bool> {
        let Some(arg) = call_at(root, path, S3) else {
            return Ok(false);
        };
        let mut arg = arg.clone();
        resolve_path_ref(root, &mut arg, ctx)?;
        let options = match arg.as_str() {
            Some(text) => S3Options {
                path: text.to_string(),
                bucket_property: None,
                key_property: None,
                zip: false,
                format: None,
            },
            None => S3Options::from_node(&arg)?,
        };

        let local = asset_path(ctx, &options.path, S3)?;
        let location = ctx.upload(S3, UploadRequest::new(local).zipped(options.zip))?;
        let replacement = options.render(&location)?;
        replace_at(root, path, replacement)?;
        Ok(true)
    }
}

pub struct S3HttpDirective {
    pattern: Pattern,
}

impl S3HttpDirective {
    pub fn new() -> Self {
        Self {
            pattern: super::call_pattern(S3_HTTP),
        }
    }
}

impl Default for S3HttpDirective {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveHandler for S3HttpDirective {
    fn name(&self) -> &str {
        S3_HTTP
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, root: &mut Node, path: &NodePath, ctx: &DirectiveContext) -> Result<bool> {
        let Some(asset) = scalar_arg(root, path, S3_HTTP)? else {
            return Ok(false);
        };
        let local = asset_path(ctx, &asset, S3_HTTP)?;
        let location = ctx.upload(S3_HTTP, UploadRequest::new(local))?;
        replace_at(root, path, Node::string(location.http_url()))?;
        Ok(true)
    }
}
