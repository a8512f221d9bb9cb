/*
 * intrinsics.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Intrinsic function names and short-form tag normalization.
 */

use cumulus_yaml::{Node, NodeKind, visit_mut};

use crate::sub;

pub const REF: &str = "Ref";
pub const SUB: &str = "Fn::Sub";
pub const GET_ATT: &str = "Fn::GetAtt";
pub const IF: &str = "Fn::If";
pub const EQUALS: &str = "Fn::Equals";
pub const AND: &str = "Fn::And";
pub const OR: &str = "Fn::Or";
pub const NOT: &str = "Fn::Not";
pub const CONDITION: &str = "Condition";
pub const NO_VALUE: &str = "AWS::NoValue";

/// Tags that expand to `Fn::<Name>`.
const FN_TAGS: &[&str] = &[
    "And",
    "Base64",
    "Cidr",
    "Equals",
    "FindInMap",
    "GetAtt",
    "GetAZs",
    "If",
    "ImportValue",
    "Join",
    "Not",
    "Or",
    "Select",
    "Split",
    "Sub",
    "Transform",
    "Length",
    "ToJsonString",
];

/// The call name a short-form tag stands for, if it is a known one.
fn call_name_for_tag(tag: &str) -> Option<String> {
    let name = tag.strip_prefix('!')?;
    if name.starts_with('!') {
        return None;
    }
    match name {
        "Ref" | "Condition" => Some(name.to_string()),
        _ if name.starts_with("Rain::") => Some(name.to_string()),
        _ if FN_TAGS.contains(&name) => Some(format!("Fn::{}", name)),
        _ => None,
    }
}

/// Rewrite short-form tags (`!Ref X`, `!GetAtt A.B`, `!Rain::Embed f`) into
/// their single-pair mapping form. Unknown tags are kept.
pub fn normalize_tags(root: &mut Node) {
    visit_mut(root, |node, _| {
        let Some(name) = node.tag.as_deref().and_then(call_name_for_tag) else {
            return;
        };
        let mut arg = std::mem::replace(node, Node::null());
        arg.tag = None;
        let source_info = arg.source_info.clone();
        let anchor = arg.anchor.take();
        let comments = std::mem::take(&mut arg.comments);

        if name == GET_ATT {
            if let Some(text) = arg.as_str() {
                if let Some((resource, attribute)) = text.split_once('.') {
                    arg = Node::sequence(vec![
                        Node::scalar(resource).with_source_info(source_info.clone()),
                        Node::scalar(attribute).with_source_info(source_info.clone()),
                    ])
                    .with_source_info(source_info.clone());
                }
            }
        }

        let mut call = Node::call(name, arg).with_source_info(source_info);
        call.anchor = anchor;
        call.comments = comments;
        *node = call;
    });
}

/// The argument of `node` if it is a call to `name`.
pub fn call_arg<'a>(node: &'a Node, name: &str) -> Option<&'a Node> {
    match node.as_call() {
        Some((n, arg)) if n == name => Some(arg),
        _ => None,
    }
}

pub fn is_call(node: &Node, name: &str) -> bool {
    call_arg(node, name).is_some()
}

/// `{Ref: name}`
pub fn make_ref(name: &str) -> Node {
    Node::call(REF, Node::scalar(name))
}

/// `{Fn::GetAtt: [resource, attribute]}`
pub fn make_get_att(resource: &str, attribute: &str) -> Node {
    Node::call(
        GET_ATT,
        Node::sequence(vec![Node::scalar(resource), Node::scalar(attribute)]),
    )
}

/// `{Fn::Sub: text}`, or a plain string when nothing is left to interpolate.
pub fn make_sub(text: String) -> Node {
    match sub::literal_text(&text) {
        Some(literal) => Node::string(literal),
        None => Node::call(SUB, Node::string(text)),
    }
}

/// `{Ref: AWS::NoValue}`
pub fn is_no_value(node: &Node) -> bool {
    call_arg(node, REF).and_then(Node::as_str) == Some(NO_VALUE)
}

/// The `(resource, attribute)` pair of a `Fn::GetAtt` argument, accepting
/// both the list form and the dotted string form.
pub fn get_att_parts(arg: &Node) -> Option<(String, String)> {
    match &arg.kind {
        NodeKind::Scalar(text) => text
            .split_once('.')
            .map(|(r, a)| (r.to_string(), a.to_string())),
        NodeKind::Sequence(items) => match items.as_slice() {
            [resource, attribute] => Some((
                resource.as_str()?.to_string(),
                attribute.as_str()?.to_string(),
            )),
            _ => None,
        },
        _ => None,
    }
}
