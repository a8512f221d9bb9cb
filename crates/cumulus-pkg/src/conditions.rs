/*
 * conditions.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Module condition evaluation and branch selection.
 */

//! Condition evaluation for inlined modules.
//!
//! Once a module's parameters are bound, many of its `Conditions` can be
//! decided statically. Decided conditions prune resources and select
//! `Fn::If` branches. The rest are exported to the parent document under a
//! prefixed name, and every reference to them is renamed to match.
//!
//! Evaluation is three-valued. An `Fn::Equals` whose operands are still
//! unresolved intrinsics (a parent parameter, say) is [`Truth::Unresolved`].

use cumulus_yaml::{MapEntry, Node, NodeKind};
use indexmap::IndexMap;

use crate::intrinsics::{AND, CONDITION, EQUALS, IF, NOT, OR, call_arg, is_no_value};
use crate::{PackageError, Result};

/// A parsed condition expression.
#[derive(Debug, Clone)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Equals(Node, Node),
    /// `{Condition: Name}`
    Ref(String),
}

impl Condition {
    pub fn parse(node: &Node) -> Result<Condition> {
        let Some((name, arg)) = node.as_call() else {
            return Err(malformed(node, "expected a condition function"));
        };
        match name {
            EQUALS => match arg.as_sequence() {
                Some([a, b]) => Ok(Condition::Equals(a.clone(), b.clone())),
                _ => Err(malformed(node, "Fn::Equals takes two operands")),
            },
            AND | OR => {
                let operands = arg
                    .as_sequence()
                    .ok_or_else(|| malformed(node, "expected a list of conditions"))?
                    .iter()
                    .map(Condition::parse)
                    .collect::<Result<Vec<_>>>()?;
                Ok(if name == AND {
                    Condition::And(operands)
                } else {
                    Condition::Or(operands)
                })
            }
            NOT => match arg.as_sequence() {
                Some([operand]) => Ok(Condition::Not(Box::new(Condition::parse(operand)?))),
                _ => Err(malformed(node, "Fn::Not takes one condition")),
            },
            CONDITION => arg
                .as_str()
                .map(|name| Condition::Ref(name.to_string()))
                .ok_or_else(|| malformed(node, "Condition takes a name")),
            other => Err(malformed(node, &format!("{} is not a condition function", other))),
        }
    }
}

fn malformed(node: &Node, message: &str) -> PackageError {
    PackageError::structural(format!(
        "malformed condition: {}{}",
        message,
        crate::error::at(&node.source_info)
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unresolved,
}

impl Truth {
    fn from_bool(value: bool) -> Truth {
        if value { Truth::True } else { Truth::False }
    }

    fn not(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unresolved => Truth::Unresolved,
        }
    }
}

/// What to do with a resource after its `Condition` attribute is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Drop,
}

/// Truth values of a module's conditions, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ConditionTable {
    values: IndexMap<String, Truth>,
}

impl ConditionTable {
    /// Evaluate a `Conditions` section in declaration order.
    ///
    /// A condition may only refer to conditions declared before it.
    pub fn evaluate(section: &Node) -> Result<ConditionTable> {
        let entries = section
            .as_mapping()
            .ok_or_else(|| PackageError::structural("the Conditions section must be a mapping"))?;
        let mut table = ConditionTable::default();
        for entry in entries {
            let condition = Condition::parse(&entry.value)?;
            let truth = table.eval(&condition)?;
            tracing::trace!(condition = entry.key_str(), ?truth, "Evaluated condition");
            table.values.insert(entry.key_str().to_string(), truth);
        }
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<Truth> {
        self.values.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn eval(&self, condition: &Condition) -> Result<Truth> {
        match condition {
            Condition::Ref(name) => self.get(name).ok_or_else(|| {
                PackageError::resolution(format!(
                    "condition {} is referenced before it is defined",
                    name
                ))
            }),
            Condition::Not(inner) => Ok(self.eval(inner)?.not()),
            Condition::Equals(a, b) => Ok(equals(a, b)),
            Condition::And(operands) => self.short_circuit(operands, Truth::False),
            Condition::Or(operands) => self.short_circuit(operands, Truth::True),
        }
    }

    /// Evaluate operands left to right, stopping at the first one equal to
    /// `decisive`. Operands after it are never looked at.
    fn short_circuit(&self, operands: &[Condition], decisive: Truth) -> Result<Truth> {
        let mut unresolved = false;
        for operand in operands {
            match self.eval(operand)? {
                truth if truth == decisive => return Ok(decisive),
                Truth::Unresolved => unresolved = true,
                _ => {}
            }
        }
        Ok(if unresolved {
            Truth::Unresolved
        } else {
            decisive.not()
        })
    }
}

fn equals(a: &Node, b: &Node) -> Truth {
    if a.same_content(b) {
        return Truth::True;
    }
    match (a.as_str(), b.as_str()) {
        (Some(x), Some(y)) => Truth::from_bool(x == y),
        _ => Truth::Unresolved,
    }
}

/// Apply a resource's `Condition` attribute.
///
/// A false condition drops the resource. A true one is removed. An
/// unresolved one is renamed to the name it is exported under. Conditions
/// the module does not declare are left for the parent.
pub fn apply_condition_attribute(
    resource: &mut Node,
    table: &ConditionTable,
    prefix: &str,
) -> Disposition {
    let Some(name) = resource.get_str(CONDITION).map(str::to_string) else {
        return Disposition::Keep;
    };
    match table.get(&name) {
        Some(Truth::False) => Disposition::Drop,
        Some(Truth::True) => {
            resource.remove(CONDITION);
            Disposition::Keep
        }
        Some(Truth::Unresolved) => {
            resource.insert(CONDITION, Node::scalar(format!("{}{}", prefix, name)));
            Disposition::Keep
        }
        None => Disposition::Keep,
    }
}

/// Replace every decidable `Fn::If` under `node` with its selected branch.
///
/// A selected `{Ref: AWS::NoValue}` removes the enclosing mapping entry or
/// sequence item.
pub fn select_branches(node: &mut Node, table: &ConditionTable, prefix: &str) -> Result<()> {
    if prune(node, table, prefix)? {
        *node = Node::null();
    }
    Ok(())
}

/// Returns whether the caller should remove `node`.
fn prune(node: &mut Node, table: &ConditionTable, prefix: &str) -> Result<bool> {
    let mut selected = false;
    while let Some(arg) = call_arg(node, IF) {
        let Some([name, when_true, when_false]) = arg.as_sequence() else {
            return Err(malformed(node, "Fn::If takes a condition and two values"));
        };
        let Some(name) = name.as_str().map(str::to_string) else {
            return Err(malformed(node, "Fn::If needs a condition name"));
        };
        let branch = match table.get(&name) {
            Some(Truth::True) => when_true.clone(),
            Some(Truth::False) => when_false.clone(),
            Some(Truth::Unresolved) => {
                rename_if_condition(node, &format!("{}{}", prefix, name));
                break;
            }
            None => {
                tracing::warn!(condition = %name, "Fn::If refers to a condition the module does not declare");
                break;
            }
        };
        *node = branch;
        selected = true;
    }
    if selected && is_no_value(node) {
        return Ok(true);
    }

    match &mut node.kind {
        NodeKind::Mapping(entries) => {
            let mut i = 0;
            while i < entries.len() {
                if prune(&mut entries[i].value, table, prefix)? {
                    entries.remove(i);
                } else {
                    i += 1;
                }
            }
        }
        NodeKind::Sequence(items) => {
            let mut i = 0;
            while i < items.len() {
                if prune(&mut items[i], table, prefix)? {
                    items.remove(i);
                } else {
                    i += 1;
                }
            }
        }
        NodeKind::Document(root) => select_branches(root, table, prefix)?,
        NodeKind::Scalar(_) | NodeKind::Alias(_) => {}
    }
    Ok(false)
}

fn rename_if_condition(node: &mut Node, renamed: &str) {
    if let Some((_, arg)) = node.as_call_mut() {
        if let Some(first) = arg.as_sequence_mut().and_then(|items| items.first_mut()) {
            *first = Node::scalar(renamed).with_source_info(first.source_info.clone());
        }
    }
}

/// The module conditions that stayed unresolved, renamed with `prefix`.
///
/// Inside the exported expressions, references to other unresolved
/// conditions are renamed too, and references to decided conditions are
/// replaced by a constant `Fn::Equals`.
pub fn export_unresolved(section: &Node, table: &ConditionTable, prefix: &str) -> Vec<MapEntry> {
    let Some(entries) = section.as_mapping() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter(|entry| table.get(entry.key_str()) == Some(Truth::Unresolved))
        .map(|entry| {
            let mut value = entry.value.clone();
            rewrite_condition_refs(&mut value, table, prefix);
            MapEntry::new(format!("{}{}", prefix, entry.key_str()), value)
        })
        .collect()
}

fn rewrite_condition_refs(node: &mut Node, table: &ConditionTable, prefix: &str) {
    cumulus_yaml::visit_mut(node, |node, _| {
        let Some(name) = call_arg(node, CONDITION).and_then(Node::as_str) else {
            return;
        };
        let replacement = match table.get(name) {
            Some(Truth::Unresolved) => Node::call(CONDITION, Node::scalar(format!("{}{}", prefix, name))),
            Some(truth) => Node::call(
                EQUALS,
                Node::sequence(vec![
                    Node::string("true"),
                    Node::string(if truth == Truth::True { "true" } else { "false" }),
                ]),
            ),
            None => return,
        };
        let source_info = node.source_info.clone();
        *node = replacement.with_source_info(source_info);
    });
}

/// Add exported conditions to the parent's `Conditions` section.
///
/// Re-exporting an identical definition is allowed; a different definition
/// under the same name is an error.
pub fn merge_into_parent(root: &mut Node, entries: Vec<MapEntry>, module: &str) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let root = root.unwrap_document_mut();
    if !root.contains_key("Conditions") {
        root.insert("Conditions", Node::empty_mapping());
    }
    let Some(section) = root.get_mut("Conditions") else {
        return Ok(());
    };
    for entry in entries {
        let name = entry.key_str().to_string();
        match section.get(&name) {
            Some(existing) if existing.same_content(&entry.value) => {}
            Some(_) => {
                return Err(PackageError::validation(format!(
                    "condition {} from module {} conflicts with an existing condition",
                    name, module
                )));
            }
            None => {
                section.insert(name, entry.value);
            }
        }
    }
    Ok(())
}
