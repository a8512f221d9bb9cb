//! Tokenizer for `Fn::Sub` interpolation strings.
//!
//! `"ABC-${XYZ}-123"` splits into a literal, a reference and a literal.
//! `${!Name}` is an escape for the literal text `${Name}`.

use crate::{PackageError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    /// `${Name}`, a parameter or resource
    Reference(String),
    /// `${AWS::Region}`, kept with its `AWS::` prefix
    PseudoParameter(String),
    /// `${Resource.Attribute}`
    AttributePath { resource: String, attribute: String },
    /// `${Rain::Name}` or `${Const::Name}`, without the prefix
    Constant(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Literal,
    MaybeVariable,
    ReadingVariable,
}

/// Split `text` into tokens.
///
/// Fails with a syntax error when a `${` is never closed or names nothing.
pub fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut buf = String::new();
    let mut state = State::Literal;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Literal => {
                if c == '$' {
                    state = State::MaybeVariable;
                } else {
                    buf.push(c);
                }
            }
            State::MaybeVariable => match c {
                '{' if chars.peek() == Some(&'!') => {
                    chars.next();
                    buf.push_str("${");
                    state = State::Literal;
                }
                '{' => {
                    if !buf.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut buf)));
                    }
                    state = State::ReadingVariable;
                }
                '$' => buf.push('$'),
                other => {
                    buf.push('$');
                    buf.push(other);
                    state = State::Literal;
                }
            },
            State::ReadingVariable => {
                if c == '}' {
                    tokens.push(classify(std::mem::take(&mut buf), text)?);
                    state = State::Literal;
                } else {
                    buf.push(c);
                }
            }
        }
    }

    match state {
        State::ReadingVariable => {
            return Err(PackageError::syntax(format!(
                "invalid string, unclosed variable: \"{}\"",
                text
            )));
        }
        State::MaybeVariable => buf.push('$'),
        State::Literal => {}
    }
    if !buf.is_empty() {
        tokens.push(Token::Literal(buf));
    }
    Ok(tokens)
}

fn classify(name: String, text: &str) -> Result<Token> {
    if name.is_empty() {
        return Err(PackageError::syntax(format!(
            "empty variable in \"{}\"",
            text
        )));
    }
    if name.starts_with("AWS::") {
        return Ok(Token::PseudoParameter(name));
    }
    if let Some(constant) = name
        .strip_prefix("Rain::")
        .or_else(|| name.strip_prefix("Const::"))
    {
        return Ok(Token::Constant(constant.to_string()));
    }
    if let Some((resource, attribute)) = name.split_once('.') {
        return Ok(Token::AttributePath {
            resource: resource.to_string(),
            attribute: attribute.to_string(),
        });
    }
    Ok(Token::Reference(name))
}

/// Reassemble tokens into `Fn::Sub` syntax, escaping literal `${`.
pub fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Literal(text) => out.push_str(&text.replace("${", "${!")),
            Token::Reference(name) | Token::PseudoParameter(name) => {
                out.push_str("${");
                out.push_str(name);
                out.push('}');
            }
            Token::AttributePath {
                resource,
                attribute,
            } => {
                out.push_str(&format!("${{{}.{}}}", resource, attribute));
            }
            Token::Constant(name) => out.push_str(&format!("${{Rain::{}}}", name)),
        }
    }
    out
}

/// The plain text of `text` if it contains no variables.
pub fn literal_text(text: &str) -> Option<String> {
    let tokens = tokenize(text).ok()?;
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Literal(literal) => out.push_str(&literal),
            _ => return None,
        }
    }
    Some(out)
}

/// Whether `text` still contains variables (or cannot be tokenized).
pub fn needs_interpolation(text: &str) -> bool {
    literal_text(text).is_none()
}
