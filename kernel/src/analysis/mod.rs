//! Static def/use analysis of a target function's source.
//!
//! A coarse "what might influence what" oracle: for each name assigned in
//! the function body it records the names the most recent right-hand side
//! reads. The result only narrows the search space. It makes no claim of
//! soundness for aliasing, indirection through containers, or callees.
//!
//! # Module layout
//!
//! - `lexer`: logical lines and tokens
//! - `deps`: assignment walking and the [`DependencyMap`]

mod deps;
mod lexer;

pub use deps::DependencyMap;

use serde::{Deserialize, Serialize};

use lexer::{tokenize, LogicalLine, Token, TokenKind};

/// Failure to analyze a function's source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("no definition of function {name:?} in source")]
    FunctionNotFound { name: String },
    #[error("syntax error at line {line}: {detail}")]
    Syntax { line: usize, detail: String },
}

/// How a parameter binds call arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    /// Positional-or-keyword.
    Positional,
    /// `*args`.
    VarArgs,
    /// After `*` or `*args`.
    KeywordOnly,
    /// `**kwargs`.
    VarKeyword,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
}

/// Parsed signature plus the body's dependency map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Parameter>,
    pub dependencies: DependencyMap,
}

impl FunctionDecl {
    /// A declaration with no known parameters or dependencies.
    #[must_use]
    pub fn opaque(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Name of the `index`-th positional parameter, if declared.
    #[must_use]
    pub fn positional_name(&self, index: usize) -> Option<&str> {
        self.params
            .iter()
            .filter(|p| p.kind == ParamKind::Positional)
            .nth(index)
            .map(|p| p.name.as_str())
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Analyze the last definition of `function_name` in `source`.
///
/// # Errors
///
/// Returns [`AnalysisError::Syntax`] for an unterminated string, unbalanced
/// brackets or a malformed `def` header, and
/// [`AnalysisError::FunctionNotFound`] if no such `def` exists.
pub fn analyze(source: &str, function_name: &str) -> Result<FunctionDecl, AnalysisError> {
    let lines = tokenize(source)?;
    let def_index = lines
        .iter()
        .rposition(|l| def_name(l) == Some(function_name))
        .ok_or_else(|| AnalysisError::FunctionNotFound {
            name: function_name.to_string(),
        })?;
    let header = &lines[def_index];
    let (params, inline_body) = parse_header(header)?;

    let mut dependencies = DependencyMap::new();
    if !inline_body.is_empty() {
        deps::walk_statement(inline_body, &mut dependencies);
    }
    for line in lines[def_index + 1..]
        .iter()
        .take_while(|l| l.indent > header.indent)
    {
        for statement in split_statements(&line.tokens) {
            deps::walk_statement(statement, &mut dependencies);
        }
    }

    Ok(FunctionDecl {
        name: function_name.to_string(),
        params,
        dependencies,
    })
}

fn def_name(line: &LogicalLine) -> Option<&str> {
    let tokens = match line.tokens.first() {
        Some(t) if t.is_name("async") => &line.tokens[1..],
        _ => &line.tokens[..],
    };
    match tokens {
        [def, name, ..] if def.is_name("def") && name.kind == TokenKind::Name => {
            Some(name.text.as_str())
        }
        _ => None,
    }
}

fn split_statements(tokens: &[Token]) -> Vec<&[Token]> {
    let mut depth = 0_usize;
    let mut out = Vec::new();
    let mut start = 0;
    for (i, t) in tokens.iter().enumerate() {
        if t.kind == TokenKind::Op {
            match t.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                ";" if depth == 0 => {
                    out.push(&tokens[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
    }
    out.push(&tokens[start..]);
    out.retain(|s| !s.is_empty());
    out
}

/// Parse `def name(params) [-> ann]:` and return the parameters plus any
/// statement written after the colon on the same line.
fn parse_header(line: &LogicalLine) -> Result<(Vec<Parameter>, &[Token]), AnalysisError> {
    let malformed = |detail: &str| AnalysisError::Syntax {
        line: line.line,
        detail: detail.to_string(),
    };
    let tokens = &line.tokens;
    let open = tokens
        .iter()
        .position(|t| t.is_op("("))
        .ok_or_else(|| malformed("missing parameter list"))?;
    let mut depth = 0_usize;
    let mut close = None;
    for (i, t) in tokens.iter().enumerate().skip(open) {
        if t.is_op("(") || t.is_op("[") || t.is_op("{") {
            depth += 1;
        } else if t.is_op(")") || t.is_op("]") || t.is_op("}") {
            depth -= 1;
            if depth == 0 {
                close = Some(i);
                break;
            }
        }
    }
    let close = close.ok_or_else(|| malformed("unclosed parameter list"))?;
    let colon = tokens[close + 1..]
        .iter()
        .position(|t| t.is_op(":"))
        .map(|p| p + close + 1)
        .ok_or_else(|| malformed("missing ':' after parameter list"))?;
    let params = parse_params(&tokens[open + 1..close]).map_err(|d| malformed(&d))?;
    Ok((params, &tokens[colon + 1..]))
}

fn parse_params(tokens: &[Token]) -> Result<Vec<Parameter>, String> {
    let mut params = Vec::new();
    let mut keyword_only = false;
    let mut depth = 0_usize;
    let mut start = 0;
    let mut parts = Vec::new();
    for (i, t) in tokens.iter().enumerate() {
        if t.is_op("(") || t.is_op("[") || t.is_op("{") {
            depth += 1;
        } else if t.is_op(")") || t.is_op("]") || t.is_op("}") {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && t.is_op(",") {
            parts.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    parts.push(&tokens[start..]);

    for part in parts.into_iter().filter(|p| !p.is_empty()) {
        match part {
            [star] if star.is_op("*") => keyword_only = true,
            [slash] if slash.is_op("/") => {}
            [star, name, ..] if star.is_op("*") && name.kind == TokenKind::Name => {
                keyword_only = true;
                params.push(Parameter {
                    name: name.text.clone(),
                    kind: ParamKind::VarArgs,
                });
            }
            [stars, name, ..] if stars.is_op("**") && name.kind == TokenKind::Name => {
                params.push(Parameter {
                    name: name.text.clone(),
                    kind: ParamKind::VarKeyword,
                });
            }
            [name, ..] if name.kind == TokenKind::Name => params.push(Parameter {
                name: name.text.clone(),
                kind: if keyword_only {
                    ParamKind::KeywordOnly
                } else {
                    ParamKind::Positional
                },
            }),
            [other, ..] => return Err(format!("unexpected {:?} in parameter list", other.text)),
            [] => {}
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
import os

def step(a):
    return a

def step(a, b=2, *rest, scale, **options):
    """Docstring with = and 'quotes'."""
    global counter
    counter = counter + a
    total = counter * scale; label = "n=%d" % total
    if total > 10:
        overflow = total - 10
    return total

def other(x):
    y = x
"#;

    #[test]
    fn last_definition_wins_and_params_parse() {
        let decl = analyze(SOURCE, "step").unwrap();
        let kinds: Vec<(&str, ParamKind)> = decl
            .params
            .iter()
            .map(|p| (p.name.as_str(), p.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("a", ParamKind::Positional),
                ("b", ParamKind::Positional),
                ("rest", ParamKind::VarArgs),
                ("scale", ParamKind::KeywordOnly),
                ("options", ParamKind::VarKeyword),
            ]
        );
        assert_eq!(decl.positional_name(1), Some("b"));
        assert_eq!(decl.positional_name(2), None);
    }

    #[test]
    fn body_stops_at_dedent() {
        let decl = analyze(SOURCE, "step").unwrap();
        let deps = &decl.dependencies;
        assert!(deps.get("counter").unwrap().contains("a"));
        assert!(deps.get("counter").unwrap().contains("counter"));
        assert!(deps.get("label").unwrap().contains("total"));
        assert!(deps.get("overflow").unwrap().contains("total"));
        assert!(deps.get("y").is_none());
    }

    #[test]
    fn inline_body_is_walked() {
        let decl = analyze("def f(p): q = p\n", "f").unwrap();
        assert_eq!(decl.dependencies.get("q").map(|d| d.len()), Some(1));
    }

    #[test]
    fn missing_function() {
        let err = analyze(SOURCE, "absent").unwrap_err();
        assert_eq!(
            err,
            AnalysisError::FunctionNotFound {
                name: "absent".into()
            }
        );
    }

    #[test]
    fn malformed_header() {
        let err = analyze("def f(a)\n    x = a\n", "f").unwrap_err();
        assert!(matches!(err, AnalysisError::Syntax { line: 1, .. }));
    }
}
