//! Assignment walking: from statements to a [`DependencyMap`].

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::lexer::{Token, TokenKind};

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

const COMPOUND: &[&str] = &[
    "if", "elif", "else", "for", "while", "with", "try", "except", "finally", "def", "class",
    "async",
];

const AUGMENTED: &[&str] = &[
    "+=", "-=", "*=", "/=", "//=", "%=", "**=", ">>=", "<<=", "&=", "|=", "^=", "@=",
];

/// Assigned name → names its latest right-hand side reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyMap {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest assignment to `target`, replacing any earlier one.
    pub fn insert(&mut self, target: &str, deps: BTreeSet<String>) {
        self.edges.insert(target.to_string(), deps);
    }

    #[must_use]
    pub fn get(&self, target: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(target)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.edges.iter()
    }

    /// Resolve `name` to the top-level bindings that may influence it.
    ///
    /// `is_root` decides whether a top-level name is a parameter or global.
    /// A path whose root segment passes `is_root` is a result and is kept
    /// dotted (`"ledger.total"`). Dependencies are followed through the map,
    /// including assignments to dotted children of a name (`name.field`).
    #[must_use]
    pub fn influencers(&self, name: &str, is_root: impl Fn(&str) -> bool) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::from([name.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let root = current.split('.').next().unwrap_or(&current);
            if is_root(root) {
                found.insert(current.clone());
            }
            let prefix = format!("{current}.");
            let children = self
                .edges
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .flat_map(|(_, deps)| deps.iter());
            for dep in self.edges.get(&current).into_iter().flatten().chain(children) {
                if !seen.contains(dep) {
                    queue.push_back(dep.clone());
                }
            }
        }
        found
    }
}

/// Walk one logical statement and record its assignments.
pub(crate) fn walk_statement(tokens: &[Token], map: &mut DependencyMap) {
    let Some(first) = tokens.first() else {
        return;
    };
    if first.kind == TokenKind::Name && COMPOUND.contains(&first.text.as_str()) {
        walk_compound(tokens, map);
        return;
    }
    if first.kind == TokenKind::Name && KEYWORDS.contains(&first.text.as_str()) {
        return;
    }

    if let Some(pos) = top_level_position(tokens, |t| {
        t.kind == TokenKind::Op && AUGMENTED.contains(&t.text.as_str())
    }) {
        for (key, mut deps) in targets(&tokens[..pos]) {
            deps.extend(references(&tokens[pos + 1..]));
            deps.insert(key.clone());
            map.insert(&key, prune_prefixes(deps));
        }
        return;
    }

    let eq_positions = top_level_positions(tokens, |t| t.is_op("="));
    let colon = top_level_position(tokens, |t| t.is_op(":"));
    if let Some(colon) = colon {
        // Annotated assignment: `x: T = value`.
        let Some(&eq) = eq_positions.first() else {
            return;
        };
        if colon < eq {
            for (key, mut deps) in targets(&tokens[..colon]) {
                deps.extend(references(&tokens[eq + 1..]));
                map.insert(&key, prune_prefixes(deps));
            }
            return;
        }
    }
    let Some(&last) = eq_positions.last() else {
        return;
    };
    let value = references(&tokens[last + 1..]);
    let mut start = 0;
    for &eq in &eq_positions {
        for (key, mut deps) in targets(&tokens[start..eq]) {
            deps.extend(value.iter().cloned());
            map.insert(&key, prune_prefixes(deps));
        }
        start = eq + 1;
    }
}

/// `if c: x = y` and friends. A `for` header binds its targets to the
/// iterable. The inline body after the header colon is walked as a
/// statement of its own.
fn walk_compound(tokens: &[Token], map: &mut DependencyMap) {
    let Some(colon) = top_level_position(tokens, |t| t.is_op(":")) else {
        return;
    };
    let header = &tokens[..colon];
    let header = if header.first().is_some_and(|t| t.is_name("async")) {
        &header[1..]
    } else {
        header
    };
    if header.first().is_some_and(|t| t.is_name("for")) {
        if let Some(in_pos) = top_level_position(header, |t| t.is_name("in")) {
            let iterable = references(&header[in_pos + 1..]);
            for (key, mut deps) in targets(&header[1..in_pos]) {
                deps.extend(iterable.iter().cloned());
                map.insert(&key, prune_prefixes(deps));
            }
        }
    }
    let body = &tokens[colon + 1..];
    if !body.is_empty() && !header.first().is_some_and(|t| t.is_name("def") || t.is_name("class")) {
        walk_statement(body, map);
    }
}

fn top_level_positions(tokens: &[Token], pred: impl Fn(&Token) -> bool) -> Vec<usize> {
    let mut depth = 0_usize;
    let mut found = Vec::new();
    let mut in_lambda = 0_usize;
    for (i, t) in tokens.iter().enumerate() {
        if t.kind == TokenKind::Op {
            match t.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        if depth == 0 && t.is_name("lambda") {
            in_lambda += 1;
            continue;
        }
        if depth == 0 && in_lambda > 0 && t.is_op(":") {
            in_lambda -= 1;
            continue;
        }
        if depth == 0 && pred(t) {
            found.push(i);
        }
    }
    found
}

fn top_level_position(tokens: &[Token], pred: impl Fn(&Token) -> bool) -> Option<usize> {
    top_level_positions(tokens, pred).first().copied()
}

/// Split a target list into `(key, deps)` pairs. Subscript index names
/// become dependencies of the subscripted base.
fn targets(tokens: &[Token]) -> Vec<(String, BTreeSet<String>)> {
    let mut out = Vec::new();
    let mut start = 0;
    let commas = top_level_positions(tokens, |t| t.is_op(","));
    for end in commas.into_iter().chain(std::iter::once(tokens.len())) {
        let part = &tokens[start..end];
        start = end + 1;
        let part = match part.first() {
            Some(t) if t.is_op("*") => &part[1..],
            _ => part,
        };
        if part.is_empty() {
            continue;
        }
        if is_wrapped(part) {
            out.extend(targets(&part[1..part.len() - 1]));
            continue;
        }
        if let Some(target) = single_target(part) {
            out.push(target);
        }
    }
    out
}

/// True if the slice is one bracket pair around everything, `(a, b)`.
fn is_wrapped(part: &[Token]) -> bool {
    let (Some(first), Some(last)) = (part.first(), part.last()) else {
        return false;
    };
    let pair = (first.is_op("(") && last.is_op(")")) || (first.is_op("[") && last.is_op("]"));
    if !pair || part.len() < 2 {
        return false;
    }
    let mut depth = 0_usize;
    for (i, t) in part.iter().enumerate() {
        if t.is_op("(") || t.is_op("[") || t.is_op("{") {
            depth += 1;
        } else if t.is_op(")") || t.is_op("]") || t.is_op("}") {
            depth = depth.saturating_sub(1);
            if depth == 0 && i + 1 < part.len() {
                return false;
            }
        }
    }
    true
}

fn single_target(part: &[Token]) -> Option<(String, BTreeSet<String>)> {
    let first = part.first()?;
    if first.kind != TokenKind::Name || KEYWORDS.contains(&first.text.as_str()) {
        return None;
    }
    let mut key = first.text.clone();
    let mut i = 1;
    while i + 1 < part.len() && part[i].is_op(".") && part[i + 1].kind == TokenKind::Name {
        key.push('.');
        key.push_str(&part[i + 1].text);
        i += 2;
    }
    let mut deps = BTreeSet::new();
    if part.get(i).is_some_and(|t| t.is_op("[")) {
        deps.extend(references(&part[i..]));
    }
    Some((key, deps))
}

/// Identifiers and dotted chains read by an expression.
pub(crate) fn references(tokens: &[Token]) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut depth = 0_usize;
    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        if t.kind == TokenKind::Op {
            match t.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                _ => {}
            }
            i += 1;
            continue;
        }
        if t.kind != TokenKind::Name || KEYWORDS.contains(&t.text.as_str()) {
            i += 1;
            continue;
        }
        // Attribute of a non-name expression, `f(x).y` or `"s".join`.
        if i > 0 && tokens[i - 1].is_op(".") {
            i += 1;
            continue;
        }
        // Call keyword, `f(key=value)`.
        if depth > 0
            && tokens.get(i + 1).is_some_and(|n| n.is_op("="))
            && i > 0
            && (tokens[i - 1].is_op("(") || tokens[i - 1].is_op(","))
        {
            i += 1;
            continue;
        }
        let mut segments = vec![t.text.as_str()];
        let mut j = i + 1;
        while j + 1 < tokens.len() && tokens[j].is_op(".") && tokens[j + 1].kind == TokenKind::Name
        {
            segments.push(tokens[j + 1].text.as_str());
            j += 2;
        }
        // Method call: `obj.method(...)` reads `obj`.
        if segments.len() > 1 && tokens.get(j).is_some_and(|n| n.is_op("(")) {
            segments.pop();
        }
        found.insert(segments.join("."));
        i = j;
    }
    found
}

/// Drop every name that is a strict textual prefix of another.
pub(crate) fn prune_prefixes(names: BTreeSet<String>) -> BTreeSet<String> {
    names
        .iter()
        .filter(|name| {
            !names
                .iter()
                .any(|other| other.len() > name.len() && other.starts_with(name.as_str()))
        })
        .cloned()
        .collect()
}
