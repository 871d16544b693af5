//! Structural queries over an element tree, used by `waitForXPath` polling.
//!
//! Supported: absolute and relative location paths with `/` and `//`, `*`,
//! `.`, name tests compared by local name, and the predicates `[n]`, `[@a]`,
//! `[@a='v']`, `[text()='v']`, `[child='v']` and `[child]`.

use super::tree::{local_name, Element};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError(pub String);

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for QueryError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    SelfNode,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    HasAttr(String),
    AttrEquals(String, String),
    TextEquals(String),
    HasChild(String),
    ChildEquals(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicates: Vec<Predicate>,
}

/// A compiled query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    source: String,
    absolute: bool,
    steps: Vec<Step>,
}

impl Query {
    pub fn compile(expression: &str) -> Result<Self, QueryError> {
        let source = expression.trim();
        if source.is_empty() {
            return Err(QueryError("expression is empty".into()));
        }

        let mut rest = source;
        let absolute = rest.starts_with('/');
        let mut steps = Vec::new();
        let mut axis = Axis::Child;

        if let Some(r) = rest.strip_prefix("//") {
            axis = Axis::Descendant;
            rest = r;
        } else if let Some(r) = rest.strip_prefix('/') {
            rest = r;
        }

        loop {
            if rest.is_empty() {
                return Err(QueryError(format!("missing step in '{}'", source)));
            }
            let (step_text, tail) = split_step(rest)?;
            steps.push(parse_step(step_text, axis)?);

            if tail.is_empty() {
                break;
            }
            if let Some(r) = tail.strip_prefix("//") {
                axis = Axis::Descendant;
                rest = r;
            } else if let Some(r) = tail.strip_prefix('/') {
                axis = Axis::Child;
                rest = r;
            } else {
                return Err(QueryError(format!("unexpected '{}'", tail)));
            }
        }

        Ok(Self {
            source: source.to_string(),
            absolute,
            steps,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Elements selected by the query, in document order.
    pub fn select<'a>(&self, root: &'a Element) -> Vec<&'a Element> {
        let mut context: Vec<&Element>;
        let mut steps = self.steps.iter();

        if self.absolute {
            // The document node's only child is the root element.
            let Some(first) = steps.next() else {
                return vec![root];
            };
            let candidates: Vec<&Element> = match first.axis {
                Axis::Child => vec![root],
                Axis::Descendant => {
                    let mut all = vec![root];
                    all.extend(root.descendants());
                    all
                }
            };
            context = filter(candidates, first);
        } else {
            context = vec![root];
        }

        for step in steps {
            let mut next: Vec<&Element> = Vec::new();
            for node in &context {
                let candidates: Vec<&Element> = match (&step.test, step.axis) {
                    (NameTest::SelfNode, Axis::Child) => vec![*node],
                    (NameTest::SelfNode, Axis::Descendant) => {
                        let mut all = vec![*node];
                        all.extend(node.descendants());
                        all
                    }
                    (_, Axis::Child) => node.child_elements().collect(),
                    (_, Axis::Descendant) => node.descendants(),
                };
                for el in filter(candidates, step) {
                    if !next.iter().any(|seen| std::ptr::eq(*seen, el)) {
                        next.push(el);
                    }
                }
            }
            context = next;
        }
        context
    }

    /// Whether the query selects at least one element.
    pub fn matches(&self, root: &Element) -> bool {
        !self.select(root).is_empty()
    }
}

fn filter<'a>(candidates: Vec<&'a Element>, step: &Step) -> Vec<&'a Element> {
    let mut selected: Vec<&Element> = candidates
        .into_iter()
        .filter(|el| match &step.test {
            NameTest::Any | NameTest::SelfNode => true,
            NameTest::Name(n) => el.local_name() == n,
        })
        .collect();

    for predicate in &step.predicates {
        selected = match predicate {
            Predicate::Position(n) => selected.get(n - 1).copied().into_iter().collect(),
            other => selected
                .into_iter()
                .filter(|el| predicate_holds(el, other))
                .collect(),
        };
    }
    selected
}

fn predicate_holds(el: &Element, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Position(_) => true,
        Predicate::HasAttr(a) => el.attr(a).is_some(),
        Predicate::AttrEquals(a, v) => el.attr(a) == Some(v.as_str()),
        Predicate::TextEquals(v) => el.text().trim() == v,
        Predicate::HasChild(c) => el.child(c).is_some(),
        Predicate::ChildEquals(c, v) => el
            .child_elements()
            .any(|child| child.local_name() == local_name(c) && child.text().trim() == v),
    }
}

/// Split off the first step, respecting brackets and quotes.
fn split_step(s: &str) -> Result<(&str, &str), QueryError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, ch) in s.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| QueryError("unbalanced ']'".into()))?;
            }
            (None, '/') if depth == 0 => return Ok((&s[..i], &s[i..])),
            _ => {}
        }
    }
    if quote.is_some() {
        return Err(QueryError("unterminated string literal".into()));
    }
    if depth != 0 {
        return Err(QueryError("unbalanced '['".into()));
    }
    Ok((s, ""))
}

fn parse_step(text: &str, axis: Axis) -> Result<Step, QueryError> {
    let text = text.trim();
    let (name_part, mut rest) = match text.find('[') {
        Some(i) => (&text[..i], &text[i..]),
        None => (text, ""),
    };

    let test = match name_part.trim() {
        "*" => NameTest::Any,
        "." => NameTest::SelfNode,
        "" => return Err(QueryError(format!("missing name test in '{}'", text))),
        n if is_name(n) => NameTest::Name(local_name(n).to_string()),
        n => return Err(QueryError(format!("invalid name test '{}'", n))),
    };

    let mut predicates = Vec::new();
    while !rest.is_empty() {
        let inner_end = closing_bracket(rest)
            .ok_or_else(|| QueryError(format!("unbalanced predicate in '{}'", text)))?;
        predicates.push(parse_predicate(rest[1..inner_end].trim())?);
        rest = rest[inner_end + 1..].trim_start();
        if !rest.is_empty() && !rest.starts_with('[') {
            return Err(QueryError(format!("unexpected '{}' after predicate", rest)));
        }
    }

    Ok(Step {
        axis,
        test,
        predicates,
    })
}

fn closing_bracket(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, ch) in s.char_indices().skip(1) {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_predicate(p: &str) -> Result<Predicate, QueryError> {
    if p.is_empty() {
        return Err(QueryError("empty predicate".into()));
    }
    if let Ok(n) = p.parse::<usize>() {
        if n == 0 {
            return Err(QueryError("positions start at 1".into()));
        }
        return Ok(Predicate::Position(n));
    }

    let (lhs, rhs) = match p.find('=') {
        Some(i) => (p[..i].trim(), Some(literal(p[i + 1..].trim())?)),
        None => (p, None),
    };

    if let Some(attr) = lhs.strip_prefix('@') {
        if !is_name(attr) {
            return Err(QueryError(format!("invalid attribute name '{}'", attr)));
        }
        return Ok(match rhs {
            Some(v) => Predicate::AttrEquals(attr.to_string(), v),
            None => Predicate::HasAttr(attr.to_string()),
        });
    }
    if lhs == "text()" {
        return rhs
            .map(Predicate::TextEquals)
            .ok_or_else(|| QueryError("text() predicate needs a comparison".into()));
    }
    if is_name(lhs) {
        return Ok(match rhs {
            Some(v) => Predicate::ChildEquals(lhs.to_string(), v),
            None => Predicate::HasChild(lhs.to_string()),
        });
    }
    Err(QueryError(format!("unsupported predicate '{}'", p)))
}

fn literal(s: &str) -> Result<String, QueryError> {
    for q in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return Ok(s[1..s.len() - 1].to_string());
        }
    }
    Err(QueryError(format!("expected a quoted literal, found '{}'", s)))
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}
