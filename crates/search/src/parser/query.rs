//! Query expression parser.
//!
//! Query text is passed to the engine's query-string syntax unchanged unless
//! it contains a `nested(<path>, <expr>)` call. In that case the text is split
//! into top-level clauses joined by `AND` / `OR`, each clause is classified,
//! and field references inside nested scopes are prefixed with the scope path.
//!
//! # Grammar
//!
//! ```text
//! expr     := clause ( ("AND" | "OR") clause )*
//! clause   := ["AND" | "OR" | "NOT"] ( group | nested | text )
//! group    := "(" expr ")"
//! nested   := "nested" [" "] "(" path "," ( expr-with-nested | text ) ")"
//! ```
//!
//! # Examples
//!
//! ```
//! use helios_search::parser::{parse_query_nodes, QueryNode};
//!
//! let nodes = parse_query_nodes("nested(data.Markers, (Depth:>100))").unwrap();
//! assert_eq!(nodes.len(), 1);
//! match &nodes[0] {
//!     QueryNode::Nested { path, .. } => assert_eq!(path, "data.Markers"),
//!     other => panic!("unexpected node {other:?}"),
//! }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};

use super::nested::{contains_nested, nested_call, split_top_level, starts_with_nested};
use crate::error::{ParseResult, QueryError, malformed_query};

/// Expected shape reported for malformed nested query expressions.
const BAD_QUERY_MESSAGE: &str = "Must be in format: nested(<path>, (<query>)) OR nested(<parent_path>, .....nested(<child_path>, (<query>)))";

static AND_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s)]AND[\s(]").expect("AND boundary pattern is valid"));

static OR_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s)]OR[\s(]").expect("OR boundary pattern is valid"));

/// Boolean operator joining a clause to its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `AND`, a required clause.
    And,
    /// `OR`, an optional clause.
    Or,
    /// `NOT`, an excluded clause.
    Not,
}

impl Operator {
    /// Returns the boolean occurrence the operator maps to.
    pub fn occurrence(self) -> &'static str {
        match self {
            Operator::And => "must",
            Operator::Or => "should",
            Operator::Not => "must_not",
        }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "AND" => Some(Operator::And),
            "OR" => Some(Operator::Or),
            "NOT" => Some(Operator::Not),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
        };
        write!(f, "{s}")
    }
}

/// Body of a nested clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NestedBody {
    /// A query-string expression with every field resolved to the nested path.
    Expression(String),
    /// Child clauses, at least one of which is itself nested.
    Clauses(Vec<QueryNode>),
}

/// A parsed clause of a query expression.
///
/// A missing operator is treated as `AND`.
///
/// # Example
///
/// ```
/// use helios_search::parser::{NestedBody, Operator, QueryNode, parse_query_nodes};
///
/// let nodes = parse_query_nodes("Name:top OR nested(data.Markers, (Depth:>100))").unwrap();
/// assert_eq!(nodes.len(), 2);
/// assert_eq!(nodes[1].operator(), Some(Operator::Or));
///
/// let QueryNode::Nested { path, body, .. } = &nodes[1] else {
///     panic!("expected a nested clause");
/// };
/// assert_eq!(path, "data.Markers");
/// assert_eq!(body, &NestedBody::Expression("(data.Markers.Depth:>100)".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    /// Plain query-string text.
    Text {
        /// The text, passed through to the engine unchanged.
        expression: String,
        /// Operator joining the clause to the previous one.
        operator: Option<Operator>,
    },
    /// A parenthesized sub-expression containing nested calls.
    Group {
        /// Operator joining the group to the previous clause.
        operator: Option<Operator>,
        /// Clauses inside the parentheses.
        children: Vec<QueryNode>,
    },
    /// A `nested(<path>, ...)` call.
    Nested {
        /// Nested object path, e.g. `data.Markers`.
        path: String,
        /// Operator joining the call to the previous clause.
        operator: Option<Operator>,
        /// What the call matches inside `path`.
        body: NestedBody,
    },
}

impl QueryNode {
    /// Returns the clause operator, if one was given.
    pub fn operator(&self) -> Option<Operator> {
        match self {
            QueryNode::Text { operator, .. }
            | QueryNode::Group { operator, .. }
            | QueryNode::Nested { operator, .. } => *operator,
        }
    }

    /// Returns the engine query for this clause.
    pub fn to_query(&self) -> Value {
        match self {
            QueryNode::Text { expression, .. } => query_string(expression),
            QueryNode::Group { children, .. } => bool_query(children),
            QueryNode::Nested { path, body, .. } => json!({
                "nested": {
                    "path": path,
                    "query": nested_body_query(body),
                    "score_mode": "avg",
                    "ignore_unmapped": true,
                }
            }),
        }
    }

    /// Returns the query inside a nested clause, or `None` for other clauses.
    ///
    /// Nested sort filters use this in place of the full nested wrapper.
    pub fn nested_query(&self) -> Option<Value> {
        match self {
            QueryNode::Nested { body, .. } => Some(nested_body_query(body)),
            _ => None,
        }
    }
}

fn nested_body_query(body: &NestedBody) -> Value {
    match body {
        NestedBody::Expression(expression) => query_string(expression),
        NestedBody::Clauses(children) => bool_query(children),
    }
}

/// Builds the engine query for free-text query input.
///
/// Text without a nested call becomes a single query-string clause. An empty
/// or blank text matches everything.
pub fn build_text_query(text: &str) -> ParseResult<Value> {
    if contains_nested(text) {
        let nodes = parse_query_nodes(text)?;
        Ok(bool_query(&nodes))
    } else {
        Ok(bool_query(&[QueryNode::Text {
            expression: text.to_string(),
            operator: None,
        }]))
    }
}

/// Parses a query expression into top-level clauses.
///
/// # Errors
///
/// Returns [`QueryError::MalformedQuery`] for unbalanced parentheses or a
/// `nested(...)` call without a path.
pub fn parse_query_nodes(expression: &str) -> ParseResult<Vec<QueryNode>> {
    parse_scoped(expression, None)
}

fn parse_scoped(expression: &str, scope: Option<&str>) -> ParseResult<Vec<QueryNode>> {
    let mut tokens = tokenize(expression)?;

    // The first clause inherits the joining operator of the second.
    if tokens.len() > 1 {
        let prefix = if tokens[1].starts_with("OR") { "OR " } else { "AND " };
        tokens[0] = format!("{prefix}{}", tokens[0]);
    }

    tokens.iter().map(|token| classify(token, scope)).collect()
}

/// Splits an expression into top-level clauses.
///
/// A clause ends where a depth-0 `AND` / `OR` keyword begins, or at the
/// parenthesis that closes a depth-1 group. Parentheses inside double quotes
/// are ignored; a quote opens only if a closing quote exists later.
fn tokenize(expression: &str) -> ParseResult<Vec<String>> {
    let boundaries: HashSet<usize> = AND_BOUNDARY
        .find_iter(expression)
        .chain(OR_BOUNDARY.find_iter(expression))
        .map(|m| m.start())
        .collect();

    let mut tokens = Vec::new();
    let mut token = String::new();
    let mut depth: i32 = 0;
    let mut in_quote = false;

    for (position, (offset, c)) in expression.char_indices().enumerate() {
        if !token.is_empty() || c != ' ' {
            token.push(c);
        }

        let next = offset + c.len_utf8();
        if c == '"' {
            if in_quote {
                in_quote = false;
            } else if expression[next..].contains('"') {
                in_quote = true;
            }
        }
        if in_quote {
            continue;
        }

        match c {
            '(' => depth += 1,
            ')' => {
                if depth == 1 && !token.is_empty() {
                    tokens.push(std::mem::take(&mut token));
                }
                depth -= 1;
                if depth < 0 {
                    return Err(malformed_query(format!(
                        "Malformed closing parentheses in query part: \"{expression}\", at position: {position}"
                    )));
                }
            }
            _ if depth == 0 && !token.is_empty() && boundaries.contains(&next) => {
                tokens.push(std::mem::take(&mut token));
            }
            _ => {}
        }
    }

    let rest = token.trim_end();
    if !rest.is_empty() {
        tokens.push(rest.to_string());
    }

    if depth > 0 {
        return Err(malformed_query(format!(
            "Malformed parentheses in query part: \"{expression}\", {depth} of closing brackets missing"
        )));
    }

    Ok(tokens)
}

/// Splits a leading `AND` / `OR` / `NOT` keyword off a clause.
///
/// The keyword must be followed by whitespace or `(`.
fn split_operator(token: &str) -> (Option<Operator>, &str) {
    let token = token.trim_start();
    for keyword in ["AND", "OR", "NOT"] {
        if let Some(rest) = token.strip_prefix(keyword)
            && rest.starts_with(|c: char| c.is_whitespace() || c == '(')
        {
            return (Operator::from_keyword(keyword), rest.trim_start());
        }
    }
    (None, token)
}

fn classify(token: &str, scope: Option<&str>) -> ParseResult<QueryNode> {
    let (mut operator, mut rest) = split_operator(token);

    // `AND NOT nested(...)` negates the nested clause itself.
    if rest.starts_with("NOT") {
        let (_, negated) = split_operator(rest);
        if starts_with_nested(negated) {
            operator = Some(Operator::Not);
            rest = negated;
        }
    }

    if rest.starts_with('(') && rest.ends_with(')') && contains_nested(rest) {
        let inner = &rest[1..rest.len() - 1];
        return Ok(QueryNode::Group {
            operator,
            children: parse_scoped(inner, scope)?,
        });
    }

    if starts_with_nested(rest) {
        return parse_nested(rest, operator);
    }

    let expression = match scope {
        Some(path) => scope_fields(rest, path),
        None => rest.to_string(),
    };
    Ok(QueryNode::Text {
        expression,
        operator,
    })
}

fn parse_nested(clause: &str, operator: Option<Operator>) -> ParseResult<QueryNode> {
    let malformed = || QueryError::MalformedQuery {
        message: format!("Malformed nested query : {clause}. {BAD_QUERY_MESSAGE}"),
    };

    let (arguments, trailing) = nested_call(clause).ok_or_else(malformed)?;
    if !trailing.trim().is_empty() {
        return Err(malformed());
    }

    let parts = split_top_level(arguments, ',', 2);
    let [path, body] = parts.as_slice() else {
        return Err(malformed());
    };
    if path.is_empty() || path.contains(char::is_whitespace) || body.is_empty() {
        return Err(malformed());
    }

    let body = if contains_nested(body) {
        NestedBody::Clauses(parse_scoped(body, Some(path))?)
    } else {
        NestedBody::Expression(scope_fields(body, path))
    };

    Ok(QueryNode::Nested {
        path: path.to_string(),
        operator,
        body,
    })
}

/// Prefixes bare field references in `expression` with `path.`.
///
/// A field reference is a run of non-space characters followed by `:` that
/// appears at the start of the expression, right after `(`, or right after an
/// `AND` / `OR` / `NOT` keyword. Fields already under `path.` and anything
/// inside double quotes are left alone.
pub fn scope_fields(expression: &str, path: &str) -> String {
    let prefix = format!("{path}.");
    let chars: Vec<char> = expression.chars().collect();
    let mut out = String::with_capacity(expression.len() + prefix.len() * 2);

    let mut expect_field = true;
    let mut in_quote = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_quote {
            out.push(c);
            if c == '"' && chars[i - 1] != '\\' {
                in_quote = false;
            }
            i += 1;
            continue;
        }

        if c == '"' {
            in_quote = true;
            expect_field = false;
            out.push(c);
            i += 1;
            continue;
        }

        if c.is_whitespace() || c == '(' {
            if c == '(' {
                expect_field = true;
            }
            out.push(c);
            i += 1;
            continue;
        }

        let end = word_end(&chars, i);
        let word: String = chars[i..end].iter().collect();
        let at_boundary = i == 0 || matches!(chars[i - 1], ' ' | '\t' | '\n' | '(' | ')');

        if at_boundary
            && Operator::from_keyword(&word).is_some()
            && chars.get(end).is_some_and(|n| n.is_whitespace() || *n == '(')
        {
            out.push_str(&word);
            expect_field = true;
        } else if expect_field && chars.get(end) == Some(&':') && !word.is_empty() {
            if !word.starts_with(&prefix) {
                out.push_str(&prefix);
            }
            out.push_str(&word);
            expect_field = false;
        } else if word.is_empty() {
            out.push(c);
            expect_field = false;
            i += 1;
            continue;
        } else {
            out.push_str(&word);
            expect_field = false;
        }
        i = end;
    }

    out
}

fn word_end(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && !matches!(chars[end], ':' | '(' | ')' | '"') && !chars[end].is_whitespace()
    {
        end += 1;
    }
    end
}

fn query_string(expression: &str) -> Value {
    let query = if expression.trim().is_empty() {
        "*"
    } else {
        expression
    };
    json!({
        "query_string": {
            "query": query,
            "allow_leading_wildcard": false,
            "default_operator": "or",
            "fuzziness": "AUTO",
            "fuzzy_prefix_length": 0,
            "fuzzy_max_expansions": 50,
            "fuzzy_transpositions": true,
            "auto_generate_synonyms_phrase_query": true,
            "boost": 1.0,
        }
    })
}

/// Combines clauses into a bool query by operator occurrence.
pub(crate) fn bool_query(nodes: &[QueryNode]) -> Value {
    let mut occurrences = Map::new();
    for node in nodes {
        let occurrence = node.operator().unwrap_or(Operator::And).occurrence();
        let entry = occurrences
            .entry(occurrence)
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(clauses) = entry {
            clauses.push(node.to_query());
        }
    }
    json!({ "bool": occurrences })
}
