//! Reader for the Graph Modelling Language.
//!
//! Only the structure needed to rebuild topology is interpreted: the first
//! top-level `graph` list, its `node` entries (`id`, optional `label`) and
//! its `edge` entries (`source`, `target`). Every other key is parsed and
//! ignored. Directed graphs are read as undirected.

use std::{iter::Peekable, sync::Arc, vec};

use neugraph_core::Graph;

use crate::{assembler::GraphAssembler, errors::GraphFileError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token<'a> {
    Open,
    Close,
    Word(&'a str),
    Text(&'a str),
}

#[derive(Clone, Copy, Debug)]
struct Lexeme<'a> {
    line: usize,
    token: Token<'a>,
}

#[derive(Debug)]
enum Value<'a> {
    Scalar(&'a str),
    List(Vec<(&'a str, Value<'a>)>),
}

/// Parses a GML document into a [`Graph`].
///
/// Node identifiers may be integers or quoted strings. Self-loops and
/// repeated edges are dropped. Nodes keep their `label`, falling back to
/// the identifier.
///
/// # Errors
/// Returns [`GraphFileError::Syntax`] for malformed documents,
/// [`GraphFileError::MissingGraph`] when no `graph` list is present, and
/// [`GraphFileError::UnknownNode`] when an edge names an undeclared node.
///
/// # Examples
/// ```
/// use neugraph_providers_files::parse_gml;
///
/// let graph = parse_gml(
///     r#"graph [
///         directed 1
///         node [ id 0 label "a" ]
///         node [ id 1 label "b" ]
///         edge [ source 0 target 1 ]
///         edge [ source 1 target 0 ]
///     ]"#,
/// )?;
/// assert_eq!(graph.edge_count(), 1);
/// assert_eq!(graph.label(1), Some("b"));
/// # Ok::<(), neugraph_providers_files::GraphFileError>(())
/// ```
pub fn parse_gml(text: &str) -> Result<Graph, GraphFileError> {
    let mut tokens = tokenize(text)?.into_iter().peekable();
    let root = parse_list(&mut tokens, None)?;
    let items = root
        .iter()
        .find_map(|(key, value)| match value {
            Value::List(items) if *key == "graph" => Some(items),
            _ => None,
        })
        .ok_or(GraphFileError::MissingGraph)?;

    let mut assembler = GraphAssembler::default();
    for (key, value) in items {
        let Value::List(fields) = value else {
            continue;
        };
        match *key {
            "node" => {
                let id = required(fields, "node", "id")?;
                assembler.add_node(id, scalar(fields, "label"))?;
            }
            "edge" => {
                let source = required(fields, "edge", "source")?;
                let target = required(fields, "edge", "target")?;
                assembler.add_edge(source, target);
            }
            _ => {}
        }
    }
    assembler.finish()
}

fn scalar<'a>(fields: &[(&'a str, Value<'a>)], name: &str) -> Option<&'a str> {
    fields.iter().find_map(|(key, value)| match value {
        Value::Scalar(text) if *key == name => Some(*text),
        _ => None,
    })
}

fn required<'a>(
    fields: &[(&'a str, Value<'a>)],
    element: &'static str,
    attribute: &'static str,
) -> Result<&'a str, GraphFileError> {
    scalar(fields, attribute).ok_or(GraphFileError::MissingAttribute { element, attribute })
}

fn syntax(line: usize, message: &str) -> GraphFileError {
    GraphFileError::Syntax {
        line,
        message: Arc::from(message),
    }
}

fn tokenize(src: &str) -> Result<Vec<Lexeme<'_>>, GraphFileError> {
    let mut lexemes = Vec::new();
    let mut chars = src.char_indices().peekable();
    let mut line = 1;
    while let Some((start, ch)) = chars.next() {
        let token = match ch {
            '\n' => {
                line += 1;
                continue;
            }
            '#' => {
                while chars.next_if(|&(_, c)| c != '\n').is_some() {}
                continue;
            }
            c if c.is_whitespace() => continue,
            '[' => Token::Open,
            ']' => Token::Close,
            '"' => {
                let opened_on = line;
                let end = loop {
                    match chars.next() {
                        Some((end, '"')) => break end,
                        Some((_, '\n')) => line += 1,
                        Some(_) => {}
                        None => return Err(syntax(opened_on, "unterminated string")),
                    }
                };
                lexemes.push(Lexeme {
                    line: opened_on,
                    token: Token::Text(src.get(start + 1..end).unwrap_or_default()),
                });
                continue;
            }
            _ => {
                let mut end = start + ch.len_utf8();
                while let Some((at, c)) =
                    chars.next_if(|&(_, c)| !c.is_whitespace() && !matches!(c, '[' | ']' | '"'))
                {
                    end = at + c.len_utf8();
                }
                Token::Word(src.get(start..end).unwrap_or_default())
            }
        };
        lexemes.push(Lexeme { line, token });
    }
    Ok(lexemes)
}

/// Parses `key value` pairs until the matching `]`, or end of input at the
/// top level. `opened_on` carries the line of the enclosing `[`.
fn parse_list<'a>(
    tokens: &mut Peekable<vec::IntoIter<Lexeme<'a>>>,
    opened_on: Option<usize>,
) -> Result<Vec<(&'a str, Value<'a>)>, GraphFileError> {
    let mut items = Vec::new();
    loop {
        let Some(Lexeme { line, token }) = tokens.next() else {
            return match opened_on {
                Some(line) => Err(syntax(line, "`[` is never closed")),
                None => Ok(items),
            };
        };
        let key = match token {
            Token::Word(key) => key,
            Token::Close if opened_on.is_some() => return Ok(items),
            Token::Close => return Err(syntax(line, "unexpected `]`")),
            Token::Open | Token::Text(_) => return Err(syntax(line, "expected a key")),
        };
        let value = match tokens.next() {
            Some(Lexeme {
                token: Token::Word(text) | Token::Text(text),
                ..
            }) => Value::Scalar(text),
            Some(Lexeme {
                line: open_line,
                token: Token::Open,
            }) => Value::List(parse_list(tokens, Some(open_line))?),
            Some(Lexeme {
                token: Token::Close,
                ..
            })
            | None => return Err(syntax(line, "key has no value")),
        };
        items.push((key, value));
    }
}
