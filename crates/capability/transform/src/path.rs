//! JSON 路径表达式（JSONPath 子集）。
//!
//! 支持：`$` 根、`.name`、`['name']`、`[n]`（负数从尾部计）、`.*` / `[*]`、
//! `..selector` 递归下降。

use serde_json::Value;
use std::fmt;

/// 占位符前缀：表达式变量必须以此开头。
pub const PLACEHOLDER_PREFIX: &str = "JSON__";
const PLACEHOLDER_SEPARATOR: &str = "__";

/// 路径解析错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("path must start with '$': {0}")]
    MissingRoot(String),
    #[error("invalid path {path} at offset {offset}: {reason}")]
    Syntax {
        path: String,
        offset: usize,
        reason: &'static str,
    },
    #[error("placeholder {0} must start with JSON__")]
    PlaceholderPrefix(String),
    #[error("placeholder {0} has no path segments")]
    EmptyPlaceholder(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Selector {
    Name(String),
    Index(i64),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Child(Selector),
    Descendant(Selector),
}

/// 已解析的路径表达式。
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(input: &str) -> Result<Self, PathError> {
        let text = input.trim();
        let mut parser = Parser {
            path: text,
            chars: text.char_indices().collect(),
            pos: 0,
        };
        parser.parse()
    }

    /// `JSON__payload__items__0` → `$.payload.items[0]`。
    pub fn from_placeholder(name: &str) -> Result<Self, PathError> {
        let rest = name
            .strip_prefix(PLACEHOLDER_PREFIX)
            .ok_or_else(|| PathError::PlaceholderPrefix(name.to_string()))?;
        let segments = rest
            .split(PLACEHOLDER_SEPARATOR)
            .filter(|part| !part.is_empty())
            .map(|part| match part.parse::<i64>() {
                Ok(index) => Segment::Child(Selector::Index(index)),
                Err(_) => Segment::Child(Selector::Name(part.to_string())),
            })
            .collect::<Vec<_>>();
        if segments.is_empty() {
            return Err(PathError::EmptyPlaceholder(name.to_string()));
        }
        Ok(Self { segments })
    }

    /// 返回第一个匹配的节点。
    pub fn find_first<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.find_all(root).into_iter().next()
    }

    pub fn find_all<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut nodes = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for node in nodes {
                match segment {
                    Segment::Child(selector) => select(node, selector, &mut next),
                    Segment::Descendant(selector) => {
                        let mut visited = Vec::new();
                        descendants(node, &mut visited);
                        for item in visited {
                            select(item, selector, &mut next);
                        }
                    }
                }
            }
            if next.is_empty() {
                return next;
            }
            nodes = next;
        }
        nodes
    }
}

fn select<'a>(node: &'a Value, selector: &Selector, out: &mut Vec<&'a Value>) {
    match (selector, node) {
        (Selector::Name(name), Value::Object(map)) => out.extend(map.get(name)),
        (Selector::Index(index), Value::Array(items)) => {
            let len = items.len() as i64;
            let position = if *index < 0 { len + index } else { *index };
            if (0..len).contains(&position) {
                out.push(&items[position as usize]);
            }
        }
        (Selector::Index(index), Value::Object(map)) => out.extend(map.get(&index.to_string())),
        (Selector::Wildcard, Value::Object(map)) => out.extend(map.values()),
        (Selector::Wildcard, Value::Array(items)) => out.extend(items.iter()),
        _ => {}
    }
}

/// 先序遍历：节点自身及所有后代。
fn descendants<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
    out.push(node);
    match node {
        Value::Object(map) => map.values().for_each(|child| descendants(child, out)),
        Value::Array(items) => items.iter().for_each(|child| descendants(child, out)),
        _ => {}
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            let (prefix, selector) = match segment {
                Segment::Child(selector) => ("", selector),
                Segment::Descendant(selector) => ("..", selector),
            };
            match selector {
                Selector::Name(name) if is_plain_name(name) => {
                    if prefix.is_empty() {
                        write!(f, ".{}", name)?;
                    } else {
                        write!(f, "..{}", name)?;
                    }
                }
                Selector::Name(name) => {
                    write!(f, "{}['{}']", prefix, name.replace('\'', "\\'"))?
                }
                Selector::Index(index) => write!(f, "{}[{}]", prefix, index)?,
                Selector::Wildcard => {
                    if prefix.is_empty() {
                        f.write_str(".*")?;
                    } else {
                        f.write_str("..*")?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

struct Parser<'a> {
    path: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Parser<'_> {
    fn parse(&mut self) -> Result<JsonPath, PathError> {
        if self.peek() != Some('$') {
            return Err(PathError::MissingRoot(self.path.to_string()));
        }
        self.pos += 1;

        let mut segments = Vec::new();
        while let Some(c) = self.peek() {
            match c {
                '.' => {
                    self.pos += 1;
                    if self.peek() == Some('.') {
                        self.pos += 1;
                        let selector = if self.peek() == Some('[') {
                            self.bracket()?
                        } else {
                            self.dotted()?
                        };
                        segments.push(Segment::Descendant(selector));
                    } else {
                        segments.push(Segment::Child(self.dotted()?));
                    }
                }
                '[' => segments.push(Segment::Child(self.bracket()?)),
                _ => return Err(self.error("expected '.' or '['")),
            }
        }
        Ok(JsonPath { segments })
    }

    fn dotted(&mut self) -> Result<Selector, PathError> {
        if self.peek() == Some('*') {
            self.pos += 1;
            return Ok(Selector::Wildcard);
        }
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == '.' || c == '[' {
                break;
            }
            name.push(c);
            self.pos += 1;
        }
        if name.is_empty() {
            return Err(self.error("empty member name"));
        }
        Ok(Selector::Name(name))
    }

    fn bracket(&mut self) -> Result<Selector, PathError> {
        self.pos += 1;
        let selector = match self.peek() {
            Some('*') => {
                self.pos += 1;
                Selector::Wildcard
            }
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                let mut name = String::new();
                loop {
                    match self.peek() {
                        Some('\\') => {
                            self.pos += 1;
                            let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                            name.push(escaped);
                            self.pos += 1;
                        }
                        Some(c) if c == quote => {
                            self.pos += 1;
                            break;
                        }
                        Some(c) => {
                            name.push(c);
                            self.pos += 1;
                        }
                        None => return Err(self.error("unterminated string")),
                    }
                }
                Selector::Name(name)
            }
            Some(_) => {
                let mut digits = String::new();
                while let Some(c) = self.peek() {
                    if c == ']' {
                        break;
                    }
                    digits.push(c);
                    self.pos += 1;
                }
                let index = digits
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| self.error("expected index, quoted name or '*'"))?;
                Selector::Index(index)
            }
            None => return Err(self.error("unterminated bracket")),
        };
        if self.peek() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        self.pos += 1;
        Ok(selector)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn error(&self, reason: &'static str) -> PathError {
        let offset = self
            .chars
            .get(self.pos)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.path.len());
        PathError::Syntax {
            path: self.path.to_string(),
            offset,
            reason,
        }
    }
}
