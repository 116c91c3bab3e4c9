//! The query language: comma-separated conditions compiled to filters.
//!
//! ```text
//! condition := key_path binop literal      binop := = == != <> < > <= >= : !:
//!            | key_path unop               unop  := .  ?  +  -
//!            | [! ^ -] tag
//! ```
//!
//! A key path is dot-separated and resolved with `dig`, against own
//! attributes unless parent recursion is asked for. Bare tags test
//! membership in the `tags` attribute. Numeric-looking literals are compared
//! as numbers; an ordering comparison between mismatched types, or against a
//! missing value, is false.

use std::cmp::Ordering;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::entry::{Entry, TAGS_KEY, split_path};
use crate::error::{EntryError, Result};
use crate::value::{Map, Value};

lazy_static! {
    static ref BINARY_CONDITION: Regex = Regex::new(r"^([\w.]*\w)(==|=|!=|<>|<=|>=|<|>|!:|:)(-?[\w.]+)$").unwrap();
    static ref UNARY_CONDITION: Regex = Regex::new(r"^([\w.]*\w)([.?+-])$").unwrap();
    static ref TAG_CONDITION: Regex = Regex::new(r"^([!^-])?(\w+)$").unwrap();
}

type Filter = Box<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

/// One compiled condition: where to look, and what must hold there.
pub struct Condition {
    text: String,
    key_path: Vec<String>,
    filter: Filter,
}
impl Condition {
    pub fn text(&self) -> &str {
        &self.text
    }
    pub fn key_path(&self) -> &[String] {
        &self.key_path
    }
    pub fn holds(&self, entry: &Entry, parent_recursion: bool) -> Result<bool> {
        let value = entry.dig_with(&self.key_path, parent_recursion)?;
        Ok((self.filter)(value.as_ref()))
    }
}
impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Condition({})", self.text)
    }
}

#[derive(Debug)]
pub struct Query {
    conditions: Vec<Condition>,
    positive_tags: Vec<String>,
    positive_values: Map,
}

impl Query {
    pub fn parse(text: &str) -> Result<Query> {
        let mut conditions = Vec::new();
        let mut positive_tags = Vec::new();
        let mut positive_values = Map::new();
        for condition in text.split(',') {
            if let Some(captures) = BINARY_CONDITION.captures(condition) {
                let key_path = captures[1].to_string();
                let against = Value::coerce(&captures[3]);
                let filter: Filter = match &captures[2] {
                    "=" | "==" => {
                        positive_values.insert(key_path.clone(), against.clone());
                        Box::new(move |x: Option<&Value>| x == Some(&against))
                    }
                    "!=" | "<>" => Box::new(move |x: Option<&Value>| x != Some(&against)),
                    "<" => Box::new(move |x: Option<&Value>| ordered(x, &against, |o| o == Ordering::Less)),
                    ">" => Box::new(move |x: Option<&Value>| ordered(x, &against, |o| o == Ordering::Greater)),
                    "<=" => Box::new(move |x: Option<&Value>| ordered(x, &against, |o| o != Ordering::Greater)),
                    ">=" => Box::new(move |x: Option<&Value>| ordered(x, &against, |o| o != Ordering::Less)),
                    ":" => Box::new(move |x: Option<&Value>| x.is_some_and(|v| v.contains(&against))),
                    _ => Box::new(move |x: Option<&Value>| matches!(x, Some(Value::List(items)) if !items.contains(&against))),
                };
                conditions.push(Condition { text: condition.to_string(), key_path: split_path(&key_path), filter });
            } else if let Some(captures) = UNARY_CONDITION.captures(condition) {
                let filter: Filter = match &captures[2] {
                    "." => Box::new(|x: Option<&Value>| x.is_some()),
                    "?" | "+" => Box::new(|x: Option<&Value>| x.is_some_and(Value::truthy)),
                    _ => Box::new(|x: Option<&Value>| !x.is_some_and(Value::truthy)),
                };
                conditions.push(Condition { text: condition.to_string(), key_path: split_path(&captures[1]), filter });
            } else if let Some(captures) = TAG_CONDITION.captures(condition) {
                let tag = Value::Text(captures[2].to_string());
                let filter: Filter = if captures.get(1).is_some() {
                    Box::new(move |x: Option<&Value>| !x.is_some_and(|v| v.contains(&tag)))
                } else {
                    positive_tags.push(captures[2].to_string());
                    Box::new(move |x: Option<&Value>| x.is_some_and(|v| v.contains(&tag)))
                };
                conditions.push(Condition { text: condition.to_string(), key_path: vec![TAGS_KEY.to_string()], filter });
            } else {
                return Err(EntryError::QuerySyntaxError { condition: condition.to_string() });
            }
        }
        Ok(Query { conditions, positive_tags, positive_values })
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
    /// Bare, non-negated tags: the capabilities a producer may offer.
    pub fn positive_tags(&self) -> &[String] {
        &self.positive_tags
    }
    /// `key=val` pairs, handed to producers as overrides.
    pub fn positive_values(&self) -> &Map {
        &self.positive_values
    }

    /// Every condition, in textual order, stopping at the first that fails.
    pub fn matches(&self, entry: &Entry, parent_recursion: bool) -> Result<bool> {
        for condition in &self.conditions {
            if !condition.holds(entry, parent_recursion)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether a producer's advertised tags are all among the query's positive tags.
    pub fn satisfied_by(&self, offered_tags: &[String]) -> bool {
        offered_tags.iter().all(|tag| self.positive_tags.contains(tag))
    }
}

fn ordered(x: Option<&Value>, against: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    x.and_then(|x| x.compare(against)).is_some_and(accept)
}
