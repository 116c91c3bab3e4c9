//! Turns a flat token sequence into a [`Pipeline`].
//!
//! ```text
//! entrywise [label:] action arg... [--key=value] [--key,=a,b] [--flag] , [label:] action ...
//! ```
//!
//! Steps are separated by a token equal to the separator (`,` by default).
//! Values are numerically coerced.

use crate::error::{EntryError, Result};
use crate::pipeline::{Pipeline, Step};
use crate::value::{Map, Value};

pub fn parse_pipeline<S: AsRef<str>>(tokens: &[S], separator: &str) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new();
    let mut group: Vec<&str> = Vec::new();
    for token in tokens.iter().map(|token| token.as_ref()).chain(std::iter::once(separator)) {
        if token == separator {
            if !group.is_empty() {
                pipeline.push(parse_step(&group)?);
                group.clear();
            }
        } else {
            group.push(token);
        }
    }
    Ok(pipeline)
}

fn parse_step(tokens: &[&str]) -> Result<Step> {
    let mut tokens = tokens.iter().copied();
    let mut label = None;
    let mut action = tokens.next();
    if let Some(first) = action {
        if first.len() > 1 && first.ends_with(':') {
            label = Some(first.trim_end_matches(':').to_string());
            action = tokens.next();
        }
    }
    let action = action.ok_or_else(|| EntryError::Parse {
        message: format!("step labeled {} names no action", label.as_deref().unwrap_or_default()),
    })?;
    let mut step = Step::new(action);
    step.label = label;
    for token in tokens {
        match token.strip_prefix("--") {
            Some(option) => {
                let (key, value) = parse_option(option)?;
                step.overrides.get_or_insert_with(Map::new).insert(key, value);
            }
            None => step.positional.push(Value::coerce(token)),
        }
    }
    Ok(step)
}

fn parse_option(option: &str) -> Result<(String, Value)> {
    match option.split_once('=') {
        Some((key, list)) if key.ends_with(',') => {
            let key = key.trim_end_matches(',');
            let items = if list.is_empty() { Vec::new() } else { list.split(',').map(Value::coerce).collect() };
            Ok((checked_key(key)?, Value::List(items)))
        }
        Some((key, value)) => Ok((checked_key(key)?, Value::coerce(value))),
        None => Ok((checked_key(option)?, Value::Bool(true))),
    }
}

fn checked_key(key: &str) -> Result<String> {
    if key.is_empty() {
        Err(EntryError::Parse { message: "option without a name".to_string() })
    } else {
        Ok(key.to_string())
    }
}
