use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::storage;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] storage::Error),
    #[error("Unknown argument: {0}")]
    UnknownKey(String),
    #[error("Argument {key} needs {expected}, got {value}")]
    WrongType {
        key: String,
        expected: &'static str,
        value: String,
    },
    #[error("Argument {0} is a list! Need operation add/del before value")]
    IsList(String),
    #[error("Argument {0} is not a list")]
    NotAList(String),
    #[error("Value {value} is not in list {key}")]
    NotInList { key: String, value: String },
}

/// A scan parameter. The variant of a key never changes at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Text(s) => write!(f, "{s}"),
            ParamValue::List(l) => {
                let items: Vec<String> = l.iter().map(Value::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

impl ParamValue {
    /// Parses `raw` into a scalar of the same variant as `self`.
    fn coerce(&self, key: &str, raw: &str) -> Result<ParamValue, Error> {
        let wrong_type = |expected| Error::WrongType {
            key: key.to_string(),
            expected,
            value: raw.to_string(),
        };

        match self {
            ParamValue::Bool(_) => parse_bool(raw)
                .map(ParamValue::Bool)
                .ok_or_else(|| wrong_type("true or false")),
            ParamValue::Int(_) => raw
                .parse()
                .map(ParamValue::Int)
                .map_err(|_| wrong_type("an integer")),
            ParamValue::Float(_) => raw
                .parse()
                .map(ParamValue::Float)
                .map_err(|_| wrong_type("a number")),
            ParamValue::Text(_) => Ok(ParamValue::Text(raw.to_string())),
            ParamValue::List(_) => Err(Error::IsList(key.to_string())),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Text of a list element as users type it: strings unquoted, everything
/// else as JSON.
fn element_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// New list elements take the type of the list's first element. Elements of
/// empty or non-scalar lists are stored as strings.
fn coerce_element(list: &[Value], key: &str, raw: &str) -> Result<Value, Error> {
    let template = match list.first() {
        Some(Value::Bool(b)) => ParamValue::Bool(*b),
        Some(Value::Number(n)) if n.is_i64() => ParamValue::Int(0),
        Some(Value::Number(_)) => ParamValue::Float(0.0),
        _ => return Ok(Value::String(raw.to_string())),
    };

    match template.coerce(key, raw)? {
        ParamValue::Bool(b) => Ok(Value::Bool(b)),
        ParamValue::Int(i) => Ok(Value::from(i)),
        ParamValue::Float(x) => Ok(Value::from(x)),
        _ => Ok(Value::String(raw.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub old: ParamValue,
    pub new: ParamValue,
}

/// Runtime-editable parameters handed to the scanner, mirrored to a JSON
/// document on every change.
#[derive(Debug)]
pub struct ScanParams {
    path: PathBuf,
    values: BTreeMap<String, ParamValue>,
}

impl ScanParams {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let values = storage::load_json(&path).await?.unwrap_or_else(|| {
            log::info!("No scan parameter file at {}, starting empty", path.display());
            BTreeMap::new()
        });

        Ok(Self { path, values })
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Elements of a list parameter as text.
    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        match self.values.get(key)? {
            ParamValue::List(l) => Some(l.iter().map(element_text).collect()),
            _ => None,
        }
    }

    /// Pretty-printed JSON of all parameters.
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(&self.values).unwrap_or_else(|_| "{}".to_string())
    }

    /// Replaces a scalar, coercing `raw` to the type of the current value.
    pub async fn set(&mut self, key: &str, raw: &str) -> Result<Change, Error> {
        let old = self
            .values
            .get(key)
            .ok_or_else(|| Error::UnknownKey(key.to_string()))?
            .clone();
        let new = old.coerce(key, raw)?;

        self.values.insert(key.to_string(), new.clone());
        if let Err(e) = self.persist().await {
            self.values.insert(key.to_string(), old);
            return Err(e);
        }

        Ok(Change { old, new })
    }

    /// Appends `value` to a list parameter and returns the updated list.
    pub async fn add(&mut self, key: &str, value: &str) -> Result<ParamValue, Error> {
        let list = self.list_mut(key)?;
        let element = coerce_element(list, key, value)?;
        list.push(element);

        if let Err(e) = self.persist().await {
            self.list_mut(key)?.pop();
            return Err(e);
        }

        Ok(ParamValue::List(self.list_mut(key)?.clone()))
    }

    /// Removes the first element whose text is `value`. Removing a value that
    /// is not in the list is an error and changes nothing.
    pub async fn remove(&mut self, key: &str, value: &str) -> Result<ParamValue, Error> {
        let list = self.list_mut(key)?;
        let index = list
            .iter()
            .position(|v| element_text(v) == value)
            .ok_or_else(|| Error::NotInList {
                key: key.to_string(),
                value: value.to_string(),
            })?;
        let removed = list.remove(index);

        if let Err(e) = self.persist().await {
            self.list_mut(key)?.insert(index, removed);
            return Err(e);
        }

        Ok(ParamValue::List(self.list_mut(key)?.clone()))
    }

    fn list_mut(&mut self, key: &str) -> Result<&mut Vec<Value>, Error> {
        match self.values.get_mut(key) {
            Some(ParamValue::List(l)) => Ok(l),
            Some(_) => Err(Error::NotAList(key.to_string())),
            None => Err(Error::UnknownKey(key.to_string())),
        }
    }

    async fn persist(&self) -> Result<(), Error> {
        Ok(storage::save_json(&self.path, &self.values).await?)
    }
}
