//! The runtime value model.
//!
//! Strings are the only primitive literal type. There is no implicit
//! coercion: numeric-looking strings stay strings, and commands that want a
//! number parse it themselves.
//!
//! Lists and maps sit behind `Arc`, so copying a value is cheap and two
//! variables may share storage. Indexed assignment and `del` go through
//! [`Value::assoc`] and [`Value::dissoc`], which clone the container only
//! when it is shared.

use std::fmt;
use std::sync::Arc;

use super::closure::Closure;
use super::exception::{ErrorCause, Exception};
use super::scope::Namespace;

#[derive(Clone)]
pub enum Value {
    String(String),
    Bool(bool),
    List(Arc<Vec<Value>>),
    /// Insertion-ordered pairs. Keys are unique; equality ignores order.
    Map(Arc<Vec<(Value, Value)>>),
    Closure(Arc<Closure>),
    /// `None` is `$ok`, the zero exception.
    Exception(Option<Arc<Exception>>),
    Namespace(Arc<Namespace>),
}

impl Value {
    pub fn ok() -> Self {
        Value::Exception(None)
    }

    pub fn empty() -> Self {
        Value::String(String::new())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(items.into_iter().collect()))
    }

    pub fn map(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut out: Vec<(Value, Value)> = Vec::new();
        for (k, v) in pairs {
            match out.iter_mut().find(|(existing, _)| *existing == k) {
                Some(slot) => slot.1 = v,
                None => out.push((k, v)),
            }
        }
        Value::Map(Arc::new(out))
    }

    pub fn exception(e: Exception) -> Self {
        Value::Exception(Some(Arc::new(e)))
    }

    /// Short name of the variant, used in type errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Closure(_) => "fn",
            Value::Exception(_) => "exception",
            Value::Namespace(_) => "ns",
        }
    }

    /// `$false` and every exception except `$ok` are false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Exception(e) => e.is_none(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The string payload, or a type error naming `what`.
    pub fn expect_string(&self, what: &str) -> Result<&str, ErrorCause> {
        self.as_str().ok_or_else(|| {
            ErrorCause::Type(format!("{what} must be a string, got {}", self.kind()))
        })
    }

    /// Elements visited by `for` and `each`: list items, map keys, or the
    /// characters of a string.
    pub fn iterate(&self) -> Result<Vec<Value>, ErrorCause> {
        match self {
            Value::List(items) => Ok(items.as_ref().clone()),
            Value::Map(pairs) => Ok(pairs.iter().map(|(k, _)| k.clone()).collect()),
            Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
            other => Err(ErrorCause::Type(format!("cannot iterate {}", other.kind()))),
        }
    }

    pub fn index(&self, key: &Value) -> Result<Value, ErrorCause> {
        match self {
            Value::List(items) => {
                let key = key.expect_string("list index")?;
                if let Some((from, to)) = parse_slice(key, items.len())? {
                    return Ok(Value::list(items[from..to].iter().cloned()));
                }
                let i = list_position(key, items.len())?;
                Ok(items[i].clone())
            }
            Value::Map(pairs) => pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| ErrorCause::Index(format!("no such key: {}", key.repr()))),
            Value::String(s) => {
                let key = key.expect_string("string index")?;
                let (from, to) = match parse_slice(key, s.len())? {
                    Some(range) => range,
                    None => {
                        let i = list_position(key, s.len())?;
                        let end = s
                            .get(i..)
                            .and_then(|rest| rest.chars().next())
                            .map_or(i, |c| i + c.len_utf8());
                        (i, end)
                    }
                };
                s.get(from..to)
                    .map(|sub| Value::String(sub.to_string()))
                    .ok_or_else(|| ErrorCause::Index(format!("{key} is not a character boundary")))
            }
            Value::Exception(Some(e)) => {
                let key = key.expect_string("exception field")?;
                e.field(key)
                    .ok_or_else(|| ErrorCause::Index(format!("exception has no field {key}")))
            }
            other => Err(ErrorCause::Type(format!("cannot index {}", other.kind()))),
        }
    }

    /// Copy-on-write update of one element.
    pub fn assoc(&mut self, key: &Value, value: Value) -> Result<(), ErrorCause> {
        match self {
            Value::List(items) => {
                let i = list_position(key.expect_string("list index")?, items.len())?;
                Arc::make_mut(items)[i] = value;
                Ok(())
            }
            Value::Map(pairs) => {
                let pairs = Arc::make_mut(pairs);
                match pairs.iter_mut().find(|(k, _)| k == key) {
                    Some(slot) => slot.1 = value,
                    None => pairs.push((key.clone(), value)),
                }
                Ok(())
            }
            other => Err(ErrorCause::Type(format!("cannot assign into {}", other.kind()))),
        }
    }

    /// Copy-on-write removal of one element.
    pub fn dissoc(&mut self, key: &Value) -> Result<(), ErrorCause> {
        match self {
            Value::List(items) => {
                let i = list_position(key.expect_string("list index")?, items.len())?;
                Arc::make_mut(items).remove(i);
                Ok(())
            }
            Value::Map(pairs) => {
                let before = pairs.len();
                Arc::make_mut(pairs).retain(|(k, _)| k != key);
                if pairs.len() == before {
                    return Err(ErrorCause::Index(format!("no such key: {}", key.repr())));
                }
                Ok(())
            }
            other => Err(ErrorCause::Type(format!("cannot delete from {}", other.kind()))),
        }
    }

    /// Source-like rendering, as printed for value output.
    pub fn repr(&self) -> String {
        match self {
            Value::String(s) => quote(s),
            Value::Bool(true) => "$true".to_string(),
            Value::Bool(false) => "$false".to_string(),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(" "))
            }
            Value::Map(pairs) if pairs.is_empty() => "[&]".to_string(),
            Value::Map(pairs) => {
                let inner: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("&{}={}", k.repr(), v.repr()))
                    .collect();
                format!("[{}]", inner.join(" "))
            }
            Value::Closure(c) => format!("<closure {:p}>", Arc::as_ptr(c)),
            Value::Exception(None) => "$ok".to_string(),
            Value::Exception(Some(e)) => format!("[^exception &reason={}]", quote(&e.to_string())),
            Value::Namespace(ns) => format!("<ns {}>", ns.name()),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, ErrorCause> {
        use serde_json::Value as Json;
        Ok(match self {
            Value::String(s) => Json::String(s.clone()),
            Value::Bool(b) => Json::Bool(*b),
            Value::List(items) => {
                Json::Array(items.iter().map(Value::to_json).collect::<Result<_, _>>()?)
            }
            Value::Map(pairs) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in pairs.iter() {
                    let key = k.expect_string("json object key")?;
                    obj.insert(key.to_string(), v.to_json()?);
                }
                Json::Object(obj)
            }
            other => {
                return Err(ErrorCause::Type(format!("cannot encode {} as json", other.kind())))
            }
        })
    }

    /// Numbers become decimal strings and `null` becomes the empty string.
    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::empty(),
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::String(n.to_string()),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::list(items.iter().map(Value::from_json)),
            Json::Object(obj) => Value::map(
                obj.iter()
                    .map(|(k, v)| (Value::String(k.clone()), Value::from_json(v))),
            ),
        }
    }
}

/// Resolve a possibly negative list index.
fn list_position(key: &str, len: usize) -> Result<usize, ErrorCause> {
    let i: isize = key
        .parse()
        .map_err(|_| ErrorCause::Index(format!("bad index: {key}")))?;
    let pos = if i < 0 { len as isize + i } else { i };
    if pos < 0 || pos as usize >= len {
        return Err(ErrorCause::Index(format!("index out of range: {key}")));
    }
    Ok(pos as usize)
}

/// `from..to` with either end optional. `None` when `key` is not a slice.
fn parse_slice(key: &str, len: usize) -> Result<Option<(usize, usize)>, ErrorCause> {
    let Some((from, to)) = key.split_once("..") else {
        return Ok(None);
    };
    let bound = |s: &str, default: usize| -> Result<usize, ErrorCause> {
        if s.is_empty() {
            return Ok(default);
        }
        let i: isize = s
            .parse()
            .map_err(|_| ErrorCause::Index(format!("bad slice: {key}")))?;
        let pos = if i < 0 { len as isize + i } else { i };
        if pos < 0 || pos as usize > len {
            return Err(ErrorCause::Index(format!("slice out of range: {key}")));
        }
        Ok(pos as usize)
    };
    let (from, to) = (bound(from, 0)?, bound(to, len)?);
    if from > to {
        return Err(ErrorCause::Index(format!("inverted slice: {key}")));
    }
    Ok(Some((from, to)))
}

fn quote(s: &str) -> String {
    let bare = !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || "-_./:@%+,=~".contains(c));
    if bare {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "''"))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::Exception(None), Value::Exception(None)) => true,
            (Value::Exception(Some(a)), Value::Exception(Some(b))) => Arc::ptr_eq(a, b),
            (Value::Namespace(a), Value::Namespace(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

/// Strings print raw; everything else prints its repr.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.repr()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
