//! Runtime variable storage: cells, frames and namespaces.
//!
//! Which frame a name lives in is decided by the compiler, so nothing here
//! walks a chain. A frame is a flat `name → Cell` map. Closures hold the
//! cells they captured directly, which keeps a cell alive for as long as
//! any closure can still reach it, independent of its frame.
//!
//! Each cell has its own lock. Sibling pipeline commands that write the same
//! captured variable are serialized per cell, never per frame.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::exception::ErrorCause;
use super::value::Value;

/// A shared, mutable storage location for one value.
#[derive(Clone)]
pub struct Cell(Arc<RwLock<Value>>);

impl Cell {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    pub fn get(&self) -> Value {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the value, returning the previous one.
    pub fn set(&self, value: Value) -> Value {
        let mut guard = self.0.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, value)
    }

    /// Read-modify-write under the cell's lock. The value is left unchanged
    /// when `f` fails.
    pub fn update<F>(&self, f: F) -> Result<(), ErrorCause>
    where
        F: FnOnce(&mut Value) -> Result<(), ErrorCause>,
    {
        let mut guard = self.0.write().unwrap_or_else(|e| e.into_inner());
        let mut scratch = guard.clone();
        f(&mut scratch)?;
        *guard = scratch;
        Ok(())
    }

    pub fn same_cell(&self, other: &Cell) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell({:?})", self.get())
    }
}

/// The local variables of one lambda activation, module body, or the
/// kernel's global scope.
#[derive(Default)]
pub struct Frame {
    vars: RwLock<HashMap<String, Cell>>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Cell> {
        self.vars
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// The cell for `name`, created holding the empty string if absent.
    ///
    /// The compiler guarantees the name was declared in this frame; the cell
    /// may still be missing when the declaring assignment sits on a path
    /// that has not run yet.
    pub fn get_or_create(&self, name: &str) -> Cell {
        if let Some(cell) = self.get(name) {
            return cell;
        }
        self.vars
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_insert_with(|| Cell::new(Value::empty()))
            .clone()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.get_or_create(name).set(value);
    }

    pub fn insert(&self, name: impl Into<String>, cell: Cell) {
        self.vars
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), cell);
    }

    pub fn remove(&self, name: &str) -> Option<Cell> {
        self.vars
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Sorted variable names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .vars
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn snapshot(&self) -> HashMap<String, Cell> {
        self.vars.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame").field("names", &self.names()).finish()
    }
}

/// The frozen frame of an evaluated module.
///
/// The member set never changes after load. Importers may read members but
/// the compiler rejects assignments to them.
pub struct Namespace {
    name: String,
    vars: HashMap<String, Cell>,
}

impl Namespace {
    pub fn from_frame(name: impl Into<String>, frame: &Frame) -> Self {
        Self {
            name: name.into(),
            vars: frame.snapshot(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, member: &str) -> Option<Cell> {
        self.vars.get(member).cloned()
    }

    pub fn members(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vars.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.name)
            .field("members", &self.members())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_cell() {
        let frame = Frame::new();
        frame.set("x", "1".into());
        let a = frame.get("x").unwrap();
        let b = frame.get("x").unwrap();
        a.set("2".into());
        assert_eq!(b.get(), Value::from("2"));
        assert!(a.same_cell(&b));
    }

    #[test]
    fn get_or_create_starts_empty() {
        let frame = Frame::new();
        assert!(!frame.contains("fresh"));
        assert_eq!(frame.get_or_create("fresh").get(), Value::empty());
        assert!(frame.contains("fresh"));
    }

    #[test]
    fn failed_update_leaves_value_alone() {
        let cell = Cell::new(Value::list(["a".into()]));
        let err = cell.update(|v| v.assoc(&"5".into(), "x".into()));
        assert!(err.is_err());
        assert_eq!(cell.get(), Value::list(["a".into()]));
    }

    #[test]
    fn captured_cell_outlives_removal_from_frame() {
        let frame = Frame::new();
        frame.set("x", "kept".into());
        let captured = frame.get("x").unwrap();
        frame.remove("x");
        assert!(!frame.contains("x"));
        assert_eq!(captured.get(), Value::from("kept"));
    }

    #[test]
    fn namespace_is_a_snapshot_of_member_names() {
        let frame = Frame::new();
        frame.set("a", "1".into());
        let ns = Namespace::from_frame("lib", &frame);
        frame.set("b", "2".into());
        assert_eq!(ns.members(), vec!["a".to_string()]);
        assert!(ns.get("b").is_none());
    }

    #[test]
    fn concurrent_updates_are_serialized() {
        let cell = Cell::new(Value::list(Vec::<Value>::new()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cell = cell.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        cell.update(|v| match v {
                            Value::List(l) => {
                                std::sync::Arc::make_mut(l).push(format!("{i}-{j}").into());
                                Ok(())
                            }
                            _ => Err(ErrorCause::Type("not a list".into())),
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        match cell.get() {
            Value::List(l) => assert_eq!(l.len(), 400),
            other => panic!("expected list, got {other:?}"),
        }
    }
}
