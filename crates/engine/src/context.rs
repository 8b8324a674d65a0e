//! Scoped view over the render context.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::directive::NameSet;
use crate::value::{Mapping, Value};

/// The mapping visible while a row renders.
///
/// A range block gets its own scope per element (`overlay`); list rows bind
/// the row's name to one element at a time and restore it afterwards.
/// Entries are shared, so an overlay costs one pointer copy per name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    vars: BTreeMap<String, Arc<Value>>,
}

impl Scope {
    pub fn new(vars: Mapping) -> Self {
        Self { vars: vars.into_iter().map(|(k, v)| (k, Arc::new(v))).collect() }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name).map(|v| v.as_ref())
    }

    /// A handle on `name` that outlives later binds
    pub fn shared(&self, name: &str) -> Option<Arc<Value>> {
        self.vars.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// True iff `name` exists and is a sequence, whatever its elements are
    pub fn is_sequence(&self, name: &str) -> bool {
        self.get(name).is_some_and(Value::is_sequence)
    }

    /// The elements of `name` when it is a sequence of mappings.
    ///
    /// None when absent, not a sequence, or when any element is not a mapping.
    /// An empty sequence qualifies.
    pub fn range_elements(&self, name: &str) -> Option<Vec<&Mapping>> {
        self.get(name)?.as_sequence()?.iter().map(Value::as_mapping).collect()
    }

    /// New scope with every entry of `self`, then every entry of `local`
    /// written over it.
    pub fn overlay(&self, local: &Mapping) -> Scope {
        let mut vars = self.vars.clone();
        for (key, value) in local {
            vars.insert(key.clone(), Arc::new(value.clone()));
        }
        Scope { vars }
    }

    /// Bind `name`, returning what it was bound to before
    pub fn bind(&mut self, name: &str, value: Value) -> Option<Arc<Value>> {
        self.vars.insert(name.to_string(), Arc::new(value))
    }

    /// Undo a `bind` with the value it returned
    pub fn restore(&mut self, name: &str, previous: Option<Arc<Value>>) {
        match previous {
            Some(value) => {
                self.vars.insert(name.to_string(), value);
            }
            None => {
                self.vars.remove(name);
            }
        }
    }

    /// The entries of this scope that `names` can reach
    pub fn visible<'a>(&'a self, names: &'a NameSet) -> Visible<'a> {
        Visible { scope: self, names }
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.visible(&NameSet::everything()).serialize(serializer)
    }
}

/// A scope filtered down to the names a block of rows reads.
pub struct Visible<'a> {
    scope: &'a Scope,
    names: &'a NameSet,
}

impl Serialize for Visible<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_map(None)?;
        for (key, value) in self.scope.vars.iter().filter(|(k, _)| self.names.contains(k)) {
            out.serialize_entry(key, value.as_ref())?;
        }
        out.end()
    }
}

/// Pick the scope for sheet `sheet_index`.
///
/// A mapping applies to every sheet; a sequence supplies one mapping per
/// sheet. Anything else, or a missing/non-mapping element, yields an empty
/// scope.
pub fn resolve(data: &Value, sheet_index: usize) -> Scope {
    let vars = match data {
        Value::Mapping(map) => Some(map),
        Value::Sequence(items) => items.get(sheet_index).and_then(Value::as_mapping),
        Value::Scalar(_) => None,
    };
    match vars {
        Some(map) => Scope::new(map.clone()),
        None => {
            log::debug!("no context for sheet {}", sheet_index);
            Scope::default()
        }
    }
}
