//! Edge proxy backend documents
//!
//! Each edge instance keeps a JSON dynamic config document that the
//! proxy hot-reloads. The backend list sits at a configured JSON pointer
//! and holds `{"url": ...}` entries. Everything else in the document is
//! opaque and preserved.

use serde_json::{Map, Value};

use super::errors::{RuntimeError, RuntimeResult};
use super::EdgeStore;
use crate::cluster::{EdgeInstance, Timing};
use crate::remote::{RemoteCommand, RemoteExecutor};

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeDocument {
    root: Value,
    pointer: String,
}

impl EdgeDocument {
    /// Parse a document. An empty document is treated as `{}`.
    pub fn parse(text: &str, pointer: &str) -> RuntimeResult<Self> {
        let root = if text.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(text)
                .map_err(|e| RuntimeError::malformed("edge document", e.to_string()))?
        };
        if !root.is_object() {
            return Err(RuntimeError::malformed(
                "edge document",
                "top level is not an object",
            ));
        }
        match root.pointer(pointer) {
            None | Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(RuntimeError::malformed(
                    "edge document",
                    format!("{} is not a list", pointer),
                ))
            }
        }
        Ok(Self {
            root,
            pointer: pointer.to_string(),
        })
    }

    /// Registered backend URLs, in document order.
    pub fn backends(&self) -> Vec<String> {
        match self.root.pointer(&self.pointer) {
            Some(Value::Array(entries)) => entries
                .iter()
                .filter_map(entry_url)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.backends().iter().any(|b| b == url)
    }

    /// Register `url`. Returns false when it was already present.
    pub fn add(&mut self, url: &str) -> RuntimeResult<bool> {
        if self.contains(url) {
            return Ok(false);
        }
        let list = self.list_mut()?;
        let mut entry = Map::new();
        entry.insert("url".to_string(), Value::String(url.to_string()));
        list.push(Value::Object(entry));
        Ok(true)
    }

    /// Deregister `url`. Returns false when it was not present.
    pub fn remove(&mut self, url: &str) -> RuntimeResult<bool> {
        if !self.contains(url) {
            return Ok(false);
        }
        let list = self.list_mut()?;
        list.retain(|entry| entry_url(entry) != Some(url));
        Ok(true)
    }

    pub fn render(&self) -> String {
        // Serializing a Value cannot fail.
        let mut out = serde_json::to_string_pretty(&self.root).unwrap_or_default();
        out.push('\n');
        out
    }

    /// The backend list, creating missing objects along the pointer.
    fn list_mut(&mut self) -> RuntimeResult<&mut Vec<Value>> {
        let tokens: Vec<String> = self
            .pointer
            .split('/')
            .skip(1)
            .map(|t| t.replace("~1", "/").replace("~0", "~"))
            .collect();
        let (last, parents) = tokens
            .split_last()
            .ok_or_else(|| RuntimeError::malformed("edge pointer", "empty pointer"))?;

        let mut current = &mut self.root;
        for token in parents {
            let object = current.as_object_mut().ok_or_else(|| {
                RuntimeError::malformed("edge document", format!("{} is not an object", token))
            })?;
            current = object
                .entry(token.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let object = current.as_object_mut().ok_or_else(|| {
            RuntimeError::malformed("edge document", format!("parent of {} is not an object", last))
        })?;
        match object
            .entry(last.clone())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(list) => Ok(list),
            _ => Err(RuntimeError::malformed(
                "edge document",
                format!("{} is not a list", last),
            )),
        }
    }
}

/// Edge documents read and written over the remote channel.
pub struct RemoteEdgeStore<'a> {
    exec: &'a dyn RemoteExecutor,
    timing: &'a Timing,
}

impl<'a> RemoteEdgeStore<'a> {
    pub fn new(exec: &'a dyn RemoteExecutor, timing: &'a Timing) -> Self {
        Self { exec, timing }
    }
}

impl EdgeStore for RemoteEdgeStore<'_> {
    fn load(&self, edge: &EdgeInstance) -> RuntimeResult<String> {
        let out = self.exec.run_ok(
            &edge.host,
            &RemoteCommand::read_file(&edge.config_path),
            self.timing.command_timeout(),
        )?;
        Ok(out.stdout)
    }

    fn store(&self, edge: &EdgeInstance, document: &str) -> RuntimeResult<()> {
        self.exec.run_ok(
            &edge.host,
            &RemoteCommand::write_file(&edge.config_path, document),
            self.timing.command_timeout(),
        )?;
        Ok(())
    }
}

fn entry_url(entry: &Value) -> Option<&str> {
    entry
        .as_str()
        .or_else(|| entry.get("url").and_then(Value::as_str))
}
