//! Process and compound configuration entities.

use super::reference::Reference;
use super::{NodeId, ProjectId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Executable payload of one process: command, inputs, validations and
/// prerequisites. Kept as opaque JSON; the command engine interprets it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessSettings {
    pub command: Value,
    pub inputs: Vec<Value>,
    pub validations: Vec<Value>,
    pub prerequisites: Vec<Value>,
}

/// One executable configuration unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessConfiguration {
    pub id: NodeId,
    pub source_id: Option<NodeId>,
    pub name: String,
    /// Mirror-file location relative to the flow directory.
    pub path_to_file: String,
    pub execution_target: Option<String>,
    pub settings: ProcessSettings,
    /// Names of sections listing this process (legacy export shape only).
    #[serde(default)]
    pub sections: Vec<String>,
    /// Names of compounds listing this process (legacy export shape only).
    #[serde(default)]
    pub compounds: Vec<String>,
    #[serde(skip)]
    pub project: Option<ProjectId>,
}

impl ProcessConfiguration {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            source_id: None,
            path_to_file: default_process_path(&name),
            name,
            execution_target: None,
            settings: ProcessSettings::default(),
            sections: Vec::new(),
            compounds: Vec::new(),
            project: None,
        }
    }

    pub fn reference(&self) -> Reference {
        Reference::new(self.id, self.name.as_str())
    }
}

/// Ordered group of processes, optionally gated by an input reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundConfiguration {
    pub id: NodeId,
    pub source_id: Option<NodeId>,
    pub name: String,
    pub refer_to_input: Option<String>,
    pub process_refs: Vec<Reference>,
    /// Names of sections listing this compound.
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(skip)]
    pub project: Option<ProjectId>,
}

impl CompoundConfiguration {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            source_id: None,
            name: name.into(),
            refer_to_input: None,
            process_refs: Vec::new(),
            sections: Vec::new(),
            project: None,
        }
    }

    pub fn reference(&self) -> Reference {
        Reference::new(self.id, self.name.as_str())
    }
}

/// Mirror-file name used when a process has no explicit `pathToFile`.
pub fn default_process_path(name: &str) -> String {
    format!("{name}.json")
}

pub(crate) fn push_name(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|existing| existing == name) {
        names.push(name.to_string());
    }
}

pub(crate) fn remove_name(names: &mut Vec<String>, name: &str) {
    names.retain(|existing| existing != name);
}
