//! Nested root document and per-process file shapes.
//!
//! Parsing is tolerant: a malformed node is skipped with a diagnostic and its
//! siblings are still read. Rendering always uses the canonical field names.

use super::parse::{normalize_relative_path, parse_with_fallback, KnownFields};
use crate::model::process::{ProcessConfiguration, ProcessSettings};
use crate::model::project::{CommonConfiguration, HeaderConfiguration, PotHeaderConfiguration};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

const PATH_ALIASES: &[&str] = &["pathToFile", "process", "template", "Process"];
const TYPE_ALIASES: &[&str] = &["execType", "type"];

/// Root document of one project's mirror.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDocument {
    pub common_configuration: CommonConfiguration,
    pub header_configuration: HeaderConfiguration,
    pub pot_header_configuration: PotHeaderConfiguration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_target: Option<String>,
    pub sections: Vec<SectionNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<usize>,
    pub processes: Vec<ExecNode>,
    pub sections: Vec<SectionNode>,
}

/// Member of a section's `processes` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "execType", rename_all = "lowercase")]
pub enum ExecNode {
    Process(ProcessNode),
    Compound(CompoundNode),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Normalized path relative to the document directory.
    pub path_to_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refer_to_input: Option<String>,
    pub process_list: Vec<ProcessNode>,
}

impl KnownFields for CommonConfiguration {
    const FIELDS: &'static [&'static str] = &["stopOnFailure", "retries", "variables"];
}

impl KnownFields for HeaderConfiguration {
    const FIELDS: &'static [&'static str] = &["title", "fields"];
}

impl KnownFields for PotHeaderConfiguration {
    const FIELDS: &'static [&'static str] = &["enabled", "columns"];
}

impl FlowDocument {
    /// Reads a root document value, collecting per-node diagnostics.
    ///
    /// Returns `None` only when `value` is not an object.
    pub fn from_value(value: &Value, diagnostics: &mut Vec<String>) -> Option<Self> {
        let map = value.as_object()?;
        Some(Self {
            common_configuration: parse_singleton(map, "commonConfiguration", diagnostics),
            header_configuration: parse_singleton(map, "headerConfiguration", diagnostics),
            pot_header_configuration: parse_singleton(map, "potHeaderConfiguration", diagnostics),
            default_target: map
                .get("defaultTarget")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|target| !target.is_empty())
                .map(str::to_string),
            sections: parse_sections(map.get("sections"), "", diagnostics),
        })
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn parse_singleton<T>(map: &Map<String, Value>, key: &str, diagnostics: &mut Vec<String>) -> T
where
    T: Default + serde::de::DeserializeOwned + KnownFields,
{
    match map.get(key) {
        None | Some(Value::Null) => T::default(),
        Some(value) => parse_with_fallback(value, key, diagnostics).unwrap_or_default(),
    }
}

fn parse_sections(value: Option<&Value>, trail: &str, diagnostics: &mut Vec<String>) -> Vec<SectionNode> {
    let Some(value) = value else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        diagnostics.push(format!("{}sections: expected an array", prefix(trail)));
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| parse_section(item, trail, index, diagnostics))
        .collect()
}

fn parse_section(
    value: &Value,
    trail: &str,
    index: usize,
    diagnostics: &mut Vec<String>,
) -> Option<SectionNode> {
    let Some(map) = value.as_object() else {
        diagnostics.push(format!("{}sections[{index}]: expected an object", prefix(trail)));
        return None;
    };
    let Some(name) = non_blank(map.get("name")) else {
        diagnostics.push(format!("{}sections[{index}]: section without name", prefix(trail)));
        return None;
    };
    let here = format!("{}section `{name}`", prefix(trail));
    let id = parse_id(map, &here, diagnostics);
    let place = map
        .get("place")
        .and_then(Value::as_u64)
        .and_then(|place| usize::try_from(place).ok());

    let processes = match map.get("processes") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(position, item)| parse_exec(item, &here, position, diagnostics))
            .collect(),
        Some(_) => {
            diagnostics.push(format!("{here}: processes must be an array"));
            Vec::new()
        }
    };

    Some(SectionNode {
        id,
        name,
        place,
        processes,
        sections: parse_sections(map.get("sections"), &here, diagnostics),
    })
}

enum NodeKind {
    Process,
    Compound,
}

fn parse_exec(
    value: &Value,
    trail: &str,
    position: usize,
    diagnostics: &mut Vec<String>,
) -> Option<ExecNode> {
    let Some(map) = value.as_object() else {
        diagnostics.push(format!("{trail}: processes[{position}]: expected an object"));
        return None;
    };
    let kind = match first_string(map, TYPE_ALIASES) {
        Some(kind) => match kind.to_ascii_lowercase().as_str() {
            "process" | "config" => NodeKind::Process,
            "compound" => NodeKind::Compound,
            other => {
                diagnostics.push(format!(
                    "{trail}: processes[{position}]: unsupported node type `{other}`"
                ));
                return None;
            }
        },
        None if map.contains_key("processList") => NodeKind::Compound,
        None if first_string(map, PATH_ALIASES).is_some() => NodeKind::Process,
        None => {
            diagnostics.push(format!(
                "{trail}: processes[{position}]: node has neither a type nor a path"
            ));
            return None;
        }
    };

    match kind {
        NodeKind::Process => parse_process_node(map, trail, position, diagnostics).map(ExecNode::Process),
        NodeKind::Compound => parse_compound_node(map, trail, position, diagnostics).map(ExecNode::Compound),
    }
}

fn parse_process_node(
    map: &Map<String, Value>,
    trail: &str,
    position: usize,
    diagnostics: &mut Vec<String>,
) -> Option<ProcessNode> {
    let here = format!("{trail}: processes[{position}]");
    let Some(raw_path) = first_string(map, PATH_ALIASES) else {
        diagnostics.push(format!("{here}: process node without pathToFile"));
        return None;
    };
    let Some(path_to_file) = normalize_relative_path(&raw_path) else {
        diagnostics.push(format!("{here}: invalid process path `{raw_path}`"));
        return None;
    };
    Some(ProcessNode {
        id: parse_id(map, &here, diagnostics),
        path_to_file,
    })
}

fn parse_compound_node(
    map: &Map<String, Value>,
    trail: &str,
    position: usize,
    diagnostics: &mut Vec<String>,
) -> Option<CompoundNode> {
    let Some(name) = non_blank(map.get("name")) else {
        diagnostics.push(format!("{trail}: processes[{position}]: compound without name"));
        return None;
    };
    let here = format!("{trail}/compound `{name}`");
    let id = parse_id(map, &here, diagnostics);
    let refer_to_input = non_blank(map.get("referToInput"));

    let mut process_list = Vec::new();
    match map.get("processList") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                let Some(member) = item.as_object() else {
                    diagnostics.push(format!("{here}: processList[{index}]: expected an object"));
                    continue;
                };
                let nested_compound = first_string(member, TYPE_ALIASES)
                    .is_some_and(|kind| kind.eq_ignore_ascii_case("compound"));
                if nested_compound {
                    diagnostics.push(format!(
                        "{here}: processList[{index}]: nested compounds are not supported"
                    ));
                    continue;
                }
                if let Some(node) = parse_process_node(member, &here, index, diagnostics) {
                    process_list.push(node);
                }
            }
        }
        Some(_) => diagnostics.push(format!("{here}: processList must be an array")),
    }

    Some(CompoundNode {
        id,
        name,
        refer_to_input,
        process_list,
    })
}

fn parse_id(map: &Map<String, Value>, trail: &str, diagnostics: &mut Vec<String>) -> Option<Uuid> {
    match map.get("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.trim().is_empty() => None,
        Some(Value::String(text)) => match Uuid::parse_str(text.trim()) {
            Ok(id) => Some(id),
            Err(_) => {
                diagnostics.push(format!("{trail}: ignoring invalid id `{text}`"));
                None
            }
        },
        Some(other) => {
            diagnostics.push(format!("{trail}: ignoring non-string id `{other}`"));
            None
        }
    }
}

fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| non_blank(map.get(*key)))
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn prefix(trail: &str) -> String {
    if trail.is_empty() {
        String::new()
    } else {
        format!("{trail}/")
    }
}

/// One per-process mirror file.
///
/// `sections`/`compounds` are written for the legacy shape and ignored on
/// import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_target: Option<String>,
    #[serde(default)]
    pub command: Value,
    #[serde(default)]
    pub inputs: Vec<Value>,
    #[serde(default)]
    pub validations: Vec<Value>,
    #[serde(default)]
    pub prerequisites: Vec<Value>,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub compounds: Vec<String>,
}

impl KnownFields for ProcessDocument {
    const FIELDS: &'static [&'static str] = &[
        "id",
        "name",
        "executionTarget",
        "command",
        "inputs",
        "validations",
        "prerequisites",
        "sections",
        "compounds",
    ];
}

impl ProcessDocument {
    pub fn from_process(process: &ProcessConfiguration) -> Self {
        Self {
            id: Some(process.id),
            name: process.name.clone(),
            execution_target: process.execution_target.clone(),
            command: process.settings.command.clone(),
            inputs: process.settings.inputs.clone(),
            validations: process.settings.validations.clone(),
            prerequisites: process.settings.prerequisites.clone(),
            sections: process.sections.clone(),
            compounds: process.compounds.clone(),
        }
    }

    pub fn settings(&self) -> ProcessSettings {
        ProcessSettings {
            command: self.command.clone(),
            inputs: self.inputs.clone(),
            validations: self.validations.clone(),
            prerequisites: self.prerequisites.clone(),
        }
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
