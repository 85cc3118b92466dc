//! UserData extraction for comparing rendered templates
//!
//! Instance bootstrap scripts are embedded in templates as base64, which
//! makes template diffs unreadable. `extract_user_data` swaps every
//! `UserData` string for the literal `"extracted"` and returns the decoded
//! scripts keyed by their JSON path.

use crate::error::{CloudFormationError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use std::collections::BTreeMap;

pub const PLACEHOLDER: &str = "extracted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTemplate {
    /// The template with every UserData replaced by the placeholder
    pub template: String,

    /// Decoded UserData keyed by path, e.g. `Resources.X.Properties.LaunchTemplateData.UserData`
    pub user_data: BTreeMap<String, String>,
}

impl ExtractedTemplate {
    /// Decoded scripts as a YAML mapping
    pub fn user_data_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.user_data)?)
    }
}

pub fn extract_user_data(document: &str) -> Result<ExtractedTemplate> {
    let mut value: Value = serde_json::from_str(document)?;
    let mut user_data = BTreeMap::new();
    walk(&mut value, "", &mut user_data)?;

    let mut template = serde_json::to_string_pretty(&value)?;
    template.push('\n');
    Ok(ExtractedTemplate {
        template,
        user_data,
    })
}

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn walk(value: &mut Value, path: &str, out: &mut BTreeMap<String, String>) -> Result<()> {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let path = child_path(path, key);
                if key == "UserData" {
                    if let Value::String(encoded) = child {
                        let decoded = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                            CloudFormationError::InvalidUserData {
                                path: path.clone(),
                                reason: e.to_string(),
                            }
                        })?;
                        // carriage returns do not survive YAML block scalars
                        let script = String::from_utf8_lossy(&decoded).replace('\r', "");
                        out.insert(path, script);
                        *child = Value::String(PLACEHOLDER.to_string());
                        continue;
                    }
                }
                walk(child, &path, out)?;
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                walk(item, &child_path(path, &index.to_string()), out)?;
            }
        }
        _ => {}
    }
    Ok(())
}
