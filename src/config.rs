//! Mapping file loading.
//!
//! The mapping file is a list of groups, each naming the databases its
//! tables live in:
//!
//! ```yaml
//! - sourceDatabase: sales
//!   targetDatabase: sales_mirror
//!   tablesForChanges:
//!     - sourceSchema: public
//!       sourceTable: orders
//!       targetSchema: public
//!       targetTable: orders
//!       primaryKey: [id]
//! ```
//!
//! JSON and YAML are both accepted, chosen by file extension.

use anyhow::{bail, Context};
use mirror_core::{QualifiedName, TableMapping};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Mappings that share a source and target database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingGroup {
    pub source_database: String,
    /// Defaults to `source_database`
    #[serde(default)]
    pub target_database: Option<String>,
    pub tables_for_changes: Vec<TableMapping>,
}

impl MappingGroup {
    pub fn target_database(&self) -> &str {
        self.target_database
            .as_deref()
            .unwrap_or(&self.source_database)
    }
}

/// Read and validate the mapping file at `path`.
pub fn load_mapping_groups(path: &Path) -> anyhow::Result<Vec<MappingGroup>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mapping file {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let groups = match extension.as_deref() {
        Some("json") => parse_json(&content),
        Some("yaml") | Some("yml") => parse_yaml(&content),
        other => bail!(
            "Unsupported mapping file extension {:?} for {}, expected .json, .yaml or .yml",
            other.unwrap_or(""),
            path.display()
        ),
    }
    .with_context(|| format!("Failed to parse mapping file {}", path.display()))?;

    validate(&groups)?;
    Ok(groups)
}

pub fn parse_json(content: &str) -> anyhow::Result<Vec<MappingGroup>> {
    Ok(serde_json::from_str(content)?)
}

pub fn parse_yaml(content: &str) -> anyhow::Result<Vec<MappingGroup>> {
    Ok(serde_yaml::from_str(content)?)
}

/// Check every mapping and reject two mappings writing the same target.
pub fn validate(groups: &[MappingGroup]) -> anyhow::Result<()> {
    let mut targets: Vec<(&str, QualifiedName)> = Vec::new();
    for group in groups {
        if group.source_database.is_empty() {
            bail!("Mapping group has an empty sourceDatabase");
        }
        for mapping in &group.tables_for_changes {
            mapping
                .validate()
                .with_context(|| format!("Invalid mapping {}", mapping.label()))?;

            let target = (group.target_database(), mapping.target());
            if targets.contains(&target) {
                bail!(
                    "Table {} in database {} is the target of more than one mapping",
                    target.1,
                    target.0
                );
            }
            targets.push(target);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
- sourceDatabase: sales
  targetDatabase: sales_mirror
  tablesForChanges:
    - sourceSchema: public
      sourceTable: orders
      targetSchema: mirror
      targetTable: orders
      primaryKey: [id]
- sourceDatabase: hr
  tablesForChanges:
    - sourceSchema: public
      sourceTable: people
      targetSchema: public
      targetTable: people_copy
      primaryKey: [region, id]
      lastModifiedColumn: updated_on
"#;

    #[test]
    fn test_parse_yaml_groups() {
        let groups = parse_yaml(YAML).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].target_database(), "sales_mirror");
        assert_eq!(groups[1].target_database(), "hr");

        let people = &groups[1].tables_for_changes[0];
        assert_eq!(people.primary_key.len(), 2);
        assert_eq!(
            people.last_modified_column.as_ref().map(|c| c.as_str()),
            Some("updated_on")
        );
        validate(&groups).unwrap();
    }

    #[test]
    fn test_json_and_yaml_agree() {
        let from_yaml = parse_yaml(YAML).unwrap();
        let json = serde_json::to_string(&from_yaml).unwrap();
        assert_eq!(parse_json(&json).unwrap(), from_yaml);
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let mut groups = parse_yaml(YAML).unwrap();
        let copy = groups[0].tables_for_changes[0].clone();
        groups[0].tables_for_changes.push(copy);

        let err = validate(&groups).unwrap_err();
        assert!(err.to_string().contains("more than one mapping"));
    }

    #[test]
    fn test_same_table_in_different_databases_allowed() {
        let mut groups = parse_yaml(YAML).unwrap();
        let mut other = groups[0].clone();
        other.target_database = Some("sales_archive".to_string());
        groups.push(other);

        validate(&groups).unwrap();
    }
}
