//! package.json model used by every pipeline step
//!
//! Only the fields the pipeline reads or rewrites are typed; everything else
//! is carried through untouched so a rewritten manifest loses nothing.
//! Key order matters to Node (conditional `exports` are matched in order),
//! so untyped objects keep their order and `save` writes the top-level keys
//! in the order they were loaded.

use crate::core::error::{DepupError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

pub const MANIFEST_FILE: &str = "package.json";

/// Which manifest section a dependency was declared in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DependencySection {
    Dependencies,
    DevDependencies,
}

impl DependencySection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dependencies => "dependencies",
            Self::DevDependencies => "devDependencies",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(
        rename = "devDependencies",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Top-level keys in the order they were read
    #[serde(skip)]
    pub(crate) key_order: Vec<String>,
}

impl PartialEq for PackageManifest {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.scripts == other.scripts
            && self.dependencies == other.dependencies
            && self.dev_dependencies == other.dev_dependencies
            && self.extra == other.extra
    }
}

impl PackageManifest {
    pub fn from_json(content: &str) -> Result<Self> {
        let invalid = |e: serde_json::Error| DepupError::Resolution {
            spec: MANIFEST_FILE.to_string(),
            message: format!("invalid manifest: {}", e),
        };
        let document: Map<String, Value> = serde_json::from_str(content).map_err(invalid)?;
        let key_order = document.keys().cloned().collect();
        let mut manifest: Self = serde_json::from_value(Value::Object(document)).map_err(invalid)?;
        manifest.key_order = key_order;
        Ok(manifest)
    }

    /// Pretty JSON with the loaded keys first, in their original order,
    /// then any key the manifest gained since
    pub fn to_json(&self) -> Result<String> {
        let malformed = |message: String| DepupError::Resolution {
            spec: MANIFEST_FILE.to_string(),
            message,
        };
        let fields = match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            Ok(other) => return Err(malformed(format!("manifest serialised to {}", other))),
            Err(e) => return Err(malformed(e.to_string())),
        };

        let mut ordered = Map::with_capacity(fields.len());
        for key in &self.key_order {
            if let Some(value) = fields.get(key) {
                ordered.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in fields {
            if !ordered.contains_key(&key) {
                ordered.insert(key, value);
            }
        }
        serde_json::to_string_pretty(&Value::Object(ordered)).map_err(|e| malformed(e.to_string()))
    }

    /// Load `package.json` from a package directory
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| DepupError::store(&path, e))?;
        Self::from_json(&content)
    }

    /// Write `package.json` back into a package directory
    pub async fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        let json = self.to_json()?;
        fs::write(&path, json + "\n")
            .await
            .map_err(|e| DepupError::store(&path, e))
    }

    pub fn section(&self, section: DependencySection) -> &BTreeMap<String, String> {
        match section {
            DependencySection::Dependencies => &self.dependencies,
            DependencySection::DevDependencies => &self.dev_dependencies,
        }
    }

    pub fn section_mut(&mut self, section: DependencySection) -> &mut BTreeMap<String, String> {
        match section {
            DependencySection::Dependencies => &mut self.dependencies,
            DependencySection::DevDependencies => &mut self.dev_dependencies,
        }
    }

    /// Merged view of `dependencies` and `devDependencies`, each entry
    /// tagged with the section that holds it
    pub fn merged_dependencies(&self) -> Vec<(DependencySection, &str, &str)> {
        self.dependencies
            .iter()
            .map(|(n, r)| (DependencySection::Dependencies, n.as_str(), r.as_str()))
            .chain(
                self.dev_dependencies
                    .iter()
                    .map(|(n, r)| (DependencySection::DevDependencies, n.as_str(), r.as_str())),
            )
            .collect()
    }
}
