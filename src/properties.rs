//! Property definitions with defaults from comparison.json
//!
//! comparison.json is embedded at compile time and is the only place where
//! property defaults are defined. User values (config file, CLI flags) are
//! layered on top by [`PropertyReader`].

use crate::error::{CompareError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// comparison.json embedded at compile time
const PROPERTIES_JSON: &str = include_str!("../comparison.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PropertyKind {
    #[serde(rename = "StringProperty")]
    String,
    #[serde(rename = "EnumeratedProperty")]
    Enumerated,
}

/// One entry of the `properties` array
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
    #[serde(default)]
    pub default_value: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl PropertyDef {
    /// Accepted values of an enumerated property, `None` for free-form ones
    pub fn allowed_values(&self) -> Option<&[String]> {
        match self.kind {
            PropertyKind::Enumerated => Some(&self.values),
            PropertyKind::String => None,
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        self.allowed_values()
            .map_or(true, |values| values.iter().any(|v| v.eq_ignore_ascii_case(value)))
    }
}

#[derive(Debug, Deserialize)]
struct PropertyFile {
    properties: Vec<PropertyDef>,
}

/// Registry of all properties with their defaults
#[derive(Debug)]
pub struct PropertyRegistry {
    properties: HashMap<String, PropertyDef>,
}

impl PropertyRegistry {
    /// Parse a property file in the comparison.json layout
    pub fn parse(json: &str) -> Result<Self> {
        let file: PropertyFile = serde_json::from_str(json)?;
        let properties = file
            .properties
            .into_iter()
            .map(|def| (def.name.clone(), def))
            .collect();
        Ok(Self { properties })
    }

    pub fn get(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.get(name)
    }

    pub fn default_of(&self, name: &str) -> &str {
        self.get(name).map_or("", |def| def.default_value.as_str())
    }

    /// All property names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.properties.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

static REGISTRY: std::sync::OnceLock<PropertyRegistry> = std::sync::OnceLock::new();

/// Global property registry built from the embedded comparison.json
///
/// Panics if the embedded file is malformed, which `test_registry_loads`
/// rules out.
pub fn registry() -> &'static PropertyRegistry {
    REGISTRY.get_or_init(|| {
        PropertyRegistry::parse(PROPERTIES_JSON).expect("embedded comparison.json is malformed")
    })
}

/// Typed property reader: user values first, comparison.json defaults second
#[derive(Debug, Clone, Default)]
pub struct PropertyReader {
    user_values: HashMap<String, String>,
}

impl PropertyReader {
    pub fn new(user_values: HashMap<String, String>) -> Self {
        let user_values = user_values
            .into_iter()
            .filter(|(_, v)| !v.is_empty()) // Empty = not set
            .collect();
        Self { user_values }
    }

    /// Load user values from a flat JSON object (`{"cell.size.km": 50, ...}`)
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CompareError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&json)?;

        let mut user_values = HashMap::new();
        for (key, value) in map {
            let value_str = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => {
                    eprintln!("⚠ Ignoring non-scalar value for property '{}'", key);
                    continue;
                }
            };
            if registry().get(&key).is_none() {
                eprintln!("⚠ Unknown property '{}' in {}", key, path.display());
            }
            user_values.insert(key, value_str);
        }

        Ok(Self::new(user_values))
    }

    /// Override a property (e.g. from a CLI flag)
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.user_values.remove(name);
        } else {
            self.user_values.insert(name.to_string(), value);
        }
    }

    /// User value if set, otherwise the default
    pub fn get_string(&self, name: &str) -> String {
        match self.user_values.get(name) {
            Some(value) => value.clone(),
            None => registry().default_of(name).to_string(),
        }
    }

    /// Enumerated property; invalid user values fall back to the default
    pub fn get_enum(&self, name: &str) -> String {
        let default = registry().default_of(name);
        let Some(value) = self.user_values.get(name) else {
            return default.to_string();
        };

        match registry().get(name) {
            Some(def) if !def.accepts(value) => {
                eprintln!(
                    "⚠ Invalid value '{}' for property '{}'. Valid values: [{}]. Using default: '{}'",
                    value,
                    name,
                    def.values.join(", "),
                    default
                );
                default.to_string()
            }
            _ => value.clone(),
        }
    }

    /// Optional string property (None if empty)
    pub fn get_optional_string(&self, name: &str) -> Option<String> {
        let value = self.get_string(name);
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// f64 property; an unparsable value is a `Config` error
    pub fn get_f64(&self, name: &str) -> Result<f64> {
        let value = self.get_string(name);
        value.trim().parse::<f64>().map_err(|_| {
            CompareError::Config(format!(
                "Invalid numeric value '{}' for property '{}'",
                value, name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads() {
        let reg = registry();
        for name in ["cell.size.km", "method", "value.column", "output.format"] {
            assert!(reg.get(name).is_some(), "missing {}", name);
        }
        assert_eq!(reg.names().len(), 8);
        assert_eq!(reg.get("output.format").unwrap().kind, PropertyKind::Enumerated);
    }

    #[test]
    fn test_registry_defaults() {
        let reg = registry();
        assert_eq!(reg.default_of("cell.size.km"), "100");
        assert_eq!(reg.default_of("method"), "max");
        assert_eq!(reg.default_of("value.column"), "Te_ppm");
        assert_eq!(reg.default_of("geometry.column"), "geometry");
        assert_eq!(reg.default_of("crs"), "");
        assert_eq!(reg.default_of("no.such.property"), "");
    }

    #[test]
    fn test_enum_validation() {
        let reg = registry();
        let format = reg.get("output.format").unwrap();
        assert!(format.accepts("csv"));
        assert!(format.accepts("PARQUET"));
        assert!(!format.accepts("xlsx"));
        // Non-enumerated properties accept anything
        let x = reg.get("x.column").unwrap();
        assert_eq!(x.allowed_values(), None);
        assert!(x.accepts("easting"));
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        let json = r#"{"properties": [{"kind": "DoubleProperty", "name": "a"}]}"#;
        assert!(matches!(
            PropertyRegistry::parse(json),
            Err(CompareError::Json(_))
        ));
    }

    #[test]
    fn test_reader_defaults() {
        let reader = PropertyReader::default();
        assert_eq!(reader.get_f64("cell.size.km").unwrap(), 100.0);
        assert_eq!(reader.get_enum("output.format"), "parquet");
        assert_eq!(reader.get_optional_string("crs"), None);
    }

    #[test]
    fn test_reader_overrides() {
        let mut reader = PropertyReader::new(HashMap::from([
            ("cell.size.km".to_string(), "25".to_string()),
            ("output.format".to_string(), "xlsx".to_string()),
            ("x.column".to_string(), String::new()),
        ]));
        assert_eq!(reader.get_f64("cell.size.km").unwrap(), 25.0);
        assert_eq!(reader.get_enum("output.format"), "parquet");
        assert_eq!(reader.get_string("x.column"), "x");

        reader.set("crs", "EPSG:3035");
        assert_eq!(reader.get_optional_string("crs").as_deref(), Some("EPSG:3035"));
    }

    #[test]
    fn test_unparsable_number_is_error() {
        let mut reader = PropertyReader::default();
        reader.set("cell.size.km", "abc");
        match reader.get_f64("cell.size.km") {
            Err(CompareError::Config(msg)) => assert!(msg.contains("'abc'")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
