use serde::{Deserialize, Serialize};

use crate::{
    components::{pixel::PixelType, Metadata},
    errors::{RastroError, Result},
};

/// What a driver declares it can do. Consulted by the registry and by
/// generic callers before any backend code runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub raster: bool,
    pub vector: bool,
    pub create: bool,
    pub create_copy: bool,
    pub update: bool,
    pub subdatasets: bool,
    pub virtual_io: bool,
}

/// Value domain of one creation/open option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OptionKind {
    String,
    Int { min: Option<i64>, max: Option<i64> },
    Float,
    Boolean,
    Choice(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionDef {
    pub name: String,
    pub kind: OptionKind,
    pub default: Option<String>,
    pub description: String,
}

impl OptionDef {
    pub fn new(name: &str, kind: OptionKind, default: Option<&str>, description: &str) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            kind,
            default: default.map(str::to_string),
            description: description.to_string(),
        }
    }
}

/// Declared schema of a driver's creation options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionSchema {
    options: Vec<OptionDef>,
}

impl OptionSchema {
    pub fn new(options: Vec<OptionDef>) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &[OptionDef] {
        &self.options
    }

    fn find(&self, name: &str) -> Option<&OptionDef> {
        self.options
            .iter()
            .find(|def| def.name.eq_ignore_ascii_case(name))
    }

    /// Checks user options against the schema and returns the validated
    /// map, upper-cased keys, with declared defaults filled in. Unknown
    /// names, unparsable values and out-of-domain values all fail before
    /// any backend is invoked.
    pub fn validate(&self, user: &[(String, String)]) -> Result<Metadata> {
        let mut validated = Metadata::new();
        for (name, value) in user {
            let def = self.find(name).ok_or_else(|| RastroError::InvalidOption {
                name: name.clone(),
                reason: "not declared by this driver".to_string(),
            })?;
            check_value(def, value)?;
            if validated.insert(def.name.clone(), value.clone()).is_some() {
                return Err(RastroError::InvalidOption {
                    name: name.clone(),
                    reason: "given more than once".to_string(),
                });
            }
        }
        for def in &self.options {
            if let Some(default) = &def.default {
                validated
                    .entry(def.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        Ok(validated)
    }
}

fn check_value(def: &OptionDef, value: &str) -> Result<()> {
    let fail = |reason: String| {
        Err(RastroError::InvalidOption {
            name: def.name.clone(),
            reason,
        })
    };
    match &def.kind {
        OptionKind::String => Ok(()),
        OptionKind::Int { min, max } => match value.parse::<i64>() {
            Err(_) => fail(format!("`{value}` is not an integer")),
            Ok(parsed) => {
                if min.is_some_and(|min| parsed < min) || max.is_some_and(|max| parsed > max) {
                    fail(format!("{parsed} outside allowed range"))
                } else {
                    Ok(())
                }
            }
        },
        OptionKind::Float => {
            if value.parse::<f64>().is_ok() {
                Ok(())
            } else {
                fail(format!("`{value}` is not a number"))
            }
        }
        OptionKind::Boolean => {
            if ["YES", "NO", "TRUE", "FALSE", "ON", "OFF"]
                .contains(&value.to_ascii_uppercase().as_str())
            {
                Ok(())
            } else {
                fail(format!("`{value}` is not a boolean"))
            }
        }
        OptionKind::Choice(choices) => {
            if choices.iter().any(|c| c.eq_ignore_ascii_case(value)) {
                Ok(())
            } else {
                fail(format!("`{value}` not one of {choices:?}"))
            }
        }
    }
}

/// Static document a driver publishes about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverDescriptor {
    pub name: String,
    pub description: String,
    pub capabilities: Capabilities,
    /// Pixel types the driver can create bands of.
    pub create_types: Vec<PixelType>,
    pub creation_options: OptionSchema,
}
