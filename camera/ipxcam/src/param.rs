//! Typed GenICam parameters.

use std::sync::Arc;

use ipxcam_types::{ParamType, Visibility};

use crate::event::{ObserverRegistry, ParamObserver, SubscriptionId};
use crate::{Error, Result};

/// An entry of an enumeration parameter.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EnumEntry {
    pub name: String,
    pub value: i64,
    pub available: bool,
}

/// The typed value of a parameter together with its constraints.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum ParamKind {
    Int {
        value: i64,
        min: i64,
        max: i64,
        inc: i64,
    },
    Float {
        value: f64,
        min: f64,
        max: f64,
        unit: String,
    },
    String {
        value: String,
        max_len: usize,
    },
    Enum {
        value: i64,
        entries: Vec<EnumEntry>,
    },
    Boolean {
        value: bool,
    },
    Command {
        done: bool,
    },
    Category {
        children: Vec<String>,
    },
}

impl ParamKind {
    pub fn param_type(&self) -> ParamType {
        match self {
            Self::Int { .. } => ParamType::Int,
            Self::Float { .. } => ParamType::Float,
            Self::String { .. } => ParamType::String,
            Self::Enum { .. } => ParamType::Enum,
            Self::Boolean { .. } => ParamType::Boolean,
            Self::Command { .. } => ParamType::Command,
            Self::Category { .. } => ParamType::Category,
        }
    }
}

/// A snapshot of one parameter of a [ParamTree].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Param {
    pub name: String,
    pub display_name: String,
    pub tooltip: String,
    pub description: String,
    pub visibility: Visibility,
    pub available: bool,
    pub readable: bool,
    pub writable: bool,
    pub kind: ParamKind,
}

impl Param {
    pub fn new(name: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_string(),
            display_name: name.to_string(),
            tooltip: String::new(),
            description: String::new(),
            visibility: Visibility::Beginner,
            available: true,
            readable: true,
            writable: true,
            kind,
        }
    }

    pub fn param_type(&self) -> ParamType {
        self.kind.param_type()
    }

    /// The name of the current entry of an enumeration parameter.
    pub fn enum_entry(&self) -> Option<&str> {
        match &self.kind {
            ParamKind::Enum { value, entries } => entries
                .iter()
                .find(|e| e.value == *value)
                .map(|e| e.name.as_str()),
            _ => None,
        }
    }

    /// Format the current value for display.
    ///
    /// Commands report their completion state and categories their number of
    /// children.
    pub fn value_string(&self) -> String {
        match &self.kind {
            ParamKind::Int { value, .. } => value.to_string(),
            ParamKind::Float { value, .. } => value.to_string(),
            ParamKind::String { value, .. } => value.clone(),
            ParamKind::Enum { value, .. } => match self.enum_entry() {
                Some(name) => name.to_string(),
                None => value.to_string(),
            },
            ParamKind::Boolean { value } => value.to_string(),
            ParamKind::Command { done } => {
                if *done {
                    "done".to_string()
                } else {
                    "pending".to_string()
                }
            }
            ParamKind::Category { children } => format!("{} children", children.len()),
        }
    }

    pub(crate) fn wrong_type(&self, expected: ParamType) -> Error {
        Error::WrongType {
            name: self.name.clone(),
            expected,
            actual: self.param_type(),
        }
    }
}

/// A value to write to a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamWrite {
    Int(i64),
    Float(f64),
    Str(String),
    EnumName(String),
    EnumValue(i64),
    Bool(bool),
}

impl ParamWrite {
    /// Parse user supplied text into a write matching the type of `param`.
    ///
    /// Booleans accept `true`, `True`, `TRUE` or an integer (non-zero is
    /// true). Enumerations accept an entry name or its integer value.
    /// Commands and categories cannot be written.
    pub fn parse_for(param: &Param, text: &str) -> Result<Self> {
        let text = text.trim();
        let invalid = |what: &str| {
            Error::InvalidArgument(format!(
                "cannot parse \"{text}\" as {what} for parameter \"{}\"",
                param.name
            ))
        };
        match &param.kind {
            ParamKind::Int { .. } => text
                .parse::<i64>()
                .map(ParamWrite::Int)
                .map_err(|_| invalid("integer")),
            ParamKind::Float { .. } => text
                .parse::<f64>()
                .map(ParamWrite::Float)
                .map_err(|_| invalid("float")),
            ParamKind::String { .. } => Ok(ParamWrite::Str(text.to_string())),
            ParamKind::Boolean { .. } => match text {
                "true" | "True" | "TRUE" => Ok(ParamWrite::Bool(true)),
                "false" | "False" | "FALSE" => Ok(ParamWrite::Bool(false)),
                other => other
                    .parse::<i64>()
                    .map(|v| ParamWrite::Bool(v != 0))
                    .map_err(|_| invalid("boolean")),
            },
            ParamKind::Enum { entries, .. } => {
                if entries.iter().any(|e| e.name == text) {
                    Ok(ParamWrite::EnumName(text.to_string()))
                } else {
                    text.parse::<i64>()
                        .map(ParamWrite::EnumValue)
                        .map_err(|_| invalid("enumeration entry"))
                }
            }
            ParamKind::Command { .. } | ParamKind::Category { .. } => Err(Error::WrongType {
                name: param.name.clone(),
                expected: ParamType::String,
                actual: param.param_type(),
            }),
        }
    }
}

/// A GenICam parameter tree.
///
/// Reads may happen from several threads at once. Writes and command
/// execution affecting acquisition should be serialized by the caller.
pub trait ParamTree: Send + Sync {
    /// Names of every parameter in the tree.
    fn names(&self) -> Vec<String>;
    fn param(&self, name: &str) -> Result<Param>;
    fn write(&self, name: &str, value: ParamWrite) -> Result<()>;
    /// Execute a command parameter.
    fn execute(&self, name: &str) -> Result<()>;
    /// Registry of observers notified of parameter updates.
    fn observers(&self) -> &ObserverRegistry;

    fn contains(&self, name: &str) -> bool {
        self.param(name).is_ok()
    }

    /// Register `observer` for updates of parameter `name`.
    fn subscribe(&self, name: &str, observer: Arc<dyn ParamObserver>) -> Result<SubscriptionId> {
        // validate the name before registering
        self.param(name)?;
        Ok(self.observers().subscribe_param(name, observer))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers().unsubscribe(id)
    }

    fn int_value(&self, name: &str) -> Result<i64> {
        let p = self.param(name)?;
        match p.kind {
            ParamKind::Int { value, .. } => Ok(value),
            _ => Err(p.wrong_type(ParamType::Int)),
        }
    }

    fn set_int_value(&self, name: &str, value: i64) -> Result<()> {
        self.write(name, ParamWrite::Int(value))
    }

    fn float_value(&self, name: &str) -> Result<f64> {
        let p = self.param(name)?;
        match p.kind {
            ParamKind::Float { value, .. } => Ok(value),
            ParamKind::Int { value, .. } => Ok(value as f64),
            _ => Err(p.wrong_type(ParamType::Float)),
        }
    }

    fn set_float_value(&self, name: &str, value: f64) -> Result<()> {
        self.write(name, ParamWrite::Float(value))
    }

    fn bool_value(&self, name: &str) -> Result<bool> {
        let p = self.param(name)?;
        match p.kind {
            ParamKind::Boolean { value } => Ok(value),
            _ => Err(p.wrong_type(ParamType::Boolean)),
        }
    }

    fn set_bool_value(&self, name: &str, value: bool) -> Result<()> {
        self.write(name, ParamWrite::Bool(value))
    }

    fn string_value(&self, name: &str) -> Result<String> {
        let p = self.param(name)?;
        match p.kind {
            ParamKind::String { value, .. } => Ok(value),
            _ => Err(p.wrong_type(ParamType::String)),
        }
    }

    /// Name of the current entry of an enumeration parameter.
    fn enum_value(&self, name: &str) -> Result<String> {
        let p = self.param(name)?;
        match p.enum_entry() {
            Some(entry) => Ok(entry.to_string()),
            None => Err(p.wrong_type(ParamType::Enum)),
        }
    }

    fn set_enum_value(&self, name: &str, entry: &str) -> Result<()> {
        self.write(name, ParamWrite::EnumName(entry.to_string()))
    }

    /// Parse `text` according to the parameter type and write it.
    fn set_from_str(&self, name: &str, text: &str) -> Result<()> {
        let p = self.param(name)?;
        let value = ParamWrite::parse_for(&p, text)?;
        self.write(name, value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn enum_param() -> Param {
        Param::new(
            "TriggerMode",
            ParamKind::Enum {
                value: 0,
                entries: vec![
                    EnumEntry {
                        name: "Off".into(),
                        value: 0,
                        available: true,
                    },
                    EnumEntry {
                        name: "On".into(),
                        value: 1,
                        available: true,
                    },
                ],
            },
        )
    }

    #[test]
    fn test_parse_bool() {
        let p = Param::new("PulseGenEnable", ParamKind::Boolean { value: false });
        for text in ["true", "True", "TRUE", "1", " 7 "] {
            assert_eq!(ParamWrite::parse_for(&p, text).unwrap(), ParamWrite::Bool(true));
        }
        assert_eq!(ParamWrite::parse_for(&p, "0").unwrap(), ParamWrite::Bool(false));
        assert!(matches!(
            ParamWrite::parse_for(&p, "yes"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parse_enum_prefers_name() {
        let p = enum_param();
        assert_eq!(p.enum_entry(), Some("Off"));
        assert_eq!(
            ParamWrite::parse_for(&p, "On").unwrap(),
            ParamWrite::EnumName("On".into())
        );
        assert_eq!(
            ParamWrite::parse_for(&p, "1").unwrap(),
            ParamWrite::EnumValue(1)
        );
        assert!(ParamWrite::parse_for(&p, "Maybe").is_err());
    }

    #[test]
    fn test_parse_numbers() {
        let p = Param::new(
            "Width",
            ParamKind::Int {
                value: 640,
                min: 16,
                max: 4096,
                inc: 16,
            },
        );
        assert_eq!(ParamWrite::parse_for(&p, "1024").unwrap(), ParamWrite::Int(1024));
        assert!(ParamWrite::parse_for(&p, "10.5").is_err());

        let cmd = Param::new("AcquisitionStart", ParamKind::Command { done: true });
        assert!(matches!(
            ParamWrite::parse_for(&cmd, "1"),
            Err(Error::WrongType { .. })
        ));
        assert_eq!(cmd.value_string(), "done");
    }
}
