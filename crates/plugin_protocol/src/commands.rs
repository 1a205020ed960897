//! Command specifications declared by plugins in their hello.
//!
//! A [`CommandSpec`] lists typed parameters. Before a spec is accepted it is
//! checked with [`CommandSpec::validate`]: optional parameters must trail the
//! required ones and a varargs parameter may only come last.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// The closed set of parameter types the host understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Int,
    Float,
    Bool,
    String,
    /// One choice from [`ParamSpec::enum_values`].
    Enum,
    /// Consumes every remaining raw token.
    Varargs,
    /// A single player reference.
    Target,
    /// One or more player references.
    Targets,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::String => "string",
            ParamType::Enum => "enum",
            ParamType::Varargs => "varargs",
            ParamType::Target => "target",
            ParamType::Targets => "targets",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

impl ParamSpec {
    /// A required parameter of the given type.
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            optional: false,
            enum_values: Vec::new(),
        }
    }

    /// An optional parameter of the given type.
    pub fn optional(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            optional: true,
            ..Self::required(name, param_type)
        }
    }

    /// A required enum parameter with its candidate values.
    pub fn choice<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enum_values: values.into_iter().map(Into::into).collect(),
            ..Self::required(name, ParamType::Enum)
        }
    }

    /// Marks this parameter optional.
    pub fn into_optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A command the plugin registers with the host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

/// Reasons a [`CommandSpec`] is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandSpecError {
    #[error("Command name must not be empty")]
    EmptyName,
    #[error("Command /{command}: parameter #{index} has an empty name")]
    EmptyParamName { command: String, index: usize },
    #[error("Command /{command}: duplicate parameter '{param}'")]
    DuplicateParam { command: String, param: String },
    #[error("Command /{command}: enum parameter '{param}' declares no values")]
    EmptyEnum { command: String, param: String },
    #[error("Command /{command}: parameter '{param}' is not an enum but declares values")]
    UnexpectedEnumValues { command: String, param: String },
    #[error("Command /{command}: required parameter '{param}' follows an optional one")]
    RequiredAfterOptional { command: String, param: String },
    #[error("Command /{command}: varargs parameter '{param}' must be last")]
    VarargsNotLast { command: String, param: String },
}

impl CommandSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Checks the parameter list once, at registration time.
    ///
    /// # Returns
    ///
    /// The first violation found, in declaration order.
    pub fn validate(&self) -> Result<(), CommandSpecError> {
        if self.name.trim().is_empty() {
            return Err(CommandSpecError::EmptyName);
        }

        let mut seen = HashSet::new();
        let mut optional_seen = false;
        let last = self.params.len().saturating_sub(1);

        for (index, param) in self.params.iter().enumerate() {
            if param.name.trim().is_empty() {
                return Err(CommandSpecError::EmptyParamName {
                    command: self.name.clone(),
                    index,
                });
            }
            if !seen.insert(param.name.as_str()) {
                return Err(CommandSpecError::DuplicateParam {
                    command: self.name.clone(),
                    param: param.name.clone(),
                });
            }

            match (param.param_type, param.enum_values.is_empty()) {
                (ParamType::Enum, true) => {
                    return Err(CommandSpecError::EmptyEnum {
                        command: self.name.clone(),
                        param: param.name.clone(),
                    })
                }
                (ParamType::Enum, false) | (_, true) => {}
                (_, false) => {
                    return Err(CommandSpecError::UnexpectedEnumValues {
                        command: self.name.clone(),
                        param: param.name.clone(),
                    })
                }
            }

            if param.optional {
                optional_seen = true;
            } else if optional_seen {
                return Err(CommandSpecError::RequiredAfterOptional {
                    command: self.name.clone(),
                    param: param.name.clone(),
                });
            }

            if param.param_type == ParamType::Varargs && index != last {
                return Err(CommandSpecError::VarargsNotLast {
                    command: self.name.clone(),
                    param: param.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Whether `name` is this command's name or one of its aliases, ignoring case.
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    /// One-line usage string, e.g. `/tp <target> <x> <y> <z> [reason...]`.
    pub fn usage(&self) -> String {
        let mut usage = format!("/{}", self.name);
        for param in &self.params {
            let label = match param.param_type {
                ParamType::Varargs => format!("{}...", param.name),
                ParamType::Enum => param.enum_values.join("|"),
                _ => param.name.clone(),
            };
            if param.optional {
                usage.push_str(&format!(" [{}]", label));
            } else {
                usage.push_str(&format!(" <{}>", label));
            }
        }
        usage
    }
}
