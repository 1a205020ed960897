//! Command routing.
//!
//! Commands are declared with a [`CommandSpec`] and announced in the hello.
//! When a COMMAND event names one of them (or an alias, ignoring case), its
//! raw arguments are parsed against the spec into [`CommandArgs`] and the
//! handler runs. Bad arguments get the usage line sent back to the player.
//! Either way the event is cancelled afterwards unless a handler already
//! responded, so the host does not also treat it as an unknown command.

use crate::context::EventContext;
use crate::correlation::panic_message;
use crate::error::PluginError;
use async_trait::async_trait;
use futures::FutureExt;
use plugin_protocol::{CommandEvent, CommandSpec, ParamType};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// A parsed argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    /// The canonical spelling of the chosen candidate.
    Enum(String),
    Varargs(Vec<String>),
    Target(String),
    Targets(Vec<String>),
}

/// Arguments of one command invocation, by parameter name.
///
/// Optional parameters the player left out are simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandArgs {
    values: Vec<(String, ArgValue)>,
}

impl CommandArgs {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            ArgValue::Float(v) => Some(*v),
            ArgValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            ArgValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Text of a string, enum or single-target argument.
    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            ArgValue::String(v) | ArgValue::Enum(v) | ArgValue::Target(v) => Some(v),
            _ => None,
        }
    }

    /// Tokens of a varargs or multi-target argument.
    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.get(name)? {
            ArgValue::Varargs(v) | ArgValue::Targets(v) => Some(v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Why raw arguments did not fit a spec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    #[error("Missing argument <{param}>")]
    Missing { param: String },
    #[error("Invalid {expected} for <{param}>: '{value}'")]
    Invalid {
        param: String,
        expected: ParamType,
        value: String,
    },
    #[error("Too many arguments: {}", .extra.join(" "))]
    UnexpectedArgs { extra: Vec<String> },
}

/// Parses raw tokens against `spec`.
pub fn parse_args(spec: &CommandSpec, args: &[String]) -> Result<CommandArgs, ArgError> {
    let mut values = Vec::with_capacity(spec.params.len());
    let mut next = 0;

    for param in &spec.params {
        if param.param_type == ParamType::Varargs {
            let rest = &args[next.min(args.len())..];
            if rest.is_empty() {
                if param.optional {
                    continue;
                }
                return Err(ArgError::Missing {
                    param: param.name.clone(),
                });
            }
            values.push((param.name.clone(), ArgValue::Varargs(rest.to_vec())));
            next = args.len();
            continue;
        }

        let Some(token) = args.get(next) else {
            if param.optional {
                continue;
            }
            return Err(ArgError::Missing {
                param: param.name.clone(),
            });
        };
        next += 1;

        let invalid = || ArgError::Invalid {
            param: param.name.clone(),
            expected: param.param_type,
            value: token.clone(),
        };
        let value = match param.param_type {
            ParamType::Int => ArgValue::Int(token.parse().map_err(|_| invalid())?),
            ParamType::Float => {
                let v: f64 = token.parse().map_err(|_| invalid())?;
                if !v.is_finite() {
                    return Err(invalid());
                }
                ArgValue::Float(v)
            }
            ParamType::Bool => match token.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => ArgValue::Bool(true),
                "false" | "no" | "off" | "0" => ArgValue::Bool(false),
                _ => return Err(invalid()),
            },
            ParamType::String => ArgValue::String(token.clone()),
            ParamType::Enum => {
                let choice = param
                    .enum_values
                    .iter()
                    .find(|candidate| candidate.eq_ignore_ascii_case(token))
                    .ok_or_else(invalid)?;
                ArgValue::Enum(choice.clone())
            }
            ParamType::Target => ArgValue::Target(token.clone()),
            ParamType::Targets => {
                let targets: Vec<String> = token
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
                if targets.is_empty() {
                    return Err(invalid());
                }
                ArgValue::Targets(targets)
            }
            ParamType::Varargs => unreachable!("varargs handled above"),
        };
        values.push((param.name.clone(), value));
    }

    if next < args.len() {
        return Err(ArgError::UnexpectedArgs {
            extra: args[next..].to_vec(),
        });
    }
    Ok(CommandArgs { values })
}

/// Runs a routed command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, ctx: EventContext, args: CommandArgs) -> Result<(), PluginError>;
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(EventContext, CommandArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), PluginError>> + Send,
{
    async fn execute(&self, ctx: EventContext, args: CommandArgs) -> Result<(), PluginError> {
        (self)(ctx, args).await
    }
}

struct RegisteredCommand {
    spec: CommandSpec,
    handler: Arc<dyn CommandHandler>,
}

/// Command names and aliases mapped to their handlers.
#[derive(Default)]
pub struct CommandRouter {
    commands: Vec<RegisteredCommand>,
    by_name: HashMap<String, usize>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command after validating its spec.
    ///
    /// Names and aliases share one case-insensitive namespace; a clash with
    /// an earlier command is a configuration error.
    pub fn register(&mut self, spec: CommandSpec, handler: Arc<dyn CommandHandler>) -> Result<(), PluginError> {
        spec.validate()?;

        let names: Vec<String> = std::iter::once(&spec.name)
            .chain(spec.aliases.iter())
            .map(|n| n.to_ascii_lowercase())
            .collect();
        for (i, name) in names.iter().enumerate() {
            if self.by_name.contains_key(name) || names[..i].contains(name) {
                return Err(PluginError::Config(format!(
                    "Command name /{} is registered twice",
                    name
                )));
            }
        }

        let index = self.commands.len();
        for name in names {
            self.by_name.insert(name, index);
        }
        debug!("Registered command {}", spec.usage());
        self.commands.push(RegisteredCommand { spec, handler });
        Ok(())
    }

    /// Specs in registration order, as announced in the hello.
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.commands.iter().map(|c| c.spec.clone()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&CommandSpec> {
        let name = name.trim_start_matches('/').to_ascii_lowercase();
        self.by_name.get(&name).map(|&i| &self.commands[i].spec)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Routes a COMMAND event to its registered command.
    ///
    /// # Returns
    ///
    /// `false` when the event is not a command this router knows, leaving
    /// it to the ordinary handlers.
    pub async fn route(&self, ctx: &EventContext) -> bool {
        let Some(event) = ctx.event().command() else {
            return false;
        };
        let (name, args) = split_command(event);
        let Some(&index) = self.by_name.get(&name.to_ascii_lowercase()) else {
            return false;
        };
        let command = &self.commands[index];

        match parse_args(&command.spec, &args) {
            Ok(parsed) => {
                debug!("Running /{} for {}", command.spec.name, event.name);
                let outcome = AssertUnwindSafe(command.handler.execute(ctx.clone(), parsed))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("❌ Command /{} failed: {}", command.spec.name, e),
                    Err(panic) => error!(
                        "❌ Command /{} failed: {}",
                        command.spec.name,
                        PluginError::HandlerPanicked(panic_message(panic.as_ref()))
                    ),
                }
            }
            Err(e) => {
                debug!("Rejected /{} from {}: {}", command.spec.name, event.name, e);
                let reply = format!("{}\nUsage: {}", e, command.spec.usage());
                if let Err(e) = ctx.server().send_chat(event.player_uuid.clone(), reply).await {
                    warn!("⚠️ Could not send usage for /{}: {}", command.spec.name, e);
                }
            }
        }

        if let Err(e) = ctx.cancel_if_unhandled().await {
            warn!("⚠️ Could not resolve command event {}: {}", ctx.event_id(), e);
        }
        true
    }
}

/// Command name and argument tokens, falling back to the raw line.
fn split_command(event: &CommandEvent) -> (String, Vec<String>) {
    let name = event.command.trim().trim_start_matches('/');
    if !name.is_empty() {
        return (name.to_string(), event.args.clone());
    }
    let mut tokens = event.raw.trim().trim_start_matches('/').split_whitespace();
    let name = tokens.next().unwrap_or_default().to_string();
    (name, tokens.map(str::to_string).collect())
}
