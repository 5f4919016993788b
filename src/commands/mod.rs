//! Chainable commands
//!
//! A command is a named options patch. Commands given positionally on the
//! command line run one after another, each with its own resolved options.

mod builtin;

use std::collections::HashMap;

use tracing::{info, warn};

use crate::options::BuildOptions;

pub use builtin::{builtin_commands, CommandGenerator};

/// What the builder does once a command's options are resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandAction {
    /// Clean, build or watch, clean
    #[default]
    Build,
    /// Only run the clean stages
    CleanOnly,
}

/// A named options patch
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub description: String,
    pub patch: BuildOptions,
    pub action: CommandAction,
}

impl Command {
    pub fn new(name: impl Into<String>, description: impl Into<String>, patch: BuildOptions) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            patch,
            action: CommandAction::Build,
        }
    }

    pub fn with_action(mut self, action: CommandAction) -> Self {
        self.action = action;
        self
    }

    /// `current` overwritten key by key with this command's patch
    pub fn execute(&self, current: &BuildOptions) -> BuildOptions {
        current.overlay(&self.patch)
    }
}

/// Registry of available commands
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
    order: Vec<String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in commands
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for command in builtin_commands() {
            registry.register_command(command);
        }
        registry
    }

    /// Insert a command, replacing any command with the same name
    pub fn register_command(&mut self, command: Command) {
        info!("Command registered: {}", command.name);
        if !self.commands.contains_key(&command.name) {
            self.order.push(command.name.clone());
        }
        self.commands.insert(command.name.clone(), command);
    }

    /// Apply the named command to `options`; unknown names leave them as is
    pub fn execute_command(&self, name: &str, options: &BuildOptions) -> BuildOptions {
        match self.commands.get(name) {
            Some(command) => {
                info!("Executing command: {} - {}", command.name, command.description);
                command.execute(options)
            }
            None => {
                warn!("Command \"{}\" not found", name);
                options.clone()
            }
        }
    }

    pub fn get_command(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Every command, in registration order
    pub fn get_all_commands(&self) -> Vec<&Command> {
        self.order
            .iter()
            .filter_map(|name| self.commands.get(name))
            .collect()
    }
}
