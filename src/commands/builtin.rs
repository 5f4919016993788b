//! Built-in commands and commands generated from presets and config files

use tracing::debug;

use super::{Command, CommandAction, CommandRegistry};
use crate::options::presets::{self, DEFAULT_PRESET};
use crate::options::{BuildOptions, Clean, CleanStage, PresetTable};

/// The commands every registry starts with
pub fn builtin_commands() -> Vec<Command> {
    vec![
        Command::new(
            DEFAULT_PRESET,
            "Build with default production settings",
            presets::build_preset(),
        ),
        Command::new("build", "Build with production settings", presets::build_preset()),
        Command::new("dev", "Build in development mode", presets::dev_preset()),
        Command::new(
            "watch",
            "Build in development mode and rebuild on change",
            presets::watch_preset(),
        ),
        Command::new("test", "Build the test bundle", presets::test_preset()),
        Command::new(
            "minify",
            "Build with minification enabled",
            BuildOptions {
                minify: Some(true),
                ..presets::build_preset()
            },
        ),
        Command::new(
            "uglify",
            "Build with uglification enabled",
            BuildOptions {
                uglify: Some(true),
                ..presets::build_preset()
            },
        ),
        Command::new(
            "clean-only",
            "Clean the output without building",
            BuildOptions {
                clean: Some(Clean::Stages(vec![CleanStage::Before])),
                ..Default::default()
            },
        )
        .with_action(CommandAction::CleanOnly),
    ]
}

/// Derives commands from the preset table
pub struct CommandGenerator;

impl CommandGenerator {
    /// Register one command per preset whose name is still free.
    ///
    /// The table is expected to hold the user presets loaded from the config
    /// file as well, so every configuration entry becomes a command unless a
    /// built-in already uses its name.
    pub fn register_all(registry: &mut CommandRegistry, presets: &PresetTable) {
        for (name, preset) in presets.iter() {
            if name == DEFAULT_PRESET {
                continue;
            }
            if registry.has_command(name) {
                debug!("A command with name '{}' already exists. Skipping...", name);
                continue;
            }
            registry.register_command(Command::new(
                name,
                format!("Build with '{}' preset settings", name),
                preset.clone(),
            ));
        }
    }
}
