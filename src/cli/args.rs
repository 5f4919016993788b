//! Command-line parsing
//!
//! The clap command is generated from the option catalog, so every catalog
//! entry is a flag with the same name, aliases and value shape.

use std::ffi::OsString;

use clap::builder::PossibleValuesParser;
use clap::parser::ValueSource;
use clap::{crate_description, crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use serde_json::{Map, Value};

use crate::options::catalog::CLEAN_STAGES;
use crate::options::{BuildOptions, OptionDescriptor, ValueType, OPTION_CATALOG};

const COMMANDS_ARG: &str = "commands";
const VERBOSE_ARG: &str = "verbose";

/// A parsed command line.
///
/// Built once at startup and handed to the resolver and the builder; nothing
/// downstream reads the process arguments again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Positional command names, in command-line order
    pub commands: Vec<String>,
    /// Only the options actually given on the command line
    pub options: BuildOptions,
    pub verbose: bool,
}

impl Invocation {
    /// Parse the process arguments, exiting with usage on error
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parse an explicit argument list (the first item is the binary name)
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    pub fn from_matches(matches: &ArgMatches) -> Self {
        let commands = matches
            .get_many::<String>(COMMANDS_ARG)
            .unwrap_or_default()
            .cloned()
            .collect();

        Self {
            commands,
            options: BuildOptions::from_map(&options_from_matches(matches)),
            verbose: matches.get_flag(VERBOSE_ARG),
        }
    }
}

/// The full clap command
pub fn command() -> Command {
    let mut cmd = Command::new("kt-build")
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new(COMMANDS_ARG)
                .value_name("COMMAND")
                .num_args(0..)
                .action(ArgAction::Append)
                .help("Commands or presets to run, in order"),
        )
        .arg(
            Arg::new(VERBOSE_ARG)
                .long(VERBOSE_ARG)
                .action(ArgAction::SetTrue)
                .help("Enable verbose output"),
        );

    for descriptor in OPTION_CATALOG {
        cmd = cmd.arg(option_arg(descriptor));
    }

    cmd
}

fn option_arg(descriptor: &'static OptionDescriptor) -> Arg {
    let mut arg = Arg::new(descriptor.name)
        .long(descriptor.name)
        .help(descriptor.description)
        .help_heading(descriptor.group.heading());

    for alias in descriptor.aliases {
        let mut chars = alias.chars();
        arg = match (chars.next(), chars.next()) {
            (Some(short), None) => arg.short(short),
            _ => arg.alias(*alias),
        };
    }

    match descriptor.value_type {
        ValueType::String if descriptor.choices.is_empty() => {
            arg.num_args(1).action(ArgAction::Set)
        }
        ValueType::String => arg
            .num_args(1)
            .action(ArgAction::Set)
            .value_parser(PossibleValuesParser::new(descriptor.choices.iter().copied())),
        // `--watch` or `--watch=false`
        ValueType::Boolean => arg
            .num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true")
            .value_parser(value_parser!(bool))
            .action(ArgAction::Set),
        // one value per occurrence so positional commands are never swallowed;
        // `-p a.json -p b.json` or `-p a.json,b.json`
        ValueType::StringArray => arg
            .num_args(1)
            .value_delimiter(',')
            .action(ArgAction::Append),
        // `--clean` alone means "true"; `--clean=before,after` for stages
        ValueType::Stages => arg
            .num_args(0..=1)
            .require_equals(true)
            .value_delimiter(',')
            .default_missing_value("true")
            .value_parser(PossibleValuesParser::new(
                CLEAN_STAGES.iter().copied().chain(["true"]),
            ))
            .action(ArgAction::Append),
    }
}

/// Collect the options typed on the command line into a JSON object keyed
/// by catalog name. Defaults are deliberately absent.
fn options_from_matches(matches: &ArgMatches) -> Map<String, Value> {
    let mut map = Map::new();

    for descriptor in OPTION_CATALOG {
        let name = descriptor.name;
        if matches.value_source(name) != Some(ValueSource::CommandLine) {
            continue;
        }

        let value = match descriptor.value_type {
            ValueType::String => matches.get_one::<String>(name).cloned().map(Value::String),
            ValueType::Boolean => matches.get_one::<bool>(name).copied().map(Value::Bool),
            ValueType::StringArray => matches
                .get_many::<String>(name)
                .map(|values| Value::Array(values.cloned().map(Value::String).collect())),
            ValueType::Stages => matches.get_many::<String>(name).map(|values| {
                let stages: Vec<Value> = values
                    .filter(|v| v.as_str() != "true")
                    .cloned()
                    .map(Value::String)
                    .collect();
                if stages.is_empty() {
                    Value::Bool(true)
                } else {
                    Value::Array(stages)
                }
            }),
        };

        if let Some(value) = value {
            map.insert(name.to_string(), value);
        }
    }

    map
}
