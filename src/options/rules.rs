//! Option dependency rules
//!
//! Pure transformations applied to the merged options, in registration
//! order. Each rule sees the output of the previous one.

use tracing::debug;

use super::{BuildOptions, Clean, CleanStage, Mode};
use crate::config::AdobeCatalog;

/// Data the rules may consult besides the options themselves
#[derive(Debug, Clone, Default)]
pub struct RuleContext {
    pub adobe: AdobeCatalog,
}

/// A dependency rule. Must be total: missing keys are treated as absent.
pub type Rule = fn(BuildOptions, &RuleContext) -> BuildOptions;

/// Ordered list of dependency rules
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<(&'static str, Rule)>,
    context: RuleContext,
}

impl RuleEngine {
    /// Create an engine with the base rules registered
    pub fn new(adobe: AdobeCatalog) -> Self {
        let mut engine = Self::empty(adobe);
        engine.add_rule("mode", mode_rule);
        engine.add_rule("test", test_rule);
        engine.add_rule("tsconfig", tsconfig_rule);
        engine.add_rule("clean", clean_rule);
        engine.add_rule("app-version", app_version_rule);
        engine
    }

    /// Create an engine without any rule
    pub fn empty(adobe: AdobeCatalog) -> Self {
        Self {
            rules: Vec::new(),
            context: RuleContext { adobe },
        }
    }

    /// Append a rule; it runs after every rule registered before it
    pub fn add_rule(&mut self, name: &'static str, rule: Rule) {
        self.rules.push((name, rule));
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|(name, _)| *name)
    }

    /// Apply every rule to `options`, left to right
    pub fn resolve(&self, options: BuildOptions) -> BuildOptions {
        self.rules.iter().fold(options, |acc, (name, rule)| {
            let next = rule(acc, &self.context);
            debug!("Applied '{}' rule", name);
            next
        })
    }
}

/// Production never watches; development always does
pub fn mode_rule(mut options: BuildOptions, _ctx: &RuleContext) -> BuildOptions {
    match options.mode {
        Some(Mode::Production) => options.watch = Some(false),
        Some(Mode::Development) => options.watch = Some(true),
        None => {}
    }
    options
}

/// Test builds without a dedicated tsconfig use the template
pub fn test_rule(mut options: BuildOptions, _ctx: &RuleContext) -> BuildOptions {
    if options.is_test() && options.tsconfig_test_path.is_none() {
        options.tsconfig_template = Some(true);
    }
    options
}

/// The template is used exactly when no tsconfig path applies to this build;
/// `tsconfig-test-path` only counts for test builds
pub fn tsconfig_rule(mut options: BuildOptions, _ctx: &RuleContext) -> BuildOptions {
    let has_custom = options.tsconfig.is_some()
        || (options.is_test() && options.tsconfig_test_path.is_some());
    options.tsconfig_template = Some(!has_custom);
    options
}

/// Normalize `clean` to a list of stages
pub fn clean_rule(mut options: BuildOptions, _ctx: &RuleContext) -> BuildOptions {
    let stages = match options.clean.take() {
        None | Some(Clean::Flag(false)) => vec![CleanStage::False],
        Some(Clean::Flag(true)) => vec![CleanStage::Both],
        Some(Clean::Stage(stage)) => vec![stage],
        Some(Clean::Stages(stages)) if stages.is_empty() => vec![CleanStage::False],
        Some(Clean::Stages(stages)) => stages,
    };
    options.clean = Some(Clean::Stages(stages));
    options
}

/// Replace an unknown application version with the nearest known lower one
pub fn app_version_rule(mut options: BuildOptions, ctx: &RuleContext) -> BuildOptions {
    let (Some(app), Some(version)) = (options.dest_app.clone(), options.app_version.clone()) else {
        return options;
    };
    let Some(versions) = ctx.adobe.versions(&app) else {
        return options;
    };

    if let Some(adjusted) = adjust_version(versions, &version) {
        if adjusted != version {
            debug!("{} {} is unknown, using {}", app, version, adjusted);
            options.app_version = Some(adjusted);
        }
    }
    options
}

/// Nearest version sorting below `version`, or the highest known one.
///
/// Versions are compared as plain strings, so `"10.5" < "9.0"`.
pub fn adjust_version(versions: &[String], version: &str) -> Option<String> {
    if versions.iter().any(|v| v == version) {
        return Some(version.to_string());
    }

    versions
        .iter()
        .rev()
        .find(|v| v.as_str() < version)
        .or_else(|| versions.last())
        .cloned()
}
