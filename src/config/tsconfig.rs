//! Compiler settings for the bundle
//!
//! Either one of the built-in ES3 templates or a user tsconfig file, with
//! `rootDir`/`outDir` pointed at the input and output locations.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::debug;

use super::{read_json, ConfigError};
use crate::options::BuildOptions;

const DEFAULT_TSCONFIG: &str = "tsconfig.json";

/// Template for regular ExtendScript builds
pub fn es3_template() -> Value {
    json!({
        "compilerOptions": {
            "target": "ES3",
            "module": "CommonJS",
            "outDir": "./dist",
            "rootDir": "./src",
            "strict": true,
            "esModuleInterop": true,
            "skipLibCheck": true,
            "forceConsistentCasingInFileNames": true,
            "lib": [],
            "sourceMap": true,
            "types": [
                "kt-core/src/lib/json2",
                "types-for-adobe/shared/global",
                "types-for-adobe/shared/JavaScript"
            ]
        }
    })
}

/// Template for test builds, rooted at the project
pub fn es3_tests_template() -> Value {
    json!({
        "compilerOptions": {
            "target": "ES3",
            "module": "CommonJS",
            "outDir": "./dist.test",
            "rootDir": "./",
            "strict": true,
            "esModuleInterop": true,
            "skipLibCheck": true,
            "forceConsistentCasingInFileNames": true,
            "lib": [],
            "sourceMap": true,
            "types": [
                "kt-core/src/lib/json2",
                "types-for-adobe/shared/global",
                "types-for-adobe/shared/JavaScript",
                "types-for-adobe/AfterEffects/23.0"
            ]
        },
        "include": ["src/**/*", "src/tests/**/*"],
        "exclude": ["node_modules", "dist"]
    })
}

/// Picks and loads the tsconfig for a set of resolved options
#[derive(Debug, Clone)]
pub struct TsconfigLoader {
    root: PathBuf,
}

impl TsconfigLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The tsconfig path that would be read when templates are off
    pub fn select_path<'a>(&self, options: &'a BuildOptions) -> &'a str {
        if options.is_test() {
            if let Some(path) = options.tsconfig_test_path.as_deref() {
                return path;
            }
        }
        options.tsconfig.as_deref().unwrap_or(DEFAULT_TSCONFIG)
    }

    pub fn load(&self, options: &BuildOptions) -> Result<Value, ConfigError> {
        let mut tsconfig = if options.tsconfig_template.unwrap_or(false) {
            debug!("Using built-in tsconfig template");
            if options.is_test() {
                es3_tests_template()
            } else {
                es3_template()
            }
        } else {
            let path = self.root.join(self.select_path(options));
            debug!("Reading tsconfig from {}", path.display());
            read_json(&path)?
        };

        if let Some(compiler) = tsconfig
            .get_mut("compilerOptions")
            .and_then(Value::as_object_mut)
        {
            if let Some(input) = options.input.as_deref() {
                compiler.insert("rootDir".into(), Value::String(parent_dir(input)));
            }
            if let Some(output) = options.output.as_deref() {
                compiler.insert("outDir".into(), Value::String(parent_dir(output)));
            }
        }

        Ok(tsconfig)
    }
}

fn parent_dir(path: &str) -> String {
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.display().to_string(),
        _ => ".".to_string(),
    }
}
