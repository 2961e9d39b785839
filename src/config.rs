use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::protocol::vocabulary::DEFAULT_LOCATION_SCHEME;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub project: Project,
    #[serde(default)]
    pub runner: RunnerSettings,
    #[serde(default)]
    pub classes: Vec<ClassSpec>,
}

#[derive(Debug, Deserialize)]
pub struct Project {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSettings {
    /// Scheme prefixed to `location` attributes
    #[serde(default = "default_location_scheme")]
    pub location_scheme: String,
    /// Worker threads for TestNG class execution (1 = sequential)
    #[serde(default = "default_testng_threads")]
    pub testng_threads: usize,
    /// Exit code a test command uses to report itself skipped
    #[serde(default = "default_skip_exit_code")]
    pub skip_exit_code: i32,
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            location_scheme: default_location_scheme(),
            testng_threads: default_testng_threads(),
            skip_exit_code: default_skip_exit_code(),
            shell: default_shell(),
        }
    }
}

fn default_location_scheme() -> String {
    DEFAULT_LOCATION_SCHEME.to_string()
}

fn default_testng_threads() -> usize {
    1
}

fn default_skip_exit_code() -> i32 {
    77
}

fn default_shell() -> String {
    "sh".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassSpec {
    pub name: String,
    /// Source file, relative to the manifest
    #[serde(default)]
    pub source: Option<String>,
    /// Working directory for the class's commands (shell-expanded)
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub methods: Vec<MethodSpec>,
    #[serde(default)]
    pub nested: Vec<ClassSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MethodSpec {
    pub name: String,
    pub cmd: String,
    #[serde(default)]
    pub line: Option<u32>,
    /// Reason the method is disabled
    #[serde(default)]
    pub disabled: Option<String>,
    /// Data table, one invocation per row
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(default = "default_success_percentage")]
    pub success_percentage: u8,
}

fn default_success_percentage() -> u8 {
    100
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// A catalog with no classes, used when no manifest exists
    pub fn empty(project: &str) -> Self {
        Self {
            project: Project {
                name: project.to_string(),
            },
            runner: RunnerSettings::default(),
            classes: Vec::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.project.name.trim().is_empty() {
            anyhow::bail!("Project name must not be empty");
        }

        if self.runner.testng_threads == 0 {
            anyhow::bail!("runner.testng_threads must be at least 1");
        }

        validate_classes(&self.classes, "")
    }
}

fn validate_classes(classes: &[ClassSpec], parent: &str) -> Result<()> {
    let mut seen = HashSet::new();

    for class in classes {
        if class.name.trim().is_empty() {
            anyhow::bail!("Class with empty name in '{}'", parent);
        }
        if !seen.insert(class.name.as_str()) {
            anyhow::bail!("Class '{}{}' is defined twice", parent, class.name);
        }

        let mut methods = HashSet::new();
        for method in &class.methods {
            if method.name.trim().is_empty() {
                anyhow::bail!("Class '{}' has a method with an empty name", class.name);
            }
            if !methods.insert(method.name.as_str()) {
                anyhow::bail!(
                    "Method '{}' is defined twice in class '{}'",
                    method.name,
                    class.name
                );
            }
            if method.success_percentage > 100 {
                anyhow::bail!(
                    "Method '{}#{}' has success_percentage {} (must be 0-100)",
                    class.name,
                    method.name,
                    method.success_percentage
                );
            }
        }

        validate_classes(&class.nested, &format!("{}{}$", parent, class.name))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MANIFEST: &str = r#"
[project]
name = "calc"

[runner]
testng_threads = 2

[[classes]]
name = "com.acme.Calc"
source = "src/Calc.java"

[[classes.methods]]
name = "testAdd"
cmd = "test 2 -eq 2"
line = 12

[[classes.methods]]
name = "testTable"
cmd = "test $1 -eq $2"
rows = [["1", "1"], ["2", "2"]]
success_percentage = 50

[[classes.nested]]
name = "Inner"

[[classes.nested.methods]]
name = "testDeep"
cmd = "true"
disabled = "not yet"
"#;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(MANIFEST).unwrap();
        assert_eq!(config.project.name, "calc");
        assert_eq!(config.runner.testng_threads, 2);
        assert_eq!(config.runner.location_scheme, "java:test");
        assert_eq!(config.runner.skip_exit_code, 77);
        assert_eq!(config.classes.len(), 1);

        let calc = &config.classes[0];
        assert_eq!(calc.methods[0].line, Some(12));
        assert_eq!(calc.methods[0].success_percentage, 100);
        assert_eq!(calc.methods[1].rows.len(), 2);
        assert_eq!(calc.nested[0].methods[0].disabled.as_deref(), Some("not yet"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.classes[0].name, "com.acme.Calc");
    }

    #[test]
    fn test_rejects_duplicate_methods() {
        let manifest = r#"
[project]
name = "calc"

[[classes]]
name = "C"

[[classes.methods]]
name = "m"
cmd = "true"

[[classes.methods]]
name = "m"
cmd = "false"
"#;
        let config: Config = toml::from_str(manifest).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn test_rejects_bad_percentage_in_nested_class() {
        let manifest = r#"
[project]
name = "calc"

[[classes]]
name = "C"

[[classes.nested]]
name = "Inner"

[[classes.nested.methods]]
name = "m"
cmd = "true"
success_percentage = 120
"#;
        let config: Config = toml::from_str(manifest).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("testwire.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read catalog file"));
    }
}
