//! Manifest-backed catalog
//!
//! Builds a [`InMemoryCatalog`] from a `testwire.toml` manifest. Every test
//! body runs the method's shell command; row values are passed as `$1..$n`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::catalog::{Failure, InMemoryCatalog, TestClass, TestMethod, TestOutcome};
use crate::config::{ClassSpec, Config, MethodSpec, RunnerSettings};

/// How to run one test command
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: String,
    pub shell: String,
    pub cmd: String,
    pub cwd: PathBuf,
    pub skip_exit_code: i32,
}

/// Run the command and map its exit status to an outcome
pub fn run_command(spec: &CommandSpec, args: &[String]) -> TestOutcome {
    debug!("Running {}: {} {:?}", spec.name, spec.cmd, args);

    let output = Command::new(&spec.shell)
        .arg("-c")
        .arg(&spec.cmd)
        .arg(&spec.name)
        .args(args)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .output();

    let output = match output {
        Ok(output) => output,
        Err(e) => {
            return TestOutcome::Failed(Failure::with_message(format!(
                "Failed to spawn '{}': {}",
                spec.cmd, e
            )))
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    match output.status.code() {
        Some(0) => TestOutcome::Passed,
        Some(code) if code == spec.skip_exit_code => {
            let reason = stderr
                .lines()
                .chain(stdout.lines())
                .find(|l| !l.trim().is_empty())
                .unwrap_or("skipped");
            TestOutcome::Aborted(reason.trim().to_string())
        }
        code => {
            let message = match code {
                Some(code) => format!("'{}' exited with status {}", spec.cmd, code),
                None => format!("'{}' was terminated by a signal", spec.cmd),
            };
            let mut details = stdout.into_owned();
            details.push_str(&stderr);

            let failure = Failure::with_message(message);
            if details.trim().is_empty() {
                TestOutcome::Failed(failure)
            } else {
                TestOutcome::Failed(failure.with_details(details))
            }
        }
    }
}

/// Build the catalog described by `config`; relative paths resolve from `base_dir`
pub fn catalog_from_config(config: &Config, base_dir: &Path) -> Result<InMemoryCatalog> {
    let mut catalog = InMemoryCatalog::new(&config.project.name);

    for spec in &config.classes {
        let class = build_class(spec, &spec.name, base_dir, base_dir, &config.runner)?;
        catalog.add_class(class);
    }

    Ok(catalog)
}

fn build_class(
    spec: &ClassSpec,
    full_name: &str,
    base_dir: &Path,
    inherited_cwd: &Path,
    runner: &RunnerSettings,
) -> Result<TestClass> {
    let cwd = match spec.cwd {
        Some(ref cwd) => {
            let expanded = shellexpand::full(cwd)
                .with_context(|| format!("Failed to expand cwd of class '{}'", full_name))?;
            base_dir.join(expanded.as_ref())
        }
        None => inherited_cwd.to_path_buf(),
    };

    let mut class = TestClass::new(&spec.name);
    if let Some(ref source) = spec.source {
        class = class.with_source(&format!("file://{}", base_dir.join(source).display()));
    }

    for method in &spec.methods {
        class = class.method(build_method(method, full_name, &cwd, runner));
    }

    for nested in &spec.nested {
        let nested_name = format!("{}${}", full_name, nested.name);
        let nested_class = build_class(nested, &nested_name, base_dir, &cwd, runner)?;
        class = class.nested(nested_class);
    }

    Ok(class)
}

fn build_method(spec: &MethodSpec, class_name: &str, cwd: &Path, runner: &RunnerSettings) -> TestMethod {
    let command = CommandSpec {
        name: format!("{}#{}", class_name, spec.name),
        shell: runner.shell.clone(),
        cmd: spec.cmd.clone(),
        cwd: cwd.to_path_buf(),
        skip_exit_code: runner.skip_exit_code,
    };

    let mut method = TestMethod::new(&spec.name, move |args| run_command(&command, args))
        .with_rows(spec.rows.clone())
        .with_success_percentage(spec.success_percentage);
    method.line = spec.line;
    if let Some(ref reason) = spec.disabled {
        method = method.disabled(reason);
    }

    method
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TestCatalog;

    fn command(cmd: &str) -> CommandSpec {
        CommandSpec {
            name: "C#m".to_string(),
            shell: "sh".to_string(),
            cmd: cmd.to_string(),
            cwd: std::env::temp_dir(),
            skip_exit_code: 77,
        }
    }

    #[test]
    fn test_exit_codes_map_to_outcomes() {
        assert_eq!(run_command(&command("exit 0"), &[]), TestOutcome::Passed);
        assert_eq!(
            run_command(&command("echo 'no database' >&2; exit 77"), &[]),
            TestOutcome::Aborted("no database".to_string())
        );

        match run_command(&command("echo expected 3; exit 2"), &[]) {
            TestOutcome::Failed(failure) => {
                assert!(failure.message.unwrap().contains("status 2"));
                assert_eq!(failure.details.as_deref(), Some("expected 3\n"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_row_values_are_positional_arguments() {
        let spec = command("test \"$1\" = \"$2\"");
        assert_eq!(
            run_command(&spec, &["a b".into(), "a b".into()]),
            TestOutcome::Passed
        );
        assert!(matches!(
            run_command(&spec, &["a".into(), "b".into()]),
            TestOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_catalog_from_config() {
        let manifest = r#"
[project]
name = "calc"

[[classes]]
name = "com.acme.Calc"
source = "Calc.java"

[[classes.methods]]
name = "testAdd"
cmd = "true"
line = 3

[[classes.nested]]
name = "Inner"

[[classes.nested.methods]]
name = "testPwd"
cmd = "test -d ."
disabled = "later"
"#;
        let config: Config = toml::from_str(manifest).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_from_config(&config, dir.path()).unwrap();

        assert_eq!(catalog.project(), "calc");
        let calc = catalog.load_class("com.acme.Calc").unwrap();
        assert!(calc.source.as_ref().unwrap().ends_with("Calc.java"));
        assert_eq!(calc.methods[0].line, Some(3));
        assert_eq!(calc.methods[0].invoke(&[]), TestOutcome::Passed);

        let inner = catalog.load_class("com.acme.Calc$Inner").unwrap();
        assert_eq!(inner.methods[0].disabled.as_deref(), Some("later"));
    }
}
