//! CAN database code generation
//!
//! Pre-build step: every `*.dbc` file in the input directory is turned into C
//! encode/decode sources by `cantools generate_c_source`. The firmware build
//! adds the output directory to its include path. The monitor never depends
//! on this at runtime.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const DEFAULT_INPUT_DIR: &str = "dbc";
pub const DEFAULT_OUTPUT_DIR: &str = ".dbc_gen";

/// Runs cantools over a directory of DBC files
#[derive(Debug, Clone)]
pub struct DbcGenerator {
    python: PathBuf,
    input_dir: PathBuf,
    output_dir: PathBuf,
}

/// Per-file outcome of a generation pass
#[derive(Debug, Default)]
pub struct GenerateReport {
    pub generated: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl GenerateReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn print_report(&self, output_dir: &Path) {
        for path in &self.generated {
            println!("  {} {}", "[OK]".green().bold(), path.display());
        }
        for (path, reason) in &self.failed {
            println!("  {} {}: {}", "[FAIL]".red().bold(), path.display(), reason);
        }
        println!(
            "\n{} generated, {} failed -> {}",
            self.generated.len().to_string().green(),
            if self.failed.is_empty() {
                "0".to_string()
            } else {
                self.failed.len().to_string().red().to_string()
            },
            output_dir.display()
        );
    }
}

impl DbcGenerator {
    pub fn new(python: impl Into<PathBuf>, input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// DBC files in the input directory, sorted by name
    pub fn dbc_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.input_dir)
            .with_context(|| format!("Failed to read DBC directory: {}", self.input_dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_dbc = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("dbc"))
                .unwrap_or(false);
            if is_dbc && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Fail early with an install hint when the interpreter cannot import cantools
    pub fn check_cantools(&self) -> Result<()> {
        let output = Command::new(&self.python)
            .args(["-c", "import cantools"])
            .output()
            .with_context(|| format!("Failed to run {}", self.python.display()))?;
        if !output.status.success() {
            bail!(
                "cantools is not importable by {} (install it with: {} -m pip install cantools)",
                self.python.display(),
                self.python.display()
            );
        }
        Ok(())
    }

    /// Generate sources for every DBC file. A failing file does not stop the others.
    pub fn generate(&self) -> Result<GenerateReport> {
        let files = self.dbc_files()?;
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory: {}", self.output_dir.display())
        })?;

        let mut report = GenerateReport::default();
        for file in files {
            log::debug!("generating C sources for {}", file.display());
            let output = Command::new(&self.python)
                .args(["-m", "cantools", "generate_c_source", "--prune", "--use-float", "-o"])
                .arg(&self.output_dir)
                .arg(&file)
                .output()
                .with_context(|| format!("Failed to run {}", self.python.display()))?;

            if output.status.success() {
                report.generated.push(file);
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let reason = if stderr.is_empty() {
                    format!("cantools exited with {}", output.status)
                } else {
                    stderr
                };
                report.failed.push((file, reason));
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dbc_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.dbc", "a.DBC", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("nested.dbc")).unwrap();

        let generator = DbcGenerator::new("python3", dir.path(), dir.path().join("out"));
        let names: Vec<String> = generator
            .dbc_files()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.DBC", "b.dbc"]);
    }

    #[test]
    fn test_missing_input_dir() {
        let dir = tempfile::tempdir().unwrap();
        let generator = DbcGenerator::new("python3", dir.path().join("dbc"), dir.path().join("out"));
        assert!(generator.generate().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_generate_reports_each_file() {
        use crate::test_support::script;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("dbc");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("inverter.dbc"), "").unwrap();
        fs::write(input.join("bad.dbc"), "").unwrap();

        // $7 is the output directory, $8 the DBC file
        let python = script(
            dir.path(),
            "python",
            r#"[ "$1" = "-c" ] && exit 0
case "$8" in
  *bad.dbc) echo "invalid syntax" >&2; exit 1 ;;
esac
touch "$7/$(basename "$8" .dbc).c""#,
        );

        let output = dir.path().join(".dbc_gen");
        let generator = DbcGenerator::new(&python, &input, &output);
        generator.check_cantools().unwrap();
        let report = generator.generate().unwrap();

        assert!(!report.is_success());
        assert_eq!(report.generated, vec![input.join("inverter.dbc")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].1, "invalid syntax");
        assert!(output.join("inverter.c").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_check_cantools_missing() {
        use crate::test_support::script;

        let dir = tempfile::tempdir().unwrap();
        let python = script(dir.path(), "python", "exit 1");
        let generator = DbcGenerator::new(&python, dir.path(), dir.path());
        let err = generator.check_cantools().unwrap_err();
        assert!(err.to_string().contains("pip install cantools"));
    }
}
