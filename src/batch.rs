//! File and directory conversion.
//!
//! Resolves an input path into [`Job`]s (input file plus output `.sql`
//! path) and runs them one by one. A failing file never stops the others.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, info_span};

use crate::config::Config;
use crate::convert;
use crate::error::{ConvertError, ConvertResult};
use crate::model::Diagnostic;

const OUTPUT_EXTENSION: &str = "sql";

/// One input file and the script path it converts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// What happened to one input file.
#[derive(Debug)]
pub enum FileOutcome {
    /// Script written to the job's output path.
    Written { diagnostics: Vec<Diagnostic> },
    /// No block produced; nothing written.
    Skipped { diagnostics: Vec<Diagnostic> },
    Failed(ConvertError),
}

/// Counts over a batch of jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    pub fn add(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Written { .. } => self.converted += 1,
            FileOutcome::Skipped { .. } => self.skipped += 1,
            FileOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Resolve the command-line paths into jobs.
///
/// A file input must carry a configured extension. For a directory, only
/// matching files are taken, subdirectories only when `recursive` is set.
/// With an output directory the relative layout of the input is mirrored
/// under it; otherwise each script lands beside its input.
pub fn plan(
    input: &Path,
    output: Option<&Path>,
    recursive: bool,
    config: &Config,
) -> ConvertResult<Vec<Job>> {
    if input.is_file() {
        if !config.accepts(input) {
            return Err(ConvertError::InvalidExtension {
                path: input.to_path_buf(),
                expected: config.extension_list(),
            });
        }
        return Ok(vec![Job {
            input: input.to_path_buf(),
            output: single_output(input, output),
        }]);
    }

    if !input.is_dir() {
        return Err(ConvertError::PathNotFound(input.to_path_buf()));
    }

    let mut files = Vec::new();
    collect(input, recursive, config, &mut files)?;

    let jobs = files
        .into_iter()
        .map(|file| {
            let output = match output {
                Some(dir) => {
                    let relative = file.strip_prefix(input).unwrap_or(&file);
                    dir.join(relative).with_extension(OUTPUT_EXTENSION)
                }
                None => file.with_extension(OUTPUT_EXTENSION),
            };
            Job {
                input: file,
                output,
            }
        })
        .collect();
    Ok(jobs)
}

fn single_output(input: &Path, output: Option<&Path>) -> PathBuf {
    match output {
        Some(dir) if dir.is_dir() => {
            let stem = input.file_stem().unwrap_or_default().to_string_lossy();
            dir.join(format!("{}.{}", stem, OUTPUT_EXTENSION))
        }
        Some(file) => file.to_path_buf(),
        None => input.with_extension(OUTPUT_EXTENSION),
    }
}

/// Matching files under `dir`, sorted by path for a stable processing order.
fn collect(dir: &Path, recursive: bool, config: &Config, files: &mut Vec<PathBuf>) -> ConvertResult<()> {
    let entries = fs::read_dir(dir).map_err(|e| ConvertError::io(dir, e))?;
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConvertError::io(dir, e))?;
    paths.sort();

    for path in paths {
        if path.is_dir() {
            if recursive {
                collect(&path, recursive, config, files)?;
            }
        } else if config.accepts(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Convert one file and write its script.
pub fn run_job(job: &Job, config: &Config) -> FileOutcome {
    let _span = info_span!("convert", file = %job.input.display()).entered();
    convert_file(job, config).unwrap_or_else(FileOutcome::Failed)
}

fn convert_file(job: &Job, config: &Config) -> ConvertResult<FileOutcome> {
    let content = fs::read_to_string(&job.input).map_err(|e| ConvertError::io(&job.input, e))?;
    let conversion = convert(&content, config)?;

    let Some(script) = conversion.script else {
        return Ok(FileOutcome::Skipped {
            diagnostics: conversion.diagnostics,
        });
    };

    if let Some(parent) = job.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ConvertError::io(parent, e))?;
    }
    fs::write(&job.output, script).map_err(|e| ConvertError::io(&job.output, e))?;
    info!(output = %job.output.display(), nodes = conversion.model.nodes.len(), "script written");

    Ok(FileOutcome::Written {
        diagnostics: conversion.diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiagnosticKind;

    const VIEW: &str = r##"<scenario xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <calculationViews>
    <calculationView xsi:type="Calculation:ProjectionView" id="P">
      <input node="#T"><mapping source="A" target="A"/></input>
    </calculationView>
  </calculationViews>
</scenario>"##;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_plan_single_file_defaults_beside_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("CV_COST.calculationview");
        write(&input, VIEW);

        let jobs = plan(&input, None, false, &Config::default()).unwrap();
        assert_eq!(jobs, vec![Job {
            input: input.clone(),
            output: dir.path().join("CV_COST.sql"),
        }]);
    }

    #[test]
    fn test_plan_single_file_into_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("CV_COST.xml");
        let out_dir = dir.path().join("out");
        write(&input, VIEW);
        fs::create_dir(&out_dir).unwrap();

        let jobs = plan(&input, Some(&out_dir), false, &Config::default()).unwrap();
        assert_eq!(jobs[0].output, out_dir.join("CV_COST.sql"));

        let explicit = dir.path().join("custom.sql");
        let jobs = plan(&input, Some(&explicit), false, &Config::default()).unwrap();
        assert_eq!(jobs[0].output, explicit);
    }

    #[test]
    fn test_plan_rejects_extension() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        write(&input, "x");

        let err = plan(&input, None, false, &Config::default()).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidExtension { .. }));
    }

    #[test]
    fn test_plan_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = plan(&dir.path().join("missing"), None, false, &Config::default()).unwrap_err();
        assert!(matches!(err, ConvertError::PathNotFound(_)));
    }

    #[test]
    fn test_plan_directory_recursion_and_mirroring() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        write(&src.join("a.xml"), VIEW);
        write(&src.join("readme.md"), "");
        write(&src.join("finance/b.calculationview"), VIEW);

        let flat = plan(&src, None, false, &Config::default()).unwrap();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].output, src.join("a.sql"));

        let out = dir.path().join("out");
        let deep = plan(&src, Some(&out), true, &Config::default()).unwrap();
        let outputs: Vec<_> = deep.iter().map(|j| j.output.clone()).collect();
        assert_eq!(outputs, vec![out.join("a.sql"), out.join("finance/b.sql")]);
    }

    #[test]
    fn test_run_jobs_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        write(&src.join("good.xml"), VIEW);
        write(&src.join("broken.xml"), "<scenario><calculationViews>");
        write(&src.join("empty.xml"), "<scenario/>");

        let out = dir.path().join("out");
        let config = Config::default();
        let mut summary = Summary::default();
        for job in plan(&src, Some(&out), true, &config).unwrap() {
            let outcome = run_job(&job, &config);
            if let FileOutcome::Skipped { diagnostics } = &outcome {
                assert_eq!(diagnostics[0].kind, DiagnosticKind::NoCalculationViews);
            }
            summary.add(&outcome);
        }

        assert_eq!(summary, Summary { converted: 1, skipped: 1, failed: 1 });
        assert!(out.join("good.sql").is_file());
        assert!(!out.join("empty.sql").exists());
        assert!(!out.join("broken.sql").exists());
    }
}
