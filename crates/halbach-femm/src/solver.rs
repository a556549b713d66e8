//! Running FEMM and reading back the on-axis field profile

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{WigglerError, WigglerResult};

/// One contour sample: position along the axis and |B| in tesla
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSample {
    pub position: f64,
    pub field: f64,
}

/// Field magnitude along the beam axis, in contour order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldProfile {
    samples: Vec<FieldSample>,
}

impl FieldProfile {
    /// Parse FEMM's two-column plot export
    pub fn parse(text: &str) -> WigglerResult<Self> {
        let samples = text
            .lines()
            .enumerate()
            .map(|(i, line)| parse_line(line).ok_or_else(|| WigglerError::Parse {
                line: i + 1,
                content: line.to_string(),
            }))
            .collect::<WigglerResult<Vec<_>>>()?;
        Ok(Self { samples })
    }

    pub fn read(path: &Path) -> WigglerResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn samples(&self) -> &[FieldSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.position)
    }

    pub fn fields(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.field)
    }

    /// Sample with the largest |field|
    pub fn peak_abs_field(&self) -> Option<FieldSample> {
        self.samples
            .iter()
            .copied()
            .max_by(|a, b| a.field.abs().total_cmp(&b.field.abs()))
    }
}

impl FromStr for FieldProfile {
    type Err = WigglerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_line(line: &str) -> Option<FieldSample> {
    let mut tokens = line.split_whitespace();
    let position = finite(tokens.next()?)?;
    let field = finite(tokens.next()?)?;
    if tokens.next().is_some() {
        return None;
    }
    Some(FieldSample { position, field })
}

/// `f64::from_str` also accepts "NaN" and "inf"
fn finite(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// External solver that executes a generated script
pub trait Solver {
    /// Run the script to completion; blocks until the solver exits
    fn run(&self, script: &Path) -> WigglerResult<()>;
}

/// FEMM executable invoked in Lua-script mode
#[derive(Debug, Clone)]
pub struct FemmProcess {
    pub executable: PathBuf,
    /// Pass `-windowhide` so FEMM runs without showing its main window
    pub hide_window: bool,
}

impl FemmProcess {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            hide_window: true,
        }
    }
}

impl Solver for FemmProcess {
    fn run(&self, script: &Path) -> WigglerResult<()> {
        let mut command = Command::new(&self.executable);
        command.arg(format!("-lua-script={}", script.display()));
        if self.hide_window {
            command.arg("-windowhide");
        }

        info!("Running {:?} on {:?}", self.executable, script);
        let status = command.status().map_err(|e| {
            WigglerError::Solver(format!("failed to start {:?}: {e}", self.executable))
        })?;

        if !status.success() {
            return Err(WigglerError::Solver(format!(
                "{:?} exited with {status}",
                self.executable
            )));
        }
        Ok(())
    }
}

/// Run a solve script and read the field profile it writes
pub fn solve_and_extract<S: Solver>(
    solver: &S,
    script: &Path,
    field_file: &Path,
) -> WigglerResult<FieldProfile> {
    // A stale profile from an earlier run must never be mistaken for output
    if field_file.exists() {
        warn!("Removing stale field file {:?}", field_file);
        fs::remove_file(field_file)?;
    }

    solver.run(script)?;

    if !field_file.exists() {
        return Err(WigglerError::Solver(format!(
            "solver finished but wrote no field file at {field_file:?}"
        )));
    }

    let profile = FieldProfile::read(field_file)?;
    if let Some(peak) = profile.peak_abs_field() {
        info!(
            "Read {} field samples, peak |B| = {:.4} T at x = {:.3}",
            profile.len(),
            peak.field.abs(),
            peak.position
        );
    } else {
        warn!("Field file {:?} is empty", field_file);
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct FakeSolver {
        output: Option<(PathBuf, String)>,
        runs: Cell<usize>,
    }

    impl Solver for FakeSolver {
        fn run(&self, _script: &Path) -> WigglerResult<()> {
            self.runs.set(self.runs.get() + 1);
            if let Some((path, text)) = &self.output {
                fs::write(path, text)?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_parse_two_columns() {
        let profile = FieldProfile::parse("0.0 1.66\n1.0 1.64\n").unwrap();
        assert_eq!(
            profile.samples(),
            &[
                FieldSample { position: 0.0, field: 1.66 },
                FieldSample { position: 1.0, field: 1.64 },
            ]
        );
    }

    #[test]
    fn test_parse_tabs_and_crlf() {
        let profile: FieldProfile = "0\t-0.5\r\n2.5e1\t1e-3\r\n".parse().unwrap();
        assert_eq!(profile.positions().collect::<Vec<_>>(), vec![0.0, 25.0]);
        assert_eq!(profile.fields().collect::<Vec<_>>(), vec![-0.5, 0.001]);
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        let err = FieldProfile::parse("0.0 abc\n").unwrap_err();
        assert!(matches!(err, WigglerError::Parse { line: 1, .. }), "{err}");

        let err = FieldProfile::parse("0.0 1.0\n1.0\n").unwrap_err();
        assert!(matches!(err, WigglerError::Parse { line: 2, .. }));

        let err = FieldProfile::parse("0.0 1.0 2.0\n").unwrap_err();
        assert!(matches!(err, WigglerError::Parse { line: 1, .. }));

        let err = FieldProfile::parse("0.0 1.0\n\n1.0 2.0\n").unwrap_err();
        assert!(matches!(err, WigglerError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_parse_rejects_non_finite_values() {
        for text in ["0.0 NaN\n", "inf 1.0\n", "0.0 -inf\n", "0.0 1.0\n1.0 nan\n"] {
            let err = FieldProfile::parse(text).unwrap_err();
            assert!(matches!(err, WigglerError::Parse { .. }), "{text:?}: {err}");
        }
    }

    #[test]
    fn test_peak_abs_field() {
        let profile = FieldProfile::parse("0 0.2\n1 -1.7\n2 1.66\n").unwrap();
        assert_eq!(profile.peak_abs_field(), Some(FieldSample { position: 1.0, field: -1.7 }));
        assert_eq!(FieldProfile::default().peak_abs_field(), None);
    }

    #[test]
    fn test_solve_and_extract_reads_fresh_output() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("wiggler.lua");
        let field_file = dir.path().join("B.txt");
        fs::write(&field_file, "9 9\n").unwrap();

        let solver = FakeSolver {
            output: Some((field_file.clone(), "0.0 1.66\n1.0 1.64\n".to_string())),
            runs: Cell::new(0),
        };
        let profile = solve_and_extract(&solver, &script, &field_file).unwrap();
        assert_eq!(solver.runs.get(), 1);
        assert_eq!(profile.len(), 2);
        assert_eq!(profile.samples()[1], FieldSample { position: 1.0, field: 1.64 });
    }

    #[test]
    fn test_missing_output_is_solver_error() {
        let dir = TempDir::new().unwrap();
        let field_file = dir.path().join("B.txt");
        fs::write(&field_file, "0 1\n").unwrap();

        let solver = FakeSolver { output: None, runs: Cell::new(0) };
        let err = solve_and_extract(&solver, &dir.path().join("w.lua"), &field_file).unwrap_err();
        assert!(matches!(err, WigglerError::Solver(_)));
        assert!(!field_file.exists());
    }

    #[test]
    fn test_missing_executable_is_solver_error() {
        let solver = FemmProcess::new("/nonexistent/femm-binary");
        let err = solver.run(Path::new("wiggler.lua")).unwrap_err();
        assert!(matches!(err, WigglerError::Solver(_)));
    }
}
