use std::fs;
use std::path::PathBuf;
use std::process::Command;

use crate::error::OptimizerError;

/// Invokes the external ion-optics code on a rendered input script.
///
/// The executable takes the working file's base name as its sole argument
/// and writes its report to standard output. The call is synchronous and
/// unbounded: the simulator may run for minutes and the adapter imposes no
/// timeout of its own.
pub struct FoxRunner {
    executable: PathBuf,
    workdir: PathBuf,
    /// Base name of the working file; the rendered script is written to
    /// `<workdir>/<work_name>.fox` before every invocation.
    work_name: String,
}

impl FoxRunner {
    pub fn new(executable: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            workdir: workdir.into(),
            work_name: "temp".to_string(),
        }
    }

    pub fn with_work_name(mut self, work_name: impl Into<String>) -> Self {
        self.work_name = work_name.into();
        self
    }

    /// Write the script to the working file, run the simulator, and return
    /// its standard output. A non-zero exit is `InvocationFailed` with the
    /// captured output attached; it is up to the caller never to cache it.
    pub fn run(&self, script: &str) -> Result<String, OptimizerError> {
        let script_path = self.workdir.join(format!("{}.fox", self.work_name));
        fs::write(&script_path, script)?;

        let output = Command::new(&self.executable)
            .arg(&self.work_name)
            .current_dir(&self.workdir)
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut combined = stdout;
            if !stderr.is_empty() {
                if !combined.is_empty() {
                    combined.push('\n');
                }
                combined.push_str(&stderr);
            }
            return Err(OptimizerError::InvocationFailed {
                status: output.status,
                output: combined,
            });
        }

        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // The tests drive the runner with /bin/sh standing in for the
    // simulator: the "input script" it receives is the base name of the
    // working file, so a shell script named `temp` is executed directly.

    #[cfg(unix)]
    fn shell_runner(dir: &TempDir, body: &str) -> FoxRunner {
        let script = dir.path().join("sim.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        FoxRunner::new("/bin/sh", dir.path()).with_work_name("sim.sh")
    }

    #[test]
    #[cfg(unix)]
    fn captures_standard_output() {
        let dir = TempDir::new().unwrap();
        let runner = shell_runner(&dir, "echo 'Time Resol.(ps)  12.5'");
        let text = runner.run("ignored").unwrap();
        assert!(text.contains("12.5"));
    }

    #[test]
    #[cfg(unix)]
    fn nonzero_exit_is_invocation_failure_with_output() {
        let dir = TempDir::new().unwrap();
        let runner = shell_runner(&dir, "echo 'partial report'; echo 'boom' >&2; exit 3");
        let err = runner.run("ignored").unwrap_err();
        match err {
            OptimizerError::InvocationFailed { status, output } => {
                assert_eq!(status.code(), Some(3));
                assert!(output.contains("partial report"));
                assert!(output.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn writes_the_rendered_script_to_the_working_file() {
        let dir = TempDir::new().unwrap();
        let runner = shell_runner(&dir, "true");
        runner.run("strength_O := -0.003;").unwrap();
        let written = std::fs::read_to_string(dir.path().join("sim.sh.fox")).unwrap();
        assert_eq!(written, "strength_O := -0.003;");
    }
}
