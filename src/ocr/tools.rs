//! Helpers for the external Poppler and Tesseract binaries.

use std::ffi::OsString;
use std::io;
use std::process::{Command, Output};

/// Tools the pipeline shells out to.
pub const REQUIRED_TOOLS: [&str; 4] = ["pdftotext", "pdfinfo", "pdftoppm", "tesseract"];

/// Check if a binary is available in PATH.
pub fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Report availability of every required tool.
pub fn check_tools() -> Vec<(String, bool)> {
    REQUIRED_TOOLS
        .iter()
        .map(|tool| (tool.to_string(), check_binary(tool)))
        .collect()
}

/// Outcome of running an external command.
#[derive(Debug)]
pub enum CommandOutcome {
    /// Exited successfully; raw stdout.
    Success(Vec<u8>),
    /// Exited with failure; stderr as text.
    Failed(String),
    /// Binary is not installed.
    NotFound,
}

/// Classify the result of `Command::output()`.
pub fn classify_output(result: io::Result<Output>) -> io::Result<CommandOutcome> {
    match result {
        Ok(output) if output.status.success() => Ok(CommandOutcome::Success(output.stdout)),
        Ok(output) => Ok(CommandOutcome::Failed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(CommandOutcome::NotFound),
        Err(e) => Err(e),
    }
}

/// Runs an external program and classifies how it ended.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[OsString]) -> io::Result<CommandOutcome>;
}

/// Runs programs as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[OsString]) -> io::Result<CommandOutcome> {
        classify_output(Command::new(program).args(args).output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tools() {
        let tools = check_tools();
        assert_eq!(tools.len(), REQUIRED_TOOLS.len());
        for (tool, available) in tools {
            println!("{}: {}", tool, if available { "found" } else { "missing" });
        }
    }

    #[test]
    fn test_missing_binary_classified_as_not_found() {
        let result = std::process::Command::new("doctext-definitely-not-a-binary").output();
        assert!(matches!(classify_output(result), Ok(CommandOutcome::NotFound)));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_command_captures_stderr() {
        let result = std::process::Command::new("sh")
            .args(["-c", "echo broken >&2; exit 3"])
            .output();
        match classify_output(result).unwrap() {
            CommandOutcome::Failed(stderr) => assert_eq!(stderr, "broken"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_passes_arguments() {
        let args: Vec<OsString> = vec!["-c".into(), "printf '%s' \"$0\"".into(), "page_3.png".into()];
        match SystemRunner.run("sh", &args).unwrap() {
            CommandOutcome::Success(stdout) => assert_eq!(stdout, b"page_3.png"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(matches!(
            SystemRunner.run("doctext-definitely-not-a-binary", &[]),
            Ok(CommandOutcome::NotFound)
        ));
    }
}
