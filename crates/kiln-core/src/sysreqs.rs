//! Installing host packages a recipe needs before it can build.

use thiserror::Error;

use crate::host::{HostEnvironment, SysrequiresMode};
use crate::process::{BuildError, CommandRunner};
use crate::recipe::SystemPackage;

#[derive(Error, Debug)]
pub enum SysreqError {
    #[error("Missing system requirements. Run:\n  {}", .0.join("\n  "))]
    Missing(Vec<String>),

    #[error(transparent)]
    Install(#[from] BuildError),
}

/// Handle `packages` according to the host's [`SysrequiresMode`].
///
/// Returns the command lines that were run.
pub fn install(
    runner: &dyn CommandRunner,
    host: &HostEnvironment,
    packages: &[SystemPackage],
) -> Result<Vec<String>, SysreqError> {
    if packages.is_empty() {
        return Ok(Vec::new());
    }
    let lines: Vec<String> = packages.iter().map(|p| p.command_line(host)).collect();

    match host.sysrequires_mode {
        SysrequiresMode::Disabled => {
            for line in &lines {
                tracing::warn!(command = line.as_str(), "System requirements disabled, not running");
            }
            Ok(Vec::new())
        }
        SysrequiresMode::Verify => Err(SysreqError::Missing(lines)),
        SysrequiresMode::Enabled => {
            for (pkg, line) in packages.iter().zip(&lines) {
                tracing::info!(command = line.as_str(), "Installing system requirement");
                runner.run(&pkg.command(host))?;
            }
            Ok(lines)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RecordingRunner;
    use kiln_schema::Os;

    const EXECINFO: SystemPackage = SystemPackage {
        manager: "apk",
        args: &["add", "libexecinfo-dev"],
    };

    fn alpine(mode: SysrequiresMode) -> HostEnvironment {
        HostEnvironment {
            sysrequires_mode: mode,
            sudo_on_path: true,
            stdout_is_tty: true,
            ..HostEnvironment::new(Os::Linux).with_distro("alpine")
        }
    }

    #[test]
    fn test_enabled_runs_with_sudo() {
        let runner = RecordingRunner::new();
        let ran = install(&runner, &alpine(SysrequiresMode::Enabled), &[EXECINFO]).unwrap();
        assert_eq!(ran, vec!["sudo apk add libexecinfo-dev"]);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "sudo");
        assert_eq!(calls[0].args, vec!["apk", "add", "libexecinfo-dev"]);
    }

    #[test]
    fn test_verify_lists_commands() {
        let runner = RecordingRunner::new();
        let err = install(&runner, &alpine(SysrequiresMode::Verify), &[EXECINFO]).unwrap_err();
        assert!(matches!(&err, SysreqError::Missing(lines) if lines.len() == 1));
        assert!(err.to_string().contains("sudo apk add libexecinfo-dev"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_disabled_skips() {
        let runner = RecordingRunner::new();
        let ran = install(&runner, &alpine(SysrequiresMode::Disabled), &[EXECINFO]).unwrap();
        assert!(ran.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_nothing_to_do() {
        let runner = RecordingRunner::new();
        assert!(install(&runner, &alpine(SysrequiresMode::Verify), &[]).unwrap().is_empty());
    }
}
