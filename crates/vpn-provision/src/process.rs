//! Control-tool invocation.

use tokio::process::Command;
use tracing::debug;

use crate::error::AdapterError;

/// Split a configured command line into program and arguments.
///
/// Arguments are separated by whitespace; no shell is involved.
pub(crate) fn split_command(line: &str) -> Option<(String, Vec<String>)> {
    let mut parts = line.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

/// Run `program args...` and return its stdout.
pub(crate) async fn run<I, S>(program: &str, args: I) -> Result<String, AdapterError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| AdapterError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(AdapterError::Command {
            program: program.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    debug!(program, "control command succeeded");
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command_line() {
        assert_eq!(
            split_command("systemctl reload v2ray"),
            Some(("systemctl".into(), vec!["reload".into(), "v2ray".into()]))
        );
        assert_eq!(split_command("   "), None);
    }

    #[tokio::test]
    async fn test_run_reports_exit_status() {
        assert!(run("true", Vec::<String>::new()).await.is_ok());
        assert!(matches!(
            run("false", Vec::<String>::new()).await,
            Err(AdapterError::Command { .. })
        ));
        assert!(matches!(
            run("/nonexistent/vpn-rs-tool", Vec::<String>::new()).await,
            Err(AdapterError::Spawn { .. })
        ));
    }
}
