use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tracing::trace;

use crate::command::HookCommand;
use crate::hook::Hook;
use crate::process::{self, Cmd};

/// The classified outcome of one hook subprocess.
#[derive(Debug, Clone, Default)]
pub(crate) struct Execution {
    /// Combined stdout and stderr.
    pub output: String,
    pub exit_code: i32,
    pub success: bool,
    pub timed_out: bool,
    /// Set when the output alone does not explain the failure.
    pub error: Option<String>,
}

/// Hook ids and entry substrings that identify formatters for the
/// modified-files heuristic.
const FORMATTER_TOKENS: &[&str] = &[
    "black",
    "autopep8",
    "yapf",
    "isort",
    "prettier",
    "eslint",
    "rustfmt",
    "gofmt",
    "clang-format",
    "terraform_fmt",
];

/// Output fragments formatters print when they rewrote files.
const MODIFIED_MARKERS: &[&str] = &[
    "files reformatted",
    "file reformatted",
    "reformatted",
    "would reformat",
    "formatting",
    "fixed",
];

pub(crate) const MODIFIED_LINE: &str = "- files were modified by this hook";

fn is_formatter(hook: &Hook) -> bool {
    if FORMATTER_TOKENS.contains(&hook.id.as_str()) {
        return true;
    }
    let entry = hook.entry.to_lowercase();
    FORMATTER_TOKENS.iter().any(|token| entry.contains(token))
}

/// Insert the modified-files marker before the first blank line of `output`,
/// or at the front when there is none. Empty output becomes just the marker.
fn insert_modified_line(output: &str) -> String {
    if output.trim().is_empty() {
        return MODIFIED_LINE.to_string();
    }
    let lines: Vec<&str> = output.split('\n').collect();
    let insert_at = lines
        .iter()
        .position(|line| line.trim().is_empty())
        .unwrap_or(0);

    let mut result = Vec::with_capacity(lines.len() + 1);
    result.extend_from_slice(&lines[..insert_at]);
    result.push(MODIFIED_LINE);
    result.extend_from_slice(&lines[insert_at..]);
    result.join("\n")
}

/// Exit code 1 from a known formatter whose output mentions rewriting is a
/// "files were modified" outcome: the run must block the commit even though
/// nothing is otherwise wrong.
fn apply_formatter_heuristic(hook: &Hook, execution: &mut Execution) {
    if execution.exit_code != 1 || !is_formatter(hook) {
        return;
    }
    let lowered = execution.output.to_lowercase();
    if MODIFIED_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        execution.output = insert_modified_line(&execution.output);
        execution.success = false;
        execution.error = None;
    }
}

/// Run a hook command, capture combined output, and classify the result.
///
/// Never returns an error: every failure mode lands in the [`Execution`].
pub(crate) async fn execute(
    hook: &Hook,
    command: &HookCommand,
    work_root: &Path,
    timeout: Option<Duration>,
) -> Execution {
    let mut cmd = Cmd::new(&command.program, format!("run hook `{}`", hook.id));
    cmd.args(&command.args)
        .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_os_str())))
        .current_dir(command.cwd.as_deref().unwrap_or(work_root))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // A timed-out child must not outlive us.
    cmd.inner.kill_on_drop(true);
    cmd.check(false);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(process::Error::Exec { cause, .. })
            if cause.kind() == std::io::ErrorKind::NotFound =>
        {
            return Execution {
                exit_code: -1,
                success: false,
                error: Some(format!("Executable not found: {cause}")),
                ..Default::default()
            };
        }
        Err(err) => {
            return Execution {
                exit_code: -1,
                success: false,
                error: Some(format!("Execution error: {err}")),
                ..Default::default()
            };
        }
    };

    let wait = child.wait_with_output();
    let output = match timeout {
        Some(duration) => match tokio::time::timeout(duration, wait).await {
            Ok(result) => result,
            Err(_elapsed) => {
                trace!(hook = %hook.id, ?duration, "Hook timed out");
                return Execution {
                    exit_code: -1,
                    success: false,
                    timed_out: true,
                    error: Some(format!("Hook timed out after {duration:?}")),
                    ..Default::default()
                };
            }
        },
        None => wait.await,
    };

    let output = match output {
        Ok(output) => output,
        Err(err) => {
            return Execution {
                exit_code: -1,
                success: false,
                error: Some(format!("Execution error: {err}")),
                ..Default::default()
            };
        }
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    let exit_code = output.status.code().unwrap_or(-1);
    let mut execution = if output.status.success() {
        Execution {
            output: combined,
            exit_code,
            success: true,
            ..Default::default()
        }
    } else if combined.trim().is_empty() {
        Execution {
            output: combined,
            exit_code,
            success: false,
            error: Some(format!("Command failed with exit code {exit_code}")),
            ..Default::default()
        }
    } else {
        // The output itself is the message.
        Execution {
            output: combined,
            exit_code,
            success: false,
            ..Default::default()
        }
    };

    apply_formatter_heuristic(hook, &mut execution);
    execution
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::command::HookCommand;
    use crate::config::{Config, Language, ManifestHook};
    use crate::hook::{Hook, RepoSource, from_manifest_hook};

    use super::{Execution, MODIFIED_LINE, apply_formatter_heuristic, execute};

    fn make_hook(id: &str, language: Language, entry: &str) -> Hook {
        let config: Config = serde_yaml::from_str("repos: []").expect("config");
        let manifest = ManifestHook {
            id: id.to_string(),
            name: id.to_string(),
            entry: entry.to_string(),
            language,
            options: crate::config::HookOptions::default(),
        };
        from_manifest_hook(manifest, &config, Arc::new(RepoSource::Local), 0)
    }

    fn shell(body: &str) -> HookCommand {
        HookCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), body.to_string()],
            cwd: None,
            env: Vec::new(),
        }
    }

    #[tokio::test]
    async fn successful_command() {
        let hook = make_hook("ok", Language::System, "sh -c 'echo fine'");
        let result = execute(&hook, &shell("echo fine"), Path::new("."), None).await;
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output.trim(), "fine");
        assert!(result.error.is_none());
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn nonzero_exit_without_output_gets_a_message() {
        let hook = make_hook("bad", Language::System, "sh -c 'exit 3'");
        let result = execute(&hook, &shell("exit 3"), Path::new("."), None).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        assert_eq!(
            result.error.as_deref(),
            Some("Command failed with exit code 3")
        );
    }

    #[tokio::test]
    async fn nonzero_exit_with_output_keeps_output_as_message() {
        let hook = make_hook("bad", Language::System, "x");
        let result = execute(
            &hook,
            &shell("echo broken things; exit 2"),
            Path::new("."),
            None,
        )
        .await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 2);
        assert!(result.error.is_none());
        assert!(result.output.contains("broken things"));
    }

    #[tokio::test]
    async fn missing_executable_is_reported() {
        let hook = make_hook("gone", Language::System, "definitely-not-a-real-tool");
        let command = HookCommand {
            program: "definitely-not-a-real-tool-7f3a".to_string(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        };
        let result = execute(&hook, &command, Path::new("."), None).await;
        assert!(!result.success);
        assert!(
            result
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with("Executable not found:")),
            "unexpected error: {:?}",
            result.error
        );
    }

    #[tokio::test]
    async fn timeout_is_classified() {
        let hook = make_hook("slow", Language::System, "sleep");
        let result = execute(
            &hook,
            &shell("sleep 5"),
            Path::new("."),
            Some(Duration::from_millis(100)),
        )
        .await;
        assert!(!result.success);
        assert!(result.timed_out);
        assert!(
            result
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with("Hook timed out after")),
            "unexpected error: {:?}",
            result.error
        );
    }

    #[test]
    fn formatter_exit_one_with_marker_blocks_commit() {
        let hook = make_hook("black", Language::Python, "black");
        let mut execution = Execution {
            output: "1 file reformatted.".to_string(),
            exit_code: 1,
            success: false,
            ..Default::default()
        };
        apply_formatter_heuristic(&hook, &mut execution);

        assert!(!execution.success);
        assert!(execution.output.starts_with(MODIFIED_LINE));
        assert!(execution.output.contains("1 file reformatted."));
        assert!(execution.error.is_none());
    }

    #[test]
    fn formatter_detection_by_entry_token() {
        let hook = make_hook("style", Language::System, "npx prettier --write");
        let mut execution = Execution {
            output: "Formatting complete".to_string(),
            exit_code: 1,
            success: false,
            ..Default::default()
        };
        apply_formatter_heuristic(&hook, &mut execution);
        assert!(execution.output.starts_with(MODIFIED_LINE));
    }

    #[test]
    fn heuristic_requires_exit_code_one_and_marker() {
        // Exit code 2 is a real failure, not a reformat.
        let hook = make_hook("black", Language::Python, "black");
        let mut execution = Execution {
            output: "1 file reformatted.".to_string(),
            exit_code: 2,
            success: false,
            ..Default::default()
        };
        apply_formatter_heuristic(&hook, &mut execution);
        assert!(!execution.output.starts_with(MODIFIED_LINE));

        // A formatter failing without any marker keeps its output untouched.
        let mut execution = Execution {
            output: "error: cannot parse a.py".to_string(),
            exit_code: 1,
            success: false,
            ..Default::default()
        };
        apply_formatter_heuristic(&hook, &mut execution);
        assert!(!execution.output.starts_with(MODIFIED_LINE));

        // A non-formatter is never rewritten.
        let hook = make_hook("pylint", Language::Python, "pylint");
        let mut execution = Execution {
            output: "would reformat".to_string(),
            exit_code: 1,
            success: false,
            ..Default::default()
        };
        apply_formatter_heuristic(&hook, &mut execution);
        assert!(!execution.output.starts_with(MODIFIED_LINE));
    }

    #[test]
    fn marker_insertion_respects_first_blank_line() {
        let hook = make_hook("black", Language::Python, "black");
        let mut execution = Execution {
            output: "reformatted a.py\n\ndetails follow".to_string(),
            exit_code: 1,
            success: false,
            ..Default::default()
        };
        apply_formatter_heuristic(&hook, &mut execution);
        assert_eq!(
            execution.output,
            format!("reformatted a.py\n{MODIFIED_LINE}\n\ndetails follow")
        );
    }
}
