use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::Language;
use crate::hook::Hook;
use crate::languages::bin_dir;

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("Hook `{hook}`: empty command")]
    EmptyCommand { hook: String },

    #[error("Hook `{hook}`: failed to parse entry `{entry}`")]
    InvalidEntry { hook: String, entry: String },
}

/// A concrete subprocess invocation for a hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HookCommand {
    pub program: String,
    pub args: Vec<String>,
    /// `None` inherits the orchestrator's working directory (the repo root).
    pub cwd: Option<PathBuf>,
    /// Variables injected on top of the inherited environment.
    pub env: Vec<(String, OsString)>,
}

impl HookCommand {
    fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }
}

/// Whether matched filenames are appended to the hook's command line.
///
/// An explicit setting always wins; otherwise every language passes
/// filenames except the docker family, where the container would not see the
/// host paths anyway.
pub(crate) fn pass_filenames(hook: &Hook) -> bool {
    hook.pass_filenames
        .unwrap_or(!matches!(hook.language, Language::Docker | Language::DockerImage))
}

/// Split a hook entry into words.
///
/// `sh -c '...'`/`bash -c '...'` entries keep the shell body as a single
/// argument; everything else goes through shell-style word splitting.
fn split_entry(hook_id: &str, entry: &str) -> Result<Vec<String>, Error> {
    if entry.trim().is_empty() {
        return Err(Error::EmptyCommand {
            hook: hook_id.to_string(),
        });
    }

    for shell in ["sh", "bash"] {
        let prefix = format!("{shell} -c ");
        if let Some(body) = entry.strip_prefix(&prefix) {
            let body = body.trim();
            let body = body
                .strip_prefix('\'')
                .and_then(|b| b.strip_suffix('\''))
                .or_else(|| body.strip_prefix('"').and_then(|b| b.strip_suffix('"')))
                .unwrap_or(body);
            return Ok(vec![
                shell.to_string(),
                "-c".to_string(),
                body.to_string(),
            ]);
        }
    }

    let words = shlex::split(entry).ok_or_else(|| Error::InvalidEntry {
        hook: hook_id.to_string(),
        entry: entry.to_string(),
    })?;
    if words.is_empty() {
        return Err(Error::EmptyCommand {
            hook: hook_id.to_string(),
        });
    }
    Ok(words)
}

fn env_executable(env_path: Option<&Path>, name: &str) -> Option<PathBuf> {
    let candidate = bin_dir(env_path?).join(name);
    candidate.is_file().then_some(candidate)
}

fn push_tail(cmd: &mut HookCommand, hook: &Hook, files: &[String]) {
    cmd.args.extend(hook.args.iter().cloned());
    if pass_filenames(hook) {
        cmd.args.extend(files.iter().cloned());
    }
}

/// Build the subprocess invocation for a resolved hook.
///
/// `work_root` is the user's repository root, `env_path` the provisioned
/// environment (when the language has one).
pub(crate) fn build_command(
    hook: &Hook,
    files: &[String],
    work_root: &Path,
    env_path: Option<&Path>,
) -> Result<HookCommand, Error> {
    let entry = hook.entry.as_str();
    let mut cmd = match &hook.language {
        Language::Fail => {
            // Always produces a failing exit status; the entry text is the
            // message shown to the user.
            let mut cmd = HookCommand::new("sh");
            cmd.args = vec!["-c".to_string(), "exit 1".to_string()];
            cmd
        }

        Language::Script => {
            let words = split_entry(&hook.id, entry)?;
            // Bare names resolve against the provider repository when the
            // script exists there.
            let in_repo = (!words[0].contains('/'))
                .then(|| hook.repo_path().map(|repo| repo.join(&words[0])))
                .flatten()
                .filter(|path| path.is_file());
            let mut cmd = match in_repo {
                Some(path) => HookCommand::new(path.to_string_lossy().to_string()),
                None => HookCommand::new(words[0].clone()),
            };
            cmd.args.extend(words[1..].iter().cloned());
            cmd.cwd = hook.repo_path().map(Path::to_path_buf);
            push_tail(&mut cmd, hook, files);
            cmd
        }

        Language::Python => {
            let mut words = split_entry(&hook.id, entry)?;
            let env_python = env_path
                .map(|env| bin_dir(env).join(if cfg!(windows) { "python.exe" } else { "python" }));

            let mut cmd = if words[0] == "python" || words[0] == "python3" {
                // `python -m tool` style entries run under the environment's
                // interpreter.
                let interpreter = env_python
                    .filter(|p| p.is_file())
                    .map_or_else(|| words[0].clone(), |p| p.to_string_lossy().to_string());
                words.remove(0);
                let mut cmd = HookCommand::new(interpreter);
                cmd.args.extend(words);
                cmd
            } else if let Some(executable) = env_executable(env_path, &words[0]) {
                let mut cmd = HookCommand::new(executable.to_string_lossy().to_string());
                cmd.args.extend(words[1..].iter().cloned());
                cmd
            } else {
                let interpreter = env_python
                    .filter(|p| p.is_file())
                    .map_or_else(|| "python3".to_string(), |p| p.to_string_lossy().to_string());
                let mut cmd = HookCommand::new(interpreter);
                cmd.args.extend(words);
                cmd
            };
            push_tail(&mut cmd, hook, files);
            cmd
        }

        Language::Node => {
            let words = split_entry(&hook.id, entry)?;
            let mut cmd = if let Some(executable) = env_executable(env_path, &words[0]) {
                HookCommand::new(executable.to_string_lossy().to_string())
            } else {
                HookCommand::new(words[0].clone())
            };
            cmd.args.extend(words[1..].iter().cloned());
            push_tail(&mut cmd, hook, files);
            cmd
        }

        Language::Golang => {
            let mut cmd = if let Some(rest) = entry.strip_prefix("go ") {
                let mut cmd = HookCommand::new("go");
                cmd.args
                    .extend(rest.split_whitespace().map(ToString::to_string));
                cmd
            } else if entry.ends_with(".go") {
                let mut cmd = HookCommand::new("go");
                cmd.args = vec!["run".to_string(), entry.to_string()];
                cmd
            } else {
                let words = split_entry(&hook.id, entry)?;
                let mut cmd = HookCommand::new(words[0].clone());
                cmd.args.extend(words[1..].iter().cloned());
                cmd
            };
            push_tail(&mut cmd, hook, files);
            cmd
        }

        Language::Rust => {
            let mut cmd = if entry.ends_with(".rs") {
                let mut cmd = HookCommand::new("rustc");
                cmd.args = vec![entry.to_string()];
                cmd
            } else {
                let words = split_entry(&hook.id, entry)?;
                let mut cmd = HookCommand::new(words[0].clone());
                cmd.args.extend(words[1..].iter().cloned());
                cmd
            };
            push_tail(&mut cmd, hook, files);
            cmd
        }

        Language::Ruby
        | Language::Perl
        | Language::Lua
        | Language::Swift
        | Language::R
        | Language::Haskell => {
            let interpreter = match hook.language {
                Language::Ruby => "ruby",
                Language::Perl => "perl",
                Language::Lua => "lua",
                Language::Swift => "swift",
                Language::R => "Rscript",
                Language::Haskell => "runhaskell",
                _ => unreachable!(),
            };
            let words = split_entry(&hook.id, entry)?;
            let mut cmd = HookCommand::new(interpreter);
            cmd.args.extend(words);
            push_tail(&mut cmd, hook, files);
            cmd
        }

        Language::Docker | Language::DockerImage => {
            let mut cmd = HookCommand::new("docker");
            cmd.args = vec![
                "run".to_string(),
                "--rm".to_string(),
                "-v".to_string(),
                format!("{}:/src", work_root.display()),
                "-w".to_string(),
                "/src".to_string(),
            ];
            if hook.language_version.is_empty() {
                // The entry itself names the image.
                cmd.args.push(entry.to_string());
            } else {
                cmd.args.push(hook.language_version.clone());
                cmd.args
                    .extend(split_entry(&hook.id, entry)?.into_iter());
            }
            push_tail(&mut cmd, hook, files);
            cmd
        }

        Language::Conda => {
            let words = split_entry(&hook.id, entry)?;
            let mut cmd = if let Some(env) = env_path {
                let mut cmd = HookCommand::new("conda");
                cmd.args = vec![
                    "run".to_string(),
                    "-p".to_string(),
                    env.to_string_lossy().to_string(),
                ];
                cmd.args.extend(words);
                cmd
            } else {
                let mut cmd = HookCommand::new(words[0].clone());
                cmd.args.extend(words[1..].iter().cloned());
                cmd
            };
            push_tail(&mut cmd, hook, files);
            cmd
        }

        Language::Dart => {
            let words = split_entry(&hook.id, entry)?;
            let mut cmd = if words[0].ends_with(".dart") {
                let mut cmd = HookCommand::new("dart");
                cmd.args.extend(words);
                cmd
            } else {
                let mut cmd = HookCommand::new(words[0].clone());
                cmd.args.extend(words[1..].iter().cloned());
                cmd
            };
            push_tail(&mut cmd, hook, files);
            cmd
        }

        Language::Julia => {
            let words = split_entry(&hook.id, entry)?;
            let mut cmd = if words[0].ends_with(".jl") {
                let mut cmd = HookCommand::new("julia");
                cmd.args.extend(words);
                cmd
            } else {
                let mut cmd = HookCommand::new(words[0].clone());
                cmd.args.extend(words[1..].iter().cloned());
                cmd
            };
            push_tail(&mut cmd, hook, files);
            cmd
        }

        Language::Dotnet => {
            let words = split_entry(&hook.id, entry)?;
            let mut cmd = HookCommand::new(words[0].clone());
            cmd.args.extend(words[1..].iter().cloned());
            push_tail(&mut cmd, hook, files);
            cmd
        }

        // `system`, `pygrep`, `coursier`, `script`-less languages, and
        // anything unrecognized run the entry as-is.
        Language::System
        | Language::Pygrep
        | Language::Coursier
        | Language::Other(_) => {
            let words = split_entry(&hook.id, entry)?;
            let mut cmd = HookCommand::new(words[0].clone());
            cmd.args.extend(words[1..].iter().cloned());
            push_tail(&mut cmd, hook, files);
            cmd
        }
    };

    if let Some(env) = env_path {
        cmd.env = hook.language.environment_variables(env);
    }

    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use crate::config::{Config, Language, ManifestHook};
    use crate::hook::{Hook, RepoSource, from_manifest_hook};

    use super::{Error, build_command, pass_filenames};

    fn make_hook(language: Language, entry: &str) -> Hook {
        let config: Config = serde_yaml::from_str("repos: []").expect("config");
        let manifest = ManifestHook {
            id: "test-hook".to_string(),
            name: "test hook".to_string(),
            entry: entry.to_string(),
            language,
            options: crate::config::HookOptions::default(),
        };
        from_manifest_hook(manifest, &config, Arc::new(RepoSource::Local), 0)
    }

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn system_appends_args_and_files() {
        let mut hook = make_hook(Language::System, "mytool --check");
        hook.args = vec!["--fast".to_string()];
        let cmd = build_command(&hook, &files(&["a.txt", "b.txt"]), Path::new("/repo"), None)
            .expect("build");

        assert_eq!(cmd.program, "mytool");
        assert_eq!(cmd.args, vec!["--check", "--fast", "a.txt", "b.txt"]);
    }

    #[test]
    fn sh_dash_c_body_stays_one_argument() {
        let hook = make_hook(Language::System, "sh -c 'echo one two'");
        let cmd = build_command(&hook, &files(&["a.txt"]), Path::new("/repo"), None).expect("build");

        assert_eq!(cmd.program, "sh");
        assert_eq!(cmd.args[0], "-c");
        assert_eq!(cmd.args[1], "echo one two");
        assert_eq!(cmd.args[2], "a.txt");
    }

    #[test]
    fn empty_entry_is_rejected() {
        let hook = make_hook(Language::System, "   ");
        let err =
            build_command(&hook, &[], Path::new("/repo"), None).expect_err("must fail");
        assert!(matches!(err, Error::EmptyCommand { .. }), "{err}");
    }

    #[test]
    fn docker_mounts_root_and_skips_filenames_by_default() {
        let mut hook = make_hook(Language::Docker, "alpine:latest");
        hook.args = vec!["echo".to_string(), "hi".to_string()];
        let cmd = build_command(&hook, &files(&["a.txt"]), Path::new("/root/project"), None)
            .expect("build");

        assert_eq!(cmd.program, "docker");
        assert_eq!(
            cmd.args,
            vec![
                "run",
                "--rm",
                "-v",
                "/root/project:/src",
                "-w",
                "/src",
                "alpine:latest",
                "echo",
                "hi",
            ]
        );

        // Explicitly enabling pass_filenames overrides the docker default.
        hook.pass_filenames = Some(true);
        let cmd = build_command(&hook, &files(&["a.txt"]), Path::new("/root/project"), None)
            .expect("build");
        assert!(cmd.args.contains(&"a.txt".to_string()));
    }

    #[test]
    fn docker_language_version_is_the_image() {
        let mut hook = make_hook(Language::DockerImage, "lint --strict");
        hook.language_version = "mylinter:2".to_string();
        let cmd = build_command(&hook, &[], Path::new("/p"), None).expect("build");
        assert_eq!(
            cmd.args,
            vec!["run", "--rm", "-v", "/p:/src", "-w", "/src", "mylinter:2", "lint", "--strict"]
        );
    }

    #[test]
    fn pass_filenames_defaults() {
        let hook = make_hook(Language::System, "x");
        assert!(pass_filenames(&hook));

        let hook = make_hook(Language::Docker, "img");
        assert!(!pass_filenames(&hook));

        let mut hook = make_hook(Language::Docker, "img");
        hook.pass_filenames = Some(true);
        assert!(pass_filenames(&hook));

        let mut hook = make_hook(Language::System, "x");
        hook.pass_filenames = Some(false);
        assert!(!pass_filenames(&hook));
    }

    #[test]
    fn golang_entry_forms() {
        let hook = make_hook(Language::Golang, "go vet ./...");
        let cmd = build_command(&hook, &[], Path::new("/p"), None).expect("build");
        assert_eq!(cmd.program, "go");
        assert_eq!(cmd.args, vec!["vet", "./..."]);

        let hook = make_hook(Language::Golang, "check.go");
        let cmd = build_command(&hook, &[], Path::new("/p"), None).expect("build");
        assert_eq!(cmd.program, "go");
        assert_eq!(cmd.args, vec!["run", "check.go"]);

        let hook = make_hook(Language::Golang, "golangci-lint run");
        let cmd = build_command(&hook, &[], Path::new("/p"), None).expect("build");
        assert_eq!(cmd.program, "golangci-lint");
        assert_eq!(cmd.args, vec!["run"]);
    }

    #[test]
    fn rust_script_entries_use_rustc() {
        let hook = make_hook(Language::Rust, "lint.rs");
        let cmd = build_command(&hook, &files(&["src/a.rs"]), Path::new("/p"), None).expect("build");
        assert_eq!(cmd.program, "rustc");
        assert_eq!(cmd.args, vec!["lint.rs", "src/a.rs"]);

        let hook = make_hook(Language::Rust, "cargo fmt --");
        let cmd = build_command(&hook, &[], Path::new("/p"), None).expect("build");
        assert_eq!(cmd.program, "cargo");
        assert_eq!(cmd.args, vec!["fmt", "--"]);
    }

    #[test]
    fn interpreter_languages_prefix_the_interpreter() {
        for (language, interpreter) in [
            (Language::Ruby, "ruby"),
            (Language::Perl, "perl"),
            (Language::R, "Rscript"),
            (Language::Haskell, "runhaskell"),
        ] {
            let hook = make_hook(language, "check.script --flag");
            let cmd = build_command(&hook, &files(&["f"]), Path::new("/p"), None).expect("build");
            assert_eq!(cmd.program, interpreter);
            assert_eq!(cmd.args, vec!["check.script", "--flag", "f"]);
        }
    }

    #[test]
    fn fail_language_always_fails() {
        let hook = make_hook(Language::Fail, "do not commit to main");
        let cmd = build_command(&hook, &files(&["f"]), Path::new("/p"), None).expect("build");
        assert_eq!(cmd.program, "sh");
        assert_eq!(cmd.args[..2], ["-c".to_string(), "exit 1".to_string()]);
    }

    #[test]
    fn unknown_language_falls_back_to_system() {
        let hook = make_hook(Language::Other("cobol".to_string()), "cobc --lint");
        let cmd = build_command(&hook, &files(&["f"]), Path::new("/p"), None).expect("build");
        assert_eq!(cmd.program, "cobc");
        assert_eq!(cmd.args, vec!["--lint", "f"]);
    }

    #[test]
    fn python_env_executable_is_preferred() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let env = tmp.path();
        let bin = crate::languages::bin_dir(env);
        fs_err::create_dir_all(&bin).expect("mkdir");
        fs_err::write(bin.join("black"), "#!/bin/sh\n").expect("write");

        let hook = make_hook(Language::Python, "black");
        let cmd =
            build_command(&hook, &files(&["a.py"]), Path::new("/p"), Some(env)).expect("build");
        assert_eq!(cmd.program, bin.join("black").to_string_lossy());
        assert_eq!(cmd.args, vec!["a.py"]);

        // Entries not present in the environment run under the interpreter.
        let hook = make_hook(Language::Python, "missing-tool");
        let cmd =
            build_command(&hook, &files(&["a.py"]), Path::new("/p"), Some(env)).expect("build");
        assert_eq!(cmd.program, "python3");
        assert_eq!(cmd.args, vec!["missing-tool", "a.py"]);
    }
}
