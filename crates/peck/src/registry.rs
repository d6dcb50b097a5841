use crate::config::{HookOptions, Language, ManifestHook};

/// Static metadata for a hook shipped by a well-known tool repository or
/// built into the runner.
struct RegistryHook {
    id: &'static str,
    name: &'static str,
    entry: &'static str,
    language: &'static str,
    /// Type tags the hook applies to (AND semantics, like `types`).
    types: &'static [&'static str],
}

impl RegistryHook {
    fn to_manifest_hook(&self) -> ManifestHook {
        ManifestHook {
            id: self.id.to_string(),
            name: self.name.to_string(),
            entry: self.entry.to_string(),
            language: match self.language {
                "python" => Language::Python,
                "node" => Language::Node,
                "golang" => Language::Golang,
                "rust" => Language::Rust,
                _ => Language::System,
            },
            options: HookOptions {
                types: if self.types.is_empty() {
                    None
                } else {
                    Some(self.types.iter().map(ToString::to_string).collect())
                },
                ..Default::default()
            },
        }
    }
}

/// Default metadata for hooks of well-known upstream tool repositories, used
/// when a cloned tree carries no manifest entry for the requested id.
static WELL_KNOWN: &[(&str, &[RegistryHook])] = &[
    (
        "https://github.com/psf/black",
        &[RegistryHook {
            id: "black",
            name: "black",
            entry: "black",
            language: "python",
            types: &["python"],
        }],
    ),
    (
        "https://github.com/hhatto/autopep8",
        &[RegistryHook {
            id: "autopep8",
            name: "autopep8",
            entry: "autopep8 -i",
            language: "python",
            types: &["python"],
        }],
    ),
    (
        "https://github.com/google/yapf",
        &[RegistryHook {
            id: "yapf",
            name: "yapf",
            entry: "yapf -i",
            language: "python",
            types: &["python"],
        }],
    ),
    (
        "https://github.com/PyCQA/isort",
        &[RegistryHook {
            id: "isort",
            name: "isort",
            entry: "isort",
            language: "python",
            types: &["python"],
        }],
    ),
    (
        "https://github.com/PyCQA/flake8",
        &[RegistryHook {
            id: "flake8",
            name: "flake8",
            entry: "flake8",
            language: "python",
            types: &["python"],
        }],
    ),
    (
        "https://github.com/astral-sh/ruff-pre-commit",
        &[
            RegistryHook {
                id: "ruff",
                name: "ruff",
                entry: "ruff check --force-exclude",
                language: "python",
                types: &["python"],
            },
            RegistryHook {
                id: "ruff-format",
                name: "ruff-format",
                entry: "ruff format --force-exclude",
                language: "python",
                types: &["python"],
            },
        ],
    ),
    (
        "https://github.com/pre-commit/mirrors-prettier",
        &[RegistryHook {
            id: "prettier",
            name: "prettier",
            entry: "prettier --write --ignore-unknown",
            language: "node",
            types: &[],
        }],
    ),
    (
        "https://github.com/pre-commit/mirrors-eslint",
        &[RegistryHook {
            id: "eslint",
            name: "eslint",
            entry: "eslint --fix",
            language: "node",
            types: &["javascript"],
        }],
    ),
    (
        "https://github.com/golangci/golangci-lint",
        &[RegistryHook {
            id: "golangci-lint",
            name: "golangci-lint",
            entry: "golangci-lint run",
            language: "golang",
            types: &["go"],
        }],
    ),
    (
        "https://github.com/doublify/pre-commit-rust",
        &[
            RegistryHook {
                id: "fmt",
                name: "fmt",
                entry: "cargo fmt --",
                language: "rust",
                types: &["rust"],
            },
            RegistryHook {
                id: "cargo-check",
                name: "cargo check",
                entry: "cargo check --",
                language: "rust",
                types: &["rust"],
            },
            RegistryHook {
                id: "clippy",
                name: "clippy",
                entry: "cargo clippy --",
                language: "rust",
                types: &["rust"],
            },
        ],
    ),
    (
        "https://github.com/antonbabenko/pre-commit-terraform",
        &[RegistryHook {
            id: "terraform_fmt",
            name: "Terraform fmt",
            entry: "terraform fmt",
            language: "system",
            types: &[],
        }],
    ),
];

/// Built-in checks exposed through the `meta` repo; all run as `system`
/// commands.
static META: &[RegistryHook] = &[
    RegistryHook {
        id: "check-yaml",
        name: "check yaml",
        entry: "check-yaml",
        language: "system",
        types: &["yaml"],
    },
    RegistryHook {
        id: "check-json",
        name: "check json",
        entry: "check-json",
        language: "system",
        types: &["json"],
    },
    RegistryHook {
        id: "trailing-whitespace",
        name: "trim trailing whitespace",
        entry: "trailing-whitespace-fixer",
        language: "system",
        types: &["text"],
    },
    RegistryHook {
        id: "end-of-file-fixer",
        name: "fix end of files",
        entry: "end-of-file-fixer",
        language: "system",
        types: &["text"],
    },
    RegistryHook {
        id: "check-added-large-files",
        name: "check for added large files",
        entry: "check-added-large-files",
        language: "system",
        types: &[],
    },
    RegistryHook {
        id: "check-merge-conflict",
        name: "check for merge conflicts",
        entry: "check-merge-conflict",
        language: "system",
        types: &["text"],
    },
    RegistryHook {
        id: "mixed-line-ending",
        name: "mixed line ending",
        entry: "mixed-line-ending",
        language: "system",
        types: &["text"],
    },
    RegistryHook {
        id: "detect-private-key",
        name: "detect private key",
        entry: "detect-private-key",
        language: "system",
        types: &["text"],
    },
];

/// Look up the default metadata for `hook_id` in a well-known repository.
pub(crate) fn well_known_hook(repo_url: &str, hook_id: &str) -> Option<ManifestHook> {
    WELL_KNOWN
        .iter()
        .find(|(url, _)| *url == repo_url)?
        .1
        .iter()
        .find(|hook| hook.id == hook_id)
        .map(RegistryHook::to_manifest_hook)
}

/// Look up a built-in meta hook by id.
pub(crate) fn meta_hook(hook_id: &str) -> Option<ManifestHook> {
    META.iter()
        .find(|hook| hook.id == hook_id)
        .map(RegistryHook::to_manifest_hook)
}

#[cfg(test)]
mod tests {
    use crate::config::Language;

    use super::{meta_hook, well_known_hook};

    #[test]
    fn well_known_lookup() {
        let black = well_known_hook("https://github.com/psf/black", "black").expect("black");
        assert_eq!(black.language, Language::Python);
        assert_eq!(black.entry, "black");
        assert_eq!(black.options.types.as_deref(), Some(&["python".to_string()][..]));

        assert!(well_known_hook("https://github.com/psf/black", "nope").is_none());
        assert!(well_known_hook("https://example.com/unknown", "black").is_none());
    }

    #[test]
    fn meta_hooks_are_system_language() {
        for id in ["check-yaml", "check-json", "trailing-whitespace", "end-of-file-fixer"] {
            let hook = meta_hook(id).unwrap_or_else(|| panic!("missing meta hook {id}"));
            assert_eq!(hook.language, Language::System, "{id}");
        }
        assert!(meta_hook("not-a-meta-hook").is_none());
    }
}
