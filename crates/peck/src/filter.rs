use std::path::{Path, PathBuf};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use peck_identify::tags_from_path;

use crate::config::Config;
use crate::hook::Hook;

/// Does `path` fall to `hook`? All five predicates must pass: the include
/// regex (against the path or its basename), the exclude regex, and the
/// three type-tag filters.
pub(crate) fn file_matches_hook(hook: &Hook, path: &Path) -> bool {
    let Some(path_str) = path.to_str() else {
        return false;
    };

    if let Some(include) = &hook.files {
        let basename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        if !include.is_match(path_str) && !include.is_match(basename) {
            return false;
        }
    }

    if let Some(exclude) = &hook.exclude {
        if exclude.is_match(path_str) {
            return false;
        }
    }

    if hook.types.is_empty() && hook.types_or.is_empty() && hook.exclude_types.is_empty() {
        return true;
    }

    let tags = tags_from_path(path);
    // An unknown tag can never be a tag of any file, so `types` with an
    // unknown tag matches nothing and `exclude_types` with one excludes
    // nothing.
    if !hook.types.iter().all(|tag| tags.contains(tag)) {
        return false;
    }
    if !hook.types_or.is_empty() && !hook.types_or.iter().any(|tag| tags.contains(tag)) {
        return false;
    }
    if hook.exclude_types.iter().any(|tag| tags.contains(tag)) {
        return false;
    }

    true
}

/// The candidate file list for a run, with the configuration-wide
/// include/exclude patterns already applied.
pub(crate) struct FileFilter<'a> {
    filenames: Vec<&'a Path>,
}

impl<'a> FileFilter<'a> {
    pub(crate) fn new<I>(filenames: I, config: &Config) -> Self
    where
        I: Iterator<Item = &'a PathBuf>,
    {
        let filenames = filenames
            .map(PathBuf::as_path)
            .filter(|path| {
                let Some(path_str) = path.to_str() else {
                    return false;
                };
                if let Some(include) = &config.files {
                    if !include.is_match(path_str) {
                        return false;
                    }
                }
                if let Some(exclude) = &config.exclude {
                    if exclude.is_match(path_str) {
                        return false;
                    }
                }
                true
            })
            .collect();

        Self { filenames }
    }

    pub(crate) fn len(&self) -> usize {
        self.filenames.len()
    }

    /// The subset of candidate files `hook` applies to.
    pub(crate) fn for_hook(&self, hook: &Hook) -> Vec<&Path> {
        self.filenames
            .par_iter()
            .filter(|path| file_matches_hook(hook, path))
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use crate::config::{Config, FilePattern, Language, ManifestHook};
    use crate::hook::{Hook, RepoSource, from_manifest_hook};

    use super::{FileFilter, file_matches_hook};

    fn make_hook() -> Hook {
        let config: Config = serde_yaml::from_str("repos: []").expect("config");
        let manifest = ManifestHook {
            id: "h".to_string(),
            name: "h".to_string(),
            entry: "true".to_string(),
            language: Language::System,
            options: crate::config::HookOptions::default(),
        };
        from_manifest_hook(manifest, &config, Arc::new(RepoSource::Local), 0)
    }

    #[test]
    fn include_matches_path_or_basename() {
        let mut hook = make_hook();
        hook.files = Some(FilePattern::new(r"^setup\.py$").expect("regex"));

        // Full-path match.
        assert!(file_matches_hook(&hook, Path::new("setup.py")));
        // Basename match for nested files.
        assert!(file_matches_hook(&hook, Path::new("pkg/setup.py")));
        assert!(!file_matches_hook(&hook, Path::new("pkg/setup.cfg")));
    }

    #[test]
    fn exclude_wins_over_include() {
        let mut hook = make_hook();
        hook.files = Some(FilePattern::new(r"\.py$").expect("regex"));
        hook.exclude = Some(FilePattern::new(r"^vendor/").expect("regex"));

        assert!(file_matches_hook(&hook, Path::new("src/a.py")));
        assert!(!file_matches_hook(&hook, Path::new("vendor/a.py")));
    }

    #[test]
    fn type_predicates() {
        let mut hook = make_hook();
        hook.types = vec!["python".to_string()];
        assert!(file_matches_hook(&hook, Path::new("a.py")));
        assert!(!file_matches_hook(&hook, Path::new("a.js")));

        // AND semantics across `types`.
        hook.types = vec!["python".to_string(), "text".to_string()];
        assert!(file_matches_hook(&hook, Path::new("a.py")));

        let mut hook = make_hook();
        hook.types_or = vec!["python".to_string(), "javascript".to_string()];
        assert!(file_matches_hook(&hook, Path::new("a.py")));
        assert!(file_matches_hook(&hook, Path::new("a.js")));
        assert!(!file_matches_hook(&hook, Path::new("a.rb")));

        let mut hook = make_hook();
        hook.exclude_types = vec!["markdown".to_string()];
        assert!(file_matches_hook(&hook, Path::new("a.py")));
        assert!(!file_matches_hook(&hook, Path::new("README.md")));
    }

    #[test]
    fn unknown_type_tag_never_matches() {
        let mut hook = make_hook();
        hook.types = vec!["no-such-type".to_string()];
        assert!(!file_matches_hook(&hook, Path::new("a.py")));

        // In `exclude_types` an unknown tag excludes nothing.
        let mut hook = make_hook();
        hook.exclude_types = vec!["no-such-type".to_string()];
        assert!(file_matches_hook(&hook, Path::new("a.py")));
    }

    #[test]
    fn filter_is_idempotent_and_applies_global_patterns() {
        let config: Config = serde_yaml::from_str(indoc::indoc! {r"
            repos: []
            exclude: ^generated/
        "})
        .expect("config");

        let filenames: Vec<PathBuf> = ["a.py", "generated/b.py", "docs/c.md"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let filter = FileFilter::new(filenames.iter(), &config);
        assert_eq!(filter.len(), 2);

        let mut hook = make_hook();
        hook.types = vec!["python".to_string()];

        let first = filter.for_hook(&hook);
        let second = filter.for_hook(&hook);
        assert_eq!(first, second);
        assert_eq!(first, vec![Path::new("a.py")]);
    }
}
