//! Maps file paths to type tags used by hook file filters.
//!
//! A file is tagged based on its lowercased extension, its basename, and a
//! few path-based rules. Tag names are stable strings; `all_tags` lists every
//! tag this registry can produce so configurations can be validated up front.

use std::path::Path;

use phf::phf_map;

/// Tags derived from a lowercased file extension.
static EXTENSIONS: phf::Map<&'static str, &'static [&'static str]> = phf_map! {
    // Programming languages
    "py" => &["python"],
    "pyi" => &["python"],
    "pyx" => &["python"],
    "js" => &["javascript"],
    "mjs" => &["javascript"],
    "jsx" => &["javascript", "react"],
    "ts" => &["typescript"],
    "tsx" => &["typescript", "react"],
    "go" => &["go"],
    "java" => &["java"],
    "c" => &["c"],
    "h" => &["c"],
    "cpp" => &["cpp"],
    "cc" => &["cpp"],
    "cxx" => &["cpp"],
    "hpp" => &["cpp"],
    "rs" => &["rust"],
    "rb" => &["ruby"],
    "php" => &["php"],
    "swift" => &["swift"],
    "kt" => &["kotlin"],
    "kts" => &["kotlin"],
    "scala" => &["scala"],
    "cs" => &["csharp"],
    "pl" => &["perl"],
    "pm" => &["perl"],
    "lua" => &["lua"],
    "r" => &["r"],
    "hs" => &["haskell"],
    "clj" => &["clojure"],
    "cljs" => &["clojure"],
    "cljc" => &["clojure"],
    "erl" => &["erlang"],
    "hrl" => &["erlang"],
    "ex" => &["elixir"],
    "exs" => &["elixir"],
    "dart" => &["dart"],
    "jl" => &["julia"],
    // Markup and data
    "html" => &["html"],
    "htm" => &["html"],
    "css" => &["css"],
    "xml" => &["xml"],
    "yaml" => &["yaml"],
    "yml" => &["yaml"],
    "json" => &["json"],
    "md" => &["markdown"],
    "markdown" => &["markdown"],
    "sql" => &["sql"],
    // Shell
    "sh" => &["shell"],
    "bash" => &["shell"],
    "zsh" => &["shell"],
    "ksh" => &["shell"],
    "ps1" => &["powershell"],
    "psm1" => &["powershell"],
    // Frameworks
    "vue" => &["vue"],
    "svelte" => &["svelte"],
};

/// Tags derived from an exact basename.
static BASENAMES: phf::Map<&'static str, &'static [&'static str]> = phf_map! {
    "Dockerfile" => &["dockerfile"],
    "dockerfile" => &["dockerfile"],
    "Makefile" => &["makefile"],
    "makefile" => &["makefile"],
    "GNUmakefile" => &["makefile"],
};

/// Tags that identify source code of a programming language; any file
/// carrying one of these is also `text`.
const PROGRAMMING_LANGUAGES: &[&str] = &[
    "c", "clojure", "cpp", "csharp", "dart", "elixir", "erlang", "go", "haskell", "java",
    "javascript", "julia", "kotlin", "lua", "perl", "php", "python", "r", "ruby", "rust", "scala",
    "swift", "typescript",
];

/// Extensions that are `text` without being a programming language.
const TEXT_EXTENSIONS: &[&str] = &[
    "cfg", "conf", "ini", "log", "md", "properties", "rst", "txt",
];

/// Every tag this registry can produce, sorted for binary search.
const ALL_TAGS: &[&str] = &[
    "angular",
    "c",
    "clojure",
    "cpp",
    "csharp",
    "css",
    "dart",
    "dockerfile",
    "elixir",
    "erlang",
    "go",
    "haskell",
    "html",
    "java",
    "javascript",
    "json",
    "julia",
    "kotlin",
    "lua",
    "makefile",
    "markdown",
    "perl",
    "php",
    "powershell",
    "python",
    "r",
    "react",
    "ruby",
    "rust",
    "scala",
    "shell",
    "sql",
    "svelte",
    "swift",
    "text",
    "typescript",
    "vue",
    "xml",
    "yaml",
];

/// The set of tags attached to a single file.
///
/// Files carry at most a handful of tags, so a small sorted vector beats a
/// hash set here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(Vec<&'static str>);

impl TagSet {
    fn insert(&mut self, tag: &'static str) {
        if let Err(idx) = self.0.binary_search(&tag) {
            self.0.insert(idx, tag);
        }
    }

    fn extend(&mut self, tags: &[&'static str]) {
        for tag in tags {
            self.insert(tag);
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.binary_search(&tag).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Returns every tag the registry knows about.
pub fn all_tags() -> &'static [&'static str] {
    ALL_TAGS
}

/// Returns true if `tag` is a tag this registry can produce.
pub fn is_known_tag(tag: &str) -> bool {
    ALL_TAGS.binary_search(&tag).is_ok()
}

/// Compute the tags for a path.
///
/// The path does not need to exist; tagging is purely name-based.
pub fn tags_from_path(path: &Path) -> TagSet {
    let mut tags = TagSet::default();

    let basename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    if let Some(by_name) = BASENAMES.get(basename) {
        tags.extend(by_name);
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    if let Some(by_ext) = extension.as_deref().and_then(|ext| EXTENSIONS.get(ext)) {
        tags.extend(by_ext);
    }

    let path_str = path.to_str().unwrap_or_default();

    // Framework tags that depend on the whole path, not just the extension.
    if path_str.contains("react") {
        tags.insert("react");
    }
    if extension.as_deref() == Some("ts")
        && (path_str.contains(".component.")
            || path_str.contains(".service.")
            || path_str.contains(".module."))
    {
        tags.insert("angular");
    }

    let is_text = tags.iter().any(|tag| PROGRAMMING_LANGUAGES.contains(&tag))
        || extension
            .as_deref()
            .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext));
    if is_text {
        tags.insert("text");
    }

    tags
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::{all_tags, is_known_tag, tags_from_path};

    fn tags(path: &str) -> Vec<&'static str> {
        tags_from_path(Path::new(path)).iter().collect()
    }

    #[test]
    fn tags_by_extension() {
        assert_eq!(tags("src/main.py"), vec!["python", "text"]);
        assert_eq!(tags("lib.RS"), vec!["rust", "text"]);
        assert_eq!(tags("config.yaml"), vec!["yaml"]);
        assert_eq!(tags("notes.txt"), vec!["text"]);
        assert_eq!(tags("unknown.zzz"), Vec::<&str>::new());
    }

    #[test]
    fn tags_by_basename() {
        assert_eq!(tags("Dockerfile"), vec!["dockerfile"]);
        assert_eq!(tags("sub/dir/GNUmakefile"), vec!["makefile"]);
        // Extension rules still apply alongside basename rules.
        assert_eq!(tags("Makefile.am"), Vec::<&str>::new());
    }

    #[test]
    fn react_from_extension_or_path() {
        assert_eq!(tags("app/view.jsx"), vec!["javascript", "react", "text"]);
        assert_eq!(tags("app/view.tsx"), vec!["react", "text", "typescript"]);
        assert_eq!(
            tags("src/react/button.js"),
            vec!["javascript", "react", "text"]
        );
    }

    #[test]
    fn angular_requires_ts_and_path_marker() {
        assert_eq!(
            tags("src/user.component.ts"),
            vec!["angular", "text", "typescript"]
        );
        assert_eq!(tags("src/user.component.js"), vec!["javascript", "text"]);
        assert_eq!(tags("src/user.ts"), vec!["text", "typescript"]);
    }

    #[test]
    fn all_tags_is_sorted_and_closed() {
        let mut sorted = all_tags().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, all_tags());

        for path in ["a.py", "b.tsx", "Dockerfile", "x.component.ts", "y.sql"] {
            for tag in tags_from_path(Path::new(path)).iter() {
                assert!(is_known_tag(tag), "tag `{tag}` missing from ALL_TAGS");
            }
        }
        assert!(!is_known_tag("no-such-tag"));
    }
}
