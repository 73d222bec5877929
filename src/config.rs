use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

/// Vault configuration loaded from `<vault>/mdhop.yaml`. Every key is
/// optional; a missing file means defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub build: BuildConfig,
    pub exclude: ExcludeConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Glob patterns matched against vault-relative paths; matching files
    /// are invisible to `build`.
    pub exclude_paths: Vec<String>,
}

/// Query-time filters. The core only validates them; read-only projections
/// consume them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExcludeConfig {
    pub paths: Vec<String>,
    pub tags: Vec<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: Self = serde_yaml::from_str(&text)?;
        // Reject bad globs at load time rather than mid-mutation.
        for pattern in &config.build.exclude_paths {
            Glob::compile(pattern)?;
        }
        Ok(config)
    }

    pub fn build_exclude_globs(&self) -> Vec<Glob> {
        self.build
            .exclude_paths
            .iter()
            .filter_map(|p| Glob::compile(p).ok())
            .collect()
    }
}

/// Minimal glob: `*` matches any run of characters (including `/`), `?`
/// matches exactly one character, everything else is literal. Character
/// classes are rejected, not treated as literals.
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: Vec<char>,
}

impl Glob {
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.contains('[') || pattern.contains(']') {
            return Err(Error::InvalidGlob(pattern.to_string()));
        }
        Ok(Self {
            pattern: pattern.chars().collect(),
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        let text: Vec<char> = path.chars().collect();
        let (mut p, mut t) = (0usize, 0usize);
        let mut star: Option<(usize, usize)> = None;

        while t < text.len() {
            if p < self.pattern.len()
                && (self.pattern[p] == '?' || self.pattern[p] == text[t])
            {
                p += 1;
                t += 1;
            } else if p < self.pattern.len() && self.pattern[p] == '*' {
                star = Some((p, t));
                p += 1;
            } else if let Some((sp, st)) = star {
                // Retry the last `*` against one more character.
                p = sp + 1;
                t = st + 1;
                star = Some((sp, st + 1));
            } else {
                return false;
            }
        }
        while p < self.pattern.len() && self.pattern[p] == '*' {
            p += 1;
        }
        p == self.pattern.len()
    }
}

pub fn any_glob_matches(globs: &[Glob], path: &str) -> bool {
    globs.iter().any(|g| g.matches(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_crosses_directory_separators() {
        let g = Glob::compile("drafts/*").unwrap();
        assert!(g.matches("drafts/a.md"));
        assert!(g.matches("drafts/deep/nested.md"));
        assert!(!g.matches("notes/a.md"));
    }

    #[test]
    fn question_mark_matches_single_character() {
        let g = Glob::compile("a?.md").unwrap();
        assert!(g.matches("ab.md"));
        assert!(!g.matches("a.md"));
        assert!(!g.matches("abc.md"));
    }

    #[test]
    fn literal_and_suffix_patterns() {
        assert!(Glob::compile("*.png").unwrap().matches("img/photo.png"));
        assert!(Glob::compile("exact.md").unwrap().matches("exact.md"));
        assert!(!Glob::compile("exact.md").unwrap().matches("sub/exact.md"));
    }

    #[test]
    fn character_classes_are_rejected() {
        assert!(matches!(
            Glob::compile("a[bc].md"),
            Err(Error::InvalidGlob(_))
        ));
    }

    #[test]
    fn config_defaults_when_missing() {
        let config = Config::load(Path::new("/nonexistent/mdhop.yaml")).unwrap();
        assert!(config.build.exclude_paths.is_empty());
        assert!(config.exclude.tags.is_empty());
    }
}
