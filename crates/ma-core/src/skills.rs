//! Skills: markdown prompt files loaded with `/skill <name>`.
//!
//! A skill named `review` lives at `<skills_dir>/review.md`.

use std::path::{Path, PathBuf};

const EXTENSION: &str = "md";
const PREVIEW_CHARS: usize = 200;

/// Skill names in `dir`, sorted. A missing directory has no skills.
pub fn list(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| !t.is_dir()).unwrap_or(false))
        .filter_map(|e| {
            let path = e.path();
            if path.extension()? != EXTENSION {
                return None;
            }
            Some(path.file_stem()?.to_string_lossy().to_string())
        })
        .collect();
    names.sort();
    names
}

/// Read the skill called `name`.
///
/// Returns `None` if it does not exist or `name` would leave `dir`.
pub fn load(dir: &Path, name: &str) -> Option<String> {
    std::fs::read_to_string(path_of(dir, name)?).ok()
}

fn path_of(dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return None;
    }
    Some(dir.join(format!("{name}.{EXTENSION}")))
}

/// First characters of a skill, for the confirmation shown after loading.
pub fn preview(content: &str) -> String {
    let trimmed = content.trim();
    match trimmed.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// The user message a loaded skill turns into.
pub fn compose(content: &str, extra: &str) -> String {
    let content = content.trim_end();
    let extra = extra.trim();
    if extra.is_empty() {
        content.to_string()
    } else {
        format!("{content}\n\n{extra}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_only_markdown_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("review.md"), "Review the diff.").unwrap();
        std::fs::write(dir.path().join("commit.md"), "Write a commit.").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a skill").unwrap();
        std::fs::create_dir(dir.path().join("nested.md")).unwrap();

        assert_eq!(list(dir.path()), vec!["commit", "review"]);
    }

    #[test]
    fn list_missing_dir_is_empty() {
        assert!(list(Path::new("/nonexistent/minagent/skills")).is_empty());
    }

    #[test]
    fn load_existing_skill() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("review.md"), "Review the diff.\n").unwrap();

        assert_eq!(load(dir.path(), "review").as_deref(), Some("Review the diff.\n"));
        assert!(load(dir.path(), "missing").is_none());
    }

    #[test]
    fn load_refuses_paths_outside_dir() {
        let dir = tempfile::tempdir().unwrap();
        let skills = dir.path().join("skills");
        std::fs::create_dir(&skills).unwrap();
        std::fs::write(dir.path().join("secret.md"), "outside").unwrap();

        assert!(load(&skills, "../secret").is_none());
        assert!(load(&skills, ".hidden").is_none());
        assert!(load(&skills, "").is_none());
    }

    #[test]
    fn preview_truncates_long_content() {
        let long = "é".repeat(250);
        let short = preview(&long);
        assert_eq!(short.chars().count(), PREVIEW_CHARS + 3);
        assert!(short.ends_with("..."));

        assert_eq!(preview("  brief\n"), "brief");
    }

    #[test]
    fn compose_appends_extra_input() {
        assert_eq!(compose("Review.\n", ""), "Review.");
        assert_eq!(compose("Review.", "  src/main.rs "), "Review.\n\nsrc/main.rs");
    }
}
