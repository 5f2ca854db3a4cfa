use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A commit message, optionally tied to files whose path contains one of `paths`.
///
/// `text` may reference the edited file through `{file}`, `{stem}`, `{dir}`
/// and `{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
}

impl MessageTemplate {
    pub fn general(text: &str) -> Self {
        Self {
            text: text.to_string(),
            paths: Vec::new(),
        }
    }

    pub fn for_paths(text: &str, paths: &[&str]) -> Self {
        Self {
            text: text.to_string(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn matches(&self, rel_path: &str) -> bool {
        self.paths.iter().any(|p| !p.is_empty() && rel_path.contains(p.as_str()))
    }

    pub fn render(&self, path: &Path) -> String {
        let rel = slash_path(path);
        let file = path.file_name().and_then(|n| n.to_str()).unwrap_or(&rel);
        let stem = path.file_stem().and_then(|n| n.to_str()).unwrap_or(file);
        let dir = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or(".");

        self.text
            .replace("{file}", file)
            .replace("{stem}", stem)
            .replace("{dir}", dir)
            .replace("{path}", &rel)
    }
}

fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Messages tied to the edited file are preferred while unused.
#[derive(Debug)]
pub struct MessagePool {
    templates: Vec<MessageTemplate>,
    deck: Vec<usize>,
    cursor: usize,
    used: HashSet<usize>,
}

impl MessagePool {
    pub fn new<R: Rng + ?Sized>(templates: Vec<MessageTemplate>, rng: &mut R) -> Self {
        let templates = if templates.is_empty() {
            default_messages()
        } else {
            templates
        };
        let mut deck: Vec<usize> = (0..templates.len()).collect();
        deck.shuffle(rng);
        Self {
            templates,
            deck,
            cursor: 0,
            used: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn next_for<R: Rng + ?Sized>(&mut self, path: &Path, rng: &mut R) -> String {
        let rel = slash_path(path);
        let targeted = self
            .deck
            .iter()
            .copied()
            .find(|&i| !self.used.contains(&i) && self.templates[i].matches(&rel));

        let index = match targeted {
            Some(i) => i,
            None => self.deal(rng),
        };
        self.used.insert(index);
        if self.used.len() == self.templates.len() {
            self.used.clear();
        }
        self.templates[index].render(path)
    }

    fn deal<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        loop {
            if self.cursor >= self.deck.len() {
                self.deck.shuffle(rng);
                self.cursor = 0;
            }
            let index = self.deck[self.cursor];
            self.cursor += 1;
            if !self.used.contains(&index) {
                return index;
            }
        }
    }
}

pub fn default_messages() -> Vec<MessageTemplate> {
    let general = [
        // core
        "Improve error handling around edge cases",
        "Refactor internal helpers for readability",
        "Simplify control flow in request handling",
        "Handle empty input gracefully",
        "Tighten input validation",
        "Clean up leftover debug output",
        "Rename variables for clarity",
        "Extract shared logic into helper functions",
        "Remove redundant checks",
        "Make default settings more explicit",
        // performance
        "Reduce allocations in hot paths",
        "Cache repeated lookups",
        "Avoid recomputing intermediate results",
        "Speed up startup by deferring initialization",
        // docs
        "Document public functions",
        "Clarify comments on tricky sections",
        "Expand inline documentation",
        "Fix typos in comments",
        // tooling
        "Tidy imports",
        "Apply formatter suggestions",
        "Address linter warnings",
        "Improve log messages",
    ];
    let targeted = [
        ("Add tests for {stem}", &["test"][..]),
        ("Extend test coverage in {file}", &["test"][..]),
        ("Clean up fixtures in {file}", &["test", "fixture", "conftest"][..]),
        ("Improve configuration loading in {file}", &["config", "settings"][..]),
        ("Validate configuration values in {stem}", &["config", "settings"][..]),
        ("Harden CLI argument parsing", &["cli", "main", "__main__"][..]),
        ("Improve help output of the command line", &["cli", "main"][..]),
        ("Make {stem} utilities more reusable", &["util", "helper", "common"][..]),
        ("Improve model definitions in {file}", &["model", "schema", "types"][..]),
        ("Streamline API handlers in {dir}", &["api", "handler", "route", "view"][..]),
    ];

    general
        .iter()
        .map(|t| MessageTemplate::general(t))
        .chain(
            targeted
                .iter()
                .map(|(t, paths)| MessageTemplate::for_paths(t, paths)),
        )
        .chain([
            MessageTemplate::general("Polish {file}"),
            MessageTemplate::general("Minor cleanups in {dir}"),
            MessageTemplate::general("Small readability tweaks to {stem}"),
        ])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::path::PathBuf;

    #[test]
    fn render_fills_file_placeholders() {
        let t = MessageTemplate::general("{file}|{stem}|{dir}|{path}");
        assert_eq!(
            t.render(Path::new("pkg/core/loader.py")),
            "loader.py|loader|core|pkg/core/loader.py"
        );
        assert_eq!(t.render(Path::new("main.py")), "main.py|main|.|main.py");
    }

    #[test]
    fn targeted_messages_win_until_used() {
        let templates = vec![
            MessageTemplate::general("general one"),
            MessageTemplate::general("general two"),
            MessageTemplate::for_paths("tests for {stem}", &["tests/"]),
        ];
        let mut rng = StdRng::seed_from_u64(2);
        let mut pool = MessagePool::new(templates, &mut rng);
        let path = PathBuf::from("tests/test_io.py");

        assert_eq!(pool.next_for(&path, &mut rng), "tests for test_io");
        let second = pool.next_for(&path, &mut rng);
        assert!(second.starts_with("general"));
    }

    #[test]
    fn deck_cycles_through_every_message() {
        let templates: Vec<MessageTemplate> = (0..5)
            .map(|i| MessageTemplate::general(&format!("m{i}")))
            .collect();
        let mut rng = StdRng::seed_from_u64(8);
        let mut pool = MessagePool::new(templates, &mut rng);
        let path = Path::new("a.py");

        let first_round: HashSet<String> = (0..5).map(|_| pool.next_for(path, &mut rng)).collect();
        assert_eq!(first_round.len(), 5);
        let second_round: HashSet<String> = (0..5).map(|_| pool.next_for(path, &mut rng)).collect();
        assert_eq!(second_round.len(), 5);
    }

    #[test]
    fn empty_config_falls_back_to_builtin_pool() {
        let pool = MessagePool::new(Vec::new(), &mut StdRng::seed_from_u64(0));
        assert_eq!(pool.len(), default_messages().len());
        assert!(!pool.is_empty());
    }
}
