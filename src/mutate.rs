use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

pub const MIN_EDITABLE_LINES: usize = 5;

const FALLBACK_MAX_LINE: usize = 20;

#[derive(Debug, Error)]
pub enum MutateError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no known comment syntax for {0}")]
    Unsupported(PathBuf),
    #[error("file has only {lines} lines")]
    TooShort { lines: usize },
    #[error("no edit left to make")]
    NothingToDo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Comment insertion only
    #[default]
    Simple,
    /// Comments, stub docstrings and return annotations in random order
    Rich,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    AfterImports,
    InFunction,
    AtClass,
    BeforeFunction,
    Docstring,
    TypeHint,
    Fallback,
}

impl Strategy {
    const SIMPLE: [Strategy; 4] = [
        Strategy::AfterImports,
        Strategy::InFunction,
        Strategy::AtClass,
        Strategy::BeforeFunction,
    ];

    const RICH: [Strategy; 6] = [
        Strategy::AfterImports,
        Strategy::InFunction,
        Strategy::AtClass,
        Strategy::BeforeFunction,
        Strategy::Docstring,
        Strategy::TypeHint,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::AfterImports => "comment after imports",
            Strategy::InFunction => "comment in function",
            Strategy::AtClass => "comment at class",
            Strategy::BeforeFunction => "comment before function",
            Strategy::Docstring => "stub docstring",
            Strategy::TypeHint => "return annotation",
            Strategy::Fallback => "fallback comment",
        }
    }

    fn plan(self, lines: &[String], lang: Language, comment: Option<&str>) -> Option<Change> {
        let syntax = lang.syntax();
        let len = lines.len();
        match self {
            Strategy::AfterImports => {
                let comment = comment?;
                let mut import_end = 0;
                for (i, line) in lines.iter().enumerate() {
                    let trimmed = line.trim();
                    if syntax.import.is_match(line) {
                        import_end = i + 1;
                    } else if import_end > 0
                        && !trimmed.is_empty()
                        && !trimmed.starts_with(lang.comment_token())
                    {
                        break;
                    }
                }
                (import_end > 0 && import_end < len).then(|| Change::insert(lines, import_end, comment))
            }
            Strategy::InFunction => {
                let comment = comment?;
                let i = lines
                    .iter()
                    .position(|l| syntax.function.is_match(l))
                    .filter(|&i| i + 3 < len)?;
                Some(Change::insert(lines, i + 2, comment))
            }
            Strategy::AtClass => {
                let comment = comment?;
                let class = syntax.class.as_ref()?;
                let i = lines
                    .iter()
                    .position(|l| class.is_match(l))
                    .filter(|&i| i + 2 < len)?;
                Some(Change::insert(lines, i + 2, comment))
            }
            Strategy::BeforeFunction => {
                let comment = comment?;
                let i = lines.iter().enumerate().skip(1).find_map(|(i, l)| {
                    (syntax.function.is_match(l) && !is_comment(&lines[i - 1], lang)).then_some(i)
                })?;
                Some(Change::insert(lines, i, comment))
            }
            Strategy::Docstring => plan_docstring(lines, lang),
            Strategy::TypeHint => {
                if lang != Language::Python {
                    return None;
                }
                lines.iter().enumerate().find_map(|(i, line)| {
                    if line.contains("->") {
                        return None;
                    }
                    let caps = PY_INIT.captures(line)?;
                    Some(Change::Replace {
                        at: i,
                        text: format!("{} -> None:{}", &caps["head"], &caps["tail"]),
                    })
                })
            }
            Strategy::Fallback => {
                let at = FALLBACK_MAX_LINE.min(len / 3);
                Some(Change::insert(lines, at, comment?))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    Shell,
    Ruby,
    Rust,
    JavaScript,
    Go,
    Java,
    C,
}

impl Language {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let lang = match ext.as_str() {
            "py" | "pyi" => Language::Python,
            "sh" | "bash" | "zsh" => Language::Shell,
            "rb" => Language::Ruby,
            "rs" => Language::Rust,
            "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" => Language::JavaScript,
            "go" => Language::Go,
            "java" | "kt" | "scala" => Language::Java,
            "c" | "h" | "cc" | "cpp" | "cxx" | "hpp" => Language::C,
            _ => return None,
        };
        Some(lang)
    }

    pub fn comment_token(self) -> &'static str {
        match self {
            Language::Python | Language::Shell | Language::Ruby => "#",
            _ => "//",
        }
    }

    fn doc_token(self) -> &'static str {
        match self {
            Language::Rust => "///",
            other => other.comment_token(),
        }
    }

    fn syntax(self) -> &'static Syntax {
        match self {
            Language::Python => &*PYTHON,
            Language::Shell => &*SHELL,
            Language::Ruby => &*RUBY,
            Language::Rust => &*RUST,
            Language::JavaScript => &*JAVASCRIPT,
            Language::Go => &*GO,
            Language::Java => &*JAVA,
            Language::C => &*C,
        }
    }
}

/// Line patterns for one language. `function` must capture `name`.
struct Syntax {
    import: Regex,
    function: Regex,
    class: Option<Regex>,
}

impl Syntax {
    fn new(import: &str, function: &str, class: Option<&str>) -> Self {
        Self {
            import: Regex::new(import).expect("import pattern"),
            function: Regex::new(function).expect("function pattern"),
            class: class.map(|c| Regex::new(c).expect("class pattern")),
        }
    }
}

static PYTHON: LazyLock<Syntax> = LazyLock::new(|| {
    Syntax::new(
        r"^\s*(import|from)\s",
        r"^\s*(async\s+)?def\s+(?P<name>\w+)",
        Some(r"^\s*class\s+\w+"),
    )
});

static SHELL: LazyLock<Syntax> = LazyLock::new(|| {
    Syntax::new(
        r"^\s*(source|\.)\s",
        r"^\s*(function\s+)?(?P<name>[A-Za-z_][\w-]*)\s*\(\)",
        None,
    )
});

static RUBY: LazyLock<Syntax> = LazyLock::new(|| {
    Syntax::new(
        r"^\s*require(_relative)?\s",
        r"^\s*def\s+(self\.)?(?P<name>\w+[?!]?)",
        Some(r"^\s*(class|module)\s+\w+"),
    )
});

static RUST: LazyLock<Syntax> = LazyLock::new(|| {
    Syntax::new(
        r"^\s*(pub(\([^)]*\))?\s+)?use\s",
        r"^\s*(pub(\([^)]*\))?\s+)?(const\s+)?(async\s+)?(unsafe\s+)?fn\s+(?P<name>\w+)",
        Some(r"^\s*(pub(\([^)]*\))?\s+)?(struct|enum|trait|impl)\b"),
    )
});

static JAVASCRIPT: LazyLock<Syntax> = LazyLock::new(|| {
    Syntax::new(
        r"^\s*(import\s|(const|let|var)\s+\w+\s*=\s*require\()",
        r"^\s*(export\s+)?(default\s+)?(async\s+)?function\*?\s+(?P<name>\w+)",
        Some(r"^\s*(export\s+)?(default\s+)?(abstract\s+)?class\s+\w+"),
    )
});

static GO: LazyLock<Syntax> = LazyLock::new(|| {
    Syntax::new(
        r"^\s*import\b",
        r"^func\s+(\([^)]*\)\s*)?(?P<name>\w+)",
        Some(r"^type\s+\w+\s+(struct|interface)\b"),
    )
});

static JAVA: LazyLock<Syntax> = LazyLock::new(|| {
    Syntax::new(
        r"^\s*(import|package)\s",
        r"^\s*(public|private|protected)\s[^=;(]*\s(?P<name>\w+)\s*\([^;]*$",
        Some(r"^\s*((public|private|protected|final|abstract|static)\s+)*(class|interface|enum|record)\s+\w+"),
    )
});

static C: LazyLock<Syntax> = LazyLock::new(|| {
    Syntax::new(
        r"^\s*#\s*include\b",
        r"^[A-Za-z_][\w\s\*&:<>,]*[\s\*&](\w+::)*(?P<name>\w+)\s*\([^;]*$",
        Some(r"^\s*(class|struct)\s+\w+[^;]*$"),
    )
});

static PY_DEF_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(async\s+)?def\s+(?P<name>\w+)\s*\(.*\).*:\s*(#.*)?$").expect("def pattern")
});

static PY_INIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<head>\s*def\s+__init__\s*\(.*\))\s*:(?P<tail>.*)$").expect("init pattern")
});

enum Change {
    Insert { at: usize, text: String },
    Replace { at: usize, text: String },
}

impl Change {
    fn insert(lines: &[String], at: usize, text: &str) -> Self {
        let indent = lines[at..]
            .iter()
            .find(|l| !l.trim().is_empty())
            .map(|l| indent_of(l))
            .unwrap_or("");
        Change::Insert {
            at,
            text: format!("{indent}{text}"),
        }
    }

    fn line(&self) -> usize {
        match self {
            Change::Insert { at, .. } | Change::Replace { at, .. } => *at,
        }
    }

    fn apply(self, lines: &mut Vec<String>, crlf: bool) {
        let eol = if crlf { "\r" } else { "" };
        match self {
            Change::Insert { at, text } => lines.insert(at, format!("{text}{eol}")),
            Change::Replace { at, text } => lines[at] = format!("{text}{eol}"),
        }
    }
}

fn plan_docstring(lines: &[String], lang: Language) -> Option<Change> {
    if lang == Language::Python {
        return lines.iter().enumerate().find_map(|(i, line)| {
            let caps = PY_DEF_HEADER.captures(line)?;
            let body = lines[i + 1..].iter().find(|l| !l.trim().is_empty())?;
            let body_indent = indent_of(body);
            if body_indent.len() <= indent_of(line).len() || starts_with_string(body.trim_start()) {
                return None;
            }
            Some(Change::Insert {
                at: i + 1,
                text: format!("{body_indent}\"\"\"{}.\"\"\"", humanize(&caps["name"])),
            })
        });
    }

    let syntax = lang.syntax();
    lines.iter().enumerate().find_map(|(i, line)| {
        let caps = syntax.function.captures(line)?;
        if i > 0 {
            let prev = lines[i - 1].trim_start();
            if is_comment(prev, lang) || prev.starts_with("#[") || prev.starts_with('@') {
                return None;
            }
        }
        Some(Change::Insert {
            at: i,
            text: format!(
                "{}{} {}.",
                indent_of(line),
                lang.doc_token(),
                humanize(&caps["name"])
            ),
        })
    })
}

fn starts_with_string(s: &str) -> bool {
    let s = s.trim_start_matches(['r', 'R', 'u', 'U', 'b', 'B', 'f', 'F']);
    s.starts_with('"') || s.starts_with('\'')
}

fn is_comment(line: &str, lang: Language) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with(lang.comment_token()) || trimmed.starts_with("/*") || trimmed.starts_with('*')
}

fn indent_of(line: &str) -> &str {
    let end = line.len() - line.trim_start().len();
    &line[..end]
}

/// `load_user_config` / `loadUserConfig` -> `Load user config`. Acronym runs
/// stay one word: `parseHTTPHeader` -> `Parse http header`.
fn humanize(name: &str) -> String {
    let chars: Vec<char> = name.trim_matches('_').chars().collect();
    let mut words = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' {
            if !words.ends_with(' ') {
                words.push(' ');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 && !words.ends_with(' ') {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                words.push(' ');
            }
        }
        words.extend(c.to_lowercase());
    }
    let mut chars = words.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Helper".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub strategy: Strategy,
    /// 1-based line of the edit in the new file.
    pub line: usize,
}

/// Applies one edit to `text`. `comments` are bare comment bodies; the
/// language's comment token is prepended.
pub fn mutate_text<R: Rng + ?Sized>(
    text: &str,
    lang: Language,
    mode: Mode,
    comments: &[String],
    rng: &mut R,
) -> Result<(String, Edit), MutateError> {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    if lines.len() < MIN_EDITABLE_LINES {
        return Err(MutateError::TooShort { lines: lines.len() });
    }
    let crlf = text.contains("\r\n");

    let rendered: Vec<String> = comments
        .iter()
        .map(|c| format!("{} {}", lang.comment_token(), c.trim()))
        .collect();
    let unused: Vec<&String> = rendered.iter().filter(|c| !text.contains(c.as_str())).collect();
    let comment = unused
        .choose(rng)
        .copied()
        .or_else(|| rendered.choose(rng))
        .map(String::as_str);

    let order: Vec<Strategy> = match mode {
        Mode::Simple => Strategy::SIMPLE.to_vec(),
        Mode::Rich => {
            let mut order = Strategy::RICH.to_vec();
            order.shuffle(rng);
            order
        }
    };

    let trimmed: Vec<String> = lines.iter().map(|l| l.trim_end_matches('\r').to_string()).collect();
    let planned = order
        .into_iter()
        .find_map(|s| s.plan(&trimmed, lang, comment).map(|c| (s, c)))
        .or_else(|| {
            let fresh = unused.choose(rng).map(|c| c.as_str());
            Strategy::Fallback
                .plan(&trimmed, lang, fresh)
                .map(|c| (Strategy::Fallback, c))
        });

    let (strategy, change) = planned.ok_or(MutateError::NothingToDo)?;
    let line = change.line() + 1;
    change.apply(&mut lines, crlf);
    Ok((lines.join("\n"), Edit { strategy, line }))
}

pub fn mutate_file<R: Rng + ?Sized>(
    path: &Path,
    mode: Mode,
    comments: &[String],
    rng: &mut R,
) -> Result<Edit, MutateError> {
    let lang = Language::from_path(path).ok_or_else(|| MutateError::Unsupported(path.to_path_buf()))?;
    let io_err = |source| MutateError::Io {
        path: path.to_path_buf(),
        source,
    };

    let bytes = fs::read(path).map_err(io_err)?;
    let text = String::from_utf8_lossy(&bytes);
    let (edited, edit) = mutate_text(&text, lang, mode, comments, rng)?;
    fs::write(path, edited).map_err(io_err)?;

    tracing::debug!(path = %path.display(), strategy = edit.strategy.name(), line = edit.line, "edited file");
    Ok(edit)
}
