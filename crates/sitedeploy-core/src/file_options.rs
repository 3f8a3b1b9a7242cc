//! Per-path object attributes.
//!
//! A [`FileOptionRule`] is the typed form of one `FileOptions` entry on the
//! wire, e.g. `["--exclude", "*", "--include", "*.html", "--cache-control",
//! "max-age=0"]`. Filters follow `aws s3 cp` semantics: every path starts out
//! selected, and each filter that matches the path flips it to excluded or
//! included, with later filters winning. Rules are evaluated in declaration
//! order and the last selecting rule decides each attribute.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sitedeploy_store::ObjectAttributes;

use crate::error::{DeployError, Result};

pub const HTML_CACHE_CONTROL: &str = "max-age=0,no-cache,no-store,must-revalidate";
pub const IMMUTABLE_CACHE_CONTROL: &str = "max-age=31536000,public,immutable";

/// A compiled fnmatch-style pattern. `*` also matches `/`.
#[derive(Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&translate(pattern)).map_err(|e| DeployError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobPattern").field(&self.source).finish()
    }
}

impl PartialEq for GlobPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for GlobPattern {}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    let mut body: String = chars[i + 1..end].iter().collect();
                    out.push('[');
                    if let Some(rest) = body.strip_prefix('!') {
                        out.push('^');
                        body = rest.to_string();
                    }
                    out.push_str(&body.replace('\\', "\\\\").replace('[', "\\["));
                    out.push(']');
                    i = end;
                }
                None => out.push_str("\\["),
            },
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
        i += 1;
    }
    out.push('$');
    out
}

/// Index of the `]` closing the class opened at `start`, if any.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    // A leading `]` is a literal member.
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() {
        if chars[j] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Exclude(GlobPattern),
    Include(GlobPattern),
}

/// One ordered group of filters plus the attributes it assigns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FileOptionRule {
    pub filters: Vec<Filter>,
    pub cache_control: Option<String>,
    pub content_type: Option<String>,
}

impl FileOptionRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude(mut self, pattern: &str) -> Result<Self> {
        self.filters.push(Filter::Exclude(GlobPattern::new(pattern)?));
        Ok(self)
    }

    pub fn include(mut self, pattern: &str) -> Result<Self> {
        self.filters.push(Filter::Include(GlobPattern::new(pattern)?));
        Ok(self)
    }

    pub fn with_cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    pub fn with_content_type(mut self, value: impl Into<String>) -> Self {
        self.content_type = Some(value.into());
        self
    }

    /// Parse the flat `--flag value` wire form.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut rule = Self::new();
        let mut iter = args.iter().map(AsRef::as_ref);
        while let Some(flag) = iter.next() {
            let (flag, inline) = match flag.split_once('=') {
                Some((f, v)) if f.starts_with("--") => (f, Some(v)),
                _ => (flag, None),
            };
            let value = match inline {
                Some(v) => v,
                None => iter.next().ok_or_else(|| {
                    DeployError::InvalidFileOption(format!("{flag} is missing a value"))
                })?,
            };
            rule = match flag {
                "--exclude" => rule.exclude(value)?,
                "--include" => rule.include(value)?,
                "--cache-control" => rule.with_cache_control(value),
                "--content-type" => rule.with_content_type(value),
                other => {
                    return Err(DeployError::InvalidFileOption(format!(
                        "unsupported flag '{other}'"
                    )))
                }
            };
        }
        Ok(rule)
    }

    /// The wire form accepted by [`FileOptionRule::parse`].
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for filter in &self.filters {
            let (flag, pattern) = match filter {
                Filter::Exclude(p) => ("--exclude", p),
                Filter::Include(p) => ("--include", p),
            };
            args.push(flag.to_string());
            args.push(pattern.as_str().to_string());
        }
        if let Some(cc) = &self.cache_control {
            args.push("--cache-control".to_string());
            args.push(cc.clone());
        }
        if let Some(ct) = &self.content_type {
            args.push("--content-type".to_string());
            args.push(ct.clone());
        }
        args
    }

    /// Whether the filters leave `path` selected.
    pub fn selects(&self, path: &str) -> bool {
        self.filters.iter().fold(true, |selected, filter| match filter {
            Filter::Exclude(p) if p.matches(path) => false,
            Filter::Include(p) if p.matches(path) => true,
            _ => selected,
        })
    }
}

impl TryFrom<Vec<String>> for FileOptionRule {
    type Error = DeployError;

    fn try_from(args: Vec<String>) -> Result<Self> {
        Self::parse(&args)
    }
}

impl From<FileOptionRule> for Vec<String> {
    fn from(rule: FileOptionRule) -> Self {
        rule.to_args()
    }
}

/// HTML is never cached; scripts and stylesheets are treated as immutable.
pub fn default_rules() -> Result<Vec<FileOptionRule>> {
    Ok(vec![
        FileOptionRule::new()
            .exclude("*")?
            .include("*.html")?
            .with_cache_control(HTML_CACHE_CONTROL),
        FileOptionRule::new()
            .exclude("*")?
            .include("*.js")?
            .include("*.css")?
            .with_cache_control(IMMUTABLE_CACHE_CONTROL),
    ])
}

/// Attributes for `path`: the last selecting rule wins per attribute and the
/// content type falls back to a guess from the extension.
pub fn attributes_for(rules: &[FileOptionRule], path: &str) -> ObjectAttributes {
    let mut attrs = ObjectAttributes::default();
    for rule in rules.iter().filter(|r| r.selects(path)) {
        if let Some(cc) = &rule.cache_control {
            attrs.cache_control = Some(cc.clone());
        }
        if let Some(ct) = &rule.content_type {
            attrs.content_type = Some(ct.clone());
        }
    }
    if attrs.content_type.is_none() {
        attrs.content_type = mime_guess::from_path(path).first_raw().map(str::to_string);
    }
    attrs
}
