//! Deploy-time substitution of placeholder values inside built assets.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::file_options::GlobPattern;

/// Replace every `search` with `replace` in files matching `files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceValue {
    pub files: String,
    pub search: String,
    pub replace: String,
}

/// A [`ReplaceValue`] with its glob compiled.
#[derive(Debug, Clone)]
pub struct CompiledReplace {
    files: GlobPattern,
    search: String,
    replace: String,
}

pub fn compile(values: &[ReplaceValue]) -> Result<Vec<CompiledReplace>> {
    values
        .iter()
        .map(|v| {
            Ok(CompiledReplace {
                files: GlobPattern::new(&v.files)?,
                search: v.search.clone(),
                replace: v.replace.clone(),
            })
        })
        .collect()
}

/// Apply matching substitutions to `data`.
///
/// Non UTF-8 content and empty search strings are left untouched.
pub fn apply(replacements: &[CompiledReplace], path: &str, data: Vec<u8>) -> Vec<u8> {
    let applicable: Vec<_> = replacements
        .iter()
        .filter(|r| !r.search.is_empty() && r.files.matches(path))
        .collect();
    if applicable.is_empty() {
        return data;
    }
    match String::from_utf8(data) {
        Ok(mut text) => {
            for r in applicable {
                if text.contains(&r.search) {
                    text = text.replace(&r.search, &r.replace);
                }
            }
            text.into_bytes()
        }
        Err(e) => e.into_bytes(),
    }
}
