//! Import directive scanning
//!
//! Recognizes `#import * from './other.graphql'` style lines and strips
//! comment lines before the text reaches the SDL parser.

use crate::model::{ImportReference, ImportedDocument, Requested};
use crate::parser::parse_sdl;
use crate::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

/// Default directive pattern. `symbols` is optional, `id` is required.
///
/// `open` and `close` capture the quotes around the id; a directive whose
/// quotes differ is not an import.
pub const DEFAULT_IMPORT_PATTERN: &str = r#"#\s?import\s+(?:(?P<symbols>\*|.+?)\s+from\s+)?(?P<open>['"])(?P<id>[^'"]+)(?P<close>['"]);?"#;

static DEFAULT_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_IMPORT_PATTERN).expect("default import pattern compiles"));

static COMMENT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#.*$").expect("comment pattern compiles"));

/// Source text split into its imports and the remaining SDL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedSource {
    pub imports: Vec<ImportReference>,
    pub body: String,
}

/// Extracts import directives from SDL text
#[derive(Debug, Clone)]
pub struct DirectiveScanner {
    directive: Regex,
}

impl DirectiveScanner {
    /// Scanner using [`DEFAULT_IMPORT_PATTERN`]
    pub fn new() -> Self {
        Self {
            directive: DEFAULT_DIRECTIVE.clone(),
        }
    }

    /// Scanner using a custom directive pattern.
    ///
    /// The pattern must have a named group `id`; a `symbols` group is used
    /// when present. When both `open` and `close` groups match they must
    /// capture the same text.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let directive = Regex::new(pattern).map_err(|e| Error::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        if !directive.capture_names().any(|name| name == Some("id")) {
            return Err(Error::Pattern {
                pattern: pattern.to_string(),
                message: "missing named group `id`".to_string(),
            });
        }

        Ok(Self { directive })
    }

    /// All import directives in `sdl`, in source order
    pub fn imports(&self, sdl: &str) -> Vec<ImportReference> {
        self.directive
            .captures_iter(sdl)
            .filter_map(|captures| {
                if let (Some(open), Some(close)) = (captures.name("open"), captures.name("close")) {
                    if open.as_str() != close.as_str() {
                        trace!("Ignoring directive with mismatched quotes: {}", &captures[0]);
                        return None;
                    }
                }
                let id = captures.name("id")?.as_str().trim();
                if id.is_empty() {
                    return None;
                }
                let symbols = captures.name("symbols").map(|m| m.as_str());
                Some(ImportReference::new(Requested::from_list(symbols), id))
            })
            .collect()
    }

    /// `sdl` with every comment line removed
    pub fn strip(&self, sdl: &str) -> String {
        COMMENT_LINE.replace_all(sdl, "").trim().to_string()
    }

    pub fn scan(&self, sdl: &str) -> ScannedSource {
        ScannedSource {
            imports: self.imports(sdl),
            body: self.strip(sdl),
        }
    }

    /// Scan and parse raw source text loaded for `id`
    pub fn parse(&self, id: &str, sdl: &str) -> Result<ImportedDocument> {
        let ScannedSource { imports, body } = self.scan(sdl);
        trace!("Scanned {} import(s) from {}", imports.len(), id);
        let document = parse_sdl(id, &body)?;
        Ok(ImportedDocument::new(imports, document))
    }
}

impl Default for DirectiveScanner {
    fn default() -> Self {
        Self::new()
    }
}
