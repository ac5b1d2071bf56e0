//! Position tracking
//!
//!     When a session tracks positions, every content line carries its provenance: where in
//!     which original source it came from. A unit without an upstream map maps each physical
//!     line onto itself. A unit that ends with a map reference comment
//!     (`//# sourceMappingURL=...` or `/*# sourceMappingURL=... */`) has that comment removed
//!     and its lines mapped through the referenced map instead, which lets already generated
//!     files be preprocessed without losing the way back to their own sources.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::sieve::error::ErrorKind;
use crate::sieve::loader::{normalize_path, path_identity};
use crate::sieve::sourcemap::SourceMap;
use crate::sieve::tree::{Provenance, SourceFile};

static MAP_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?://[#@]\s*sourceMappingURL=(?P<line>\S+)\s*|/\*[#@]\s*sourceMappingURL=(?P<block>\S+?)\s*\*/\s*)$",
    )
    .expect("map reference pattern is valid")
});

/// Where a unit's upstream map lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapReference {
    /// A `data:` URL carrying the map itself
    Inline(String),
    /// A URL relative to the unit
    External(String),
}

impl MapReference {
    fn parse(url: &str) -> Self {
        if url.starts_with("data:") {
            MapReference::Inline(url.to_string())
        } else {
            MapReference::External(url.to_string())
        }
    }
}

/// Split a trailing map reference off `text`
///
/// Only the last non-blank line is considered. The returned text ends where that line
/// started, so everything before it keeps its line numbers.
pub fn strip_map_reference(text: &str) -> (&str, Option<MapReference>) {
    let content = text.trim_end();
    let start = content.rfind('\n').map_or(0, |newline| newline + 1);
    let last = &content[start..];

    match MAP_REFERENCE.captures(last) {
        Some(captures) => {
            let url = captures
                .name("line")
                .or_else(|| captures.name("block"))
                .map_or("", |m| m.as_str());
            (&text[..start], Some(MapReference::parse(url)))
        }
        None => (text, None),
    }
}

/// Decode a `data:...;base64,<payload>` map reference
pub fn decode_data_url(url: &str) -> Result<SourceMap, ErrorKind> {
    let (header, payload) = url
        .split_once(',')
        .ok_or_else(|| ErrorKind::InvalidSourceMap("data URL without payload".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(ErrorKind::InvalidSourceMap(
            "only base64 data URLs are supported".to_string(),
        ));
    }

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ErrorKind::InvalidSourceMap(e.to_string()))?;
    let json = String::from_utf8(bytes).map_err(|e| ErrorKind::InvalidSourceMap(e.to_string()))?;
    SourceMap::from_json(&json).map_err(ErrorKind::InvalidSourceMap)
}

/// Attaches provenance to the physical lines of one unit
#[derive(Debug, Clone)]
pub enum PositionTracker {
    /// Every line maps onto itself in source 0
    Synthetic,
    /// Lines map through an upstream map, keyed by 0-based generated line
    Mapped(HashMap<u32, Vec<Provenance>>),
}

impl PositionTracker {
    /// Track a unit without an upstream map; its own text is the only source
    pub fn synthetic(identity: &str, text: &str) -> (Self, Vec<SourceFile>) {
        let source = SourceFile {
            name: identity.to_string(),
            content: Some(Arc::from(text)),
        };
        (PositionTracker::Synthetic, vec![source])
    }

    /// Track a unit through `map`, whose relative sources resolve against `map_dir`
    pub fn mapped(map: &SourceMap, map_dir: &Path) -> Result<(Self, Vec<SourceFile>), ErrorKind> {
        let root = map.source_root.as_deref().unwrap_or("");
        let sources = map
            .sources
            .iter()
            .enumerate()
            .map(|(index, source)| SourceFile {
                name: source_name(map_dir, root, source),
                content: map
                    .sources_content
                    .get(index)
                    .cloned()
                    .flatten()
                    .map(Arc::from),
            })
            .collect();

        let mut by_line: HashMap<u32, Vec<Provenance>> = HashMap::new();
        for mapping in map.decode().map_err(ErrorKind::InvalidSourceMap)? {
            if mapping.source as usize >= map.sources.len() {
                return Err(ErrorKind::InvalidSourceMap(format!(
                    "mapping refers to missing source {}",
                    mapping.source
                )));
            }
            let name = match mapping.name {
                Some(index) => Some(map.names.get(index as usize).cloned().ok_or_else(|| {
                    ErrorKind::InvalidSourceMap(format!("mapping refers to missing name {}", index))
                })?),
                None => None,
            };
            by_line
                .entry(mapping.generated.line)
                .or_default()
                .push(Provenance {
                    generated_column: mapping.generated.column,
                    source: mapping.source as usize,
                    original: mapping.original,
                    name,
                });
        }

        Ok((PositionTracker::Mapped(by_line), sources))
    }

    /// Provenance of the 0-based physical `line`
    pub fn provenance(&self, line: u32) -> Vec<Provenance> {
        match self {
            PositionTracker::Synthetic => vec![Provenance::synthetic(0, line)],
            PositionTracker::Mapped(by_line) => by_line.get(&line).cloned().unwrap_or_default(),
        }
    }
}

fn source_name(map_dir: &Path, root: &str, source: &str) -> String {
    if source.contains("://") || root.contains("://") {
        return format!("{}{}", root, source);
    }
    let path = Path::new(root).join(source);
    path_identity(&normalize_path(&map_dir.join(path)))
}
