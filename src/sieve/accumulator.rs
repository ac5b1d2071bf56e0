//! Output map accumulation
//!
//!     One accumulator lives for one compile. The resolver reports every emitted content
//!     line; the accumulator assigns it the current output line (the cursor), translates the
//!     line's provenance from unit-local source indices into map-wide ones and advances the
//!     cursor by exactly one line, whether or not the line had any provenance.

use std::collections::HashMap;
use std::path::Path;

use crate::sieve::sourcemap::{Mapping, Position, SourceMap};
use crate::sieve::tree::{Provenance, SourceFile};

#[derive(Debug, Default)]
pub struct MapAccumulator {
    cursor: u32,
    sources: Vec<String>,
    contents: Vec<Option<String>>,
    source_index: HashMap<String, u32>,
    names: Vec<String>,
    name_index: HashMap<String, u32>,
    mappings: Vec<Mapping>,
}

impl MapAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 0-based output line the next emitted line will occupy
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Register one emitted line whose provenance indexes into `sources`
    pub fn record(&mut self, sources: &[SourceFile], provenance: &[Provenance]) {
        let line = self.cursor;
        let start = self.mappings.len();

        for entry in provenance {
            let Some(file) = sources.get(entry.source) else {
                continue;
            };
            let source = self.source(file);
            let name = entry.name.as_deref().map(|name| self.name(name));
            self.mappings.push(Mapping {
                generated: Position::new(line, entry.generated_column),
                original: entry.original,
                source,
                name,
            });
        }

        self.mappings[start..].sort_by_key(|mapping| mapping.generated.column);
        self.cursor += 1;
    }

    fn source(&mut self, file: &SourceFile) -> u32 {
        // The first registration of a source fixes its content
        if let Some(&index) = self.source_index.get(&file.name) {
            return index;
        }

        let index = self.sources.len() as u32;
        self.sources.push(file.name.clone());
        self.contents.push(file.content.as_deref().map(String::from));
        self.source_index.insert(file.name.clone(), index);
        index
    }

    fn name(&mut self, name: &str) -> u32 {
        if let Some(&index) = self.name_index.get(name) {
            return index;
        }
        let index = self.names.len() as u32;
        self.names.push(name.to_string());
        self.name_index.insert(name.to_string(), index);
        index
    }

    /// Produce the map; sources become relative to `output_dir` when one is given
    pub fn finish(self, file: Option<String>, output_dir: Option<&Path>) -> SourceMap {
        let sources = self
            .sources
            .into_iter()
            .map(|source| match output_dir {
                Some(dir) => relative_source(&source, dir),
                None => source,
            })
            .collect();

        let sources_content = if self.contents.iter().all(Option::is_none) {
            Vec::new()
        } else {
            self.contents
        };

        SourceMap::from_mappings(file, sources, sources_content, self.names, &self.mappings)
    }
}

fn relative_source(source: &str, dir: &Path) -> String {
    if source.starts_with('<') || source.contains("://") {
        return source.to_string();
    }
    pathdiff::diff_paths(source, dir)
        .map(|path| path.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|| source.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn file(name: &str, content: Option<&str>) -> SourceFile {
        SourceFile {
            name: name.to_string(),
            content: content.map(Arc::from),
        }
    }

    #[test]
    fn test_cursor_advances_once_per_line() {
        let sources = vec![file("a.js", Some("x\ny\n"))];
        let mut accumulator = MapAccumulator::new();

        accumulator.record(&sources, &[Provenance::synthetic(0, 4)]);
        accumulator.record(&sources, &[]);
        accumulator.record(&sources, &[Provenance::synthetic(0, 9)]);
        assert_eq!(accumulator.cursor(), 3);

        let map = accumulator.finish(None, None);
        let mappings = map.decode().unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].generated, Position::new(0, 0));
        assert_eq!(mappings[0].original, Position::new(4, 0));
        assert_eq!(mappings[1].generated, Position::new(2, 0));
        assert_eq!(mappings[1].original, Position::new(9, 0));
    }

    #[test]
    fn test_sources_are_registered_once() {
        let first = vec![file("shared.js", Some("first"))];
        let second = vec![file("other.js", Some("o")), file("shared.js", Some("s"))];
        let mut accumulator = MapAccumulator::new();

        accumulator.record(&first, &[Provenance::synthetic(0, 0)]);
        accumulator.record(&second, &[Provenance::synthetic(1, 0)]);
        accumulator.record(&second, &[Provenance::synthetic(0, 0)]);

        let map = accumulator.finish(None, None);
        assert_eq!(map.sources, vec!["shared.js", "other.js"]);
        assert_eq!(
            map.sources_content,
            vec![Some("first".to_string()), Some("o".to_string())]
        );
        let sources: Vec<_> = map.decode().unwrap().iter().map(|m| m.source).collect();
        assert_eq!(sources, vec![0, 0, 1]);
    }

    #[test]
    fn test_missing_content_is_not_filled_in_later() {
        let mut accumulator = MapAccumulator::new();
        accumulator.record(&[file("a.js", None)], &[Provenance::synthetic(0, 0)]);
        accumulator.record(&[file("a.js", Some("a"))], &[Provenance::synthetic(0, 1)]);

        let map = accumulator.finish(None, None);
        assert_eq!(map.sources, vec!["a.js"]);
        assert!(map.sources_content.is_empty());
    }

    #[test]
    fn test_columns_within_a_line_are_ordered() {
        let sources = vec![file("in.ts", None)];
        let entry = |column: u32| Provenance {
            generated_column: column,
            source: 0,
            original: Position::new(0, column),
            name: Some("f".to_string()),
        };
        let mut accumulator = MapAccumulator::new();
        accumulator.record(&sources, &[entry(8), entry(2)]);

        let map = accumulator.finish(Some("out.js".to_string()), None);
        let columns: Vec<_> = map
            .decode()
            .unwrap()
            .iter()
            .map(|m| m.generated.column)
            .collect();
        assert_eq!(columns, vec![2, 8]);
        assert_eq!(map.names, vec!["f"]);
        assert_eq!(map.file.as_deref(), Some("out.js"));
    }

    #[test]
    fn test_sources_relative_to_output_dir() {
        let sources = vec![file("src/app.js", None), file("<anonymous-1>", None)];
        let mut accumulator = MapAccumulator::new();
        accumulator.record(&sources, &[Provenance::synthetic(0, 0)]);
        accumulator.record(&sources, &[Provenance::synthetic(1, 0)]);

        let map = accumulator.finish(None, Some(Path::new("dist")));
        assert_eq!(map.sources, vec!["../src/app.js", "<anonymous-1>"]);
        assert!(map.sources_content.is_empty());
    }
}
