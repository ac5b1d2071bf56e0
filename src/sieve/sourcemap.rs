//! Source map v3 model
//!
//!     Only the flat (non-indexed) form is supported. Lines and columns are 0-based, as in the
//!     encoded format.

pub mod vlq;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Serialized source map document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources_content: Vec<Option<String>>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub mappings: String,
    #[serde(default, skip_serializing)]
    sections: Option<serde_json::Value>,
}

/// Line/column pair, both 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// One decoded mapping segment that points back into a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub generated: Position,
    pub original: Position,
    /// Index into `sources`
    pub source: u32,
    /// Index into `names`
    pub name: Option<u32>,
}

impl SourceMap {
    /// Assemble a map from mappings sorted by generated position
    pub fn from_mappings(
        file: Option<String>,
        sources: Vec<String>,
        sources_content: Vec<Option<String>>,
        names: Vec<String>,
        mappings: &[Mapping],
    ) -> Self {
        Self {
            version: 3,
            file,
            source_root: None,
            sources,
            sources_content,
            names,
            mappings: encode_mappings(mappings),
            sections: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let map: SourceMap = serde_json::from_str(json).map_err(|e| e.to_string())?;
        if map.sections.is_some() {
            return Err("indexed source maps are not supported".to_string());
        }
        if map.version != 3 {
            return Err(format!("unsupported source map version {}", map.version));
        }
        Ok(map)
    }

    pub fn to_json(&self) -> String {
        // A map is strings and integers only, serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// `data:` URL embedding the whole map
    pub fn to_data_url(&self) -> String {
        format!(
            "data:application/json;charset=utf-8;base64,{}",
            STANDARD.encode(self.to_json())
        )
    }

    /// Decode `mappings`, skipping segments that carry no source position
    pub fn decode(&self) -> Result<Vec<Mapping>, String> {
        let mut decoded = Vec::new();
        let (mut source, mut original_line, mut original_column, mut name) = (0i64, 0i64, 0i64, 0i64);

        for (line, text) in self.mappings.split(';').enumerate() {
            let mut generated_column = 0i64;

            for segment in text.split(',').filter(|segment| !segment.is_empty()) {
                let fields = vlq::decode_segment(segment)?;
                match fields.len() {
                    1 => advance(&mut generated_column, fields[0], segment)?,
                    4 | 5 => {
                        advance(&mut generated_column, fields[0], segment)?;
                        advance(&mut source, fields[1], segment)?;
                        advance(&mut original_line, fields[2], segment)?;
                        advance(&mut original_column, fields[3], segment)?;
                        let name_index = if fields.len() == 5 {
                            advance(&mut name, fields[4], segment)?;
                            Some(non_negative(name, segment)?)
                        } else {
                            None
                        };

                        decoded.push(Mapping {
                            generated: Position::new(
                                line as u32,
                                non_negative(generated_column, segment)?,
                            ),
                            original: Position::new(
                                non_negative(original_line, segment)?,
                                non_negative(original_column, segment)?,
                            ),
                            source: non_negative(source, segment)?,
                            name: name_index,
                        });
                    }
                    n => return Err(format!("segment `{}` has {} fields", segment, n)),
                }
            }
        }

        Ok(decoded)
    }
}

/// Apply a relative field to its running value
fn advance(value: &mut i64, delta: i64, segment: &str) -> Result<(), String> {
    *value = value
        .checked_add(delta)
        .ok_or_else(|| format!("segment `{}` points out of range", segment))?;
    Ok(())
}

fn non_negative(value: i64, segment: &str) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("segment `{}` points out of range", segment))
}

/// Encode mappings sorted by generated position
pub fn encode_mappings(mappings: &[Mapping]) -> String {
    let mut out = String::new();
    let mut line = 0u32;
    let mut generated_column = 0i64;
    let (mut source, mut original_line, mut original_column, mut name) = (0i64, 0i64, 0i64, 0i64);
    let mut first_on_line = true;

    for mapping in mappings {
        while line < mapping.generated.line {
            out.push(';');
            line += 1;
            generated_column = 0;
            first_on_line = true;
        }
        if !first_on_line {
            out.push(',');
        }
        first_on_line = false;

        vlq::encode(mapping.generated.column as i64 - generated_column, &mut out);
        generated_column = mapping.generated.column as i64;

        vlq::encode(mapping.source as i64 - source, &mut out);
        source = mapping.source as i64;

        vlq::encode(mapping.original.line as i64 - original_line, &mut out);
        original_line = mapping.original.line as i64;

        vlq::encode(mapping.original.column as i64 - original_column, &mut out);
        original_column = mapping.original.column as i64;

        if let Some(index) = mapping.name {
            vlq::encode(index as i64 - name, &mut out);
            name = index as i64;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(gen: (u32, u32), orig: (u32, u32), source: u32) -> Mapping {
        Mapping {
            generated: Position::new(gen.0, gen.1),
            original: Position::new(orig.0, orig.1),
            source,
            name: None,
        }
    }

    #[test]
    fn test_encode_identity_lines() {
        let mappings = vec![
            mapping((0, 0), (0, 0), 0),
            mapping((1, 0), (1, 0), 0),
            mapping((2, 0), (2, 0), 0),
        ];
        assert_eq!(encode_mappings(&mappings), "AAAA;AACA;AACA");
    }

    #[test]
    fn test_decode_restores_absolute_positions() {
        let mappings = vec![
            mapping((0, 4), (10, 2), 1),
            mapping((0, 9), (10, 7), 1),
            mapping((3, 0), (2, 0), 0),
        ];
        let map = SourceMap::from_mappings(
            None,
            vec!["a.ts".to_string(), "b.ts".to_string()],
            vec![],
            vec![],
            &mappings,
        );
        assert_eq!(map.decode().unwrap(), mappings);
    }

    #[test]
    fn test_json_round_trip_and_camel_case() {
        let map = SourceMap::from_mappings(
            Some("out.js".to_string()),
            vec!["in.js".to_string()],
            vec![Some("x\n".to_string())],
            vec![],
            &[mapping((0, 0), (0, 0), 0)],
        );
        let json = map.to_json();
        assert!(json.contains("\"sourcesContent\""));
        assert_eq!(SourceMap::from_json(&json).unwrap(), map);
    }

    #[test]
    fn test_decode_rejects_positions_out_of_range() {
        let map = SourceMap::from_json(
            r#"{"version":3,"sources":["a.ts"],"names":[],"mappings":"AAAA,/////DAAA,/////DAAA"}"#,
        )
        .unwrap();
        assert!(map.decode().is_err());
    }

    #[test]
    fn test_rejects_indexed_maps() {
        let json = r#"{"version":3,"sections":[]}"#;
        assert!(SourceMap::from_json(json).is_err());
    }
}
