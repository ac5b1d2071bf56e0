//! Document trees and source units
//!
//!     A [DocumentTree] is the built form of one unit: an ordered list of [Block]s where
//!     conditionals and label scopes own their children outright. Nothing in a finished tree
//!     points back to its parent, the builder keeps its open scopes on a local stack instead.
//!
//!     Units live in a [UnitStore] arena owned by the session and are addressed by [UnitId].
//!     Inclusions refer to their target by id, which lets cyclic include graphs be represented
//!     without shared ownership.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::sieve::flags::{FlagEnv, LabelSelection};
use crate::sieve::literal::{Condition, Value};
use crate::sieve::sourcemap::Position;

/// Index of a unit in the session's [UnitStore]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub(crate) usize);

/// Node of a document tree
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Code(CodeLine),
    Include(Inclusion),
    /// `without`: resolved like an include, output discarded
    Exclude(Inclusion),
    /// `set` (`Some`) or `unset` (`None`)
    FlagSet {
        flag: String,
        value: Option<Value>,
    },
    Conditional {
        condition: Condition,
        children: Vec<Block>,
    },
    LabelScope {
        label: String,
        children: Vec<Block>,
    },
}

/// One content line
#[derive(Debug, Clone, PartialEq)]
pub struct CodeLine {
    /// Dense per-unit index, used by the consumption guard
    pub id: usize,
    /// 1-based physical line
    pub line: usize,
    /// Text without its line terminator
    pub text: String,
    /// False only for a final line that had no terminator in the source
    pub terminated: bool,
    pub provenance: Vec<Provenance>,
}

/// Original position of (part of) a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Column in the generated line; the line itself is assigned when emitted
    pub generated_column: u32,
    /// Index into the owning unit's `sources`
    pub source: usize,
    pub original: Position,
    pub name: Option<String>,
}

impl Provenance {
    /// Identity mapping of a physical line onto itself
    pub fn synthetic(source: usize, line: u32) -> Self {
        Self {
            generated_column: 0,
            source,
            original: Position::new(line, 0),
            name: None,
        }
    }
}

/// An `include` or `without` leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inclusion {
    pub target: UnitId,
    pub labels: Vec<String>,
    /// 1-based line of the directive
    pub line: usize,
}

/// Built form of one unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentTree {
    pub children: Vec<Block>,
    /// Number of [CodeLine]s in the tree
    pub code_lines: usize,
}

impl DocumentTree {
    pub fn new(children: Vec<Block>, code_lines: usize) -> Self {
        Self {
            children,
            code_lines,
        }
    }

    /// Every code line in document order, regardless of visibility
    pub fn code(&self) -> Vec<&CodeLine> {
        fn collect<'a>(blocks: &'a [Block], out: &mut Vec<&'a CodeLine>) {
            for block in blocks {
                match block {
                    Block::Code(line) => out.push(line),
                    Block::Conditional { children, .. } | Block::LabelScope { children, .. } => {
                        collect(children, out)
                    }
                    _ => {}
                }
            }
        }

        let mut out = Vec::with_capacity(self.code_lines);
        collect(&self.children, &mut out);
        out
    }
}

/// An original source a unit's provenance can point into
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub name: String,
    pub content: Option<Arc<str>>,
}

/// Composite key of the inclusion cache
///
/// The target is implied by the unit holding the cache. Labels and flags are stored sorted
/// so equal contexts produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InclusionKey {
    labels: Vec<String>,
    flags: Vec<(String, String)>,
}

impl InclusionKey {
    pub fn new(labels: &LabelSelection, flags: &FlagEnv) -> Self {
        Self {
            labels: labels.names().cloned().collect(),
            flags: flags
                .iter()
                .map(|(name, value)| (name.clone(), value.fingerprint()))
                .collect(),
        }
    }
}

/// One parsed document
#[derive(Debug, Clone)]
pub struct Unit {
    /// Normalized path, or `<anonymous-N>`
    pub identity: String,
    /// Directory include paths are resolved against
    pub dir: PathBuf,
    pub tree: Arc<DocumentTree>,
    /// Every label ever requested for this unit
    pub labels: LabelSelection,
    /// Inclusion contexts already emitted (or reserved by `without`)
    pub emitted: HashSet<InclusionKey>,
    /// Originals referenced by provenance, empty when positions are not tracked
    pub sources: Vec<SourceFile>,
}

impl Unit {
    pub fn new(identity: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            identity: identity.into(),
            dir: dir.into(),
            tree: Arc::new(DocumentTree::default()),
            labels: LabelSelection::all(),
            emitted: HashSet::new(),
            sources: Vec::new(),
        }
    }
}

/// Arena of units, indexed by id and by identity
#[derive(Debug, Clone, Default)]
pub struct UnitStore {
    units: Vec<Unit>,
    by_identity: HashMap<String, UnitId>,
}

impl UnitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, identity: &str) -> Option<UnitId> {
        self.by_identity.get(identity).copied()
    }

    pub fn insert(&mut self, unit: Unit) -> UnitId {
        let id = UnitId(self.units.len());
        self.by_identity.insert(unit.identity.clone(), id);
        self.units.push(unit);
        id
    }

    pub fn get(&self, id: UnitId) -> &Unit {
        &self.units[id.0]
    }

    pub fn get_mut(&mut self, id: UnitId) -> &mut Unit {
        &mut self.units[id.0]
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Drop every unit inserted after the store held `len` units
    pub fn truncate(&mut self, len: usize) {
        for unit in self.units.drain(len.min(self.units.len())..) {
            self.by_identity.remove(&unit.identity);
        }
    }
}
