//! Resolution engine
//!
//!     Walks built trees depth first, in document order, and produces the output text.
//!
//!     - `Code` is emitted once per unit resolution, and reported to the map accumulator
//!     - `Include` widens the target's label accumulator, then emits the target unless the
//!       target already emitted under the same (labels, flags) context
//!     - `Exclude` does the same bookkeeping but throws the text away, reserving that context
//!     - `FlagSet` mutates the live environment in place
//!     - `Conditional` / `LabelScope` descend only when visible
//!
//!     The live environment is one map threaded by `&mut` through the whole pass, so a flag
//!     set before an include point is what the included unit sees, and whatever the included
//!     unit sets is visible after it.

use std::sync::Arc;

use tracing::trace;

use crate::sieve::accumulator::MapAccumulator;
use crate::sieve::flags::{FlagEnv, LabelSelection};
use crate::sieve::tree::{Block, CodeLine, Inclusion, InclusionKey, UnitId, UnitStore};

/// Where resolved text goes
pub struct Output<'m> {
    text: String,
    map: Option<&'m mut MapAccumulator>,
    discard: bool,
}

impl<'m> Output<'m> {
    pub fn new(map: Option<&'m mut MapAccumulator>) -> Self {
        Self {
            text: String::new(),
            map,
            discard: false,
        }
    }

    /// Sink for excluded content: no text, no map entries, no cursor movement
    fn discard() -> Output<'static> {
        Output {
            text: String::new(),
            map: None,
            discard: true,
        }
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

pub struct Resolver<'a> {
    store: &'a mut UnitStore,
    terminator: &'a str,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a mut UnitStore, terminator: &'a str) -> Self {
        Self { store, terminator }
    }

    /// Resolve `root` for a top-level compile
    ///
    /// The root's own inclusion key is marked, so includes cycling back to it stay empty.
    pub fn resolve_root(
        &mut self,
        root: UnitId,
        selection: &LabelSelection,
        env: &mut FlagEnv,
        out: &mut Output<'_>,
    ) {
        let unit = self.store.get_mut(root);
        let key = InclusionKey::new(&selection.union(&unit.labels), env);
        unit.emitted.insert(key);
        self.resolve_unit(root, selection, env, out);
    }

    fn resolve_unit(
        &mut self,
        id: UnitId,
        selection: &LabelSelection,
        env: &mut FlagEnv,
        out: &mut Output<'_>,
    ) {
        let unit = self.store.get(id);
        let tree = Arc::clone(&unit.tree);
        let selection = selection.union(&unit.labels);
        let mut consumed = vec![false; tree.code_lines];

        self.walk(id, &tree.children, &selection, env, &mut consumed, out);
    }

    fn walk(
        &mut self,
        id: UnitId,
        blocks: &[Block],
        selection: &LabelSelection,
        env: &mut FlagEnv,
        consumed: &mut [bool],
        out: &mut Output<'_>,
    ) {
        for block in blocks {
            match block {
                Block::Code(line) => {
                    if !std::mem::replace(&mut consumed[line.id], true) {
                        self.emit(id, line, out);
                    }
                }
                Block::Include(inclusion) => self.include(inclusion, env, out),
                Block::Exclude(inclusion) => {
                    let mut discarded = Output::discard();
                    self.include(inclusion, env, &mut discarded);
                }
                Block::FlagSet { flag, value } => {
                    trace!(flag = %flag, value = ?value, "flag set");
                    env.apply(flag, value.as_ref());
                }
                Block::Conditional {
                    condition,
                    children,
                } => {
                    if condition.evaluate(env.get(&condition.flag)) {
                        self.walk(id, children, selection, env, consumed, out);
                    }
                }
                Block::LabelScope { label, children } => {
                    if selection.is_selected(label) {
                        self.walk(id, children, selection, env, consumed, out);
                    }
                }
            }
        }
    }

    fn include(&mut self, inclusion: &Inclusion, env: &mut FlagEnv, out: &mut Output<'_>) {
        let target = self.store.get_mut(inclusion.target);
        target.labels.extend(inclusion.labels.iter().cloned());

        let key = InclusionKey::new(&target.labels, env);
        if !target.emitted.insert(key) {
            trace!(
                unit = %target.identity,
                line = inclusion.line,
                "already emitted in this context"
            );
            return;
        }

        self.resolve_unit(inclusion.target, &LabelSelection::all(), env, out);
    }

    fn emit(&self, id: UnitId, line: &CodeLine, out: &mut Output<'_>) {
        if out.discard {
            return;
        }

        out.text.push_str(&line.text);
        if line.terminated {
            out.text.push_str(self.terminator);
        }
        if let Some(map) = out.map.as_deref_mut() {
            map.record(&self.store.get(id).sources, &line.provenance);
        }
    }
}
