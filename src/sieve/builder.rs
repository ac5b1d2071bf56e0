//! Directive builder
//!
//!     Turns the text of a unit into its [DocumentTree], recursively building every unit it
//!     includes or excludes. Each distinct identity is built once per session: the unit is
//!     registered in the store before its lines are processed, so a cycle back to a unit that
//!     is still being built simply refers to it by id.
//!
//!     Line handling:
//!         - content lines become [CodeLine] leaves of the innermost open scope
//!         - `label`, `if` and `unless` open scopes, closers pop them (kinds must match)
//!         - `include` / `without` resolve their pattern through the loader and append one leaf
//!           per concrete target, in resolver order
//!         - `set` / `unset` become [Block::FlagSet] leaves; at the top level of a unit they
//!           also write the session defaults and the build-time environment right away
//!
//!     Targets of one directive are loaded concurrently, then built one after another in
//!     declaration order so that flag defaults seeded by root-level `set`s stay deterministic.
//!     A build either completes or fails as a whole; the session discards partial results.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::sieve::directive::{Directive, DirectiveSyntax, ScopeKind, Target};
use crate::sieve::error::{ErrorKind, LoadError, SieveError};
use crate::sieve::flags::FlagEnv;
use crate::sieve::literal::{Condition, Value};
use crate::sieve::loader::{normalize_path, path_identity, substitute_flags, SourceLoader};
use crate::sieve::position::{decode_data_url, strip_map_reference, MapReference, PositionTracker};
use crate::sieve::sourcemap::SourceMap;
use crate::sieve::tree::{Block, CodeLine, DocumentTree, Inclusion, Unit, UnitId, UnitStore};

type BuildFuture<'a> = Pin<Box<dyn Future<Output = Result<UnitId, SieveError>> + Send + 'a>>;

/// Text of a unit that has not been built yet
#[derive(Debug, Clone)]
pub struct PendingUnit {
    pub identity: String,
    pub dir: PathBuf,
    pub text: String,
    /// Upstream map supplied by the caller, takes precedence over a reference in the text
    pub input_map: Option<SourceMap>,
}

/// Builds units into a session's store
pub struct Builder<'s, L: SourceLoader> {
    loader: Arc<L>,
    syntax: &'s DirectiveSyntax,
    track_positions: bool,
    store: &'s mut UnitStore,
    defaults: &'s mut FlagEnv,
    /// Build-time environment, used for `${name}` substitution
    env: FlagEnv,
}

impl<'s, L: SourceLoader> Builder<'s, L> {
    pub fn new(
        loader: Arc<L>,
        syntax: &'s DirectiveSyntax,
        track_positions: bool,
        store: &'s mut UnitStore,
        defaults: &'s mut FlagEnv,
        env: FlagEnv,
    ) -> Self {
        Self {
            loader,
            syntax,
            track_positions,
            store,
            defaults,
            env,
        }
    }

    /// Build `pending` unless a unit with the same identity already exists
    pub fn build<'a>(&'a mut self, pending: PendingUnit) -> BuildFuture<'a> {
        Box::pin(async move {
            if let Some(id) = self.store.lookup(&pending.identity) {
                return Ok(id);
            }

            let PendingUnit {
                identity,
                dir,
                text,
                input_map,
            } = pending;
            debug!(unit = %identity, "building unit");

            let mut unit = Unit::new(identity.clone(), dir.clone());
            let (body, tracker) = if self.track_positions {
                let (body, reference) = strip_map_reference(&text);
                let body = body.to_string();
                let (tracker, sources) = match self.upstream_map(&dir, input_map, reference).await {
                    Ok(Some((map, map_dir))) => PositionTracker::mapped(&map, &map_dir),
                    Ok(None) => Ok(PositionTracker::synthetic(&identity, &body)),
                    Err(kind) => Err(kind),
                }
                .map_err(|kind| SieveError::new(identity.as_str(), 0, kind))?;
                unit.sources = sources;
                (body, Some(tracker))
            } else {
                (text, None)
            };

            let id = self.store.insert(unit);
            let mut scopes = ScopeStack::default();
            let mut code_lines = 0;

            for (index, (raw, terminated)) in physical_lines(&body).into_iter().enumerate() {
                let line = index + 1;
                let located = |kind: ErrorKind| SieveError::new(identity.as_str(), line, kind);

                let Some(directive) = self.syntax.parse_line(raw).map_err(located)? else {
                    let provenance = tracker
                        .as_ref()
                        .map(|tracker| tracker.provenance(index as u32))
                        .unwrap_or_default();
                    scopes.push(Block::Code(CodeLine {
                        id: code_lines,
                        line,
                        text: raw.to_string(),
                        terminated,
                        provenance,
                    }));
                    code_lines += 1;
                    continue;
                };

                match directive {
                    Directive::Include(target) if target.path.is_empty() => {
                        trace!(unit = %identity, labels = ?target.labels, "unit requests its own labels");
                        self.store.get_mut(id).labels.extend(target.labels);
                    }
                    Directive::Include(target) => {
                        for inclusion in self.inclusions(&identity, &dir, line, target).await? {
                            scopes.push(Block::Include(inclusion));
                        }
                    }
                    Directive::Without(target) => {
                        if target.path.is_empty() {
                            return Err(located(ErrorKind::MissingOperand {
                                directive: "without",
                                expected: "a path",
                            }));
                        }
                        for inclusion in self.inclusions(&identity, &dir, line, target).await? {
                            scopes.push(Block::Exclude(inclusion));
                        }
                    }
                    Directive::Label(label) => {
                        scopes.open(ScopeKind::Label, line, ScopeHeader::Label(label))
                    }
                    Directive::If(condition) => {
                        scopes.open(ScopeKind::If, line, ScopeHeader::Condition(condition))
                    }
                    Directive::Unless(condition) => {
                        scopes.open(ScopeKind::Unless, line, ScopeHeader::Condition(condition))
                    }
                    Directive::Close(kind) => scopes.close(kind).map_err(located)?,
                    Directive::Set { flag, value } => self.flag_set(&mut scopes, flag, Some(value)),
                    Directive::Unset { flag } => self.flag_set(&mut scopes, flag, None),
                }
            }

            let children = scopes
                .finish()
                .map_err(|(line, kind)| SieveError::new(identity.as_str(), line, kind))?;
            debug!(unit = %identity, code_lines, "unit built");
            self.store.get_mut(id).tree = Arc::new(DocumentTree::new(children, code_lines));
            Ok(id)
        })
    }

    fn flag_set(&mut self, scopes: &mut ScopeStack, flag: String, value: Option<Value>) {
        if scopes.at_root() {
            trace!(flag = %flag, value = ?value, "seeding session default");
            self.defaults.apply(&flag, value.as_ref());
            self.env.apply(&flag, value.as_ref());
        }
        scopes.push(Block::FlagSet { flag, value });
    }

    /// Resolve one `include` / `without` target into built units
    async fn inclusions(
        &mut self,
        from: &str,
        dir: &Path,
        line: usize,
        target: Target,
    ) -> Result<Vec<Inclusion>, SieveError> {
        let located = |kind: ErrorKind| SieveError::new(from, line, kind);

        let pattern = substitute_flags(&target.path, &self.env).map_err(located)?;
        let paths = self
            .loader
            .resolve(dir, &pattern)
            .await
            .map_err(|source| {
                located(ErrorKind::Resolve {
                    pattern: pattern.clone(),
                    source,
                })
            })?;

        if paths.is_empty() {
            warn!(unit = from, line, pattern = %pattern, "pattern matched no files");
        }
        debug!(unit = from, line, pattern = %pattern, targets = paths.len(), "resolved targets");

        let mut texts: Vec<Option<String>> = vec![None; paths.len()];
        let mut loads = JoinSet::new();
        for (index, path) in paths.iter().enumerate() {
            if self.store.lookup(&path_identity(path)).is_some() {
                continue;
            }
            let loader = Arc::clone(&self.loader);
            let path = path.clone();
            loads.spawn(async move { (index, loader.load(&path).await) });
        }

        while let Some(joined) = loads.join_next().await {
            let (index, loaded) = joined.map_err(|e| {
                located(ErrorKind::Resolve {
                    pattern: pattern.clone(),
                    source: LoadError::Task(e.to_string()),
                })
            })?;
            let text = loaded.map_err(|source| {
                located(ErrorKind::Load {
                    path: paths[index].clone(),
                    source,
                })
            })?;
            texts[index] = Some(text);
        }

        let mut inclusions = Vec::with_capacity(paths.len());
        for (path, text) in paths.into_iter().zip(texts) {
            let identity = path_identity(&path);
            let target_id = match self.store.lookup(&identity) {
                Some(id) => id,
                None => {
                    let text = match text {
                        Some(text) => text,
                        None => self
                            .loader
                            .load(&path)
                            .await
                            .map_err(|source| {
                                located(ErrorKind::Load {
                                    path: path.clone(),
                                    source,
                                })
                            })?,
                    };
                    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                    self.build(PendingUnit {
                        identity,
                        dir,
                        text,
                        input_map: None,
                    })
                    .await?
                }
            };
            inclusions.push(Inclusion {
                target: target_id,
                labels: target.labels.clone(),
                line,
            });
        }

        Ok(inclusions)
    }

    /// The map a unit's lines should be tracked through, and the directory its sources are
    /// relative to
    async fn upstream_map(
        &self,
        dir: &Path,
        explicit: Option<SourceMap>,
        reference: Option<MapReference>,
    ) -> Result<Option<(SourceMap, PathBuf)>, ErrorKind> {
        if let Some(map) = explicit {
            return Ok(Some((map, dir.to_path_buf())));
        }

        match reference {
            None => Ok(None),
            Some(MapReference::Inline(url)) => Ok(Some((decode_data_url(&url)?, dir.to_path_buf()))),
            Some(MapReference::External(url)) => {
                let path = normalize_path(&dir.join(&url));
                debug!(map = %path.display(), "loading upstream map");
                let json = self
                    .loader
                    .load(&path)
                    .await
                    .map_err(|source| ErrorKind::Load {
                        path: path.clone(),
                        source,
                    })?;
                let map = SourceMap::from_json(&json).map_err(ErrorKind::InvalidSourceMap)?;
                let map_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                Ok(Some((map, map_dir)))
            }
        }
    }
}

/// Split text into physical lines, each with whether it had a terminator
///
/// `\r\n` terminators lose their `\r`. Text ending in a newline has no trailing empty line.
pub fn physical_lines(text: &str) -> Vec<(&str, bool)> {
    let mut lines: Vec<(&str, bool)> = text
        .split('\n')
        .map(|line| (line.strip_suffix('\r').unwrap_or(line), true))
        .collect();

    if let Some(last) = lines.pop() {
        if !last.0.is_empty() {
            lines.push((last.0, false));
        }
    }
    lines
}

enum ScopeHeader {
    Condition(Condition),
    Label(String),
}

struct OpenScope {
    kind: ScopeKind,
    line: usize,
    header: ScopeHeader,
    children: Vec<Block>,
}

/// Open scopes of the unit being built; discarded once the tree is finished
#[derive(Default)]
struct ScopeStack {
    root: Vec<Block>,
    open: Vec<OpenScope>,
}

impl ScopeStack {
    fn at_root(&self) -> bool {
        self.open.is_empty()
    }

    fn push(&mut self, block: Block) {
        match self.open.last_mut() {
            Some(scope) => scope.children.push(block),
            None => self.root.push(block),
        }
    }

    fn open(&mut self, kind: ScopeKind, line: usize, header: ScopeHeader) {
        self.open.push(OpenScope {
            kind,
            line,
            header,
            children: Vec::new(),
        });
    }

    fn close(&mut self, kind: ScopeKind) -> Result<(), ErrorKind> {
        let Some(scope) = self.open.pop() else {
            return Err(ErrorKind::UnmatchedClose(kind));
        };
        if scope.kind != kind {
            return Err(ErrorKind::MismatchedClose {
                found: kind,
                open: scope.kind,
                opened_at: scope.line,
            });
        }

        let block = match scope.header {
            ScopeHeader::Condition(condition) => Block::Conditional {
                condition,
                children: scope.children,
            },
            ScopeHeader::Label(label) => Block::LabelScope {
                label,
                children: scope.children,
            },
        };
        self.push(block);
        Ok(())
    }

    fn finish(self) -> Result<Vec<Block>, (usize, ErrorKind)> {
        match self.open.last() {
            Some(scope) => Err((scope.line, ErrorKind::Unclosed(scope.kind))),
            None => Ok(self.root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sieve::loader::MemoryLoader;

    struct Fixture {
        store: UnitStore,
        defaults: FlagEnv,
        syntax: DirectiveSyntax,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: UnitStore::new(),
                defaults: FlagEnv::new(),
                syntax: DirectiveSyntax::default(),
            }
        }

        async fn build(
            &mut self,
            loader: MemoryLoader,
            track: bool,
            text: &str,
        ) -> Result<UnitId, SieveError> {
            let mut builder = Builder::new(
                Arc::new(loader),
                &self.syntax,
                track,
                &mut self.store,
                &mut self.defaults,
                FlagEnv::new(),
            );
            builder
                .build(PendingUnit {
                    identity: "main.js".to_string(),
                    dir: PathBuf::new(),
                    text: text.to_string(),
                    input_map: None,
                })
                .await
        }
    }

    #[test]
    fn test_physical_lines() {
        assert_eq!(physical_lines("a\nb\n"), vec![("a", true), ("b", true)]);
        assert_eq!(physical_lines("a\r\nb"), vec![("a", true), ("b", false)]);
        assert_eq!(physical_lines("a\n\n"), vec![("a", true), ("", true)]);
        assert!(physical_lines("").is_empty());
    }

    #[tokio::test]
    async fn test_scopes_nest() {
        let mut fixture = Fixture::new();
        let text = "top\n//#label x\n//#if debug\ninner\n//#endif\n//#endlabel\n";
        let id = fixture.build(MemoryLoader::new(), false, text).await.unwrap();

        let tree = &fixture.store.get(id).tree;
        assert_eq!(tree.code_lines, 2);
        assert_eq!(tree.children.len(), 2);
        let Block::LabelScope { label, children } = &tree.children[1] else {
            panic!("expected a label scope");
        };
        assert_eq!(label, "x");
        assert!(matches!(&children[0], Block::Conditional { children, .. } if children.len() == 1));
    }

    #[tokio::test]
    async fn test_root_level_set_seeds_defaults() {
        let mut fixture = Fixture::new();
        let text = "//#set ie 7\n//#if ie\n//#set nested\n//#endif\n//#set gone\n//#unset gone\n";
        fixture.build(MemoryLoader::new(), false, text).await.unwrap();

        assert_eq!(fixture.defaults.get("ie"), Some(&Value::Int(7)));
        assert!(fixture.defaults.get("nested").is_none());
        assert!(fixture.defaults.get("gone").is_none());
    }

    #[tokio::test]
    async fn test_include_builds_each_unit_once() {
        let loader = MemoryLoader::new()
            .with_file("lib/a.js", "//#include b.js\na\n")
            .with_file("lib/b.js", "//#include a.js\nb\n");
        let mut fixture = Fixture::new();
        let text = "//#include lib/*.js::dbg\n//#without lib/b.js\n";
        let id = fixture.build(loader, false, text).await.unwrap();

        assert_eq!(fixture.store.len(), 3);
        let a = fixture.store.lookup("lib/a.js").unwrap();
        let b = fixture.store.lookup("lib/b.js").unwrap();

        let tree = &fixture.store.get(id).tree;
        assert_eq!(
            tree.children,
            vec![
                Block::Include(Inclusion {
                    target: a,
                    labels: vec!["dbg".to_string()],
                    line: 1,
                }),
                Block::Include(Inclusion {
                    target: b,
                    labels: vec!["dbg".to_string()],
                    line: 1,
                }),
                Block::Exclude(Inclusion {
                    target: b,
                    labels: vec![],
                    line: 2,
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_labels_only_include_widens_own_accumulator() {
        let mut fixture = Fixture::new();
        let id = fixture
            .build(MemoryLoader::new(), false, "//#include ::web::node\nx\n")
            .await
            .unwrap();
        let labels: Vec<_> = fixture.store.get(id).labels.names().cloned().collect();
        assert_eq!(labels, vec!["node", "web"]);
    }

    #[tokio::test]
    async fn test_path_variables_use_build_time_flags() {
        let loader = MemoryLoader::new().with_file("env/node.js", "node\n");
        let mut fixture = Fixture::new();
        let text = "//#set target node\n//#include env/${target}.js\n";
        fixture.build(loader, false, text).await.unwrap();
        assert!(fixture.store.lookup("env/node.js").is_some());

        let mut fixture = Fixture::new();
        let err = fixture
            .build(MemoryLoader::new(), false, "//#include env/${target}.js\n")
            .await
            .unwrap_err();
        assert_eq!(err.line, 1);
        assert!(matches!(err.kind, ErrorKind::UndefinedVariable(_)));
    }

    #[tokio::test]
    async fn test_structural_errors_carry_lines() {
        let mut fixture = Fixture::new();
        let err = fixture
            .build(MemoryLoader::new(), false, "a\n//#label x\n//#endif\n")
            .await
            .unwrap_err();
        assert_eq!(err.unit, "main.js");
        assert_eq!(err.line, 3);
        assert!(matches!(
            err.kind,
            ErrorKind::MismatchedClose {
                found: ScopeKind::If,
                open: ScopeKind::Label,
                opened_at: 2
            }
        ));

        let mut fixture = Fixture::new();
        let err = fixture
            .build(MemoryLoader::new(), false, "//#unless x\n")
            .await
            .unwrap_err();
        assert_eq!(err.line, 1);
        assert!(matches!(err.kind, ErrorKind::Unclosed(ScopeKind::Unless)));

        let mut fixture = Fixture::new();
        let err = fixture
            .build(MemoryLoader::new(), false, "//#endlabel\n")
            .await
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnmatchedClose(ScopeKind::Label)));
    }

    #[tokio::test]
    async fn test_missing_target_is_a_resolve_error() {
        let mut fixture = Fixture::new();
        let err = fixture
            .build(MemoryLoader::new(), false, "x\n//#include nope.js\n")
            .await
            .unwrap_err();
        assert_eq!(err.line, 2);
        assert!(matches!(
            err.kind,
            ErrorKind::Resolve {
                source: LoadError::NotFound(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_tracking_strips_reference_and_tags_lines() {
        let map = SourceMap::from_mappings(
            None,
            vec!["orig.ts".to_string()],
            vec![],
            vec![],
            &[crate::sieve::sourcemap::Mapping {
                generated: crate::sieve::sourcemap::Position::new(1, 0),
                original: crate::sieve::sourcemap::Position::new(7, 0),
                source: 0,
                name: None,
            }],
        );
        let loader = MemoryLoader::new().with_file("main.js.map", map.to_json());
        let mut fixture = Fixture::new();
        let id = fixture
            .build(loader, true, "a\nb\n//# sourceMappingURL=main.js.map\n")
            .await
            .unwrap();

        let unit = fixture.store.get(id);
        assert_eq!(unit.sources[0].name, "orig.ts");
        let code = unit.tree.code();
        assert_eq!(code.len(), 2);
        assert!(code[0].provenance.is_empty());
        assert_eq!(code[1].provenance[0].original.line, 7);
    }
}
