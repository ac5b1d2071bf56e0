//! Compile sessions
//!
//!     A [Session] is the unit cache plus the state that outlives a single compile: flag
//!     defaults seeded by root-level `set` directives, the label accumulator of every unit and
//!     every unit's inclusion cache. Compiling several entry points in one session shares all
//!     of it, which is what lets `without` in one output subtract content that another output
//!     includes. Independent compiles need independent sessions.
//!
//!     Each [CompileRequest] runs in two phases: build every unit reachable from the entry
//!     point (async, loader driven), then resolve the entry point synchronously. A request
//!     that fails leaves the session exactly as it was before the request.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sieve::accumulator::MapAccumulator;
use crate::sieve::builder::{Builder, PendingUnit};
use crate::sieve::directive::{DirectiveSyntax, DEFAULT_PREFIX};
use crate::sieve::error::{ErrorKind, SieveError};
use crate::sieve::flags::{FlagEnv, LabelSelection};
use crate::sieve::literal::Value;
use crate::sieve::loader::{normalize_path, path_identity, SourceLoader};
use crate::sieve::resolve::{Output, Resolver};
use crate::sieve::sourcemap::SourceMap;
use crate::sieve::tree::{UnitId, UnitStore};

/// How a compile reports its source map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapMode {
    #[default]
    Off,
    /// Embed the map as a `data:` URL declaration
    Inline,
    /// Reference a separate `.map` file the host persists
    External,
}

/// Settings fixed for the lifetime of a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Directive marker
    pub prefix: String,
    /// Directory relative request paths and anonymous units resolve against
    pub base_dir: PathBuf,
    /// Attach provenance to lines while building; required for source maps
    pub track_positions: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            base_dir: PathBuf::new(),
            track_positions: false,
        }
    }
}

impl SessionOptions {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_positions(mut self, track: bool) -> Self {
        self.track_positions = track;
        self
    }
}

/// One compile invocation
#[derive(Debug, Clone)]
pub struct CompileRequest {
    path: Option<PathBuf>,
    content: Option<String>,
    flags: FlagEnv,
    labels: LabelSelection,
    line_terminator: String,
    map_mode: MapMode,
    input_map: Option<SourceMap>,
    output: Option<PathBuf>,
}

impl CompileRequest {
    fn empty() -> Self {
        Self {
            path: None,
            content: None,
            flags: FlagEnv::new(),
            labels: LabelSelection::all(),
            line_terminator: "\n".to_string(),
            map_mode: MapMode::Off,
            input_map: None,
            output: None,
        }
    }

    /// Compile the unit at `path`, loaded through the session's loader
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::empty()
        }
    }

    /// Compile inline text as an anonymous unit
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::empty()
        }
    }

    /// Use `content` instead of reading the request path
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_flag(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.flags.set(name, value);
        self
    }

    pub fn with_flags(mut self, flags: FlagEnv) -> Self {
        self.flags = self.flags.overlay(&flags);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label);
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels);
        self
    }

    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    pub fn with_map_mode(mut self, mode: MapMode) -> Self {
        self.map_mode = mode;
        self
    }

    /// Upstream map of the entry unit, overriding any reference in its text
    pub fn with_input_map(mut self, map: SourceMap) -> Self {
        self.input_map = Some(map);
        self
    }

    /// Where the host will write the output; map sources and URLs are made relative to it
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// Result of a successful compile
#[derive(Debug, Clone, PartialEq)]
pub struct CompileResult {
    pub text: String,
    pub map: Option<SourceMap>,
    /// Map reference comment to append to the output
    pub declaration: Option<String>,
    /// Where the map should be written, relative to the output (external maps only)
    pub map_url: Option<String>,
}

impl CompileResult {
    /// Output text with the map declaration appended on its own line
    pub fn text_with_declaration(&self, terminator: &str) -> String {
        let Some(declaration) = &self.declaration else {
            return self.text.clone();
        };

        let mut text = self.text.clone();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push_str(terminator);
        }
        text.push_str(declaration);
        text.push_str(terminator);
        text
    }
}

#[derive(Debug, Default)]
struct SessionState {
    store: UnitStore,
    defaults: FlagEnv,
    anonymous: usize,
}

/// Cache and shared state for a series of compiles
pub struct Session<L: SourceLoader> {
    loader: Arc<L>,
    options: SessionOptions,
    syntax: DirectiveSyntax,
    state: SessionState,
}

impl<L: SourceLoader> Session<L> {
    pub fn new(loader: L) -> Self {
        Self::with_options(loader, SessionOptions::default())
    }

    pub fn with_options(loader: L, options: SessionOptions) -> Self {
        Self {
            loader: Arc::new(loader),
            syntax: DirectiveSyntax::new(options.prefix.clone()),
            options,
            state: SessionState::default(),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Flag defaults every compile starts from
    pub fn defaults(&self) -> &FlagEnv {
        &self.state.defaults
    }

    /// Number of distinct units built so far
    pub fn unit_count(&self) -> usize {
        self.state.store.len()
    }

    /// Labels accumulated for the unit with `identity`
    pub fn unit_labels(&self, identity: &str) -> Option<&LabelSelection> {
        self.state
            .store
            .lookup(identity)
            .map(|id| &self.state.store.get(id).labels)
    }

    pub async fn compile(&mut self, request: CompileRequest) -> Result<CompileResult, SieveError> {
        let CompileRequest {
            path,
            content,
            flags,
            labels,
            line_terminator,
            map_mode,
            input_map,
            output,
        } = request;

        let pending = self.pending_unit(path, content, input_map).await?;
        let identity = pending.identity.clone();
        if map_mode != MapMode::Off && !self.options.track_positions {
            return Err(SieveError::new(identity, 0, ErrorKind::TrackingDisabled));
        }

        debug!(unit = %identity, ?map_mode, "compiling");
        let root = self.build(pending, &flags).await?;

        let mut env = self.state.defaults.clone().overlay(&flags);
        let mut accumulator = (map_mode != MapMode::Off).then(MapAccumulator::new);
        let mut out = Output::new(accumulator.as_mut());
        Resolver::new(&mut self.state.store, &line_terminator).resolve_root(
            root,
            &labels,
            &mut env,
            &mut out,
        );
        let text = out.into_text();

        let Some(accumulator) = accumulator else {
            return Ok(CompileResult {
                text,
                map: None,
                declaration: None,
                map_url: None,
            });
        };

        let file_name = output
            .as_deref()
            .or(Some(Path::new(&identity)))
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().to_string());
        let map = accumulator.finish(
            output.as_ref().and(file_name.clone()),
            output.as_deref().and_then(Path::parent),
        );

        let (declaration, map_url) = match map_mode {
            MapMode::Inline => (Some(declaration(&map.to_data_url())), None),
            _ => {
                let url = format!("{}.map", file_name.as_deref().unwrap_or("output"));
                (Some(declaration(&url)), Some(url))
            }
        };

        Ok(CompileResult {
            text,
            map: Some(map),
            declaration,
            map_url,
        })
    }

    /// Work out identity, directory and text of the entry unit
    async fn pending_unit(
        &mut self,
        path: Option<PathBuf>,
        content: Option<String>,
        input_map: Option<SourceMap>,
    ) -> Result<PendingUnit, SieveError> {
        let Some(path) = path else {
            let content =
                content.ok_or_else(|| SieveError::new("<request>", 0, ErrorKind::MissingSource))?;
            self.state.anonymous += 1;
            return Ok(PendingUnit {
                identity: format!("<anonymous-{}>", self.state.anonymous),
                dir: self.options.base_dir.clone(),
                text: content,
                input_map,
            });
        };

        let path = normalize_path(&self.options.base_dir.join(path));
        let identity = path_identity(&path);
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let text = match content {
            Some(content) => content,
            // Cached units are not read again
            None if self.state.store.lookup(&identity).is_some() => String::new(),
            None => self.loader.load(&path).await.map_err(|source| {
                SieveError::new(identity.as_str(), 0, ErrorKind::Load { path: path.clone(), source })
            })?,
        };

        Ok(PendingUnit {
            identity,
            dir,
            text,
            input_map,
        })
    }

    /// Build phase; rolls the session back when any unit fails
    async fn build(&mut self, pending: PendingUnit, flags: &FlagEnv) -> Result<UnitId, SieveError> {
        let units_before = self.state.store.len();
        let defaults_before = self.state.defaults.clone();
        let env = self.state.defaults.clone().overlay(flags);

        let built = Builder::new(
            Arc::clone(&self.loader),
            &self.syntax,
            self.options.track_positions,
            &mut self.state.store,
            &mut self.state.defaults,
            env,
        )
        .build(pending)
        .await;

        if built.is_err() {
            debug!(units = self.state.store.len() - units_before, "rolling back failed build");
            self.state.store.truncate(units_before);
            self.state.defaults = defaults_before;
        }
        built
    }
}

fn declaration(url: &str) -> String {
    format!("//# sourceMappingURL={}", url)
}
