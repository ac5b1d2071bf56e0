//! # sieve
//!
//! A text-level conditional-compilation preprocessor.
//!
//! File Layout
//!
//! The library mirrors the pipeline it implements. Everything lives under `src/sieve`:
//!
//!     src/sieve
//!       ├── literal.rs      Literal coercion, conditions and comparisons
//!       ├── flags.rs        Flag environments and label selections
//!       ├── directive.rs    Directive line recognition and operand parsing
//!       ├── tree.rs         Document trees and source units
//!       ├── loader.rs       Path resolution and content loading (the I/O seam)
//!       ├── builder.rs      Text + directives -> document trees (async, cached)
//!       ├── position.rs     Per-line provenance and input map detection
//!       ├── sourcemap.rs    Source map v3 model and VLQ codec
//!       ├── accumulator.rs  Output map accumulation across nested includes
//!       ├── resolve.rs      Document trees -> text, under labels and flags
//!       ├── session.rs      Compile requests and the session that caches units
//!       └── error.rs
//!
//! The pipeline is strictly two-phase per compile request: every unit reachable from the
//! request is built (and cached on the session) before resolution walks the trees.

pub mod sieve;

pub use sieve::error::{ErrorKind, LoadError, SieveError};
pub use sieve::flags::{FlagEnv, LabelSelection};
pub use sieve::literal::{Comparison, Condition, Test, Value};
pub use sieve::loader::{FsLoader, MemoryLoader, SourceLoader};
pub use sieve::session::{CompileRequest, CompileResult, MapMode, Session, SessionOptions};
pub use sieve::sourcemap::SourceMap;
