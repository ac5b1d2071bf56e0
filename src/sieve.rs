//! Preprocessor core
//!
//!     Directives are single lines starting with a configurable marker (`//#` by default):
//!
//!         //#include path/to/file.js::label::other
//!         //#without shared/*.js
//!         //#if flag >= 2          //#unless flag          //#endif / //#endunless / //#end if
//!         //#label name            //#endlabel
//!         //#set flag value        //#unset flag
//!
//!     Every other line is opaque content and is carried through untouched.
//!
//!     A [session::Session] owns everything that outlives a single compile: the unit cache,
//!     the flag defaults seeded by root-level `set` directives, every unit's label
//!     accumulator and the inclusion caches. Those session-wide effects are deliberate and
//!     observable, a fresh session gives a fresh slate.

pub mod accumulator;
pub mod builder;
pub mod directive;
pub mod error;
pub mod flags;
pub mod literal;
pub mod loader;
pub mod position;
pub mod resolve;
pub mod session;
pub mod sourcemap;
pub mod tree;
