//! `composed_core` turns template strings into live values. A template such as
//! `"{craft} at altitude altitude_km km"` references variables held in a
//! registry; a [`ComposedString`] resolves those references on first read,
//! caches the result and recomputes it whenever one of the referenced
//! variables changes.
//!
//! ## Pipeline
//!
//! ```text
//! Template
//!   → Reference scan (logos tokens → `{name}` brackets + bare identifier words)
//!   → Dependency extraction (brackets always, bare words only if the registry knows them)
//!   → Subscriptions (one per segment and dependency, released on drop or template change)
//!   → Composition (substitute resolved text against the pristine template)
//!   → Cache (served until the next change notification)
//! ```
//!
//! ## Reference syntax
//!
//! - `{name}`: always a reference. Missing variables resolve to nothing, so
//!   templates can mention variables before they are defined.
//! - `name`: a bare identifier is a reference only when a variable with that
//!   name exists, so ordinary prose is left alone.
//!
//! Variables live in three disjoint segments (string, number, bool) and are
//! looked up in that order. Numbers print in shortest round-trip form (`3`,
//! `3.14159`), booleans as `True` / `False`.
//!
//! ## Modules
//!
//! - [`config`]: loading variables from `composed.toml` and the variable
//!   files it lists (JSON, TOML, YAML, plain text).
//!
//! ## Key Types
//!
//! - [`VariableRegistry`]: the contract a variable table must fulfil.
//! - [`VariableStore`]: an in-memory registry.
//! - [`ComposedValue`]: the generic cached, dependency-tracked value.
//! - [`ComposedString`]: the string specialization.
//! - [`Subscription`]: handle that releases a registration when dropped.

pub use composed::*;
pub use config::*;
pub use error::*;
pub use extract::*;
pub use registry::*;
pub use store::*;
pub use string::*;
pub use value::*;

mod composed;
pub mod config;
#[allow(unused_assignments)]
mod error;
mod extract;
mod registry;
mod store;
mod string;
mod value;

#[cfg(test)]
mod __fixtures;
