//! brick-lib: the build engine behind `brick`.
//!
//! Build files (`BUCK`) declare targets. The parser turns them into raw
//! records, rule factories lower those into [`rules::BuildRule`]s, and the
//! [`graph`] module links the rules into an acyclic dependency graph. The
//! [`engine`] then builds the graph bottom-up, reusing outputs from the
//! [`cache`] whenever a rule's [`fingerprint`] is unchanged. The
//! [`testing`] module selects, runs and reports tests on top of a build.

pub mod cache;
pub mod config;
pub mod consts;
pub mod context;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod parser;
pub mod rules;
pub mod step;
pub mod target;
pub mod testing;
pub mod util;
