//! Documentation builders for DocSmith.
//!
//! [`BuildContext`] carries the paths and detected layout of one build run;
//! [`BuilderRegistry`] picks the first [`Builder`] able to handle it.

pub mod context;
pub mod generators;
pub mod scan;
pub mod venv;

pub use context::{BuildContext, TEMP_DIR_NAME};
pub use generators::{
    Builder, BuilderRegistry, MkDocsBuilder, PdocBuilder, ReadTheDocsBuilder, SphinxBuilder,
};
pub use venv::{ToolEnv, ToolOptions};
