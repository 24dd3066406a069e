//! Comment-directive text preprocessor.
//!
//! Source files carry directives in line comments (`//#if`, `//#while`,
//! `//#include`, ...) and inline substitutions (`/*$expr$*/`).  A run
//! selects files under one or more source roots, scans them once for
//! global definitions and exclusion predicates, then preprocesses each
//! remaining file into the target directory.
//!
//! # Quick start
//!
//! ```rust
//! use dirpp::{Config, Preprocessor};
//!
//! let pp = Preprocessor::new(Config::default());
//! let out = pp
//!     .process_str("demo.txt", "//#define N 3\n//#if N > 2\nn = /*$N * 7$*/\n//#endif\n")
//!     .unwrap();
//! assert_eq!(out, "n = 21\n");
//! ```

pub mod cli;
pub mod comments;
pub mod config;
pub mod context;
pub mod directive;
pub mod engine;
pub mod error;
pub mod expr;
pub mod extension;
pub mod fs;
pub mod output;
pub mod pattern;
pub mod sources;
pub mod special;
pub mod state;

// Re-exports for convenience.
pub use comments::CommentMode;
pub use config::{Config, ConfigError};
pub use context::VariableContext;
pub use engine::{Message, MessageLevel, Preprocessor, RunReport};
pub use error::{Error, ErrorKind, ExprError, FilePosition, Result};
pub use expr::Value;
pub use extension::{Extension, FnExtension};
pub use fs::{DiskFs, FileSystem, MemoryFs};
pub use output::Eol;
pub use sources::SourceFile;
pub use special::SpecialVariables;
