//! Multi-module checking on top of `tsr-solver`.
//!
//! - `CheckSession`: one worker per module over a shared interner
//! - `ModuleGraph`: import edges and Tarjan cycle detection
//! - `SessionConfig` / `Workspace`: JSON configuration loaded with `anyhow`
//!   context on failure
//! - `tracing_config`: opt-in `tracing-subscriber` setup driven by `TSR_LOG`

pub mod config;
pub mod module_graph;
pub mod session;
pub mod tracing_config;

pub use config::{SessionConfig, Workspace};
pub use module_graph::{CircularDependency, ModuleGraph, ModuleId, ModuleInfo};
pub use session::{
    CheckSession, GuardExpr, ModuleReport, ModuleSource, Query, QueryResult, SessionReport,
};
pub use tracing_config::{LogFormat, init_tracing};
