//! Remote-control REST surface over an in-memory modeling graph.
//!
//! Family configurations ([`families`]) are compiled into CRUD routes
//! ([`compiler`]) and served next to hand-written cross-cutting routes
//! ([`routes`]) by a transport-independent [`Router`].

pub mod compiler;
pub mod config;
pub mod error;
pub mod families;
pub mod family;
pub mod geometry;
pub mod graph;
pub mod integrity;
pub mod kind;
pub mod response;
pub mod router;
pub mod routes;
pub mod validate;

use std::path::PathBuf;

pub use config::{read_config, Config, LayoutConfig};
pub use error::{ApiError, ConfigError, RouterError};
pub use families::Family;
pub use graph::{Graph, HostError};
pub use kind::{ElementKind, ViewKind};
pub use response::{ApiRequest, ApiResponse, Method};
pub use router::Router;

// --- Workspace ---

/// Mutable state every handler runs against: the open project plus the
/// layout defaults used when a request gives no coordinates.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub graph: Graph,
    pub layout: LayoutConfig,
    /// Where the project was last saved to or opened from.
    pub project_path: Option<PathBuf>,
}

impl Workspace {
    pub fn new(layout: LayoutConfig) -> Self {
        Workspace {
            graph: Graph::new(),
            layout,
            project_path: None,
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Workspace::new(LayoutConfig::default())
    }
}
