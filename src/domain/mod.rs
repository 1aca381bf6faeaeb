//! Domain layer: site model, loading, enrichment, and object application.

pub mod applier;
pub mod enricher;
pub mod loader;
pub mod model;
pub mod tasks;

pub use applier::{Applier, ApplyEvent, ApplyListener, ConsoleListener, NullListener};
pub use enricher::Enricher;
pub use loader::Source;
pub use model::{Cluster, Config, Node};
