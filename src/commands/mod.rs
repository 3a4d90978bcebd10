//! CLI commands implementation

pub mod chunk;
pub mod ingest;
pub mod init;
pub mod link;
pub mod path;
pub mod reconcile;
pub mod search;
pub mod status;

pub use chunk::*;
pub use ingest::*;
pub use init::*;
pub use link::*;
pub use path::*;
pub use reconcile::*;
pub use search::*;
pub use status::*;
