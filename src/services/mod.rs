pub mod metadata;
pub mod reconcile;

pub use metadata::{MetadataSearch, TmdbClient};
pub use reconcile::{AddOutcome, Reconciler};
