pub mod aws;
pub mod error;
pub mod local;
pub mod traits;

pub use aws::{AthenaQueryEngine, GlueStagingCatalog, RedshiftVitalsWarehouse, S3CuratedStore};
pub use error::LakeError;
pub use local::{LakeRow, LocalLake};
pub use traits::{
    Catalog, ObjectStore, QueryEngine, QueryHandle, QueryState, StatementHandle, StatementState,
    Warehouse,
};
