pub mod dynamo;
pub mod error;
mod marshal;
pub mod memory;
pub mod store;

pub use dynamo::DynamoRequestStore;
pub use error::StoreError;
pub use memory::InMemoryStore;
pub use store::{ChangeEvent, ChangeStream, RequestStore, StatusUpdate};
