pub mod boarding;
pub mod clock;
pub mod codes;
pub mod error;
pub mod ledger;
pub mod materializer;
pub mod memory;
pub mod models;
pub mod portal;
pub mod repository;
pub mod retry;
pub mod search;
pub mod status_log;

pub use error::{EngineError, EngineResult, ErrorClass};
pub use memory::MemoryStore;
pub use portal::{EngineConfig, Portal};
pub use repository::{EngineStore, StoreError, StoreResult};
