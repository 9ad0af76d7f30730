pub mod config;
pub mod directory;
pub mod error;
pub mod export;
pub mod model;
pub mod orchestrator;
pub mod retry;
pub mod scanner;
pub mod store;

pub use config::ScanConfig;
pub use directory::{AccountDirectory, DirectoryClient};
pub use error::{AccessError, CheckError, ScanError, StoreError};
pub use model::{Account, AccountStatus, Finding, Pillar, ScanRunResult, UnscannableAccount};
pub use orchestrator::ScanOrchestrator;
pub use scanner::{AccountScanner, Check, EvidenceSource, RoleBroker};
pub use store::{
    BatchStoreResult, FindingFilter, JsonFileBackend, MemoryBackend, ResilientFindingStore,
    StoreBackend,
};
