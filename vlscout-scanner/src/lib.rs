pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod frontier;
pub mod ledger;
pub mod links;
pub mod normalizer;
pub mod result;

pub use credentials::{Credential, CredentialPool};
pub use error::ScanError;
pub use fetcher::{Fetcher, FetcherConfig};
pub use frontier::{Discovered, Frontier, FrontierItem, ItemProcessor, ProgressCallback, WorkerPool};
pub use ledger::DedupLedger;
pub use links::LinkConfig;
pub use result::{FetchOutcome, FetchedDocument};
