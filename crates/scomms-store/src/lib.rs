pub mod kv;
pub mod spool;
pub mod trust;

mod error;

pub use error::{Result, StoreError};
pub use kv::KvStore;
pub use spool::FileSpool;
pub use trust::{TrustRecord, TrustStore};
