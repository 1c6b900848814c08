//! Parser layer
//! - traits.rs: InstalledVersionLookup trait and ParseError
//! - gemfile_lock.rs: Gemfile.lock parser

pub mod gemfile_lock;
pub mod traits;

pub use gemfile_lock::GemfileLock;
pub use traits::{InstalledVersionLookup, ParseError};
