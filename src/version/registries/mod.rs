//! Registry implementations for fetching candidate versions

pub mod github;
pub mod server;

pub use github::GitHubRegistry;
pub use server::ServerRegistry;
