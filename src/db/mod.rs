pub mod connection;
pub mod schema;
pub mod sites;
pub mod runs;
pub mod pages;
pub mod issues;
pub mod baselines;
pub mod diffs;

pub use connection::Database;
