pub mod baselines;
pub mod health;
pub mod runs;
pub mod sites;
