pub mod audit;
pub mod config;
pub mod hash;
pub mod queue;
