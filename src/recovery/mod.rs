pub mod strategy;
pub mod stuck;
