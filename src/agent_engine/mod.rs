pub mod cooldown;
pub mod engine;
pub mod escalation;
pub mod state;
