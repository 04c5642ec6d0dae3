pub mod recent;
pub mod ring;
pub mod store;
