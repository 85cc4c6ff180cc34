pub mod connections;
pub mod locations;
