pub mod k3s;
pub mod strategy;
pub mod tools;
