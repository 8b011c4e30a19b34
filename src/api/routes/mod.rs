pub mod balancer;
pub mod health;
pub mod network;
pub mod stats;
