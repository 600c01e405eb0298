pub mod health;
pub mod latency;
pub mod quiz;
pub mod routes;
