pub mod routes;
pub mod stats;

pub use routes::{router, ApiState};
