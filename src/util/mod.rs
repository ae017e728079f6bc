pub mod ids;
pub mod telemetry;

pub use ids::*;
pub use telemetry::*;
