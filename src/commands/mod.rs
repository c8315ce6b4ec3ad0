pub mod analyze;
pub mod quality;
pub mod schema;
