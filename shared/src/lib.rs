pub mod geo;
pub mod logger;
pub mod tracking;
pub mod types;


pub use geo::GeoError;
pub use types::{GeoPoint, NamedWaypoint, PositionUpdate, Role};
