pub mod domain;
pub mod error;
pub mod ids;

pub use domain::{validate_label, Point, Zone, ZoneBounds, ZoneSummary};
pub use error::{ErrorCode, ZoneError, ZoneResult};
pub use ids::{PointId, ZoneId};
