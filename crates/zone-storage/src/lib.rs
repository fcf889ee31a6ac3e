use async_trait::async_trait;
use zone_core::{Point, PointId, Zone, ZoneBounds, ZoneId, ZoneResult, ZoneSummary};

mod init;
mod notify;
mod reader;

pub use init::{NoopZoneInitializer, ZoneInitializer};
pub use notify::{GeometryListener, ListenerId, ListenerRegistry};
pub use reader::{ZoneCursor, ZoneReader, ZoneRow};
pub use zone_core::{ErrorCode, ZoneError};

#[async_trait]
pub trait ZoneRepository: Send + Sync {
    async fn is_label_available(&self, label: &str) -> ZoneResult<bool>;
    async fn add_zone(&self, label: &str) -> ZoneResult<Zone>;
    async fn delete_zone(&self, id: ZoneId) -> ZoneResult<()>;
    /// Returns `None` when the zone no longer exists; the caller's copy is
    /// stale in that case.
    async fn update_zone(&self, zone: &Zone) -> ZoneResult<Option<Zone>>;
    async fn add_point(&self, point: Point, zone_id: ZoneId) -> ZoneResult<Point>;
    async fn get_point(&self, id: PointId) -> ZoneResult<Option<Point>>;
    async fn get_zone(&self, id: ZoneId) -> ZoneResult<Option<Zone>>;
    async fn get_zones(&self) -> ZoneResult<Vec<ZoneSummary>>;
}

#[async_trait]
pub trait SpatialQueries: Send + Sync {
    async fn get_zone_bounds(&self, id: ZoneId) -> ZoneResult<Option<ZoneBounds>>;
    /// Smallest zone first.
    async fn get_zones_containing_point(&self, point: &Point) -> ZoneResult<ZoneCursor>;
    /// Largest zone first, never including `zone` itself.
    async fn get_zones_intersecting(&self, zone: &Zone) -> ZoneResult<ZoneCursor>;
    async fn distance_between(&self, point: &Point, zone_id: ZoneId) -> ZoneResult<Option<f64>>;
    async fn distance_to_closest_zone(&self, point: &Point) -> ZoneResult<Option<f64>>;
}

#[async_trait]
pub trait ZoneFlagRepository: Send + Sync {
    async fn set_zone_occupancy(&self, zone_id: ZoneId, occupied: bool) -> ZoneResult<()>;
    async fn get_zones_occupied(&self) -> ZoneResult<Vec<ZoneSummary>>;
    async fn set_zone_selected(&self, zone_id: ZoneId, selected: bool) -> ZoneResult<()>;
    async fn get_zones_selected(&self) -> ZoneResult<Vec<ZoneSummary>>;
    async fn clear_selected_zones(&self) -> ZoneResult<()>;
    async fn is_zone_selected(&self, zone_id: ZoneId) -> ZoneResult<bool>;
}
