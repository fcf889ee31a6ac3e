use async_trait::async_trait;
use zone_core::{ZoneId, ZoneResult};

/// Per-zone auxiliary state (action history and the like) that has to exist
/// as soon as a zone does. Called once, right after the zone row is written
/// and while the store still holds its write gate, so it must not call back
/// into the store. An error removes the new zone again.
#[async_trait]
pub trait ZoneInitializer: Send + Sync {
    async fn init_zone(&self, zone_id: ZoneId) -> ZoneResult<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopZoneInitializer;

#[async_trait]
impl ZoneInitializer for NoopZoneInitializer {
    async fn init_zone(&self, _zone_id: ZoneId) -> ZoneResult<()> {
        Ok(())
    }
}
