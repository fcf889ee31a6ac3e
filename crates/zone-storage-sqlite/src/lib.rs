use async_trait::async_trait;
use metrics::counter;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use zone_config::{env_var, env_var_bool, env_var_u32};
use zone_core::{
    validate_label, Point, PointId, Zone, ZoneBounds, ZoneError, ZoneId, ZoneResult, ZoneSummary,
};
use zone_geo::{ZoneGeometry, WGS84_SRID};
use zone_observability::{MUTATIONS_TOTAL, NOTIFICATIONS_TOTAL};
use zone_storage::{
    GeometryListener, ListenerId, ListenerRegistry, NoopZoneInitializer, SpatialQueries,
    ZoneCursor, ZoneFlagRepository, ZoneInitializer, ZoneReader, ZoneRepository, ZoneRow,
};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const TABLE_OCCUPIED: &str = "occupied";
const TABLE_SELECTED: &str = "selected";

const SELECT_ZONE: &str = "SELECT zone.id AS id, zone.label AS label FROM zone";
const SELECT_POINT: &str = "SELECT id, zone_id, longitude, latitude FROM point";
const SELECT_ZONE_POINT: &str = "SELECT zone.id AS id, zone.label AS label, \
     point.id AS point_id, point.zone_id AS point_zone_id, \
     point.longitude AS longitude, point.latitude AS latitude \
     FROM zone LEFT JOIN point ON point.zone_id = zone.id";
// Placed points in ring order, then points still waiting for a position.
const POINT_ORDER: &str = "point.ord IS NULL, point.ord, point.id";

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub notify_on_missing_update: bool,
}

impl SqliteConfig {
    pub fn from_env(default_url: &str) -> Self {
        Self {
            database_url: env_var("ZONE_SQLITE_URL", default_url.to_string()),
            max_connections: env_var_u32("ZONE_SQLITE_MAX_CONNECTIONS", 4),
            notify_on_missing_update: env_var_bool("ZONE_NOTIFY_ON_MISSING_UPDATE", false),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            notify_on_missing_update: false,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    fn pool_size(&self) -> u32 {
        // every connection to an in-memory database sees its own database
        if self.is_in_memory() {
            1
        } else {
            self.max_connections.max(1)
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum AreaOrder {
    SmallestFirst,
    LargestFirst,
}

/// Zone store on a single SQLite database.
///
/// Writes hold the write side of `write_gate` for their whole duration;
/// reads share the read side. Listeners are notified after the write has
/// committed and the gate is released.
pub struct SqliteZoneStore {
    pool: SqlitePool,
    write_gate: RwLock<()>,
    listeners: Arc<ListenerRegistry>,
    initializer: Arc<dyn ZoneInitializer>,
    notify_on_missing_update: bool,
}

impl SqliteZoneStore {
    pub async fn connect(config: &SqliteConfig) -> ZoneResult<Self> {
        Self::connect_with(
            config,
            Arc::new(ListenerRegistry::new()),
            Arc::new(NoopZoneInitializer),
        )
        .await
    }

    pub async fn connect_with(
        config: &SqliteConfig,
        listeners: Arc<ListenerRegistry>,
        initializer: Arc<dyn ZoneInitializer>,
    ) -> ZoneResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(map_err)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.pool_size())
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(map_err)?;

        let fresh = !is_initialized(&pool).await;
        MIGRATOR.run(&pool).await.map_err(map_err)?;
        if fresh {
            info!(url = %config.database_url, "Initialized the zone tables");
        }

        Ok(Self {
            pool,
            write_gate: RwLock::new(()),
            listeners,
            initializer,
            notify_on_missing_update: config.notify_on_missing_update,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    pub fn add_geometry_change_listener(&self, listener: Arc<dyn GeometryListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_geometry_change_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn geometry_changed(&self) {
        counter!(NOTIFICATIONS_TOTAL).increment(1);
        self.listeners.notify_geometry_changed();
    }

    async fn label_taken(&self, label: &str) -> ZoneResult<bool> {
        let row = sqlx::query("SELECT 1 FROM zone WHERE label = ? LIMIT 1")
            .bind(label)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.is_some())
    }

    async fn fetch_zone(&self, id: ZoneId) -> ZoneResult<Option<Zone>> {
        let mut conn = self.pool.acquire().await.map_err(map_err)?;
        load_zone(&mut *conn, id).await
    }

    async fn fetch_zones_by_id(&self, ids: &[ZoneId], order: AreaOrder) -> ZoneResult<ZoneCursor> {
        if ids.is_empty() {
            return Ok(ZoneReader::new(Vec::new()));
        }

        let direction = match order {
            AreaOrder::SmallestFirst => "ASC",
            AreaOrder::LargestFirst => "DESC",
        };
        let wanted = id_list(ids.iter().map(ZoneId::get))?;
        let rows = sqlx::query(&format!(
            "{SELECT_ZONE_POINT} WHERE zone.id IN (SELECT value FROM json_each(?)) \
             ORDER BY zone.area {direction}, zone.id, {POINT_ORDER}"
        ))
        .bind(wanted)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let rows = rows
            .iter()
            .map(zone_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_err)?;
        Ok(ZoneReader::new(rows))
    }

    async fn fetch_summaries(&self, sql: &str) -> ZoneResult<Vec<ZoneSummary>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        rows.iter()
            .map(|row| -> Result<ZoneSummary, sqlx::Error> {
                Ok(ZoneSummary {
                    id: ZoneId::new(row.try_get("id")?),
                    label: row.try_get("label")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_err)
    }

    /// Writes the zone and reads it back in the same transaction. `None`
    /// when the zone no longer exists.
    async fn write_zone(
        &self,
        zone: &Zone,
        geometry: Option<&ZoneGeometry>,
    ) -> ZoneResult<Option<Zone>> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let exists = sqlx::query("SELECT 1 FROM zone WHERE id = ?")
            .bind(zone.id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_err)?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let owned: HashSet<i64> = sqlx::query_scalar("SELECT id FROM point WHERE zone_id = ?")
            .bind(zone.id.get())
            .fetch_all(&mut *tx)
            .await
            .map_err(map_err)?
            .into_iter()
            .collect();
        let stray = zone
            .points
            .iter()
            .filter_map(|point| point.id)
            .find(|id| !owned.contains(&id.get()));
        if let Some(stray) = stray {
            warn!(zone_id = %zone.id, point_id = %stray, "Ring names a point the zone does not own");
            return Err(ZoneError::NotFound(format!("point {stray} in zone {}", zone.id)));
        }

        if let Some(geometry) = geometry {
            let bounds = geometry.bounds();
            sqlx::query(
                "UPDATE zone SET srid = ?, geometry = ?, min_x = ?, min_y = ?, max_x = ?, max_y = ?, area = ? \
                 WHERE id = ?",
            )
            .bind(WGS84_SRID)
            .bind(geometry.to_json()?)
            .bind(bounds.min.x())
            .bind(bounds.min.y())
            .bind(bounds.max.x())
            .bind(bounds.max.y())
            .bind(geometry.area())
            .bind(zone.id.get())
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

            let kept: Vec<PointId> = zone.points.iter().filter_map(|point| point.id).collect();
            let unpersisted = zone.points.len() - kept.len();
            if unpersisted > 0 {
                warn!(
                    zone_id = %zone.id,
                    unpersisted,
                    "Points without an id are part of the ring but are not stored"
                );
            }

            let pruned = sqlx::query(
                "DELETE FROM point WHERE zone_id = ? AND id NOT IN (SELECT value FROM json_each(?))",
            )
            .bind(zone.id.get())
            .bind(id_list(kept.iter().map(PointId::get))?)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?
            .rows_affected();

            for (order, point) in zone.points.iter().enumerate() {
                let Some(point_id) = point.id else {
                    continue;
                };
                sqlx::query(
                    "UPDATE point SET ord = ?, longitude = ?, latitude = ? \
                     WHERE id = ? AND zone_id = ?",
                )
                .bind(order as i64)
                .bind(point.longitude)
                .bind(point.latitude)
                .bind(point_id.get())
                .bind(zone.id.get())
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            }

            debug!(
                zone_id = %zone.id,
                points = zone.points.len(),
                pruned,
                "Rewrote zone ring"
            );
        }

        sqlx::query("UPDATE zone SET label = ? WHERE id = ?")
            .bind(&zone.label)
            .bind(zone.id.get())
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

        let written = load_zone(&mut *tx, zone.id).await?;
        tx.commit().await.map_err(map_err)?;
        Ok(written)
    }

    async fn set_flag(&self, table: &str, zone_id: ZoneId, on: bool) -> ZoneResult<()> {
        let _guard = self.write_gate.write().await;
        let sql = if on {
            format!("INSERT OR IGNORE INTO {table} (zone_id) VALUES (?)")
        } else {
            format!("DELETE FROM {table} WHERE zone_id = ?")
        };
        sqlx::query(&sql)
            .bind(zone_id.get())
            .execute(&self.pool)
            .await
            .map_err(|err| map_zone_ref_err(err, zone_id))?;
        debug!(zone_id = %zone_id, table, on, "Updated zone flag");
        Ok(())
    }

    async fn flagged_zones(&self, table: &str) -> ZoneResult<Vec<ZoneSummary>> {
        let _guard = self.write_gate.read().await;
        self.fetch_summaries(&format!(
            "{SELECT_ZONE} JOIN {table} ON zone.id = {table}.zone_id ORDER BY zone.id"
        ))
        .await
    }
}

impl fmt::Debug for SqliteZoneStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteZoneStore")
            .field("pool", &self.pool)
            .field("listeners", &self.listeners)
            .field("notify_on_missing_update", &self.notify_on_missing_update)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ZoneRepository for SqliteZoneStore {
    async fn is_label_available(&self, label: &str) -> ZoneResult<bool> {
        let _guard = self.write_gate.read().await;
        Ok(!self.label_taken(label).await?)
    }

    async fn add_zone(&self, label: &str) -> ZoneResult<Zone> {
        validate_label(label)?;
        let _guard = self.write_gate.write().await;
        if self.label_taken(label).await? {
            return Err(ZoneError::DuplicateLabel(label.to_string()));
        }
        let result = sqlx::query("INSERT INTO zone (label, srid) VALUES (?, ?)")
            .bind(label)
            .bind(WGS84_SRID)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        let id = ZoneId::new(result.last_insert_rowid());

        if let Err(err) = self.initializer.init_zone(id).await {
            warn!(zone_id = %id, error = %err, "Zone initializer failed, removing the zone");
            sqlx::query("DELETE FROM zone WHERE id = ?")
                .bind(id.get())
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            return Err(err);
        }

        counter!(MUTATIONS_TOTAL, "op" => "add_zone").increment(1);
        debug!(zone_id = %id, label, "Added zone");
        Ok(Zone::new(id, label))
    }

    async fn delete_zone(&self, id: ZoneId) -> ZoneResult<()> {
        let _guard = self.write_gate.write().await;
        let removed = sqlx::query("DELETE FROM zone WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(map_err)?
            .rows_affected();
        counter!(MUTATIONS_TOTAL, "op" => "delete_zone").increment(1);
        debug!(zone_id = %id, removed, "Deleted zone");
        Ok(())
    }

    async fn update_zone(&self, zone: &Zone) -> ZoneResult<Option<Zone>> {
        validate_label(&zone.label)?;
        let geometry = if zone.points.is_empty() {
            None
        } else {
            Some(ZoneGeometry::from_points(&zone.points)?)
        };

        let written = {
            let _guard = self.write_gate.write().await;
            self.write_zone(zone, geometry.as_ref()).await?
        };

        let Some(written) = written else {
            debug!(zone_id = %zone.id, "Update for a zone that no longer exists");
            if self.notify_on_missing_update {
                self.geometry_changed();
            }
            return Ok(None);
        };

        counter!(MUTATIONS_TOTAL, "op" => "update_zone").increment(1);
        self.geometry_changed();
        Ok(Some(written))
    }

    async fn add_point(&self, point: Point, zone_id: ZoneId) -> ZoneResult<Point> {
        let _guard = self.write_gate.write().await;
        let result = sqlx::query(
            "INSERT INTO point (zone_id, ord, longitude, latitude) VALUES (?, NULL, ?, ?)",
        )
        .bind(zone_id.get())
        .bind(point.longitude)
        .bind(point.latitude)
        .execute(&self.pool)
        .await
        .map_err(|err| map_zone_ref_err(err, zone_id))?;

        let id = PointId::new(result.last_insert_rowid());
        counter!(MUTATIONS_TOTAL, "op" => "add_point").increment(1);
        debug!(zone_id = %zone_id, point_id = %id, "Added point");
        Ok(Point::persisted(id, zone_id, point.longitude, point.latitude))
    }

    async fn get_point(&self, id: PointId) -> ZoneResult<Option<Point>> {
        let _guard = self.write_gate.read().await;
        let row = sqlx::query(&format!("{SELECT_POINT} WHERE id = ?"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;

        row.map(|row| -> Result<Point, sqlx::Error> {
            Ok(Point::persisted(
                PointId::new(row.try_get("id")?),
                ZoneId::new(row.try_get("zone_id")?),
                row.try_get("longitude")?,
                row.try_get("latitude")?,
            ))
        })
        .transpose()
        .map_err(map_err)
    }

    async fn get_zone(&self, id: ZoneId) -> ZoneResult<Option<Zone>> {
        let _guard = self.write_gate.read().await;
        self.fetch_zone(id).await
    }

    async fn get_zones(&self) -> ZoneResult<Vec<ZoneSummary>> {
        let _guard = self.write_gate.read().await;
        self.fetch_summaries(&format!("{SELECT_ZONE} ORDER BY zone.id"))
            .await
    }
}

#[async_trait]
impl SpatialQueries for SqliteZoneStore {
    async fn get_zone_bounds(&self, id: ZoneId) -> ZoneResult<Option<ZoneBounds>> {
        let _guard = self.write_gate.read().await;
        let row = sqlx::query(
            "SELECT min_x, min_y, max_x, max_y FROM zone WHERE id = ? AND geometry IS NOT NULL",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        row.map(|row| -> Result<ZoneBounds, sqlx::Error> {
            Ok(ZoneBounds::new(
                row.try_get("min_x")?,
                row.try_get("min_y")?,
                row.try_get("max_x")?,
                row.try_get("max_y")?,
            ))
        })
        .transpose()
        .map_err(map_err)
    }

    async fn get_zones_containing_point(&self, point: &Point) -> ZoneResult<ZoneCursor> {
        let _guard = self.write_gate.read().await;
        let candidates = sqlx::query(
            "SELECT id, geometry FROM zone WHERE geometry IS NOT NULL \
             AND min_x <= ? AND max_x >= ? AND min_y <= ? AND max_y >= ? \
             ORDER BY area ASC, id ASC",
        )
        .bind(point.x())
        .bind(point.x())
        .bind(point.y())
        .bind(point.y())
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let mut ids = Vec::new();
        for row in &candidates {
            let (id, geometry) = stored_geometry(row)?;
            if geometry.contains(point) {
                ids.push(id);
            }
        }
        self.fetch_zones_by_id(&ids, AreaOrder::SmallestFirst).await
    }

    async fn get_zones_intersecting(&self, zone: &Zone) -> ZoneResult<ZoneCursor> {
        let probe = ZoneGeometry::polygon_from_points(&zone.points)?;
        let bounds = probe.bounds();

        let _guard = self.write_gate.read().await;
        let candidates = sqlx::query(
            "SELECT id, geometry FROM zone WHERE geometry IS NOT NULL AND id != ? \
             AND min_x <= ? AND max_x >= ? AND min_y <= ? AND max_y >= ? \
             ORDER BY area DESC, id ASC",
        )
        .bind(zone.id.get())
        .bind(bounds.max.x())
        .bind(bounds.min.x())
        .bind(bounds.max.y())
        .bind(bounds.min.y())
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let mut ids = Vec::new();
        for row in &candidates {
            let (id, geometry) = stored_geometry(row)?;
            if geometry.intersects(&probe) {
                ids.push(id);
            }
        }
        self.fetch_zones_by_id(&ids, AreaOrder::LargestFirst).await
    }

    async fn distance_between(&self, point: &Point, zone_id: ZoneId) -> ZoneResult<Option<f64>> {
        let _guard = self.write_gate.read().await;
        let row = sqlx::query("SELECT id, geometry FROM zone WHERE id = ? AND geometry IS NOT NULL")
            .bind(zone_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;

        match row {
            Some(row) => {
                let (_, geometry) = stored_geometry(&row)?;
                Ok(geometry.distance_to(point))
            }
            None => Ok(None),
        }
    }

    async fn distance_to_closest_zone(&self, point: &Point) -> ZoneResult<Option<f64>> {
        let _guard = self.write_gate.read().await;
        let rows = sqlx::query("SELECT id, geometry FROM zone WHERE geometry IS NOT NULL")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;

        let mut closest: Option<f64> = None;
        for row in &rows {
            let (_, geometry) = stored_geometry(row)?;
            if let Some(distance) = geometry.distance_to(point) {
                closest = Some(closest.map_or(distance, |best| best.min(distance)));
            }
        }
        Ok(closest)
    }
}

#[async_trait]
impl ZoneFlagRepository for SqliteZoneStore {
    async fn set_zone_occupancy(&self, zone_id: ZoneId, occupied: bool) -> ZoneResult<()> {
        self.set_flag(TABLE_OCCUPIED, zone_id, occupied).await
    }

    async fn get_zones_occupied(&self) -> ZoneResult<Vec<ZoneSummary>> {
        self.flagged_zones(TABLE_OCCUPIED).await
    }

    async fn set_zone_selected(&self, zone_id: ZoneId, selected: bool) -> ZoneResult<()> {
        self.set_flag(TABLE_SELECTED, zone_id, selected).await
    }

    async fn get_zones_selected(&self) -> ZoneResult<Vec<ZoneSummary>> {
        self.flagged_zones(TABLE_SELECTED).await
    }

    async fn clear_selected_zones(&self) -> ZoneResult<()> {
        let _guard = self.write_gate.write().await;
        sqlx::query(&format!("DELETE FROM {TABLE_SELECTED}"))
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn is_zone_selected(&self, zone_id: ZoneId) -> ZoneResult<bool> {
        let _guard = self.write_gate.read().await;
        let row = sqlx::query(&format!(
            "SELECT 1 FROM {TABLE_SELECTED} WHERE zone_id = ?"
        ))
        .bind(zone_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row.is_some())
    }
}

async fn is_initialized(pool: &SqlitePool) -> bool {
    match sqlx::query("SELECT 1 FROM zone LIMIT 1")
        .fetch_optional(pool)
        .await
    {
        Ok(_) => true,
        Err(err) => {
            debug!(error = %err, "Zone tables not found");
            false
        }
    }
}

async fn load_zone(conn: &mut SqliteConnection, id: ZoneId) -> ZoneResult<Option<Zone>> {
    let rows = sqlx::query(&format!(
        "{SELECT_ZONE_POINT} WHERE zone.id = ? ORDER BY {POINT_ORDER}"
    ))
    .bind(id.get())
    .fetch_all(&mut *conn)
    .await
    .map_err(map_err)?;

    let rows = rows
        .iter()
        .map(zone_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_err)?;
    Ok(ZoneReader::new(rows).next())
}

fn zone_row(row: &SqliteRow) -> Result<ZoneRow, sqlx::Error> {
    let zone_id = ZoneId::new(row.try_get("id")?);
    let label: String = row.try_get("label")?;
    let point_id: Option<i64> = row.try_get("point_id")?;

    let Some(point_id) = point_id else {
        return Ok(ZoneRow::zone_only(zone_id, label));
    };
    let point = Point::persisted(
        PointId::new(point_id),
        ZoneId::new(row.try_get("point_zone_id")?),
        row.try_get("longitude")?,
        row.try_get("latitude")?,
    );
    Ok(ZoneRow::with_point(zone_id, label, point))
}

fn stored_geometry(row: &SqliteRow) -> ZoneResult<(ZoneId, ZoneGeometry)> {
    let id: i64 = row.try_get("id").map_err(map_err)?;
    let raw: String = row.try_get("geometry").map_err(map_err)?;
    Ok((ZoneId::new(id), ZoneGeometry::from_json(&raw)?))
}

// JSON array bound as a single parameter and expanded with `json_each`.
fn id_list(ids: impl Iterator<Item = i64>) -> ZoneResult<String> {
    serde_json::to_string(&ids.collect::<Vec<_>>()).map_err(map_err)
}

fn map_zone_ref_err(err: sqlx::Error, zone_id: ZoneId) -> ZoneError {
    let missing_zone = err
        .as_database_error()
        .is_some_and(|db| db.is_foreign_key_violation());
    if missing_zone {
        ZoneError::NotFound(format!("zone {zone_id}"))
    } else {
        map_err(err)
    }
}

fn map_err(err: impl fmt::Display) -> ZoneError {
    error!(error = %err, "Zone storage failure");
    ZoneError::storage(err.to_string())
}
