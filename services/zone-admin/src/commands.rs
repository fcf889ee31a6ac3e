use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use zone_core::{Point, PointId, Zone, ZoneId};
use zone_storage::{SpatialQueries, ZoneFlagRepository, ZoneRepository};
use zone_storage_sqlite::SqliteZoneStore;

use crate::cli::Command;

pub async fn run(store: &SqliteZoneStore, command: Command) -> Result<Value> {
    let output = match command {
        Command::AddZone { label } => to_json(store.add_zone(&label).await?)?,
        Command::DeleteZone { zone } => {
            store.delete_zone(ZoneId::new(zone)).await?;
            Value::Null
        }
        Command::Rename { zone, label } => {
            if !store.is_label_available(&label).await? {
                bail!("label {label:?} is already in use");
            }
            let mut current = load_zone(store, zone).await?;
            current.label = label;
            to_json(store.update_zone(&current).await?)?
        }
        Command::AddPoint {
            zone,
            longitude,
            latitude,
        } => {
            let point = store
                .add_point(Point::new(longitude, latitude), ZoneId::new(zone))
                .await?;
            to_json(point)?
        }
        Command::RemovePoint { zone, point } => {
            let mut current = load_zone(store, zone).await?;
            let before = current.points.len();
            current
                .points
                .retain(|candidate| candidate.id != Some(PointId::new(point)));
            if current.points.len() == before {
                bail!("point {point} is not part of zone {zone}");
            }
            to_json(store.update_zone(&current).await?)?
        }
        Command::Commit { zone } => {
            let current = load_zone(store, zone).await?;
            to_json(store.update_zone(&current).await?)?
        }
        Command::Show { zone } => to_json(store.get_zone(ZoneId::new(zone)).await?)?,
        Command::Point { point } => to_json(store.get_point(PointId::new(point)).await?)?,
        Command::List => to_json(store.get_zones().await?)?,
        Command::Bounds { zone } => to_json(store.get_zone_bounds(ZoneId::new(zone)).await?)?,
        Command::Containing {
            longitude,
            latitude,
        } => {
            let zones: Vec<Zone> = store
                .get_zones_containing_point(&Point::new(longitude, latitude))
                .await?
                .collect();
            to_json(zones)?
        }
        Command::Intersecting { zone } => {
            let current = load_zone(store, zone).await?;
            let zones: Vec<Zone> = store.get_zones_intersecting(&current).await?.collect();
            to_json(zones)?
        }
        Command::Distance {
            longitude,
            latitude,
            zone,
        } => {
            let point = Point::new(longitude, latitude);
            let metres = match zone {
                Some(zone) => store.distance_between(&point, ZoneId::new(zone)).await?,
                None => store.distance_to_closest_zone(&point).await?,
            };
            json!({ "metres": metres })
        }
        Command::Occupy { zone, off } => {
            store.set_zone_occupancy(ZoneId::new(zone), !off).await?;
            Value::Null
        }
        Command::Occupied => to_json(store.get_zones_occupied().await?)?,
        Command::Select { zone, off } => {
            store.set_zone_selected(ZoneId::new(zone), !off).await?;
            Value::Null
        }
        Command::Selected => to_json(store.get_zones_selected().await?)?,
        Command::ClearSelection => {
            store.clear_selected_zones().await?;
            Value::Null
        }
        Command::IsSelected { zone } => to_json(store.is_zone_selected(ZoneId::new(zone)).await?)?,
    };
    Ok(output)
}

async fn load_zone(store: &SqliteZoneStore, zone: i64) -> Result<Zone> {
    store
        .get_zone(ZoneId::new(zone))
        .await?
        .with_context(|| format!("zone {zone} not found"))
}

fn to_json<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_storage_sqlite::SqliteConfig;

    #[tokio::test]
    async fn draw_commit_and_query_a_zone() {
        let store = SqliteZoneStore::connect(&SqliteConfig::in_memory())
            .await
            .unwrap();

        let zone = run(&store, Command::AddZone { label: "park".into() })
            .await
            .unwrap();
        let zone_id = zone["id"].as_i64().unwrap();
        for (longitude, latitude) in [(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)] {
            run(
                &store,
                Command::AddPoint {
                    zone: zone_id,
                    longitude,
                    latitude,
                },
            )
            .await
            .unwrap();
        }
        run(&store, Command::Commit { zone: zone_id }).await.unwrap();

        let found = run(
            &store,
            Command::Containing {
                longitude: 5.0,
                latitude: 5.0,
            },
        )
        .await
        .unwrap();
        assert_eq!(found[0]["label"], "park");
        assert_eq!(found[0]["points"].as_array().unwrap().len(), 4);

        let bounds = run(&store, Command::Bounds { zone: zone_id }).await.unwrap();
        assert_eq!(bounds["max"]["longitude"], 10.0);
    }

    #[tokio::test]
    async fn rename_refuses_taken_labels() {
        let store = SqliteZoneStore::connect(&SqliteConfig::in_memory())
            .await
            .unwrap();
        run(&store, Command::AddZone { label: "a".into() }).await.unwrap();
        let b = run(&store, Command::AddZone { label: "b".into() }).await.unwrap();

        let result = run(
            &store,
            Command::Rename {
                zone: b["id"].as_i64().unwrap(),
                label: "a".into(),
            },
        )
        .await;
        assert!(result.is_err());
    }
}
