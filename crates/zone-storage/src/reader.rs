use std::iter::{FusedIterator, Peekable};
use zone_core::{Point, Zone, ZoneId};

/// One row of a zone query. Zone-only queries leave `point` empty; joined
/// queries carry one row per zone vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneRow {
    pub zone_id: ZoneId,
    pub label: String,
    pub point: Option<Point>,
}

impl ZoneRow {
    pub fn zone_only(zone_id: ZoneId, label: impl Into<String>) -> Self {
        Self {
            zone_id,
            label: label.into(),
            point: None,
        }
    }

    pub fn with_point(zone_id: ZoneId, label: impl Into<String>, point: Point) -> Self {
        Self {
            zone_id,
            label: label.into(),
            point: Some(point),
        }
    }
}

/// Groups contiguous rows sharing a zone id into one `Zone`.
///
/// Rows must already be sorted so that every zone's rows are adjacent and
/// its points are in ring order. The reader makes a single forward pass.
#[derive(Debug)]
pub struct ZoneReader<I: Iterator<Item = ZoneRow>> {
    rows: Peekable<I>,
}

pub type ZoneCursor = ZoneReader<std::vec::IntoIter<ZoneRow>>;

impl<I: Iterator<Item = ZoneRow>> ZoneReader<I> {
    pub fn new(rows: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            rows: rows.into_iter().peekable(),
        }
    }
}

impl<I: Iterator<Item = ZoneRow>> Iterator for ZoneReader<I> {
    type Item = Zone;

    fn next(&mut self) -> Option<Zone> {
        let first = self.rows.next()?;
        let mut zone = Zone::new(first.zone_id, first.label);
        zone.points.extend(first.point);

        while let Some(row) = self.rows.next_if(|row| row.zone_id == zone.id) {
            zone.points.extend(row.point);
        }
        Some(zone)
    }
}

impl<I: FusedIterator<Item = ZoneRow>> FusedIterator for ZoneReader<I> {}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_core::PointId;

    fn vertex(id: i64, zone: i64, x: f64, y: f64) -> Point {
        Point::persisted(PointId::new(id), ZoneId::new(zone), x, y)
    }

    #[test]
    fn groups_joined_rows_by_zone() {
        let rows = vec![
            ZoneRow::with_point(ZoneId::new(1), "park", vertex(10, 1, 0.0, 0.0)),
            ZoneRow::with_point(ZoneId::new(1), "park", vertex(11, 1, 0.0, 1.0)),
            ZoneRow::with_point(ZoneId::new(1), "park", vertex(12, 1, 1.0, 1.0)),
            ZoneRow::with_point(ZoneId::new(2), "lake", vertex(20, 2, 5.0, 5.0)),
        ];
        let zones: Vec<Zone> = ZoneReader::new(rows).collect();

        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].label, "park");
        let ids: Vec<_> = zones[0].points.iter().map(|p| p.id.unwrap().get()).collect();
        assert_eq!(ids, vec![10, 11, 12]);
        assert_eq!(zones[1].id, ZoneId::new(2));
        assert_eq!(zones[1].points.len(), 1);
    }

    #[test]
    fn zone_only_rows_yield_empty_zones() {
        let rows = vec![
            ZoneRow::zone_only(ZoneId::new(3), "a"),
            ZoneRow::zone_only(ZoneId::new(4), "b"),
        ];
        let zones: Vec<Zone> = ZoneReader::new(rows).collect();
        assert_eq!(zones.len(), 2);
        assert!(zones.iter().all(|zone| zone.points.is_empty()));
    }

    #[test]
    fn boundaries_follow_id_changes_not_labels() {
        let rows = vec![
            ZoneRow::with_point(ZoneId::new(7), "same", vertex(1, 7, 0.0, 0.0)),
            ZoneRow::with_point(ZoneId::new(8), "same", vertex(2, 8, 0.0, 0.0)),
            ZoneRow::with_point(ZoneId::new(8), "same", vertex(3, 8, 1.0, 0.0)),
        ];
        let mut reader = ZoneReader::new(rows);
        assert_eq!(reader.next().map(|zone| zone.points.len()), Some(1));
        assert_eq!(reader.next().map(|zone| zone.points.len()), Some(2));
        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
    }

    #[test]
    fn empty_input_yields_nothing() {
        let mut reader = ZoneReader::new(Vec::<ZoneRow>::new());
        assert!(reader.next().is_none());
    }
}
