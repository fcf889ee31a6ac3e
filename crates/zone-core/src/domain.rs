use crate::error::{ZoneError, ZoneResult};
use crate::ids::{PointId, ZoneId};
use serde::{Deserialize, Serialize};

/// A zone vertex. `x` is longitude and `y` is latitude.
///
/// `id` is `None` until the store has persisted the point; synthetic points
/// such as bounding box corners never get one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: Option<PointId>,
    pub zone_id: Option<ZoneId>,
    pub longitude: f64,
    pub latitude: f64,
}

impl Point {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            id: None,
            zone_id: None,
            longitude,
            latitude,
        }
    }

    pub fn persisted(id: PointId, zone_id: ZoneId, longitude: f64, latitude: f64) -> Self {
        Self {
            id: Some(id),
            zone_id: Some(zone_id),
            longitude,
            latitude,
        }
    }

    pub fn x(&self) -> f64 {
        self.longitude
    }

    pub fn y(&self) -> f64 {
        self.latitude
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// A labelled polygon. `points` is the ring in order, without the closing
/// vertex; the store closes the ring when it writes the geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub label: String,
    #[serde(default)]
    pub points: Vec<Point>,
}

impl Zone {
    pub fn new(id: ZoneId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            points: Vec::new(),
        }
    }

    pub fn summary(&self) -> ZoneSummary {
        ZoneSummary {
            id: self.id,
            label: self.label.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSummary {
    pub id: ZoneId,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneBounds {
    pub min: Point,
    pub max: Point,
}

impl ZoneBounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min: Point::new(min_x, min_y),
            max: Point::new(max_x, max_y),
        }
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.x() >= self.min.x()
            && point.x() <= self.max.x()
            && point.y() >= self.min.y()
            && point.y() <= self.max.y()
    }
}

pub fn validate_label(label: &str) -> ZoneResult<()> {
    if label.is_empty() {
        return Err(ZoneError::invalid_geometry("zone label must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_points_are_unpersisted() {
        let point = Point::new(13.4, 52.5);
        assert!(!point.is_persisted());
        assert_eq!(point.x(), 13.4);
        assert_eq!(point.y(), 52.5);
    }

    #[test]
    fn bounds_include_their_edges() {
        let bounds = ZoneBounds::new(0.0, 0.0, 10.0, 10.0);
        assert!(bounds.contains(&Point::new(0.0, 10.0)));
        assert!(bounds.contains(&Point::new(5.0, 5.0)));
        assert!(!bounds.contains(&Point::new(10.5, 5.0)));
    }

    #[test]
    fn blank_labels_are_rejected() {
        assert!(validate_label("park").is_ok());
        assert!(validate_label(" ").is_ok());
        let err = validate_label("").unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::InvalidGeometry);
    }
}
