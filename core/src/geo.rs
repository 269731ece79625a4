//! Planar map projection used for marker placement and click handling.
//!
//! The conversions treat the map as equirectangular around its centre. That
//! is only acceptable at dashboard zoom levels; it is not a geodesic model.

use common::{ScreenPercent, ScreenPoint, Viewport, WorldCoordinate};
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

pub type GeometryResult<T> = Result<T, GeometryError>;

/// Constants the projection is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionSettings {
    /// Reference screen density the host map widget assumes.
    pub dpi: f64,
    pub meters_per_inch: f64,
    /// Length of one degree of latitude.
    pub meters_per_degree: f64,
    /// Degrees per hash bucket when synthesizing child coordinates.
    pub synthetic_step_degrees: f64,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self {
            dpi: 96.0,
            meters_per_inch: 0.0254,
            meters_per_degree: 111_320.0,
            synthetic_step_degrees: 0.002,
        }
    }
}

/// Current centre, scale and size of the host map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    /// Centre as `"lon,lat"`, the format the map widget reports.
    pub center: String,
    /// Scale denominator, e.g. `72223.819286` for 1:72,223.
    pub scale: f64,
    pub viewport: Viewport,
}

impl MapView {
    pub fn new(center: impl Into<String>, scale: f64, viewport: Viewport) -> Self {
        Self {
            center: center.into(),
            scale,
            viewport,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeoProjector {
    settings: ProjectionSettings,
}

impl GeoProjector {
    pub fn new(settings: ProjectionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProjectionSettings {
        &self.settings
    }

    /// Percentage offset of `point` within the viewport.
    ///
    /// Longitude pixels are scaled by `cos(center.lat)`, the same factor
    /// `screen_to_world` divides out, so the two conversions are exact
    /// inverses. The plain `dLon * pixelsPerDegree` form leaves the factor
    /// out and would not round-trip away from the equator. Either way this
    /// is an equirectangular approximation around the centre, only good at
    /// dashboard zoom levels.
    pub fn world_to_screen(
        &self,
        center: &str,
        scale: f64,
        viewport: Viewport,
        point: WorldCoordinate,
    ) -> GeometryResult<ScreenPercent> {
        let center = parse_center(center)?;
        let pixels_per_degree = self.pixels_per_degree(scale)?;
        check_viewport(viewport)?;

        let delta_lon = point.lon - center.lon;
        let delta_lat = point.lat - center.lat;
        let lon_pixels = delta_lon * pixels_per_degree * meridian_factor(center.lat);
        let lat_pixels = delta_lat * pixels_per_degree;

        Ok(ScreenPercent {
            x: 50.0 + lon_pixels / viewport.width * 100.0,
            // screen y grows downward while latitude grows northward
            y: 50.0 - lat_pixels / viewport.height * 100.0,
        })
    }

    /// World position under a click measured from the viewport's top-left corner.
    pub fn screen_to_world(
        &self,
        center: &str,
        scale: f64,
        click_offset: ScreenPoint,
        viewport: Viewport,
    ) -> GeometryResult<WorldCoordinate> {
        let center = parse_center(center)?;
        let meters_per_pixel = self.meters_per_pixel(scale)?;
        check_viewport(viewport)?;

        let dx = click_offset.x - viewport.width / 2.0;
        let dy = click_offset.y - viewport.height / 2.0;

        let lat_degrees_per_meter = 1.0 / self.settings.meters_per_degree;
        let lon_degrees_per_meter =
            1.0 / (self.settings.meters_per_degree * meridian_factor(center.lat));

        Ok(WorldCoordinate {
            lat: center.lat - dy * meters_per_pixel * lat_degrees_per_meter,
            lon: center.lon + dx * meters_per_pixel * lon_degrees_per_meter,
        })
    }

    /// Stable position near `parent` for an entity without its own coordinate.
    /// The same inputs always produce the same output.
    pub fn synthetic_child_coordinate(
        &self,
        parent: WorldCoordinate,
        child_id: &str,
    ) -> WorldCoordinate {
        let hash = child_id_hash(child_id);
        let step = self.settings.synthetic_step_degrees;
        let offset_lat = ((hash % 100) as f64 - 50.0) * step;
        let offset_lon = ((hash.wrapping_mul(7) % 100) as f64 - 50.0) * step;

        WorldCoordinate {
            lat: parent.lat + offset_lat,
            lon: parent.lon + offset_lon,
        }
    }

    pub fn map_to_screen(
        &self,
        view: &MapView,
        point: WorldCoordinate,
    ) -> GeometryResult<ScreenPercent> {
        self.world_to_screen(&view.center, view.scale, view.viewport, point)
    }

    pub fn map_to_world(
        &self,
        view: &MapView,
        click_offset: ScreenPoint,
    ) -> GeometryResult<WorldCoordinate> {
        self.screen_to_world(&view.center, view.scale, click_offset, view.viewport)
    }

    fn meters_per_pixel(&self, scale: f64) -> GeometryResult<f64> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(GeometryError::InvalidScale(scale));
        }
        Ok(scale / self.settings.dpi * self.settings.meters_per_inch)
    }

    fn pixels_per_degree(&self, scale: f64) -> GeometryResult<f64> {
        let meters_per_pixel = self.meters_per_pixel(scale)?;
        Ok(1.0 / (meters_per_pixel * (1.0 / self.settings.meters_per_degree)))
    }
}

/// Parses a `"lon,lat"` centre string.
pub fn parse_center(raw: &str) -> GeometryResult<WorldCoordinate> {
    let invalid = || GeometryError::InvalidCoordinateFormat(raw.to_string());

    let mut parts = raw.split(',');
    let (Some(lon), Some(lat), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;

    let coordinate = WorldCoordinate::new(lat, lon);
    if !coordinate.is_valid() {
        return Err(invalid());
    }
    Ok(coordinate)
}

fn check_viewport(viewport: Viewport) -> GeometryResult<()> {
    if viewport.is_valid() {
        Ok(())
    } else {
        Err(GeometryError::InvalidViewport {
            width: viewport.width,
            height: viewport.height,
        })
    }
}

/// Longitude degrees shrink with latitude.
fn meridian_factor(center_lat: f64) -> f64 {
    center_lat.to_radians().cos()
}

fn child_id_hash(child_id: &str) -> u64 {
    child_id.chars().map(|c| c as u64).sum()
}
