use crate::{
    datatypes::{Facet, Point2D, SectionGeometry},
    error::SectionError,
};

/// Flattens one closed polyline into points and a closed facet loop.
///
/// The decoded polyline repeats its first point at the end; that closing
/// duplicate is dropped, so a polyline of P points yields P-1 points and
/// P-1 facets. Facet indices start at `start_idx` so multiple loops can
/// share one global point array; the final facet links back to `start_idx`.
///
/// # Arguments
/// * `polyline` - The ordered points of the decoded closed polyline
/// * `start_idx` - The global index of this loop's first point
///
/// # Returns
/// The loop's points and facets, in that order
pub fn flatten_polyline(
    polyline: &[Point2D],
    start_idx: usize,
) -> Result<(Vec<Point2D>, Vec<Facet>), SectionError> {
    if polyline.len() < 3 {
        return Err(SectionError::Input(format!(
            "Closed polyline needs at least 3 points, got {}",
            polyline.len()
        )));
    }

    let points: Vec<Point2D> = polyline[..polyline.len() - 1].to_vec();

    let mut facets: Vec<Facet> = Vec::with_capacity(points.len());
    for i in 0..points.len() - 1 {
        facets.push(Facet(start_idx + i, start_idx + i + 1));
    }
    facets.push(Facet(start_idx + points.len() - 1, start_idx));

    Ok((points, facets))
}

/// Builds a section geometry out of loops that share one point array.
///
/// The builder owns the growable point/facet sequence and hands each new
/// loop its starting offset, so indices stay globally unique without any
/// caller-side bookkeeping. Hole loops are registered together with their
/// interior marker, which keeps the marker-per-hole invariant intact by
/// construction.
#[derive(Debug)]
pub struct GeometryBuilder {
    points: Vec<Point2D>,
    facets: Vec<Facet>,
    holes: Vec<Point2D>,
    control_points: Vec<Point2D>,
}

impl GeometryBuilder {
    /// Starts a geometry from its perimeter loop.
    pub fn from_perimeter(polyline: &[Point2D]) -> Result<GeometryBuilder, SectionError> {
        let (points, facets) = flatten_polyline(polyline, 0)?;

        Ok(GeometryBuilder {
            points,
            facets,
            holes: Vec::new(),
            control_points: Vec::new(),
        })
    }

    /// Adds a hole loop and the interior point that marks it for the mesher.
    pub fn add_hole(
        &mut self,
        polyline: &[Point2D],
        marker: Point2D,
    ) -> Result<(), SectionError> {
        let (points, facets) = flatten_polyline(polyline, self.points.len())?;

        self.points.extend(points);
        self.facets.extend(facets);
        self.holes.push(marker);

        Ok(())
    }

    pub fn add_control_point(&mut self, point: Point2D) {
        self.control_points.push(point);
    }

    pub fn build(self) -> Result<SectionGeometry, SectionError> {
        if self.control_points.is_empty() {
            return Err(SectionError::Input(
                "Geometry needs at least one control point".to_owned(),
            ));
        }

        Ok(SectionGeometry {
            points: self.points,
            facets: self.facets,
            holes: self.holes,
            control_points: self.control_points,
        })
    }
}
