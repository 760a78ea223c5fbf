//! Navigation mesh tiles and the queries the planner runs over them.
//!
//! A [`NavMesh`] is authored per surface in that surface's local frame, so a
//! moving platform carries its mesh with it. Polygons are convex in XZ and
//! may be sloped; off-mesh links are stored as two-vertex polygons of kind
//! [`PolyKind::OffMeshLink`] so the corridor search treats them like any
//! other polygon.

use bevy::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::nav::math::tri_area_xz;

mod funnel;
mod io;
mod pool;
mod query;
#[cfg(test)]
mod tests;

pub use funnel::{find_straight_path, StraightPathFlags, StraightPathPoint};
pub use pool::NavQueryPool;
pub use query::{NavMeshQuery, PathQueryStatus};

/// Index of a polygon within its tile.
pub type PolyRef = u32;

const AREA_EPSILON: f32 = 1e-6;

#[derive(Debug, Error)]
pub enum NavMeshError {
    #[error("polygon {poly} references vertex {index} but the mesh has {count} vertices")]
    VertexOutOfRange { poly: usize, index: u32, count: usize },
    #[error("polygon {poly} is degenerate")]
    Degenerate { poly: usize },
    #[error("polygon {poly} is not convex")]
    NonConvex { poly: usize },
    #[error("polygon {poly} links to polygon {to} but the mesh has {count} polygons")]
    LinkOutOfRange { poly: usize, to: PolyRef, count: usize },
    #[error("off-mesh link {link} has an endpoint with no polygon nearby")]
    LinkEndpoint { link: usize },
    #[error("navmesh io: {0}")]
    Io(#[from] std::io::Error),
    #[error("navmesh encoding: {0}")]
    Encode(#[from] bincode::Error),
    #[error("navmesh description: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolyKind {
    Ground,
    OffMeshLink,
}

/// Edge shared with a neighbouring polygon, oriented for travel `from -> to`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolyLink {
    pub to: PolyRef,
    pub left: Vec3,
    pub right: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavPoly {
    pub vertices: SmallVec<[u32; 6]>,
    pub kind: PolyKind,
    /// Traversal classes allowed on this polygon.
    pub mask: u32,
    pub centroid: Vec3,
    pub links: SmallVec<[PolyLink; 6]>,
}

/// A point snapped onto a specific polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavMeshLocation {
    pub poly: PolyRef,
    pub point: Vec3,
}

/// One step of a corridor as seen by the funnel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Portal {
    pub left: Vec3,
    pub right: Vec3,
    /// Polygon kind changes across this portal.
    pub forced: bool,
}

// ============================================================================
// Authoring
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonDescription {
    pub vertices: Vec<u32>,
    #[serde(default = "all_classes")]
    pub mask: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffMeshLink {
    pub start: Vec3,
    pub end: Vec3,
    #[serde(default = "all_classes")]
    pub mask: u32,
    #[serde(default)]
    pub bidirectional: bool,
}

fn all_classes() -> u32 {
    u32::MAX
}

/// Authored form of a tile, as written in RON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavMeshDescription {
    pub vertices: Vec<Vec3>,
    pub polygons: Vec<PolygonDescription>,
    #[serde(default)]
    pub links: Vec<OffMeshLink>,
}

impl NavMeshDescription {
    pub fn build(&self) -> Result<NavMesh, NavMeshError> {
        NavMesh::build(&self.vertices, &self.polygons, &self.links)
    }

    /// Axis-aligned grid of `cols x rows` square cells starting at `origin`.
    pub fn grid(origin: Vec3, cell: f32, cols: u32, rows: u32) -> Self {
        let mut vertices = Vec::with_capacity(((cols + 1) * (rows + 1)) as usize);
        for z in 0..=rows {
            for x in 0..=cols {
                vertices.push(origin + Vec3::new(x as f32 * cell, 0.0, z as f32 * cell));
            }
        }
        let stride = cols + 1;
        let mut polygons = Vec::with_capacity((cols * rows) as usize);
        for z in 0..rows {
            for x in 0..cols {
                let i = z * stride + x;
                polygons.push(PolygonDescription {
                    vertices: vec![i, i + 1, i + stride + 1, i + stride],
                    mask: all_classes(),
                });
            }
        }
        Self {
            vertices,
            polygons,
            links: Vec::new(),
        }
    }
}

// ============================================================================
// Mesh
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavMesh {
    vertices: Vec<Vec3>,
    polys: Vec<NavPoly>,
}

impl NavMesh {
    /// Validate polygons, connect shared edges and append off-mesh links.
    pub fn build(
        vertices: &[Vec3],
        polygons: &[PolygonDescription],
        links: &[OffMeshLink],
    ) -> Result<Self, NavMeshError> {
        let mut mesh = Self {
            vertices: vertices.to_vec(),
            polys: Vec::with_capacity(polygons.len() + links.len()),
        };

        for (index, desc) in polygons.iter().enumerate() {
            mesh.validate_polygon(index, &desc.vertices)?;
            let centroid = desc
                .vertices
                .iter()
                .map(|&v| mesh.vertices[v as usize])
                .sum::<Vec3>()
                / desc.vertices.len() as f32;
            mesh.polys.push(NavPoly {
                vertices: desc.vertices.iter().copied().collect(),
                kind: PolyKind::Ground,
                mask: desc.mask,
                centroid,
                links: SmallVec::new(),
            });
        }

        mesh.connect_shared_edges();

        for (index, link) in links.iter().enumerate() {
            mesh.add_off_mesh_link(index, link)?;
        }

        Ok(mesh)
    }

    /// Check the indices of a mesh that did not come through [`NavMesh::build`].
    fn validate_indices(&self) -> Result<(), NavMeshError> {
        let count = self.polys.len();
        for (poly, data) in self.polys.iter().enumerate() {
            let arity_ok = match data.kind {
                PolyKind::Ground => data.vertices.len() >= 3,
                PolyKind::OffMeshLink => data.vertices.len() == 2,
            };
            if !arity_ok {
                return Err(NavMeshError::Degenerate { poly });
            }
            if let Some(&index) = data.vertices.iter().find(|&&v| v as usize >= self.vertices.len()) {
                return Err(NavMeshError::VertexOutOfRange {
                    poly,
                    index,
                    count: self.vertices.len(),
                });
            }
            if let Some(link) = data.links.iter().find(|link| link.to as usize >= count) {
                return Err(NavMeshError::LinkOutOfRange { poly, to: link.to, count });
            }
        }
        Ok(())
    }

    fn validate_polygon(&self, poly: usize, indices: &[u32]) -> Result<(), NavMeshError> {
        if indices.len() < 3 {
            return Err(NavMeshError::Degenerate { poly });
        }
        for &index in indices {
            if index as usize >= self.vertices.len() {
                return Err(NavMeshError::VertexOutOfRange {
                    poly,
                    index,
                    count: self.vertices.len(),
                });
            }
        }

        // Every turn must bend the same way, in either winding.
        let n = indices.len();
        let mut sign = 0.0_f32;
        let mut area = 0.0_f32;
        for i in 0..n {
            let a = self.vertices[indices[i] as usize];
            let b = self.vertices[indices[(i + 1) % n] as usize];
            let c = self.vertices[indices[(i + 2) % n] as usize];
            let turn = tri_area_xz(a, b, c);
            area += a.x * b.z - b.x * a.z;
            if turn.abs() <= AREA_EPSILON {
                continue;
            }
            if sign == 0.0 {
                sign = turn.signum();
            } else if turn.signum() != sign {
                return Err(NavMeshError::NonConvex { poly });
            }
        }
        if area.abs() <= AREA_EPSILON {
            return Err(NavMeshError::Degenerate { poly });
        }
        Ok(())
    }

    fn connect_shared_edges(&mut self) {
        let mut edges: FxHashMap<(u32, u32), SmallVec<[PolyRef; 2]>> = FxHashMap::default();
        for (index, poly) in self.polys.iter().enumerate() {
            let n = poly.vertices.len();
            for i in 0..n {
                let a = poly.vertices[i];
                let b = poly.vertices[(i + 1) % n];
                edges.entry((a.min(b), a.max(b))).or_default().push(index as PolyRef);
            }
        }

        // Sorted for a stable neighbour order regardless of hash iteration.
        let mut shared: Vec<_> = edges.into_iter().filter(|(_, polys)| polys.len() == 2).collect();
        shared.sort_unstable_by_key(|(edge, _)| *edge);

        for ((a, b), polys) in shared {
            let (p, q) = (polys[0], polys[1]);
            let va = self.vertices[a as usize];
            let vb = self.vertices[b as usize];
            let link_pq = self.oriented_link(p, q, va, vb);
            let link_qp = self.oriented_link(q, p, va, vb);
            self.polys[p as usize].links.push(link_pq);
            self.polys[q as usize].links.push(link_qp);
        }
    }

    /// Orient edge `(a, b)` as a portal for travel from `from` into `to`.
    fn oriented_link(&self, from: PolyRef, to: PolyRef, a: Vec3, b: Vec3) -> PolyLink {
        let centroid = self.polys[from as usize].centroid;
        let mid = (a + b) * 0.5;
        if tri_area_xz(centroid, mid, a) > 0.0 {
            PolyLink { to, left: b, right: a }
        } else {
            PolyLink { to, left: a, right: b }
        }
    }

    fn add_off_mesh_link(&mut self, index: usize, link: &OffMeshLink) -> Result<(), NavMeshError> {
        let start = self
            .nearest_location(link.start, u32::MAX)
            .ok_or(NavMeshError::LinkEndpoint { link: index })?;
        let end = self
            .nearest_location(link.end, u32::MAX)
            .ok_or(NavMeshError::LinkEndpoint { link: index })?;

        let first_vertex = self.vertices.len() as u32;
        self.vertices.push(link.start);
        self.vertices.push(link.end);

        let link_ref = self.polys.len() as PolyRef;
        let mut poly = NavPoly {
            vertices: SmallVec::from_slice(&[first_vertex, first_vertex + 1]),
            kind: PolyKind::OffMeshLink,
            mask: link.mask,
            centroid: (link.start + link.end) * 0.5,
            links: SmallVec::new(),
        };

        let enter = |to| PolyLink { to, left: link.start, right: link.start };
        let exit = |to| PolyLink { to, left: link.end, right: link.end };

        self.polys[start.poly as usize].links.push(enter(link_ref));
        poly.links.push(exit(end.poly));
        if link.bidirectional {
            self.polys[end.poly as usize].links.push(exit(link_ref));
            poly.links.push(enter(start.poly));
        }
        self.polys.push(poly);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub fn poly_count(&self) -> usize {
        self.polys.len()
    }

    pub fn poly(&self, poly: PolyRef) -> Option<&NavPoly> {
        self.polys.get(poly as usize)
    }

    pub fn polys(&self) -> &[NavPoly] {
        &self.polys
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Shared edge between two adjacent polygons, oriented for travel `from -> to`.
    pub fn portal(&self, from: PolyRef, to: PolyRef) -> Option<(Vec3, Vec3)> {
        self.poly(from)?
            .links
            .iter()
            .find(|link| link.to == to)
            .map(|link| (link.left, link.right))
    }

    /// Portals along a polygon corridor, ready for the funnel.
    pub fn corridor_portals(&self, corridor: &[PolyRef]) -> Option<Vec<Portal>> {
        corridor
            .windows(2)
            .map(|pair| {
                let (left, right) = self.portal(pair[0], pair[1])?;
                let forced = self.poly(pair[0])?.kind != self.poly(pair[1])?.kind;
                Some(Portal { left, right, forced })
            })
            .collect()
    }

    fn ground_polys(&self, mask: u32) -> impl Iterator<Item = (PolyRef, &NavPoly)> {
        self.polys
            .iter()
            .enumerate()
            .filter(move |(_, poly)| poly.kind == PolyKind::Ground && poly.mask & mask != 0)
            .map(|(index, poly)| (index as PolyRef, poly))
    }

    fn corner(&self, poly: &NavPoly, i: usize) -> Vec3 {
        self.vertices[poly.vertices[i % poly.vertices.len()] as usize]
    }

    /// Height of the polygon surface under `point`, if `point` lies inside it in XZ.
    pub fn poly_height(&self, poly: &NavPoly, point: Vec3) -> Option<f32> {
        let a = self.corner(poly, 0);
        for i in 1..poly.vertices.len().saturating_sub(1) {
            let b = self.corner(poly, i);
            let c = self.corner(poly, i + 1);
            if let Some(height) = triangle_height(a, b, c, point) {
                return Some(height);
            }
        }
        None
    }

    /// Closest point on the polygon to `point`, measured in XZ.
    fn closest_point_on_poly(&self, poly: &NavPoly, point: Vec3) -> Vec3 {
        if let Some(height) = self.poly_height(poly, point) {
            return Vec3::new(point.x, height, point.z);
        }
        let mut best = self.corner(poly, 0);
        let mut best_dist = f32::INFINITY;
        for i in 0..poly.vertices.len() {
            let candidate = closest_on_segment_xz(self.corner(poly, i), self.corner(poly, i + 1), point);
            let dist = xz_distance_sq(candidate, point);
            if dist < best_dist {
                best_dist = dist;
                best = candidate;
            }
        }
        best
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Snap `point` onto the mesh, searching within `extents` on each axis.
    pub fn map_location(&self, point: Vec3, extents: Vec3, mask: u32) -> Option<NavMeshLocation> {
        let mut best: Option<(f32, NavMeshLocation)> = None;
        for (poly_ref, poly) in self.ground_polys(mask) {
            let candidate = self.closest_point_on_poly(poly, point);
            let delta = (candidate - point).abs();
            if delta.x > extents.x || delta.y > extents.y || delta.z > extents.z {
                continue;
            }
            let dist = candidate.distance_squared(point);
            if best.is_none_or(|(d, _)| dist < d) {
                best = Some((dist, NavMeshLocation { poly: poly_ref, point: candidate }));
            }
        }
        best.map(|(_, location)| location)
    }

    /// Closest point on polygon `poly` to `point`.
    pub fn closest_point(&self, poly: PolyRef, point: Vec3) -> Option<Vec3> {
        self.poly(poly).map(|p| self.closest_point_on_poly(p, point))
    }

    /// Closest point anywhere on the mesh.
    pub fn nearest_location(&self, point: Vec3, mask: u32) -> Option<NavMeshLocation> {
        self.map_location(point, Vec3::splat(f32::INFINITY), mask)
    }

    /// Whether `point` stands on some polygon within `vertical_tolerance`.
    pub fn contains_point(&self, point: Vec3, vertical_tolerance: f32) -> bool {
        self.ground_polys(u32::MAX).any(|(_, poly)| {
            self.poly_height(poly, point)
                .is_some_and(|height| (height - point.y).abs() <= vertical_tolerance)
        })
    }
}

fn xz_distance_sq(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    dx * dx + dz * dz
}

fn closest_on_segment_xz(a: Vec3, b: Vec3, p: Vec3) -> Vec3 {
    let ab = Vec2::new(b.x - a.x, b.z - a.z);
    let ap = Vec2::new(p.x - a.x, p.z - a.z);
    let len_sq = ab.length_squared();
    let t = if len_sq <= AREA_EPSILON {
        0.0
    } else {
        (ap.dot(ab) / len_sq).clamp(0.0, 1.0)
    };
    a.lerp(b, t)
}

/// Barycentric height of triangle `abc` at `p`, if `p` is inside it in XZ.
fn triangle_height(a: Vec3, b: Vec3, c: Vec3, p: Vec3) -> Option<f32> {
    let area = tri_area_xz(a, b, c);
    if area.abs() <= AREA_EPSILON {
        return None;
    }
    let u = tri_area_xz(b, c, p) / area;
    let v = tri_area_xz(c, a, p) / area;
    let w = 1.0 - u - v;
    const EDGE: f32 = -1e-4;
    (u >= EDGE && v >= EDGE && w >= EDGE).then(|| u * a.y + v * b.y + w * c.y)
}
