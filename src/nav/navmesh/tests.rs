use super::*;
use std::sync::Arc;

/// Three unit-2 squares in a row along +Z.
fn strip() -> Arc<NavMesh> {
    Arc::new(
        NavMeshDescription::grid(Vec3::ZERO, 2.0, 1, 3)
            .build()
            .unwrap(),
    )
}

/// L-shaped corridor: A at the origin, B north of A, C east of B.
fn elbow() -> Arc<NavMesh> {
    let vertices = vec![
        Vec3::new(0.0, 0.0, 0.0), // 0
        Vec3::new(2.0, 0.0, 0.0), // 1
        Vec3::new(2.0, 0.0, 2.0), // 2
        Vec3::new(0.0, 0.0, 2.0), // 3
        Vec3::new(2.0, 0.0, 4.0), // 4
        Vec3::new(0.0, 0.0, 4.0), // 5
        Vec3::new(4.0, 0.0, 2.0), // 6
        Vec3::new(4.0, 0.0, 4.0), // 7
    ];
    let polygons = vec![
        PolygonDescription { vertices: vec![0, 1, 2, 3], mask: u32::MAX },
        PolygonDescription { vertices: vec![3, 2, 4, 5], mask: u32::MAX },
        PolygonDescription { vertices: vec![2, 6, 7, 4], mask: u32::MAX },
    ];
    Arc::new(NavMesh::build(&vertices, &polygons, &[]).unwrap())
}

fn locate(mesh: &NavMesh, point: Vec3) -> NavMeshLocation {
    mesh.map_location(point, Vec3::splat(1.0), u32::MAX).unwrap()
}

fn straight_path(mesh: &Arc<NavMesh>, start: Vec3, end: Vec3) -> Vec<StraightPathPoint> {
    let start = locate(mesh, start);
    let end = locate(mesh, end);
    let mut query = NavMeshQuery::default();
    let (status, corridor) = query.find_path(mesh, start, end, u32::MAX, 100, 64);
    assert!(status.is_success(), "status {:?}", status);
    let portals = mesh.corridor_portals(&corridor).unwrap();
    let (status, points) = find_straight_path(start.point, end.point, &portals, 64);
    assert!(status.is_success());
    points
}

// ============================================================================
// Building
// ============================================================================

#[test]
fn test_build_connects_shared_edges() {
    let mesh = strip();
    assert_eq!(mesh.poly_count(), 3);
    assert_eq!(mesh.poly(0).unwrap().links.len(), 1);
    assert_eq!(mesh.poly(1).unwrap().links.len(), 2);
    assert!(mesh.portal(0, 1).is_some());
    assert!(mesh.portal(0, 2).is_none());
}

#[test]
fn test_portal_left_is_on_the_left_of_travel() {
    let mesh = strip();
    // Travelling +Z with Y up, left is +X.
    let (left, right) = mesh.portal(0, 1).unwrap();
    assert_eq!(left, Vec3::new(2.0, 0.0, 2.0));
    assert_eq!(right, Vec3::new(0.0, 0.0, 2.0));

    let (left, right) = mesh.portal(1, 0).unwrap();
    assert_eq!(left, Vec3::new(0.0, 0.0, 2.0));
    assert_eq!(right, Vec3::new(2.0, 0.0, 2.0));
}

#[test]
fn test_build_rejects_bad_polygons() {
    let vertices = vec![Vec3::ZERO, Vec3::X, Vec3::Z];
    let out_of_range = [PolygonDescription { vertices: vec![0, 1, 7], mask: 1 }];
    assert!(matches!(
        NavMesh::build(&vertices, &out_of_range, &[]),
        Err(NavMeshError::VertexOutOfRange { index: 7, .. })
    ));

    let too_few = [PolygonDescription { vertices: vec![0, 1], mask: 1 }];
    assert!(matches!(
        NavMesh::build(&vertices, &too_few, &[]),
        Err(NavMeshError::Degenerate { .. })
    ));

    let dart = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(4.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 1.0),
        Vec3::new(0.0, 0.0, 4.0),
    ];
    let concave = [PolygonDescription { vertices: vec![0, 1, 2, 3], mask: 1 }];
    assert!(matches!(
        NavMesh::build(&dart, &concave, &[]),
        Err(NavMeshError::NonConvex { .. })
    ));
}

// ============================================================================
// Location queries
// ============================================================================

#[test]
fn test_map_location_respects_extents() {
    let mesh = strip();
    let hit = mesh.map_location(Vec3::new(1.0, 0.5, 3.0), Vec3::splat(1.0), u32::MAX).unwrap();
    assert_eq!(hit.poly, 1);
    assert_eq!(hit.point, Vec3::new(1.0, 0.0, 3.0));

    // Off the side by 3 units; only found with a wide enough extent.
    assert!(mesh.map_location(Vec3::new(5.0, 0.0, 3.0), Vec3::splat(1.0), u32::MAX).is_none());
    let clamped = mesh.map_location(Vec3::new(5.0, 0.0, 3.0), Vec3::splat(4.0), u32::MAX).unwrap();
    assert!((clamped.point - Vec3::new(2.0, 0.0, 3.0)).length() < 1e-5);
}

#[test]
fn test_map_location_filters_by_traversal_mask() {
    let vertices = NavMeshDescription::grid(Vec3::ZERO, 2.0, 1, 1).vertices;
    let polygons = [PolygonDescription { vertices: vec![0, 1, 3, 2], mask: 0b10 }];
    let mesh = NavMesh::build(&vertices, &polygons, &[]).unwrap();

    assert!(mesh.map_location(Vec3::new(1.0, 0.0, 1.0), Vec3::ONE, 0b01).is_none());
    assert!(mesh.map_location(Vec3::new(1.0, 0.0, 1.0), Vec3::ONE, 0b10).is_some());
}

#[test]
fn test_sloped_polygon_height_is_interpolated() {
    let vertices = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(4.0, 0.0, 0.0),
        Vec3::new(4.0, 2.0, 4.0),
        Vec3::new(0.0, 2.0, 4.0),
    ];
    let polygons = [PolygonDescription { vertices: vec![0, 1, 2, 3], mask: u32::MAX }];
    let mesh = NavMesh::build(&vertices, &polygons, &[]).unwrap();

    let hit = mesh.map_location(Vec3::new(2.0, 5.0, 2.0), Vec3::splat(10.0), u32::MAX).unwrap();
    assert!((hit.point.y - 1.0).abs() < 1e-5);
    assert!(mesh.contains_point(Vec3::new(2.0, 1.5, 2.0), 1.0));
    assert!(!mesh.contains_point(Vec3::new(2.0, 3.0, 2.0), 1.0));
    assert!(!mesh.contains_point(Vec3::new(6.0, 1.0, 2.0), 1.0));
}

// ============================================================================
// Corridor search
// ============================================================================

#[test]
fn test_corridor_consecutive_polys_share_a_portal() {
    let mesh = Arc::new(NavMeshDescription::grid(Vec3::ZERO, 1.0, 6, 6).build().unwrap());
    let start = locate(&mesh, Vec3::new(0.5, 0.0, 0.5));
    let end = locate(&mesh, Vec3::new(5.5, 0.0, 4.5));

    let mut query = NavMeshQuery::default();
    let (status, corridor) = query.find_path(&mesh, start, end, u32::MAX, 1000, 256);
    assert_eq!(status, PathQueryStatus::SUCCESS);
    assert_eq!(corridor.first(), Some(&start.poly));
    assert_eq!(corridor.last(), Some(&end.poly));
    for pair in corridor.windows(2) {
        assert!(mesh.portal(pair[0], pair[1]).is_some());
    }
}

#[test]
fn test_disconnected_mesh_returns_partial_corridor() {
    // Two separate squares with a gap between them.
    let vertices = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(2.0, 0.0, 0.0),
        Vec3::new(2.0, 0.0, 2.0),
        Vec3::new(0.0, 0.0, 2.0),
        Vec3::new(0.0, 0.0, 4.0),
        Vec3::new(2.0, 0.0, 4.0),
        Vec3::new(2.0, 0.0, 6.0),
        Vec3::new(0.0, 0.0, 6.0),
    ];
    let polygons = [
        PolygonDescription { vertices: vec![0, 1, 2, 3], mask: u32::MAX },
        PolygonDescription { vertices: vec![4, 5, 6, 7], mask: u32::MAX },
    ];
    let mesh = Arc::new(NavMesh::build(&vertices, &polygons, &[]).unwrap());

    let start = locate(&mesh, Vec3::new(1.0, 0.0, 1.0));
    let end = locate(&mesh, Vec3::new(1.0, 0.0, 5.0));
    let mut query = NavMeshQuery::default();
    let (status, corridor) = query.find_path(&mesh, start, end, u32::MAX, 100, 16);
    assert!(status.is_success());
    assert!(status.contains(PathQueryStatus::PARTIAL_RESULT));
    assert_eq!(corridor, vec![0]);
}

#[test]
fn test_iteration_cap_leaves_search_in_progress() {
    let mesh = Arc::new(NavMeshDescription::grid(Vec3::ZERO, 1.0, 1, 10).build().unwrap());
    let start = locate(&mesh, Vec3::new(0.5, 0.0, 0.5));
    let end = locate(&mesh, Vec3::new(0.5, 0.0, 9.5));

    let mut query = NavMeshQuery::default();
    query.begin_find_path(&mesh, start, end, u32::MAX);
    let (status, spent) = query.update_find_path(3);
    assert!(status.is_in_progress());
    assert_eq!(spent, 3);

    // Resuming the same search finishes it.
    let (status, _) = query.update_find_path(100);
    assert!(status.is_success());
    let (_, corridor) = query.end_find_path(64);
    assert_eq!(corridor.len(), 10);
}

#[test]
fn test_node_pool_overflow_is_reported() {
    let mesh = Arc::new(NavMeshDescription::grid(Vec3::ZERO, 1.0, 8, 8).build().unwrap());
    let start = locate(&mesh, Vec3::new(0.5, 0.0, 0.5));
    let end = locate(&mesh, Vec3::new(7.5, 0.0, 7.5));

    let mut query = NavMeshQuery::new(4);
    let (status, _) = query.find_path(&mesh, start, end, u32::MAX, 1000, 64);
    assert!(status.contains(PathQueryStatus::OUT_OF_NODES));
}

#[test]
fn test_invalid_start_polygon_fails() {
    let mesh = strip();
    let bogus = NavMeshLocation { poly: 99, point: Vec3::ZERO };
    let end = locate(&mesh, Vec3::new(1.0, 0.0, 5.0));
    let mut query = NavMeshQuery::default();
    let status = query.begin_find_path(&mesh, bogus, end, u32::MAX);
    assert!(status.is_failure());
    assert!(status.contains(PathQueryStatus::INVALID_PARAM));
}

#[test]
fn test_query_is_reusable_after_reset() {
    let mesh = strip();
    let mut query = NavMeshQuery::default();
    let a = locate(&mesh, Vec3::new(1.0, 0.0, 1.0));
    let b = locate(&mesh, Vec3::new(1.0, 0.0, 5.0));

    let (_, forward) = query.find_path(&mesh, a, b, u32::MAX, 100, 16);
    let (_, backward) = query.find_path(&mesh, b, a, u32::MAX, 100, 16);
    assert_eq!(forward, vec![0, 1, 2]);
    assert_eq!(backward, vec![2, 1, 0]);
}

// ============================================================================
// Funnel
// ============================================================================

#[test]
fn test_straight_corridor_yields_endpoints_only() {
    let mesh = strip();
    let points = straight_path(&mesh, Vec3::new(1.0, 0.0, 0.5), Vec3::new(1.0, 0.0, 5.5));
    assert_eq!(points.len(), 2);
    assert!(points[0].flags.contains(StraightPathFlags::START));
    assert!(points[1].flags.contains(StraightPathFlags::END));
}

#[test]
fn test_single_turn_yields_one_corner() {
    let mesh = elbow();
    let start = Vec3::new(1.0, 0.0, 1.0);
    let end = Vec3::new(3.0, 0.0, 2.5);

    let first = straight_path(&mesh, start, end);
    assert_eq!(first.len(), 3);
    assert!((first[1].position - Vec3::new(2.0, 0.0, 2.0)).length() < 1e-5);

    for _ in 0..5 {
        assert_eq!(straight_path(&mesh, start, end), first);
    }
}

#[test]
fn test_straight_path_is_truncated_at_capacity() {
    let mesh = elbow();
    let start = locate(&mesh, Vec3::new(1.0, 0.0, 1.0));
    let end = locate(&mesh, Vec3::new(3.0, 0.0, 2.5));
    let mut query = NavMeshQuery::default();
    let (_, corridor) = query.find_path(&mesh, start, end, u32::MAX, 100, 16);
    let portals = mesh.corridor_portals(&corridor).unwrap();

    let (status, points) = find_straight_path(start.point, end.point, &portals, 2);
    assert!(status.contains(PathQueryStatus::BUFFER_TOO_SMALL));
    assert_eq!(points.len(), 2);
}

#[test]
fn test_off_mesh_link_produces_explicit_vertices() {
    let vertices = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(2.0, 0.0, 0.0),
        Vec3::new(2.0, 0.0, 2.0),
        Vec3::new(0.0, 0.0, 2.0),
        Vec3::new(0.0, 1.0, 6.0),
        Vec3::new(2.0, 1.0, 6.0),
        Vec3::new(2.0, 1.0, 8.0),
        Vec3::new(0.0, 1.0, 8.0),
    ];
    let polygons = [
        PolygonDescription { vertices: vec![0, 1, 2, 3], mask: u32::MAX },
        PolygonDescription { vertices: vec![4, 5, 6, 7], mask: u32::MAX },
    ];
    let link_start = Vec3::new(1.0, 0.0, 1.8);
    let link_end = Vec3::new(1.0, 1.0, 6.2);
    let links = [OffMeshLink {
        start: link_start,
        end: link_end,
        mask: u32::MAX,
        bidirectional: false,
    }];
    let mesh = Arc::new(NavMesh::build(&vertices, &polygons, &links).unwrap());
    assert_eq!(mesh.poly(2).unwrap().kind, PolyKind::OffMeshLink);

    let points = straight_path(&mesh, Vec3::new(0.5, 0.0, 0.5), Vec3::new(1.5, 1.0, 7.5));
    let link_vertices: Vec<Vec3> = points
        .iter()
        .filter(|p| p.flags.contains(StraightPathFlags::OFFMESH_CONNECTION))
        .map(|p| p.position)
        .collect();
    assert_eq!(link_vertices, vec![link_start, link_end]);
    assert!(points.first().unwrap().flags.contains(StraightPathFlags::START));
    assert!(points.last().unwrap().flags.contains(StraightPathFlags::END));
}

#[test]
fn test_one_way_link_is_not_walked_backwards() {
    let vertices = NavMeshDescription::grid(Vec3::ZERO, 2.0, 1, 1).vertices;
    let mut all = vertices.clone();
    all.extend(vertices.iter().map(|v| *v + Vec3::new(0.0, 0.0, 6.0)));
    let polygons = [
        PolygonDescription { vertices: vec![0, 1, 3, 2], mask: u32::MAX },
        PolygonDescription { vertices: vec![4, 5, 7, 6], mask: u32::MAX },
    ];
    let links = [OffMeshLink {
        start: Vec3::new(1.0, 0.0, 1.5),
        end: Vec3::new(1.0, 0.0, 6.5),
        mask: u32::MAX,
        bidirectional: false,
    }];
    let mesh = Arc::new(NavMesh::build(&all, &polygons, &links).unwrap());

    let near = locate(&mesh, Vec3::new(1.0, 0.0, 1.0));
    let far = locate(&mesh, Vec3::new(1.0, 0.0, 7.0));
    let mut query = NavMeshQuery::default();

    let (status, _) = query.find_path(&mesh, near, far, u32::MAX, 100, 16);
    assert!(!status.contains(PathQueryStatus::PARTIAL_RESULT));
    let (status, _) = query.find_path(&mesh, far, near, u32::MAX, 100, 16);
    assert!(status.contains(PathQueryStatus::PARTIAL_RESULT));
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_save_then_load_keeps_polygons_and_adjacency() {
    let mesh = elbow();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("elbow.navmesh");

    mesh.save(&path).unwrap();
    let loaded = NavMesh::load(&path).unwrap();
    assert_eq!(loaded.polys(), mesh.polys());
    assert_eq!(loaded.vertices(), mesh.vertices());
}

#[test]
fn test_load_rejects_malformed_polygons() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.navmesh");

    let mut empty = (*elbow()).clone();
    empty.polys[1].vertices.clear();
    empty.save(&path).unwrap();
    assert!(matches!(NavMesh::load(&path), Err(NavMeshError::Degenerate { poly: 1 })));

    let mut dangling = (*elbow()).clone();
    dangling.polys[0].links[0].to = 40;
    dangling.save(&path).unwrap();
    assert!(matches!(
        NavMesh::load(&path),
        Err(NavMeshError::LinkOutOfRange { poly: 0, to: 40, .. })
    ));
}

#[test]
fn test_description_parses_from_ron() {
    let source = r#"(
        vertices: [(0.0, 0.0, 0.0), (2.0, 0.0, 0.0), (2.0, 0.0, 2.0), (0.0, 0.0, 2.0)],
        polygons: [(vertices: [0, 1, 2, 3])],
    )"#;
    let description = NavMeshDescription::from_ron(source).unwrap();
    assert_eq!(description.polygons[0].mask, u32::MAX);
    let mesh = description.build().unwrap();
    assert!(mesh.contains_point(Vec3::new(1.0, 0.0, 1.0), 0.1));
}

#[test]
fn test_pool_hands_out_a_query_per_thread() {
    let mut pool = NavQueryPool::default();
    let mesh = strip();
    let a = locate(&mesh, Vec3::new(1.0, 0.0, 1.0));
    let b = locate(&mesh, Vec3::new(1.0, 0.0, 5.0));

    let corridor = pool.scope(32, |query| {
        assert_eq!(query.max_nodes(), 32);
        query.find_path(&mesh, a, b, u32::MAX, 100, 16).1
    });
    assert_eq!(corridor.len(), 3);
    assert_eq!(pool.len(), 1);
}
