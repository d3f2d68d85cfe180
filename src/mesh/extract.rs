use super::types::Mesh;
use crate::reconstruction::{FieldSample, ReconstructionModel, SceneRepresentation};
use anyhow::{bail, ensure, Result};
use std::collections::HashMap;

/// Cube corner offsets, in (x, y, z) grid steps
const CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Six tetrahedra around the 0-6 diagonal. Neighboring cubes split their
/// shared faces the same way, so the surface has no cracks.
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 2, 6],
    [0, 3, 2, 6],
    [0, 1, 5, 6],
    [0, 4, 5, 6],
    [0, 3, 7, 6],
    [0, 4, 7, 6],
];

/// Regular sampling grid over `[-radius, radius]^3`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub resolution: usize,
    pub radius: f32,
}

impl Grid {
    pub fn new(resolution: usize, radius: f32) -> Self {
        Self { resolution, radius }
    }

    pub fn point_count(&self) -> usize {
        self.resolution.pow(3)
    }

    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.resolution + y) * self.resolution + x
    }

    pub fn position(&self, index: usize) -> [f32; 3] {
        let n = self.resolution;
        let coords = [index % n, (index / n) % n, index / (n * n)];
        let step = 2.0 * self.radius / (n - 1) as f32;
        coords.map(|c| -self.radius + c as f32 * step)
    }

    /// Grid positions in batches of at most `chunk_size`, x varying fastest
    pub fn position_chunks(&self, chunk_size: usize) -> impl Iterator<Item = Vec<[f32; 3]>> + '_ {
        let total = self.point_count();
        let step = chunk_size.max(1);
        (0..total)
            .step_by(step)
            .map(move |start| (start..(start + step).min(total)).map(|i| self.position(i)).collect())
    }
}

/// Evaluate a model at many points, `chunk_size` points per call
pub fn query_chunked<M: ReconstructionModel + ?Sized>(
    model: &mut M,
    scene: &SceneRepresentation,
    points: &[[f32; 3]],
    chunk_size: usize,
) -> Result<Vec<FieldSample>> {
    ensure!(chunk_size > 0, "chunk size must be positive");
    let mut samples = Vec::with_capacity(points.len());
    for chunk in points.chunks(chunk_size) {
        let batch = model.query(scene, chunk)?;
        if batch.len() != chunk.len() {
            bail!(
                "Model returned {} samples for {} points",
                batch.len(),
                chunk.len()
            );
        }
        samples.extend(batch);
    }
    Ok(samples)
}

/// Sample the density field on the grid and extract its iso-surface
///
/// Vertex colors are queried from the model at the vertex positions.
pub fn extract_mesh<M: ReconstructionModel + ?Sized>(
    model: &mut M,
    scene: &SceneRepresentation,
    resolution: u32,
    threshold: f32,
    chunk_size: usize,
) -> Result<Mesh> {
    let _span = tracing::debug_span!("extract_mesh", resolution, threshold).entered();

    ensure!(resolution >= 2, "resolution must be at least 2");
    ensure!(chunk_size > 0, "chunk size must be positive");
    let grid = Grid::new(resolution as usize, model.radius());

    // Only one batch of positions and samples is alive at a time
    let mut density = Vec::with_capacity(grid.point_count());
    for points in grid.position_chunks(chunk_size) {
        let batch = query_chunked(model, scene, &points, chunk_size)?;
        density.extend(batch.into_iter().map(|s| s.density));
    }

    let mut mesh = marching_tetrahedra(&grid, &density, threshold);
    tracing::debug!(
        "Iso-surface at {}: {} vertices, {} faces",
        threshold,
        mesh.vertex_count(),
        mesh.face_count()
    );

    if !mesh.vertices.is_empty() {
        mesh.colors = query_chunked(model, scene, &mesh.vertices, chunk_size)?
            .into_iter()
            .map(|s| s.color.map(|c| c.clamp(0.0, 1.0)))
            .collect();
    }

    Ok(mesh)
}

/// Extract the surface where `density == level`, inside being `density > level`
///
/// Colors are left empty. Vertices on shared grid edges are emitted once.
pub fn marching_tetrahedra(grid: &Grid, density: &[f32], level: f32) -> Mesh {
    let n = grid.resolution;
    if n < 2 || density.len() != grid.point_count() {
        return Mesh::default();
    }
    let mut builder = SurfaceBuilder::new(grid, density, level);

    for z in 0..n - 1 {
        for y in 0..n - 1 {
            for x in 0..n - 1 {
                let corners = CORNERS.map(|[dx, dy, dz]| grid.index(x + dx, y + dy, z + dz));
                let inside = corners.iter().filter(|&&i| density[i] > level).count();
                if inside == 0 || inside == 8 {
                    continue;
                }
                for tet in TETRAHEDRA {
                    builder.polygonize(tet.map(|c| corners[c]));
                }
            }
        }
    }

    builder.mesh
}

struct SurfaceBuilder<'a> {
    grid: &'a Grid,
    density: &'a [f32],
    level: f32,
    edge_vertices: HashMap<(usize, usize), u32>,
    mesh: Mesh,
}

impl<'a> SurfaceBuilder<'a> {
    fn new(grid: &'a Grid, density: &'a [f32], level: f32) -> Self {
        Self {
            grid,
            density,
            level,
            edge_vertices: HashMap::new(),
            mesh: Mesh::default(),
        }
    }

    fn is_inside(&self, point: usize) -> bool {
        self.density[point] > self.level
    }

    fn polygonize(&mut self, tet: [usize; 4]) {
        let (inside, outside): (Vec<usize>, Vec<usize>) =
            tet.iter().partition(|&&p| self.is_inside(p));

        match (inside.len(), outside.len()) {
            (1, 3) => {
                let a = inside[0];
                let v = [
                    self.edge_vertex(a, outside[0]),
                    self.edge_vertex(a, outside[1]),
                    self.edge_vertex(a, outside[2]),
                ];
                self.emit(v, &inside, &outside);
            }
            (3, 1) => {
                let b = outside[0];
                let v = [
                    self.edge_vertex(inside[0], b),
                    self.edge_vertex(inside[1], b),
                    self.edge_vertex(inside[2], b),
                ];
                self.emit(v, &inside, &outside);
            }
            (2, 2) => {
                // The four crossings form a quad in cyclic order i0o0, i0o1, i1o1, i1o0
                let q = [
                    self.edge_vertex(inside[0], outside[0]),
                    self.edge_vertex(inside[0], outside[1]),
                    self.edge_vertex(inside[1], outside[1]),
                    self.edge_vertex(inside[1], outside[0]),
                ];
                self.emit([q[0], q[1], q[2]], &inside, &outside);
                self.emit([q[0], q[2], q[3]], &inside, &outside);
            }
            _ => {}
        }
    }

    /// Push a triangle wound so its normal points from inside to outside
    fn emit(&mut self, mut tri: [u32; 3], inside: &[usize], outside: &[usize]) {
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            return;
        }
        let [a, b, c] = tri.map(|i| self.mesh.vertices[i as usize]);
        let normal = cross(sub(b, a), sub(c, a));
        let toward_outside = sub(self.centroid(outside), self.centroid(inside));
        if dot(normal, toward_outside) < 0.0 {
            tri.swap(1, 2);
        }
        self.mesh.faces.push(tri);
    }

    fn centroid(&self, points: &[usize]) -> [f32; 3] {
        let mut sum = [0.0; 3];
        for &p in points {
            let pos = self.grid.position(p);
            for c in 0..3 {
                sum[c] += pos[c];
            }
        }
        sum.map(|s| s / points.len() as f32)
    }

    fn edge_vertex(&mut self, inside: usize, outside: usize) -> u32 {
        let key = (inside.min(outside), inside.max(outside));
        if let Some(&index) = self.edge_vertices.get(&key) {
            return index;
        }

        let (da, db) = (self.density[inside], self.density[outside]);
        let t = ((self.level - da) / (db - da)).clamp(0.0, 1.0);
        let (pa, pb) = (self.grid.position(inside), self.grid.position(outside));
        let position = [0, 1, 2].map(|c| pa[c] + t * (pb[c] - pa[c]));

        let index = self.mesh.vertices.len() as u32;
        self.mesh.vertices.push(position);
        self.edge_vertices.insert(key, index);
        index
    }
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{empty_scene, SphereModel};

    fn scene() -> SceneRepresentation {
        empty_scene()
    }

    #[test]
    fn grid_spans_the_cube() {
        let grid = Grid::new(3, 0.87);
        assert_eq!(grid.position(0), [-0.87, -0.87, -0.87]);
        assert_eq!(grid.position(grid.index(2, 1, 0)), [0.87, 0.0, -0.87]);
    }

    #[test]
    fn position_chunks_cover_the_grid_in_order() {
        let grid = Grid::new(5, 1.0);
        let chunks: Vec<Vec<[f32; 3]>> = grid.position_chunks(40).collect();

        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() <= 40));
        assert_eq!(chunks[3].len(), 5);

        let flat: Vec<[f32; 3]> = chunks.into_iter().flatten().collect();
        let expected: Vec<[f32; 3]> = (0..grid.point_count()).map(|i| grid.position(i)).collect();
        assert_eq!(flat, expected);
    }

    #[test]
    fn sphere_surface_sits_at_the_threshold_radius() {
        let mut model = SphereModel::new(100.0);
        // density = 100 * (1 - r) = 50  →  r = 0.5
        let mesh = extract_mesh(&mut model, &scene(), 32, 50.0, 1024).unwrap();

        assert!(!mesh.is_empty());
        for v in &mesh.vertices {
            let r = dot(*v, *v).sqrt();
            assert!((r - 0.5).abs() < 0.06, "vertex at radius {r}");
        }
    }

    #[test]
    fn faces_point_outward() {
        let mut model = SphereModel::new(100.0);
        let mesh = extract_mesh(&mut model, &scene(), 24, 50.0, 4096).unwrap();

        for face in &mesh.faces {
            let [a, b, c] = face.map(|i| mesh.vertices[i as usize]);
            let normal = cross(sub(b, a), sub(c, a));
            if dot(normal, normal) < 1e-12 {
                continue;
            }
            let center = [0, 1, 2].map(|k| (a[k] + b[k] + c[k]) / 3.0);
            assert!(dot(normal, center) > 0.0);
        }
    }

    #[test]
    fn surface_is_closed() {
        let grid = Grid::new(20, 1.0);
        let density: Vec<f32> = (0..grid.point_count())
            .map(|i| grid.position(i))
            .map(|p| 1.0 - dot(p, p).sqrt())
            .collect();
        let mesh = marching_tetrahedra(&grid, &density, 0.3);

        let mut edges: HashMap<(u32, u32), usize> = HashMap::new();
        for f in &mesh.faces {
            for (a, b) in [(f[0], f[1]), (f[1], f[2]), (f[2], f[0])] {
                *edges.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        assert!(edges.values().all(|&count| count == 2));
    }

    #[test]
    fn colors_are_clamped_per_vertex() {
        let mut model = SphereModel::new(100.0);
        let mesh = extract_mesh(&mut model, &scene(), 16, 50.0, 8192).unwrap();

        assert_eq!(mesh.colors.len(), mesh.vertices.len());
        assert!(mesh.colors.iter().all(|c| c[1] == 1.0 && c[2] == 0.0));
    }

    #[test]
    fn extraction_is_deterministic() {
        let first = extract_mesh(&mut SphereModel::new(100.0), &scene(), 32, 25.0, 8192).unwrap();
        let second = extract_mesh(&mut SphereModel::new(100.0), &scene(), 32, 25.0, 8192).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn higher_resolution_never_loses_vertices() {
        let counts: Vec<usize> = [16, 32, 64]
            .into_iter()
            .map(|res| {
                extract_mesh(&mut SphereModel::new(100.0), &scene(), res, 25.0, 8192)
                    .unwrap()
                    .vertex_count()
            })
            .collect();
        assert!(counts.windows(2).all(|w| w[0] <= w[1]), "{counts:?}");
    }

    #[test]
    fn chunk_size_limits_batches_but_not_output() {
        let mut small = SphereModel::new(100.0);
        let mut large = SphereModel::new(100.0);
        let a = extract_mesh(&mut small, &scene(), 16, 50.0, 128).unwrap();
        let b = extract_mesh(&mut large, &scene(), 16, 50.0, 16384).unwrap();

        assert_eq!(a, b);
        assert_eq!(small.largest_batch, 128);
        assert!(small.query_calls > large.query_calls);
    }

    #[test]
    fn threshold_above_peak_yields_empty_mesh() {
        let mut model = SphereModel::new(10.0);
        let mesh = extract_mesh(&mut model, &scene(), 16, 50.0, 8192).unwrap();
        assert!(mesh.is_empty());
        assert!(mesh.colors.is_empty());
    }
}
