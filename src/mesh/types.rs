/// Triangle mesh with one RGB color per vertex
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<[f32; 3]>,
    /// RGB in [0, 1], parallel to `vertices`
    pub colors: Vec<[f32; 3]>,
    /// Counter-clockwise seen from outside
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Apply a linear map to every vertex
    pub fn transform(&mut self, matrix: &[[f32; 3]; 3]) {
        for v in &mut self.vertices {
            *v = [
                matrix[0][0] * v[0] + matrix[0][1] * v[1] + matrix[0][2] * v[2],
                matrix[1][0] * v[0] + matrix[1][1] * v[1] + matrix[1][2] * v[2],
                matrix[2][0] * v[0] + matrix[2][1] * v[1] + matrix[2][2] * v[2],
            ];
        }
    }
}
