use super::types::Mesh;

/// Rotation of `angle` radians about the X axis
pub fn rotation_x(angle: f32) -> [[f32; 3]; 3] {
    let (s, c) = angle.sin_cos();
    [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]]
}

/// Rotation of `angle` radians about the Y axis
pub fn rotation_y(angle: f32) -> [[f32; 3]; 3] {
    let (s, c) = angle.sin_cos();
    [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]]
}

/// Reorient a reconstructed mesh into the viewer's Y-up convention
///
/// Rotates -90° about X, then +90° about Y: `(x, y, z) → (-y, z, -x)`.
/// Rotations keep winding, so faces are untouched.
pub fn to_viewer_orientation(mesh: &mut Mesh) {
    mesh.transform(&rotation_x(-std::f32::consts::FRAC_PI_2));
    mesh.transform(&rotation_y(std::f32::consts::FRAC_PI_2));
}
