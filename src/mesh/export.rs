use super::types::Mesh;
use anyhow::{ensure, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write a mesh as Wavefront OBJ with per-vertex colors
///
/// Vertices are `v x y z r g b` (colors in [0, 1]); faces are 1-based.
pub fn write_obj<W: Write>(mesh: &Mesh, mut writer: W) -> Result<()> {
    ensure!(
        mesh.colors.is_empty() || mesh.colors.len() == mesh.vertices.len(),
        "mesh has {} colors for {} vertices",
        mesh.colors.len(),
        mesh.vertices.len()
    );

    for (i, [x, y, z]) in mesh.vertices.iter().enumerate() {
        match mesh.colors.get(i) {
            Some([r, g, b]) => writeln!(writer, "v {x:.6} {y:.6} {z:.6} {r:.6} {g:.6} {b:.6}")?,
            None => writeln!(writer, "v {x:.6} {y:.6} {z:.6}")?,
        }
    }
    for [a, b, c] in &mesh.faces {
        writeln!(writer, "f {} {} {}", a + 1, b + 1, c + 1)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a mesh to `path` as OBJ
pub fn export_obj<P: AsRef<Path>>(mesh: &Mesh, path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create mesh file at {}", path.display()))?;
    write_obj(mesh, BufWriter::new(file))
        .with_context(|| format!("Failed to write mesh to {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Write a mesh to a fresh temporary `.obj` file that outlives this call
///
/// The caller owns the returned path and is responsible for removing it.
pub fn export_temp_obj(mesh: &Mesh) -> Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix("meshlift-")
        .suffix(".obj")
        .tempfile()
        .context("Failed to create temporary mesh file")?;

    write_obj(mesh, BufWriter::new(file.as_file_mut()))?;

    let (_, path) = file.keep().context("Failed to persist temporary mesh file")?;
    tracing::debug!("Mesh written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Mesh {
        Mesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            colors: vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            faces: vec![[0, 1, 2]],
        }
    }

    #[test]
    fn obj_has_colored_vertices_and_one_based_faces() {
        let mut out = Vec::new();
        write_obj(&triangle(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[1],
            "v 1.000000 0.000000 0.000000 0.000000 1.000000 0.000000"
        );
        assert_eq!(lines[3], "f 1 2 3");
    }

    #[test]
    fn uncolored_mesh_writes_plain_vertices() {
        let mut mesh = triangle();
        mesh.colors.clear();
        let mut out = Vec::new();
        write_obj(&mesh, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("v 0.000000 0.000000 0.000000\n"));
    }

    #[test]
    fn mismatched_colors_are_rejected() {
        let mut mesh = triangle();
        mesh.colors.pop();
        assert!(write_obj(&mesh, Vec::new()).is_err());
    }

    #[test]
    fn temp_export_persists_an_obj_file() {
        let path = export_temp_obj(&triangle()).unwrap();

        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("obj"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), 3);
        assert_eq!(text.lines().filter(|l| l.starts_with("f ")).count(), 1);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn export_to_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_obj(&triangle(), dir.path().join("out.obj")).unwrap();
        assert!(path.is_file());
    }
}
