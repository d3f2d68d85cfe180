mod export;
mod extract;
mod orientation;
mod types;

pub use export::{export_obj, export_temp_obj, write_obj};
pub use extract::{extract_mesh, marching_tetrahedra, query_chunked, Grid};
pub use orientation::{rotation_x, rotation_y, to_viewer_orientation};
pub use types::Mesh;
