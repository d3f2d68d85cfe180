use anyhow::{bail, Result};
use ndarray::{Array4, ArrayView3};

/// Axis pairs each plane is indexed by: XY, XZ, YZ
const PLANE_AXES: [(usize, usize); 3] = [(0, 1), (0, 2), (1, 2)];

/// Triplane scene representation
///
/// Three axis-aligned feature planes, shape [3, C, H, W]. A point's feature
/// vector is the bilinear sample of each plane at the point's projection,
/// concatenated plane by plane (3 * C values).
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRepresentation {
    planes: Array4<f32>,
}

impl SceneRepresentation {
    pub fn new(planes: Array4<f32>) -> Result<Self> {
        let shape = planes.shape();
        if shape[0] != 3 || shape[1] == 0 || shape[2] == 0 || shape[3] == 0 {
            bail!("Expected triplanes shaped [3, C, H, W], got {:?}", shape);
        }
        Ok(Self { planes })
    }

    pub fn channels(&self) -> usize {
        self.planes.shape()[1]
    }

    pub fn feature_len(&self) -> usize {
        3 * self.channels()
    }

    pub fn planes(&self) -> &Array4<f32> {
        &self.planes
    }

    /// Write the feature vector of `point` into `out`
    ///
    /// `point` lives in `[-radius, radius]^3`. Samples outside the planes
    /// read as zero.
    pub fn sample_into(&self, point: [f32; 3], radius: f32, out: &mut [f32]) {
        let channels = self.channels();
        debug_assert_eq!(out.len(), 3 * channels);

        for (plane, &(a, b)) in PLANE_AXES.iter().enumerate() {
            let view = self.planes.index_axis(ndarray::Axis(0), plane);
            let u = point[a] / radius;
            let v = point[b] / radius;
            bilinear(&view, u, v, &mut out[plane * channels..(plane + 1) * channels]);
        }
    }

    pub fn sample(&self, point: [f32; 3], radius: f32) -> Vec<f32> {
        let mut out = vec![0.0; self.feature_len()];
        self.sample_into(point, radius, &mut out);
        out
    }
}

/// Bilinear lookup in a [C, H, W] plane at normalized coordinates in [-1, 1]
///
/// `u` runs along W, `v` along H. Pixel centers sit at `(i + 0.5) / size`
/// of the extent, and taps outside the plane contribute zero.
fn bilinear(plane: &ArrayView3<f32>, u: f32, v: f32, out: &mut [f32]) {
    let (height, width) = (plane.shape()[1] as i64, plane.shape()[2] as i64);
    let px = ((u + 1.0) * width as f32 - 1.0) / 2.0;
    let py = ((v + 1.0) * height as f32 - 1.0) / 2.0;

    let x0 = px.floor();
    let y0 = py.floor();
    let fx = px - x0;
    let fy = py - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    out.iter_mut().for_each(|o| *o = 0.0);
    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ];
    for (x, y, weight) in taps {
        if x < 0 || y < 0 || x >= width || y >= height || weight == 0.0 {
            continue;
        }
        for (c, o) in out.iter_mut().enumerate() {
            *o += weight * plane[[c, y as usize, x as usize]];
        }
    }
}
