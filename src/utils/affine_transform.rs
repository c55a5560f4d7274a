/// Affine transform helpers
/// Used for arbitrary-angle raster rotation (cf. cv2::warpAffine).
use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_into_with, Interpolation};

/// 2x3 affine matrix
/// | a11 a12 b1 |
/// | a21 a22 b2 |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix {
    pub a11: f32,
    pub a12: f32,
    pub b1: f32,
    pub a21: f32,
    pub a22: f32,
    pub b2: f32,
}

impl AffineMatrix {
    pub fn identity() -> Self {
        Self {
            a11: 1.0,
            a12: 0.0,
            b1: 0.0,
            a21: 0.0,
            a22: 1.0,
            b2: 0.0,
        }
    }

    pub fn translation(dx: f32, dy: f32) -> Self {
        Self {
            b1: dx,
            b2: dy,
            ..Self::identity()
        }
    }

    /// Rotation in degrees. With y pointing down, positive angles turn
    /// clockwise on screen.
    pub fn rotation(angle_degrees: f32) -> Self {
        let angle_rad = angle_degrees.to_radians();
        let cos_a = angle_rad.cos();
        let sin_a = angle_rad.sin();
        Self {
            a11: cos_a,
            a12: -sin_a,
            b1: 0.0,
            a21: sin_a,
            a22: cos_a,
            b2: 0.0,
        }
    }

    /// self * other (apply `other` first)
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            a11: self.a11 * other.a11 + self.a12 * other.a21,
            a12: self.a11 * other.a12 + self.a12 * other.a22,
            b1: self.a11 * other.b1 + self.a12 * other.b2 + self.b1,
            a21: self.a21 * other.a11 + self.a22 * other.a21,
            a22: self.a21 * other.a12 + self.a22 * other.a22,
            b2: self.a21 * other.b1 + self.a22 * other.b2 + self.b2,
        }
    }

    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a11 * x + self.a12 * y + self.b1,
            self.a21 * x + self.a22 * y + self.b2,
        )
    }

    pub fn inverse(&self) -> Option<Self> {
        let det = self.a11 * self.a22 - self.a12 * self.a21;
        if det.abs() < 1e-10 {
            return None;
        }

        let inv_det = 1.0 / det;
        Some(Self {
            a11: self.a22 * inv_det,
            a12: -self.a12 * inv_det,
            b1: (self.a12 * self.b2 - self.a22 * self.b1) * inv_det,
            a21: -self.a21 * inv_det,
            a22: self.a11 * inv_det,
            b2: (self.a21 * self.b1 - self.a11 * self.b2) * inv_det,
        })
    }
}

/// Rotation about the image centre into a canvas that holds the whole
/// rotated image. Returns the forward matrix and the canvas size.
pub fn rotation_expanding(width: u32, height: u32, angle_degrees: f32) -> (AffineMatrix, (u32, u32)) {
    let rad = angle_degrees.to_radians();
    let (w, h) = (width as f32, height as f32);
    // trim float noise so e.g. 45° on a square does not grow by a pixel
    let new_w = ((w * rad.cos().abs() + h * rad.sin().abs()) - 1e-3).ceil().max(1.0);
    let new_h = ((w * rad.sin().abs() + h * rad.cos().abs()) - 1e-3).ceil().max(1.0);

    let matrix = AffineMatrix::translation(new_w / 2.0, new_h / 2.0)
        .compose(&AffineMatrix::rotation(angle_degrees))
        .compose(&AffineMatrix::translation(-w / 2.0, -h / 2.0));
    (matrix, (new_w as u32, new_h as u32))
}

/// Warp `src` into a `size` canvas by `matrix` (bilinear, transparent fill).
pub fn warp_rgba(src: &RgbaImage, matrix: &AffineMatrix, size: (u32, u32)) -> Option<RgbaImage> {
    let inv = matrix.inverse()?;
    let mut out = RgbaImage::new(size.0, size.1);
    warp_into_with(
        src,
        move |x, y| inv.transform_point(x, y),
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 0]),
        &mut out,
    );
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let matrix = AffineMatrix::identity();
        assert_eq!(matrix.transform_point(10.0, 20.0), (10.0, 20.0));
    }

    #[test]
    fn test_rotation_90() {
        let matrix = AffineMatrix::rotation(90.0);
        let (x, y) = matrix.transform_point(1.0, 0.0);
        assert!((x - 0.0).abs() < 1e-6);
        assert!((y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let matrix = AffineMatrix::translation(5.0, 10.0).compose(&AffineMatrix::rotation(30.0));
        let inv = matrix.inverse().unwrap();
        let (fx, fy) = matrix.transform_point(3.0, 4.0);
        let (x, y) = inv.transform_point(fx, fy);
        assert!((x - 3.0).abs() < 1e-4);
        assert!((y - 4.0).abs() < 1e-4);
    }

    #[test]
    fn expanding_rotation_grows_canvas() {
        let (_, size) = rotation_expanding(100, 50, 90.0);
        assert_eq!(size, (50, 100));
        let (_, size) = rotation_expanding(100, 100, 45.0);
        assert_eq!(size, (142, 142));
        let (_, size) = rotation_expanding(100, 50, 0.0);
        assert_eq!(size, (100, 50));
    }

    #[test]
    fn warp_moves_centre_to_centre() {
        let src = RgbaImage::from_pixel(20, 20, Rgba([200, 10, 10, 255]));
        let (m, size) = rotation_expanding(20, 20, 30.0);
        let out = warp_rgba(&src, &m, size).unwrap();
        assert_eq!(out.dimensions(), size);
        let c = out.get_pixel(size.0 / 2, size.1 / 2);
        assert_eq!(c[3], 255);
        // corners of the expanded canvas lie outside the rotated square
        assert_eq!(out.get_pixel(0, 0)[3], 0);
    }
}
