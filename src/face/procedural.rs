use image::{Rgba, RgbaImage};
use rand::Rng;

use crate::math::clamp_u8;

// --- Procedural stand-in photo ---

pub const DEMO_FACE_SIZE: (u32, u32) = (256, 320);

fn ellipse_r2(x: f32, y: f32, cx: f32, cy: f32, rx: f32, ry: f32) -> f32 {
    let nx = (x - cx) / rx;
    let ny = (y - cy) / ry;
    nx * nx + ny * ny
}

/// Pale oval face on black with dark eyes and a half-open mouth. Brightness
/// peaks at the centre so the face reads as near when used as a depth map.
pub fn generate_demo_face(width: u32, height: u32) -> RgbaImage {
    let mut rng = rand::rng();
    let (w, h) = (width as f32, height as f32);
    let mut img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));

    let eyes = [(0.36 * w, 0.40 * h), (0.64 * w, 0.40 * h)];

    for (x, y, px) in img.enumerate_pixels_mut() {
        let (fx, fy) = (x as f32 + 0.5, y as f32 + 0.5);
        let face = ellipse_r2(fx, fy, 0.5 * w, 0.5 * h, 0.36 * w, 0.44 * h);
        if face >= 1.0 {
            continue;
        }

        let mouth = ellipse_r2(fx, fy, 0.5 * w, 0.71 * h, 0.07 * w, 0.035 * h);
        if mouth < 1.0 {
            continue;
        }
        if eyes
            .iter()
            .any(|&(ex, ey)| ellipse_r2(fx, fy, ex, ey, 0.06 * w, 0.03 * h) < 1.0)
        {
            *px = Rgba([25, 25, 25, 255]);
            continue;
        }

        let nose = ellipse_r2(fx, fy, 0.5 * w, 0.56 * h, 0.05 * w, 0.09 * h);
        let mut shade = 150.0 + 90.0 * (1.0 - face);
        if nose < 1.0 {
            shade += 15.0 * (1.0 - nose);
        }
        shade += rng.random_range(-4.0_f32..4.0_f32);
        let v = clamp_u8(shade);
        *px = Rgba([v, v, clamp_u8(shade * 0.96), 255]);
    }

    img
}
