use image::{Rgba, RgbaImage};

pub fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

pub fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

pub fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = clamp01((x - edge0) / (edge1 - edge0));
    t * t * (3.0 - 2.0 * t)
}

pub fn ease_in_out_cubic(t: f32) -> f32 {
    let t = clamp01(t);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) * 0.5
    }
}

/// Hexagonal HSV to RGB. `hue` in degrees (wrapped), `sat`/`val` in [0,1].
pub fn hsv_to_rgb(hue: f32, sat: f32, val: f32) -> [u8; 3] {
    let h = hue.rem_euclid(360.0);
    let s = clamp01(sat);
    let v = clamp01(val);

    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    [
        clamp_u8((r + m) * 255.0),
        clamp_u8((g + m) * 255.0),
        clamp_u8((b + m) * 255.0),
    ]
}

/// One round of the mulberry32 mix. Returns a uniform float in [0, 1).
pub fn hash32(seed: u32) -> f32 {
    let a = seed.wrapping_add(0x6D2B_79F5);
    let mut t = (a ^ (a >> 15)).wrapping_mul(1 | a);
    t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(61 | t));
    unit_from_bits(t ^ (t >> 14))
}

/// Top 24 bits as a float in [0, 1); every value is exact in f32.
fn unit_from_bits(bits: u32) -> f32 {
    (bits >> 8) as f32 / 16_777_216.0
}

/// Bilinear sample of `src` at a fractional pixel position.
///
/// Integer coordinates return the stored pixel unchanged. Positions outside
/// `[0, w-1] x [0, h-1]` yield opaque black.
pub fn sample_bilinear(src: &RgbaImage, x: f32, y: f32) -> [u8; 4] {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 || !x.is_finite() || !y.is_finite() {
        return [0, 0, 0, 255];
    }
    let max_x = (w - 1) as f32;
    let max_y = (h - 1) as f32;
    if x < 0.0 || y < 0.0 || x > max_x || y > max_y {
        return [0, 0, 0, 255];
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x0 = x0 as u32;
    let y0 = y0 as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);

    let p00 = src.get_pixel(x0, y0).0;
    if fx == 0.0 && fy == 0.0 {
        return p00;
    }
    let p10 = src.get_pixel(x1, y0).0;
    let p01 = src.get_pixel(x0, y1).0;
    let p11 = src.get_pixel(x1, y1).0;

    let w00 = (1.0 - fx) * (1.0 - fy);
    let w10 = fx * (1.0 - fy);
    let w01 = (1.0 - fx) * fy;
    let w11 = fx * fy;

    let mut out = [0u8; 4];
    for c in 0..4 {
        out[c] = clamp_u8(
            p00[c] as f32 * w00 + p10[c] as f32 * w10 + p01[c] as f32 * w01 + p11[c] as f32 * w11,
        );
    }
    out
}

/// Composite a straight-alpha pixel over opaque black.
pub fn over_black(px: Rgba<u8>) -> [u8; 3] {
    let a = px.0[3] as f32 / 255.0;
    [
        clamp_u8(px.0[0] as f32 * a),
        clamp_u8(px.0[1] as f32 * a),
        clamp_u8(px.0[2] as f32 * a),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsv_primary_hues() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [255, 0, 0]);
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), [0, 255, 0]);
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), [0, 0, 255]);
        assert_eq!(hsv_to_rgb(360.0, 1.0, 1.0), [255, 0, 0]);
        assert_eq!(hsv_to_rgb(77.0, 0.0, 0.5), [128, 128, 128]);
    }

    #[test]
    fn hash_is_pure_and_in_unit_range() {
        for seed in [0u32, 1, 42, 0xDEAD_BEEF, u32::MAX] {
            let a = hash32(seed);
            assert_eq!(a, hash32(seed));
            assert!((0.0..1.0).contains(&a));
        }
        assert_ne!(hash32(1), hash32(2));
    }

    #[test]
    fn unit_mapping_never_reaches_one() {
        assert!(unit_from_bits(u32::MAX) < 1.0);
        assert!(unit_from_bits(0xFFFF_FF80) < 1.0);
        assert_eq!(unit_from_bits(0), 0.0);
        assert_eq!(unit_from_bits(0x8000_0000), 0.5);
    }

    #[test]
    fn bilinear_at_integer_coordinates_is_exact() {
        let mut img = RgbaImage::new(3, 2);
        img.put_pixel(0, 0, Rgba([10, 20, 30, 255]));
        img.put_pixel(1, 0, Rgba([200, 100, 50, 255]));
        img.put_pixel(2, 1, Rgba([7, 9, 11, 128]));
        assert_eq!(sample_bilinear(&img, 1.0, 0.0), [200, 100, 50, 255]);
        assert_eq!(sample_bilinear(&img, 2.0, 1.0), [7, 9, 11, 128]);
        assert_eq!(sample_bilinear(&img, 0.0, 0.0), [10, 20, 30, 255]);
    }

    #[test]
    fn bilinear_midpoint_averages_and_out_of_bounds_is_black() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([200, 100, 50, 255]));
        assert_eq!(sample_bilinear(&img, 0.5, 0.0), [100, 50, 25, 255]);
        assert_eq!(sample_bilinear(&img, -0.1, 0.0), [0, 0, 0, 255]);
        assert_eq!(sample_bilinear(&img, 1.5, 0.0), [0, 0, 0, 255]);
    }

    #[test]
    fn easing_endpoints() {
        assert_eq!(ease_in_out_cubic(0.0), 0.0);
        assert_eq!(ease_in_out_cubic(1.0), 1.0);
        assert!((ease_in_out_cubic(0.5) - 0.5).abs() < 1e-6);
        assert_eq!(smoothstep(0.0, 0.5, 0.5), 1.0);
        assert_eq!(smoothstep(0.0, 0.5, 0.0), 0.0);
    }
}
