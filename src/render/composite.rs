//! Premultiplied RGBA8 compositing for stacking rasterized layers onto
//! the output buffer.

use crate::error::{MatchcardError, MatchcardResult};
use crate::model::Color;

pub type PremulRgba8 = [u8; 4];

pub fn premultiply(color: Color) -> PremulRgba8 {
    let a = color.a as u16;
    let premul = |c: u8| -> u8 { ((c as u16 * a + 127) / 255) as u8 };
    [premul(color.r), premul(color.g), premul(color.b), color.a]
}

pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = add_sat_u8(sa, mul_div255(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = add_sat_u8(sc, dc);
    }
    out
}

pub fn over_in_place(dst: &mut [u8], src: &[u8], opacity: f32) -> MatchcardResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(MatchcardError::raster(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
        d.copy_from_slice(&out);
    }
    Ok(())
}

pub fn fill(dst: &mut [u8], color: Color) {
    let px = premultiply(color);
    for chunk in dst.chunks_exact_mut(4) {
        chunk.copy_from_slice(&px);
    }
}

/// Convert a premultiplied buffer to straight alpha for image encoding.
pub fn unpremultiply_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        px[0] = ((px[0] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[1] = ((px[1] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[2] = ((px[2] as u16 * 255 + a / 2) / a).min(255) as u8;
    }
}

fn mul_div255(a: u16, b: u16) -> u8 {
    (((a * b) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}
