use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::components::pixel::Pixel;

/// How a windowed read adapts assembled pixels to a differently sized
/// output. Pure pixel math, applied after block assembly; the cache
/// never sees resampled data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResamplePolicy {
    #[default]
    Nearest,
    Bilinear,
    Average,
}

/// Resamples `src` of shape `src_shape` (width, height) into `dst` of
/// shape `dst_shape`, both row-major.
pub fn resample_into<T: Pixel>(
    src: &[T],
    src_shape: (usize, usize),
    dst: &mut [T],
    dst_shape: (usize, usize),
    policy: ResamplePolicy,
) {
    debug_assert_eq!(src.len(), src_shape.0 * src_shape.1);
    debug_assert_eq!(dst.len(), dst_shape.0 * dst_shape.1);
    if src_shape == dst_shape {
        dst.copy_from_slice(src);
        return;
    }
    match policy {
        ResamplePolicy::Nearest => nearest(src, src_shape, dst, dst_shape),
        ResamplePolicy::Bilinear => bilinear(src, src_shape, dst, dst_shape),
        ResamplePolicy::Average => average(src, src_shape, dst, dst_shape),
    }
}

pub fn resample<T: Pixel>(
    src: &[T],
    src_shape: (usize, usize),
    dst_shape: (usize, usize),
    policy: ResamplePolicy,
) -> Vec<T> {
    let mut dst = vec![T::zero(); dst_shape.0 * dst_shape.1];
    resample_into(src, src_shape, &mut dst, dst_shape, policy);
    dst
}

/// Source index of a destination pixel center.
fn nearest_index(dst_idx: usize, dst_len: usize, src_len: usize) -> usize {
    let center = (dst_idx as f64 + 0.5) * src_len as f64 / dst_len as f64;
    (center as usize).min(src_len - 1)
}

fn nearest<T: Pixel>(src: &[T], (sw, sh): (usize, usize), dst: &mut [T], (dw, dh): (usize, usize)) {
    for dy in 0..dh {
        let sy = nearest_index(dy, dh, sh);
        let src_row = &src[sy * sw..(sy + 1) * sw];
        let dst_row = &mut dst[dy * dw..(dy + 1) * dw];
        for (dx, out) in dst_row.iter_mut().enumerate() {
            *out = src_row[nearest_index(dx, dw, sw)];
        }
    }
}

fn bilinear<T: Pixel>(src: &[T], (sw, sh): (usize, usize), dst: &mut [T], (dw, dh): (usize, usize)) {
    let sample = |x: usize, y: usize| -> f64 {
        src[y * sw + x].to_f64().unwrap_or_default()
    };
    for dy in 0..dh {
        // Destination pixel center in source coordinates.
        let fy = ((dy as f64 + 0.5) * sh as f64 / dh as f64 - 0.5).clamp(0.0, (sh - 1) as f64);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(sh - 1);
        let ty = fy - y0 as f64;
        for dx in 0..dw {
            let fx = ((dx as f64 + 0.5) * sw as f64 / dw as f64 - 0.5).clamp(0.0, (sw - 1) as f64);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(sw - 1);
            let tx = fx - x0 as f64;
            let top = sample(x0, y0) * (1.0 - tx) + sample(x1, y0) * tx;
            let bottom = sample(x0, y1) * (1.0 - tx) + sample(x1, y1) * tx;
            dst[dy * dw + dx] = T::from_f64_lossy(top * (1.0 - ty) + bottom * ty);
        }
    }
}

fn average<T: Pixel>(src: &[T], (sw, sh): (usize, usize), dst: &mut [T], (dw, dh): (usize, usize)) {
    for dy in 0..dh {
        let y0 = dy * sh / dh;
        let y1 = ((dy + 1) * sh).div_ceil(dh).min(sh).max(y0 + 1);
        for dx in 0..dw {
            let x0 = dx * sw / dw;
            let x1 = ((dx + 1) * sw).div_ceil(dw).min(sw).max(x0 + 1);
            let mut sum = 0.0;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += src[y * sw + x].to_f64().unwrap_or_default();
                }
            }
            let count = ((y1 - y0) * (x1 - x0)) as f64;
            dst[dy * dw + dx] = T::from_f64_lossy(sum / count);
        }
    }
}
