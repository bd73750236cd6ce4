//! Scalar interpolation helpers shared by sampling and erosion

/// Linear interpolation; `t = 0` returns `a` bit-exactly.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    if t == 0.0 { a } else { a + (b - a) * t }
}

/// Hermite smoothstep of `x` between `edge0` and `edge1`.
///
/// Degenerate edges act as a hard step at `edge0`.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Trilinear blend of the 8 corner values of a unit cell.
///
/// Corners are ordered x-fastest: `c[x + 2y + 4z]`.
#[inline]
pub fn trilinear(c: &[f32; 8], tx: f32, ty: f32, tz: f32) -> f32 {
    let x00 = lerp(c[0], c[1], tx);
    let x10 = lerp(c[2], c[3], tx);
    let x01 = lerp(c[4], c[5], tx);
    let x11 = lerp(c[6], c[7], tx);
    let y0 = lerp(x00, x10, ty);
    let y1 = lerp(x01, x11, ty);
    lerp(y0, y1, tz)
}

/// Trilinear weights matching the corner order of [`trilinear`].
#[inline]
pub fn trilinear_weights(tx: f32, ty: f32, tz: f32) -> [f32; 8] {
    let mut w = [0.0; 8];
    for (i, slot) in w.iter_mut().enumerate() {
        let wx = if i & 1 != 0 { tx } else { 1.0 - tx };
        let wy = if i & 2 != 0 { ty } else { 1.0 - ty };
        let wz = if i & 4 != 0 { tz } else { 1.0 - tz };
        *slot = wx * wy * wz;
    }
    w
}
