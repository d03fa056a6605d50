//! Pure canvas geometry.
//!
//! Nothing here touches pixels or files, so every rule is unit testable.

use crate::config::SizeMode;

/// Size the source takes on the canvas under `mode`.
pub fn scaled_dimensions(source: (u32, u32), canvas: (u32, u32), mode: SizeMode) -> (u32, u32) {
    match mode {
        SizeMode::Contain => contain_dimensions(source, canvas),
        SizeMode::Cover => cover_dimensions(source, canvas),
    }
}

/// Fit the whole source inside the canvas. One axis matches the canvas
/// exactly; the other is proportional and never larger.
pub fn contain_dimensions(source: (u32, u32), canvas: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (canvas_w, canvas_h) = canvas;

    let src_aspect = src_w as f64 / src_h as f64;
    let canvas_aspect = canvas_w as f64 / canvas_h as f64;

    if src_aspect > canvas_aspect {
        let h = (canvas_w as f64 / src_aspect).round() as u32;
        (canvas_w, h.clamp(1, canvas_h))
    } else {
        let w = (canvas_h as f64 * src_aspect).round() as u32;
        (w.clamp(1, canvas_w), canvas_h)
    }
}

/// Scale each axis by its own factor (`canvas / source`).
///
/// This stretches rather than crops: aspect ratio is only kept when the
/// source and canvas already share it.
pub fn cover_dimensions(source: (u32, u32), canvas: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (canvas_w, canvas_h) = canvas;

    let width_scale = canvas_w as f64 / src_w as f64;
    let height_scale = canvas_h as f64 / src_h as f64;

    let w = (src_w as f64 * width_scale).round() as u32;
    let h = (src_h as f64 * height_scale).round() as u32;
    (w.max(1), h.max(1))
}

/// Top-left position that centers `image` on `canvas`, truncating halves.
pub fn center_offset(canvas: (u32, u32), image: (u32, u32)) -> (i64, i64) {
    let x = (canvas.0 as i64 - image.0 as i64) / 2;
    let y = (canvas.1 as i64 - image.1 as i64) / 2;
    (x, y)
}
