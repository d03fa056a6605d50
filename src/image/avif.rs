//! In-process AVIF decoding.
//!
//! The `image` crate only ships the AVIF encoder. AVIF sources are parsed with
//! `avif-parse` and their AV1 payloads decoded with `rav1d`; an alpha item, when
//! present, is decoded the same way and merged into an RGBA image.

use super::fallback::FallbackDecoder;
use crate::{Error, Result};
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use rav1d::include::dav1d::data::Dav1dData;
use rav1d::include::dav1d::dav1d::Dav1dSettings;
use rav1d::include::dav1d::headers::{
    DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
    DAV1D_PIXEL_LAYOUT_I444,
};
use rav1d::include::dav1d::picture::Dav1dPicture;
use rav1d::src::lib::{
    dav1d_close, dav1d_data_create, dav1d_data_unref, dav1d_default_settings, dav1d_get_picture,
    dav1d_open, dav1d_picture_unref, dav1d_send_data,
};
use std::path::Path;
use std::ptr::NonNull;

/// Decodes AVIF files without any external program.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvifDecoder;

impl AvifDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, path: &Path) -> Result<DynamicImage> {
        let file_data = std::fs::read(path)?;
        let avif = avif_parse::read_avif(&mut std::io::Cursor::new(&file_data)).map_err(|e| {
            Error::Decode(format!("Failed to parse AVIF {}: {:?}", path.display(), e))
        })?;

        let (width, height, rgb) = decode_av1(&avif.primary_item, |planes| {
            Ok((planes.width, planes.height, planes.to_rgb()))
        })?;

        let Some(alpha_item) = avif.alpha_item.as_deref() else {
            return RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| invalid_buffer(path));
        };

        let alpha = decode_av1(alpha_item, |planes| {
            if (planes.width, planes.height) != (width, height) {
                return Err(Error::Decode(format!(
                    "AVIF alpha plane is {}x{} but the image is {}x{}",
                    planes.width, planes.height, width, height
                )));
            }
            Ok(planes.to_luma())
        })?;

        let mut rgba = Vec::with_capacity(alpha.len() * 4);
        for (pixel, &a) in rgb.chunks_exact(3).zip(&alpha) {
            if avif.premultiplied_alpha {
                rgba.extend(pixel.iter().map(|&c| unpremultiply(c, a)));
            } else {
                rgba.extend_from_slice(pixel);
            }
            rgba.push(a);
        }

        RgbaImage::from_raw(width, height, rgba)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| invalid_buffer(path))
    }
}

impl FallbackDecoder for AvifDecoder {
    fn convert_to_png(&self, input: &Path, output: &Path) -> Result<()> {
        self.decode(input)?
            .save_with_format(output, ImageFormat::Png)
            .map_err(|e| Error::Encode(format!("Failed to write {}: {}", output.display(), e)))
    }
}

fn invalid_buffer(path: &Path) -> Error {
    Error::Decode(format!(
        "Decoded AVIF {} does not match its dimensions",
        path.display()
    ))
}

fn unpremultiply(channel: u8, alpha: u8) -> u8 {
    if alpha == 0 {
        return 0;
    }
    ((channel as u32 * 255 + alpha as u32 / 2) / alpha as u32).min(255) as u8
}

/// Decode a single AV1 frame and hand its planes to `read` while the picture
/// is still alive.
fn decode_av1<T>(av1: &[u8], read: impl FnOnce(&YuvPlanes) -> Result<T>) -> Result<T> {
    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    let settings_ptr = NonNull::new(settings.as_mut_ptr())
        .ok_or_else(|| Error::Invariant("rav1d settings pointer is null".to_string()))?;
    // SAFETY: dav1d_default_settings initializes every field.
    unsafe { dav1d_default_settings(settings_ptr) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc = unsafe { dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(Error::Decode(format!("rav1d open failed ({})", rc.0)));
    }

    let result = (|| {
        let mut data = Dav1dData::default();
        let buffer = unsafe { dav1d_data_create(NonNull::new(&mut data), av1.len()) };
        if buffer.is_null() {
            return Err(Error::Decode("rav1d could not allocate input data".to_string()));
        }
        unsafe { std::ptr::copy_nonoverlapping(av1.as_ptr(), buffer, av1.len()) };

        let rc = unsafe { dav1d_send_data(ctx, NonNull::new(&mut data)) };
        if rc.0 != 0 {
            unsafe { dav1d_data_unref(NonNull::new(&mut data)) };
            return Err(Error::Decode(format!("rav1d send_data failed ({})", rc.0)));
        }

        let mut picture: Dav1dPicture = unsafe { std::mem::zeroed() };
        let rc = unsafe { dav1d_get_picture(ctx, NonNull::new(&mut picture)) };
        if rc.0 != 0 {
            return Err(Error::Decode(format!("rav1d get_picture failed ({})", rc.0)));
        }

        let output = YuvPlanes::from_picture(&picture).and_then(|planes| read(&planes));
        unsafe { dav1d_picture_unref(NonNull::new(&mut picture)) };
        output
    })();

    unsafe { dav1d_close(NonNull::new(&mut ctx)) };
    result
}

/// Borrowed view of a decoded picture's planes.
struct YuvPlanes {
    y_ptr: *const u8,
    u_ptr: *const u8,
    v_ptr: *const u8,
    y_stride: isize,
    uv_stride: isize,
    width: u32,
    height: u32,
    bpc: u32,
    ss_x: bool,
    ss_y: bool,
    monochrome: bool,
}

impl YuvPlanes {
    fn from_picture(picture: &Dav1dPicture) -> Result<Self> {
        let plane = |index: usize| {
            picture.data[index]
                .map(|ptr| ptr.as_ptr() as *const u8)
                .ok_or_else(|| Error::Decode(format!("AV1 picture has no plane {}", index)))
        };

        let y_ptr = plane(0)?;
        let layout = picture.p.layout;
        let (u_ptr, v_ptr, ss_x, ss_y, monochrome) = match layout {
            DAV1D_PIXEL_LAYOUT_I400 => (y_ptr, y_ptr, false, false, true),
            DAV1D_PIXEL_LAYOUT_I420 => (plane(1)?, plane(2)?, true, true, false),
            DAV1D_PIXEL_LAYOUT_I422 => (plane(1)?, plane(2)?, true, false, false),
            DAV1D_PIXEL_LAYOUT_I444 => (plane(1)?, plane(2)?, false, false, false),
            _ => {
                return Err(Error::Decode(format!(
                    "Unsupported AVIF pixel layout: {}",
                    layout
                )))
            }
        };

        Ok(Self {
            y_ptr,
            u_ptr,
            v_ptr,
            y_stride: picture.stride[0],
            uv_stride: if monochrome { 0 } else { picture.stride[1] },
            width: picture.p.w as u32,
            height: picture.p.h as u32,
            bpc: picture.p.bpc as u32,
            ss_x,
            ss_y,
            monochrome,
        })
    }

    fn scale(&self) -> f32 {
        255.0 / ((1u32 << self.bpc) - 1) as f32
    }

    /// Interleaved RGB8 using BT.601 coefficients.
    fn to_rgb(&self) -> Vec<u8> {
        let scale = self.scale();
        let center = (1u32 << (self.bpc - 1)) as f32;
        let mut rgb = Vec::with_capacity((self.width * self.height * 3) as usize);

        for row in 0..self.height {
            for col in 0..self.width {
                let y = self.sample(self.y_ptr, self.y_stride, col, row);

                if self.monochrome {
                    let v = (y * scale).clamp(0.0, 255.0) as u8;
                    rgb.extend_from_slice(&[v, v, v]);
                    continue;
                }

                let u_col = if self.ss_x { col / 2 } else { col };
                let u_row = if self.ss_y { row / 2 } else { row };
                let cb = self.sample(self.u_ptr, self.uv_stride, u_col, u_row) - center;
                let cr = self.sample(self.v_ptr, self.uv_stride, u_col, u_row) - center;

                rgb.push(((y + 1.402 * cr) * scale).clamp(0.0, 255.0) as u8);
                rgb.push(((y - 0.344136 * cb - 0.714136 * cr) * scale).clamp(0.0, 255.0) as u8);
                rgb.push(((y + 1.772 * cb) * scale).clamp(0.0, 255.0) as u8);
            }
        }
        rgb
    }

    /// Luma plane scaled to 8 bits; used for alpha items.
    fn to_luma(&self) -> Vec<u8> {
        let scale = self.scale();
        let mut luma = Vec::with_capacity((self.width * self.height) as usize);
        for row in 0..self.height {
            for col in 0..self.width {
                let y = self.sample(self.y_ptr, self.y_stride, col, row);
                luma.push((y * scale).clamp(0.0, 255.0) as u8);
            }
        }
        luma
    }

    fn sample(&self, ptr: *const u8, stride: isize, x: u32, y: u32) -> f32 {
        // SAFETY: x and y are within the plane the picture describes, and the
        // picture is referenced for as long as `self` is used.
        unsafe {
            if self.bpc <= 8 {
                *ptr.offset(y as isize * stride + x as isize) as f32
            } else {
                // High bit depths are stored as u16.
                let offset = y as isize * stride + x as isize * 2;
                *(ptr.offset(offset) as *const u16) as f32
            }
        }
    }
}
