//! Frame composition for one recipient: lay the current video sources
//! out in a grid and turn pixels into glyphs.
//!
//! The full rendering kernel (color quantization, RLE, terminal escape
//! emission) is an external collaborator behind [`GridRenderer`]; the
//! built-in [`RampRenderer`] is the minimal luminance-ramp implementation
//! the server runs with by default.

use std::sync::Arc;

use bytes::Bytes;

use asciichat_proto::types::{ascii_flags, PixelFormat};

use crate::palette::GlyphRamp;

/// A decoded inbound image frame, as published by a client's receive task.
#[derive(Debug, Clone)]
pub struct ImageFrameData {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub flags: u16,
    pub data: Bytes,
}

/// One participant's contribution to a recipient's grid.
#[derive(Clone)]
pub struct VideoSource {
    pub client_id: u32,
    pub frame: Arc<ImageFrameData>,
    /// Fill the whole cell instead of preserving the frame's aspect.
    pub stretch: bool,
}

/// The recipient's drawable area and terminal abilities.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
    pub utf8: bool,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 80,
            height: 24,
            utf8: false,
        }
    }
}

/// A composed outbound frame, ready to wrap in an `AsciiFrame` packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    pub width: u32,
    pub height: u32,
    pub flags: u16,
    pub data: Vec<u8>,
}

pub trait GridRenderer: Send + Sync {
    fn render(
        &self,
        sources: &[VideoSource],
        viewport: &Viewport,
        ramp: &GlyphRamp,
    ) -> RenderedFrame;
}

/// Nearest-neighbor luminance renderer: each source gets one cell of a
/// near-square grid, each cell pixel becomes one glyph from the ramp.
pub struct RampRenderer;

/// Integer BT.601 luma approximation.
fn luma(format: PixelFormat, px: &[u8]) -> u8 {
    let (r, g, b) = match format {
        PixelFormat::Rgb | PixelFormat::Rgba => (px[0], px[1], px[2]),
        PixelFormat::Bgr | PixelFormat::Bgra => (px[2], px[1], px[0]),
    };
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

/// Grid shape for `n` sources: near-square, wide before tall.
pub fn grid_shape(n: usize) -> (usize, usize) {
    if n == 0 {
        return (0, 0);
    }
    let cols = (n as f64).sqrt().ceil() as usize;
    let rows = n.div_ceil(cols);
    (cols, rows)
}

impl GridRenderer for RampRenderer {
    fn render(
        &self,
        sources: &[VideoSource],
        viewport: &Viewport,
        ramp: &GlyphRamp,
    ) -> RenderedFrame {
        let out_w = viewport.width.max(1) as usize;
        let out_h = viewport.height.max(1) as usize;

        let mut flags = 0u16;
        if viewport.utf8 && ramp.needs_unicode() {
            flags |= ascii_flags::UNICODE;
        }

        let (cols, rows) = grid_shape(sources.len());
        if cols == 0 {
            return RenderedFrame {
                width: out_w as u32,
                height: out_h as u32,
                flags,
                data: blank_lines(out_w, out_h),
            };
        }

        let cell_w = (out_w / cols).max(1);
        let cell_h = (out_h / rows).max(1);

        // Precompute each source's draw rectangle within its cell:
        // stretched sources fill it, the rest letterbox to their aspect.
        let rects: Vec<CellRect> = sources
            .iter()
            .map(|s| CellRect::fit(&s.frame, cell_w, cell_h, s.stretch))
            .collect();

        let mut data = Vec::with_capacity(out_w * out_h + out_h);
        let mut line = String::with_capacity(out_w * 4);
        for y in 0..out_h {
            line.clear();
            for x in 0..out_w {
                let col = (x / cell_w).min(cols - 1);
                let row = (y / cell_h).min(rows - 1);
                let idx = row * cols + col;
                let glyph = match sources.get(idx) {
                    Some(source) => {
                        let frame = &source.frame;
                        let rect = &rects[idx];
                        let cx = x - col * cell_w;
                        let cy = y - row * cell_h;
                        match rect.sample(cx, cy) {
                            Some((sx, sy)) => {
                                let bpp = frame.format.bytes_per_pixel();
                                let offset = (sy * frame.width as usize + sx) * bpp;
                                match frame.data.get(offset..offset + bpp) {
                                    Some(px) => ramp.glyph(luma(frame.format, px)),
                                    None => ' ',
                                }
                            }
                            None => ' ',
                        }
                    }
                    None => ' ',
                };
                line.push(glyph);
            }
            data.extend_from_slice(line.as_bytes());
            data.push(b'\n');
        }

        RenderedFrame {
            width: out_w as u32,
            height: out_h as u32,
            flags,
            data,
        }
    }
}

/// Where a source draws inside its grid cell, and how cell coordinates
/// map back to source pixels.
struct CellRect {
    off_x: usize,
    off_y: usize,
    draw_w: usize,
    draw_h: usize,
    src_w: usize,
    src_h: usize,
}

impl CellRect {
    fn fit(frame: &ImageFrameData, cell_w: usize, cell_h: usize, stretch: bool) -> Self {
        let src_w = frame.width as usize;
        let src_h = frame.height as usize;
        if src_w == 0 || src_h == 0 {
            return Self {
                off_x: 0,
                off_y: 0,
                draw_w: 0,
                draw_h: 0,
                src_w,
                src_h,
            };
        }
        let (draw_w, draw_h) = if stretch {
            (cell_w, cell_h)
        } else {
            // Aspect fit, centered.
            let w_for_h = (cell_h * src_w / src_h).max(1);
            if w_for_h <= cell_w {
                (w_for_h, cell_h)
            } else {
                (cell_w, (cell_w * src_h / src_w).max(1))
            }
        };
        Self {
            off_x: (cell_w - draw_w) / 2,
            off_y: (cell_h - draw_h) / 2,
            draw_w,
            draw_h,
            src_w,
            src_h,
        }
    }

    /// Source pixel for a cell coordinate, or `None` in the letterbox.
    fn sample(&self, cx: usize, cy: usize) -> Option<(usize, usize)> {
        if self.draw_w == 0 || self.draw_h == 0 {
            return None;
        }
        if cx < self.off_x || cy < self.off_y {
            return None;
        }
        let dx = cx - self.off_x;
        let dy = cy - self.off_y;
        if dx >= self.draw_w || dy >= self.draw_h {
            return None;
        }
        let sx = (dx * self.src_w / self.draw_w).min(self.src_w - 1);
        let sy = (dy * self.src_h / self.draw_h).min(self.src_h - 1);
        Some((sx, sy))
    }
}

fn blank_lines(w: usize, h: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity((w + 1) * h);
    for _ in 0..h {
        data.extend(std::iter::repeat(b' ').take(w));
        data.push(b'\n');
    }
    data
}
