use super::config::{Blend, ImageConfig, Rect};
use crate::error::DecodeError;

/// A caller-owned canvas of BGRA pixels.
///
/// The backing slice is checked against the image config once, at
/// construction; every later access is clipped to the canvas.
#[derive(Debug)]
pub struct PixelBuffer<'a> {
    width: u32,
    height: u32,
    data: &'a mut [u8],
}

impl<'a> PixelBuffer<'a> {
    /// Wraps `data` as a canvas for `config`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::BadArgument`] if `data` is too short (any excess is
    /// left untouched).
    pub fn new(config: &ImageConfig, data: &'a mut [u8]) -> Result<Self, DecodeError> {
        let len = config
            .pixbuf_len()
            .ok_or(DecodeError::BadArgument("image is too large for this platform"))?;
        let data = data
            .get_mut(..len)
            .ok_or(DecodeError::BadArgument("pixel buffer is too small"))?;
        Ok(Self {
            width: config.width,
            height: config.height,
            data,
        })
    }

    /// Canvas width.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Canvas height.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The canvas rectangle.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    /// Raw pixel bytes, row-major with no padding.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..]
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize * self.width as usize + x as usize) * 4)
    }

    /// The pixel at `(x, y)`, if inside the canvas.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let i = self.offset(x, y)?;
        let mut px = [0; 4];
        px.copy_from_slice(&self.data[i..i + 4]);
        Some(px)
    }

    /// Paints one pixel; coordinates outside the canvas are ignored.
    pub fn put(&mut self, x: u32, y: u32, px: [u8; 4], blend: Blend) {
        if let Some(i) = self.offset(x, y) {
            let dst = &mut self.data[i..i + 4];
            let out = match blend {
                Blend::Src => px,
                Blend::SrcOver => src_over([dst[0], dst[1], dst[2], dst[3]], px),
            };
            dst.copy_from_slice(&out);
        }
    }

    /// Fills `rect`, clipped to the canvas, with `px`.
    pub fn fill(&mut self, rect: Rect, px: [u8; 4]) {
        let rect = rect.intersect(&self.bounds());
        let stride = self.width as usize * 4;
        for y in rect.y0..rect.y1 {
            let row = y as usize * stride;
            let span = &mut self.data[row + rect.x0 as usize * 4..row + rect.x1 as usize * 4];
            for chunk in span.chunks_exact_mut(4) {
                chunk.copy_from_slice(&px);
            }
        }
    }
}

/// Porter-Duff "over" on non-premultiplied BGRA.
fn src_over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    let sa = u32::from(src[3]);
    match sa {
        255 => return src,
        0 => return dst,
        _ => {}
    }
    let da = u32::from(dst[3]);
    // Output alpha scaled by 255.
    let oa = sa * 255 + da * (255 - sa);
    let mut out = [0; 4];
    for c in 0..3 {
        let num = u32::from(src[c]) * sa * 255 + u32::from(dst[c]) * da * (255 - sa);
        out[c] = u8::try_from((num + oa / 2) / oa).unwrap_or(u8::MAX);
    }
    out[3] = u8::try_from((oa + 127) / 255).unwrap_or(u8::MAX);
    out
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn config(width: u32, height: u32) -> ImageConfig {
        ImageConfig {
            width,
            height,
            ..ImageConfig::default()
        }
    }

    #[test]
    fn too_small_backing_is_rejected() {
        let mut data = vec![0; 15];
        assert_eq!(
            PixelBuffer::new(&config(2, 2), &mut data).unwrap_err(),
            DecodeError::BadArgument("pixel buffer is too small")
        );
    }

    #[test]
    fn fill_is_clipped() {
        let mut data = vec![0; 3 * 2 * 4];
        let mut pb = PixelBuffer::new(&config(3, 2), &mut data).unwrap();
        pb.fill(Rect { x0: 2, y0: 1, x1: 9, y1: 9 }, [1, 2, 3, 4]);
        assert_eq!(pb.get(2, 1), Some([1, 2, 3, 4]));
        assert_eq!(pb.get(1, 1), Some([0; 4]));
        assert_eq!(pb.get(3, 1), None);
    }

    #[test]
    fn blending() {
        assert_eq!(src_over([10, 20, 30, 255], [0, 0, 0, 0]), [10, 20, 30, 255]);
        assert_eq!(src_over([10, 20, 30, 255], [1, 2, 3, 255]), [1, 2, 3, 255]);
        // Half-transparent white over opaque black.
        assert_eq!(src_over([0, 0, 0, 255], [255, 255, 255, 128]), [128, 128, 128, 255]);
        // Over nothing, the source survives unchanged.
        assert_eq!(src_over([0, 0, 0, 0], [200, 100, 50, 64]), [200, 100, 50, 64]);
    }
}
