use flate2::read::ZlibDecoder;
use std::io::Read;

use crate::{BasketError, BasketResult};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const VP8_START_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];
const VP8L_SIGNATURE: u8 = 0x2f;
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];
const GIF_TRAILER: u8 = 0x3B;

// Adam7 passes as (x0, y0, dx, dy)
const ADAM7_PASSES: [(u64, u64, u64, u64); 7] = [
    (0, 0, 8, 8),
    (4, 0, 8, 8),
    (0, 4, 4, 8),
    (2, 0, 4, 4),
    (0, 2, 2, 4),
    (1, 0, 2, 2),
    (0, 1, 1, 2),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    WebP,
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::WebP => "webp",
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
        }
    }
}

/// A fetched image body whose container structure has been validated.
///
/// PNG pixel data is inflated and checked against the header dimensions. For
/// WebP, JPEG and GIF the chunk and segment layout is walked to the end of the
/// image, so truncated bodies are rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FetchedImage {
    pub fn decode(data: Vec<u8>) -> BasketResult<Self> {
        let (format, width, height) = probe_image(&data)?;
        if width == 0 || height == 0 {
            return Err(BasketError::DecodeError(format!(
                "{:?} image has zero dimension {}x{}",
                format, width, height
            )));
        }
        check_image_body(format, width, height, &data)?;
        Ok(Self {
            format,
            width,
            height,
            data,
        })
    }

    /// Width after resizing to `target_height` with the aspect ratio kept.
    pub fn scaled_width(&self, target_height: u32) -> u32 {
        if self.height == 0 {
            return 0;
        }
        let width = self.width as u64 * target_height as u64 / self.height as u64;
        u32::try_from(width).unwrap_or(u32::MAX)
    }
}

fn read_u16_le(data: &[u8], pos: usize) -> Option<u32> {
    let b = data.get(pos..pos + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]) as u32)
}

fn read_u16_be(data: &[u8], pos: usize) -> Option<u32> {
    let b = data.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([b[0], b[1]]) as u32)
}

fn read_u24_le(data: &[u8], pos: usize) -> Option<u32> {
    let b = data.get(pos..pos + 3)?;
    Some(b[0] as u32 | (b[1] as u32) << 8 | (b[2] as u32) << 16)
}

fn read_u32_le(data: &[u8], pos: usize) -> Option<u32> {
    let b = data.get(pos..pos + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u32_be(data: &[u8], pos: usize) -> Option<u32> {
    let b = data.get(pos..pos + 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn truncated(format: ImageFormat) -> BasketError {
    BasketError::DecodeError(format!("truncated {:?} header", format))
}

/// Return format and pixel dimensions read from the image header.
pub fn probe_image(data: &[u8]) -> BasketResult<(ImageFormat, u32, u32)> {
    if data.starts_with(&PNG_SIGNATURE) {
        return probe_png(data);
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return probe_gif(data);
    }
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return probe_webp(data);
    }
    if data.starts_with(&[0xFF, 0xD8]) {
        return probe_jpeg(data);
    }
    Err(BasketError::DecodeError(format!(
        "unrecognized image data ({} bytes)",
        data.len()
    )))
}

fn probe_png(data: &[u8]) -> BasketResult<(ImageFormat, u32, u32)> {
    if data.get(12..16) != Some(b"IHDR".as_slice()) {
        return Err(truncated(ImageFormat::Png));
    }
    let width = read_u32_be(data, 16).ok_or_else(|| truncated(ImageFormat::Png))?;
    let height = read_u32_be(data, 20).ok_or_else(|| truncated(ImageFormat::Png))?;
    Ok((ImageFormat::Png, width, height))
}

fn probe_gif(data: &[u8]) -> BasketResult<(ImageFormat, u32, u32)> {
    let width = read_u16_le(data, 6).ok_or_else(|| truncated(ImageFormat::Gif))?;
    let height = read_u16_le(data, 8).ok_or_else(|| truncated(ImageFormat::Gif))?;
    Ok((ImageFormat::Gif, width, height))
}

fn probe_webp(data: &[u8]) -> BasketResult<(ImageFormat, u32, u32)> {
    let chunk = data.get(12..16).ok_or_else(|| truncated(ImageFormat::WebP))?;
    match chunk {
        b"VP8 " => {
            if data.get(23..26) != Some(VP8_START_CODE.as_slice()) {
                return Err(BasketError::DecodeError(
                    "VP8 frame start code missing".to_string(),
                ));
            }
            let width = read_u16_le(data, 26).ok_or_else(|| truncated(ImageFormat::WebP))?;
            let height = read_u16_le(data, 28).ok_or_else(|| truncated(ImageFormat::WebP))?;
            Ok((ImageFormat::WebP, width & 0x3fff, height & 0x3fff))
        }
        b"VP8L" => {
            if data.get(20) != Some(&VP8L_SIGNATURE) {
                return Err(BasketError::DecodeError(
                    "VP8L signature missing".to_string(),
                ));
            }
            let b = data.get(21..25).ok_or_else(|| truncated(ImageFormat::WebP))?;
            let bits = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            let width = (bits & 0x3fff) + 1;
            let height = ((bits >> 14) & 0x3fff) + 1;
            Ok((ImageFormat::WebP, width, height))
        }
        b"VP8X" => {
            let width = read_u24_le(data, 24).ok_or_else(|| truncated(ImageFormat::WebP))? + 1;
            let height = read_u24_le(data, 27).ok_or_else(|| truncated(ImageFormat::WebP))? + 1;
            Ok((ImageFormat::WebP, width, height))
        }
        other => Err(BasketError::DecodeError(format!(
            "unknown WebP chunk {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn probe_jpeg(data: &[u8]) -> BasketResult<(ImageFormat, u32, u32)> {
    let mut pos = 2usize;
    loop {
        // skip fill bytes before the marker code
        while data.get(pos) == Some(&0xFF) && data.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        if data.get(pos) != Some(&0xFF) {
            return Err(BasketError::DecodeError(format!(
                "JPEG marker expected at offset {}",
                pos
            )));
        }
        let marker = *data.get(pos + 1).ok_or_else(|| truncated(ImageFormat::Jpeg))?;
        match marker {
            0xC0..=0xCF if marker != 0xC4 && marker != 0xC8 && marker != 0xCC => {
                let height = read_u16_be(data, pos + 5).ok_or_else(|| truncated(ImageFormat::Jpeg))?;
                let width = read_u16_be(data, pos + 7).ok_or_else(|| truncated(ImageFormat::Jpeg))?;
                return Ok((ImageFormat::Jpeg, width, height));
            }
            0xD9 | 0xDA => {
                return Err(BasketError::DecodeError(
                    "JPEG has no frame header before scan data".to_string(),
                ));
            }
            0x01 | 0xD0..=0xD8 => {
                pos += 2;
            }
            _ => {
                let len = read_u16_be(data, pos + 2).ok_or_else(|| truncated(ImageFormat::Jpeg))?;
                if len < 2 {
                    return Err(BasketError::DecodeError(format!(
                        "invalid JPEG segment length {}",
                        len
                    )));
                }
                pos += 2 + len as usize;
            }
        }
    }
}

/// Walk the whole body of an image whose header was accepted by `probe_image`.
pub fn check_image_body(format: ImageFormat, width: u32, height: u32, data: &[u8]) -> BasketResult<()> {
    match format {
        ImageFormat::Png => check_png_body(width, height, data),
        ImageFormat::WebP => check_webp_body(data),
        ImageFormat::Jpeg => check_jpeg_body(data),
        ImageFormat::Gif => check_gif_body(data),
    }
}

// chunk CRCs are not verified
fn check_png_body(width: u32, height: u32, data: &[u8]) -> BasketResult<()> {
    let mut pos = PNG_SIGNATURE.len();
    let mut header: Option<(u8, u8, u8)> = None;
    let mut compressed = Vec::new();
    let mut has_end = false;
    while pos < data.len() {
        let len = read_u32_be(data, pos).ok_or_else(|| truncated(ImageFormat::Png))? as usize;
        let kind = data.get(pos + 4..pos + 8).ok_or_else(|| truncated(ImageFormat::Png))?;
        let payload = data
            .get(pos + 8..pos + 8 + len)
            .ok_or_else(|| truncated(ImageFormat::Png))?;
        if data.get(pos + 8 + len..pos + 12 + len).is_none() {
            return Err(truncated(ImageFormat::Png));
        }
        match kind {
            b"IHDR" if len >= 13 => header = Some((payload[8], payload[9], payload[12])),
            b"IDAT" => compressed.extend_from_slice(payload),
            b"IEND" => {
                has_end = true;
                break;
            }
            _ => {}
        }
        pos += 12 + len;
    }
    if !has_end {
        return Err(BasketError::DecodeError("PNG has no IEND chunk".to_string()));
    }
    let (bit_depth, color_type, interlace) =
        header.ok_or_else(|| truncated(ImageFormat::Png))?;
    let channels: u64 = match color_type {
        0 | 3 => 1,
        4 => 2,
        2 => 3,
        6 => 4,
        other => {
            return Err(BasketError::DecodeError(format!(
                "unsupported PNG color type {}",
                other
            )))
        }
    };
    if !matches!(bit_depth, 1 | 2 | 4 | 8 | 16) {
        return Err(BasketError::DecodeError(format!(
            "unsupported PNG bit depth {}",
            bit_depth
        )));
    }
    let bits_per_pixel = channels * bit_depth as u64;
    let row_len = |w: u64| {
        if w == 0 {
            0
        } else {
            1 + w.saturating_mul(bits_per_pixel).saturating_add(7) / 8
        }
    };
    let (width, height) = (width as u64, height as u64);
    let expected = if interlace == 0 {
        height.saturating_mul(row_len(width))
    } else {
        ADAM7_PASSES
            .iter()
            .map(|&(x0, y0, dx, dy)| {
                let pass_w = if width > x0 { (width - x0 + dx - 1) / dx } else { 0 };
                let pass_h = if height > y0 { (height - y0 + dy - 1) / dy } else { 0 };
                if pass_w == 0 {
                    0
                } else {
                    pass_h.saturating_mul(row_len(pass_w))
                }
            })
            .fold(0u64, |total, len| total.saturating_add(len))
    };

    let mut raw = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .take(expected.saturating_add(1))
        .read_to_end(&mut raw)
        .map_err(|e| BasketError::DecodeError(format!("PNG pixel data is corrupt: {}", e)))?;
    if raw.len() as u64 != expected {
        return Err(BasketError::DecodeError(format!(
            "PNG pixel data has {} bytes, expected {}",
            raw.len(),
            expected
        )));
    }
    if interlace == 0 && width > 0 {
        let row_len = row_len(width) as usize;
        if let Some(filter) = raw.chunks(row_len).map(|row| row[0]).find(|f| *f > 4) {
            return Err(BasketError::DecodeError(format!(
                "invalid PNG filter type {}",
                filter
            )));
        }
    }
    Ok(())
}

fn check_webp_body(data: &[u8]) -> BasketResult<()> {
    let riff_len = read_u32_le(data, 4).ok_or_else(|| truncated(ImageFormat::WebP))? as usize;
    let end = riff_len + 8;
    if riff_len < 4 || data.len() < end {
        return Err(BasketError::DecodeError(format!(
            "WebP body has {} bytes, RIFF header declares {}",
            data.len(),
            end
        )));
    }
    let mut pos = 12usize;
    let mut has_frame = false;
    while pos < end {
        let kind = data.get(pos..pos + 4).ok_or_else(|| truncated(ImageFormat::WebP))?;
        let len = read_u32_le(data, pos + 4).ok_or_else(|| truncated(ImageFormat::WebP))? as usize;
        if pos + 8 + len > end {
            return Err(truncated(ImageFormat::WebP));
        }
        let payload = &data[pos + 8..pos + 8 + len];
        match kind {
            b"VP8 " => {
                if payload.len() < 10 {
                    return Err(truncated(ImageFormat::WebP));
                }
                let tag = payload[0] as usize | (payload[1] as usize) << 8 | (payload[2] as usize) << 16;
                if tag & 1 != 0 {
                    return Err(BasketError::DecodeError(
                        "VP8 frame is not a key frame".to_string(),
                    ));
                }
                let first_partition = (tag >> 5) & 0x7ffff;
                if 10 + first_partition > payload.len() {
                    return Err(truncated(ImageFormat::WebP));
                }
                has_frame = true;
            }
            b"VP8L" => {
                if payload.len() < 5 {
                    return Err(truncated(ImageFormat::WebP));
                }
                has_frame = true;
            }
            b"ANMF" => has_frame = true,
            _ => {}
        }
        // chunks are padded to an even size
        pos += 8 + len + (len & 1);
    }
    if !has_frame {
        return Err(BasketError::DecodeError(
            "WebP has no image data chunk".to_string(),
        ));
    }
    Ok(())
}

fn check_jpeg_body(data: &[u8]) -> BasketResult<()> {
    let mut pos = 2usize;
    let mut has_frame = false;
    loop {
        while data.get(pos) == Some(&0xFF) && data.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        if data.get(pos) != Some(&0xFF) {
            return Err(truncated(ImageFormat::Jpeg));
        }
        let marker = *data.get(pos + 1).ok_or_else(|| truncated(ImageFormat::Jpeg))?;
        match marker {
            0x01 | 0xD0..=0xD8 => {
                pos += 2;
                continue;
            }
            0xD9 => {
                return Err(BasketError::DecodeError(
                    "JPEG ends before scan data".to_string(),
                ))
            }
            _ => {}
        }
        let len = read_u16_be(data, pos + 2).ok_or_else(|| truncated(ImageFormat::Jpeg))? as usize;
        if len < 2 || pos + 2 + len > data.len() {
            return Err(truncated(ImageFormat::Jpeg));
        }
        if matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            has_frame = true;
        }
        pos += 2 + len;
        if marker == 0xDA {
            break;
        }
    }
    if !has_frame {
        return Err(BasketError::DecodeError(
            "JPEG has no frame header before scan data".to_string(),
        ));
    }
    if !data[pos..].windows(2).any(|w| w == JPEG_EOI) {
        return Err(BasketError::DecodeError(
            "JPEG scan data has no end marker".to_string(),
        ));
    }
    Ok(())
}

fn skip_gif_sub_blocks(data: &[u8], mut pos: usize) -> BasketResult<usize> {
    loop {
        let len = *data.get(pos).ok_or_else(|| truncated(ImageFormat::Gif))? as usize;
        pos += 1;
        if len == 0 {
            return Ok(pos);
        }
        pos += len;
    }
}

fn gif_color_table_len(flags: u8) -> usize {
    if flags & 0x80 == 0 {
        0
    } else {
        3usize << ((flags & 0x07) + 1)
    }
}

fn check_gif_body(data: &[u8]) -> BasketResult<()> {
    let flags = *data.get(10).ok_or_else(|| truncated(ImageFormat::Gif))?;
    let mut pos = 13 + gif_color_table_len(flags);
    let mut frames = 0usize;
    loop {
        match data.get(pos) {
            Some(0x21) => pos = skip_gif_sub_blocks(data, pos + 2)?,
            Some(0x2C) => {
                let flags = *data.get(pos + 9).ok_or_else(|| truncated(ImageFormat::Gif))?;
                // descriptor, local color table, LZW minimum code size
                pos += 10 + gif_color_table_len(flags);
                if data.get(pos).is_none() {
                    return Err(truncated(ImageFormat::Gif));
                }
                pos = skip_gif_sub_blocks(data, pos + 1)?;
                frames += 1;
            }
            Some(&GIF_TRAILER) if frames > 0 => return Ok(()),
            Some(&GIF_TRAILER) => {
                return Err(BasketError::DecodeError("GIF has no image".to_string()))
            }
            Some(other) => {
                return Err(BasketError::DecodeError(format!(
                    "unexpected GIF block 0x{:02x}",
                    other
                )))
            }
            None => return Err(truncated(ImageFormat::Gif)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Signature and IHDR only, without the IHDR CRC.
    pub(crate) fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend_from_slice(&13u32.to_be_bytes());
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        // 8-bit grayscale, not interlaced
        data.extend_from_slice(&[8, 0, 0, 0, 0]);
        data
    }

    fn push_png_chunk(data: &mut Vec<u8>, kind: &[u8], payload: &[u8]) {
        data.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        data.extend_from_slice(kind);
        data.extend_from_slice(payload);
        data.extend_from_slice(&[0; 4]);
    }

    fn zlib(raw: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(raw).unwrap();
        encoder.finish().unwrap()
    }

    fn png_with_rows(width: u32, height: u32, rows: usize) -> Vec<u8> {
        let mut data = png_header(width, height);
        data.extend_from_slice(&[0; 4]);
        let raw = vec![0u8; rows * (1 + width as usize)];
        push_png_chunk(&mut data, b"IDAT", &zlib(&raw));
        push_png_chunk(&mut data, b"IEND", &[]);
        data
    }

    /// A complete grayscale PNG with all-black pixels.
    pub(crate) fn png_image(width: u32, height: u32) -> Vec<u8> {
        png_with_rows(width, height, height as usize)
    }

    pub(crate) fn webp_vp8x(width: u32, height: u32) -> Vec<u8> {
        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&22u32.to_le_bytes());
        data.extend_from_slice(b"WEBPVP8X");
        data.extend_from_slice(&10u32.to_le_bytes());
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(&(width - 1).to_le_bytes()[..3]);
        data.extend_from_slice(&(height - 1).to_le_bytes()[..3]);
        data
    }

    fn webp_vp8(width: u16, height: u16) -> Vec<u8> {
        // key frame, first partition of 16 bytes
        let mut payload = vec![0x00, 0x02, 0x00];
        payload.extend_from_slice(&VP8_START_CODE);
        payload.extend_from_slice(&width.to_le_bytes());
        payload.extend_from_slice(&height.to_le_bytes());
        payload.extend_from_slice(&[0u8; 16]);

        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&(4 + 8 + payload.len() as u32).to_le_bytes());
        data.extend_from_slice(b"WEBPVP8 ");
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&payload);
        data
    }

    fn jpeg_image(width: u16, height: u16) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8];
        // APP0 with 14 bytes of payload
        data.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        data.extend_from_slice(&[0u8; 14]);
        // SOF0: length, precision, height, width, 3 components
        data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&[3, 1, 0x22, 0, 2, 0x11, 1, 3, 0x11, 1]);
        // SOS header then entropy coded data
        data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x0C, 3, 1, 0, 2, 0x11, 3, 0x11, 0, 0x3F, 0]);
        data.extend_from_slice(&[0x12, 0x34, 0xFF, 0x00, 0x56]);
        data.extend_from_slice(&JPEG_EOI);
        data
    }

    fn gif_image(width: u16, height: u16) -> Vec<u8> {
        let mut data = b"GIF89a".to_vec();
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        // global color table of 2 entries
        data.extend_from_slice(&[0x80, 0, 0]);
        data.extend_from_slice(&[0, 0, 0, 0xFF, 0xFF, 0xFF]);
        // graphic control extension
        data.extend_from_slice(&[0x21, 0xF9, 0x04, 0, 0, 0, 0, 0x00]);
        data.push(0x2C);
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        data.push(0);
        // LZW code size and one data sub-block
        data.extend_from_slice(&[0x02, 0x02, 0x4C, 0x01, 0x00]);
        data.push(GIF_TRAILER);
        data
    }

    fn assert_decode_error(data: Vec<u8>) {
        match FetchedImage::decode(data.clone()) {
            Err(BasketError::DecodeError(_)) => {}
            other => panic!("unexpected result for {:?}: {:?}", data, other),
        }
    }

    #[test]
    fn test_decode_png() {
        let img = FetchedImage::decode(png_image(640, 480)).unwrap();
        assert_eq!(img.format, ImageFormat::Png);
        assert_eq!((img.width, img.height), (640, 480));
        assert_eq!(img.scaled_width(250), 333);
    }

    #[test]
    fn test_decode_png_interlaced() {
        let (width, height) = (10u32, 3u32);
        let mut data = png_header(width, height);
        *data.last_mut().unwrap() = 1;
        data.extend_from_slice(&[0; 4]);
        // Adam7 pass sizes for 10x3 at 8 bits: 2x1, 1x1, empty, 2x1, 5x1, 5x2, 10x1
        let raw_len = (1 + 2) + (1 + 1) + (1 + 2) + (1 + 5) + 2 * (1 + 5) + (1 + 10);
        push_png_chunk(&mut data, b"IDAT", &zlib(&vec![0u8; raw_len]));
        push_png_chunk(&mut data, b"IEND", &[]);
        let img = FetchedImage::decode(data).unwrap();
        assert_eq!((img.width, img.height), (10, 3));
    }

    #[test]
    fn test_reject_png_without_pixel_data() {
        // header only
        assert_decode_error(png_header(640, 480));

        // pixel rows missing
        assert_decode_error(png_with_rows(64, 48, 40));

        // IEND cut off
        let mut data = png_image(64, 48);
        data.truncate(data.len() - 12);
        assert_decode_error(data);

        // corrupt zlib stream
        let mut data = png_header(4, 4);
        data.extend_from_slice(&[0; 4]);
        push_png_chunk(&mut data, b"IDAT", &[0x78, 0x9c, 0xFF, 0xFF, 0xFF]);
        push_png_chunk(&mut data, b"IEND", &[]);
        assert_decode_error(data);

        // unknown filter type on the first row
        let mut data = png_header(4, 2);
        data.extend_from_slice(&[0; 4]);
        push_png_chunk(&mut data, b"IDAT", &zlib(&[9, 0, 0, 0, 0, 0, 0, 0, 0, 0]));
        push_png_chunk(&mut data, b"IEND", &[]);
        assert_decode_error(data);
    }

    #[test]
    fn test_decode_gif() {
        let img = FetchedImage::decode(gif_image(288, 144)).unwrap();
        assert_eq!(img.format, ImageFormat::Gif);
        assert_eq!((img.width, img.height), (288, 144));

        let mut data = gif_image(288, 144);
        data.pop();
        assert_decode_error(data);

        let mut data = gif_image(288, 144);
        data.truncate(19);
        assert_decode_error(data);
    }

    #[test]
    fn test_decode_webp_lossy() {
        let img = FetchedImage::decode(webp_vp8(900, 1200)).unwrap();
        assert_eq!(img.format, ImageFormat::WebP);
        assert_eq!((img.width, img.height), (900, 1200));
        assert_eq!(img.scaled_width(250), 187);

        let mut data = webp_vp8(900, 1200);
        data.truncate(data.len() - 4);
        assert_decode_error(data);
    }

    #[test]
    fn test_probe_webp_lossless() {
        let bits: u32 = (99 << 14) | 199;
        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&18u32.to_le_bytes());
        data.extend_from_slice(b"WEBPVP8L");
        data.extend_from_slice(&5u32.to_le_bytes());
        data.push(VP8L_SIGNATURE);
        data.extend_from_slice(&bits.to_le_bytes());
        data.push(0);
        let img = FetchedImage::decode(data).unwrap();
        assert_eq!((img.width, img.height), (200, 100));
    }

    #[test]
    fn test_webp_extended_needs_image_chunk() {
        let (format, w, h) = probe_image(&webp_vp8x(1000, 1333)).unwrap();
        assert_eq!(format, ImageFormat::WebP);
        assert_eq!((w, h), (1000, 1333));
        assert_decode_error(webp_vp8x(1000, 1333));
    }

    #[test]
    fn test_decode_jpeg() {
        let img = FetchedImage::decode(jpeg_image(400, 300)).unwrap();
        assert_eq!(img.format, ImageFormat::Jpeg);
        assert_eq!((img.width, img.height), (400, 300));

        let mut data = jpeg_image(400, 300);
        data.truncate(data.len() - 2);
        assert_decode_error(data);

        let mut data = jpeg_image(400, 300);
        data.truncate(40);
        assert_decode_error(data);
    }

    #[test]
    fn test_reject_garbage_and_truncated() {
        let cases: Vec<Vec<u8>> = vec![
            Vec::new(),
            b"<html>not found</html>".to_vec(),
            PNG_SIGNATURE.to_vec(),
            vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00],
            vec![0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x02],
            b"RIFF\0\0\0\0WEBPABCD".to_vec(),
        ];
        for data in cases {
            assert_decode_error(data);
        }
    }

    #[test]
    fn test_reject_zero_dimension() {
        assert_decode_error(png_image(0, 10));
    }

    #[test]
    fn test_scaled_width_saturates() {
        let mut img = FetchedImage::decode(png_image(8, 2)).unwrap();
        assert_eq!(img.scaled_width(250), 1000);

        img.width = u32::MAX - 1;
        img.height = 1;
        assert_eq!(img.scaled_width(250), u32::MAX);

        img.height = 0;
        assert_eq!(img.scaled_width(250), 0);
    }
}
