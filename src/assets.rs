use crate::error::CarnetPressError;
use base64::Engine;
use log::debug;
use std::collections::HashMap;
use std::path::Path;
use tiny_skia::Pixmap;

/// In-memory store of decoded image resources, keyed by source string
/// (file path, data URI, or a caller-chosen id for raw bytes).
///
/// Decoding happens at insertion time, so by the time a scene is
/// rasterized every referenced resource is a ready pixmap. This is the
/// explicit "all images decoded" condition that replaces the source's
/// fixed settle delay: an undecodable source fails the batch up front
/// instead of capturing a blank region.
#[derive(Default)]
pub struct ImageStore {
    images: HashMap<String, Pixmap>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.images.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Pixmap> {
        self.images.get(id)
    }

    /// Registers raw encoded bytes (PNG/JPEG) under an explicit id.
    pub fn insert_bytes(
        &mut self,
        id: impl Into<String>,
        bytes: &[u8],
    ) -> Result<(), CarnetPressError> {
        let id = id.into();
        let pixmap = decode_to_pixmap(bytes, None)
            .ok_or_else(|| CarnetPressError::Asset(format!("cannot decode image {:?}", id)))?;
        debug!(
            "decoded image {:?} ({}x{})",
            id,
            pixmap.width(),
            pixmap.height()
        );
        self.images.insert(id, pixmap);
        Ok(())
    }

    /// Loads a source string: a `data:` URI is decoded inline, anything
    /// else is read from disk. Already-loaded sources are a no-op.
    pub fn load_source(&mut self, source: &str) -> Result<(), CarnetPressError> {
        if self.images.contains_key(source) {
            return Ok(());
        }
        let pixmap = if let Some((mime, data)) = parse_data_uri(source) {
            decode_to_pixmap(&data, Some(&mime))
                .ok_or_else(|| CarnetPressError::Asset("cannot decode data URI".to_string()))?
        } else {
            let bytes = std::fs::read(Path::new(source)).map_err(|e| {
                CarnetPressError::Asset(format!("cannot read image {:?}: {}", source, e))
            })?;
            decode_to_pixmap(&bytes, None)
                .ok_or_else(|| CarnetPressError::Asset(format!("cannot decode image {:?}", source)))?
        };
        debug!(
            "decoded image {:?} ({}x{})",
            source,
            pixmap.width(),
            pixmap.height()
        );
        self.images.insert(source.to_string(), pixmap);
        Ok(())
    }

    /// Decode barrier for one batch: loads every source not yet in the
    /// store. Called once by the orchestrator before the first capture.
    pub fn ensure_loaded<'a>(
        &mut self,
        sources: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), CarnetPressError> {
        for source in sources {
            self.load_source(source)?;
        }
        Ok(())
    }
}

fn decode_to_pixmap(data: &[u8], mime: Option<&str>) -> Option<Pixmap> {
    let format = if let Some(mime) = mime {
        if mime.contains("png") {
            Some(image::ImageFormat::Png)
        } else if mime.contains("jpeg") || mime.contains("jpg") {
            Some(image::ImageFormat::Jpeg)
        } else {
            None
        }
    } else {
        image::guess_format(data).ok()
    };

    let decoded = if let Some(format) = format {
        image::load_from_memory_with_format(data, format).ok()?
    } else {
        image::load_from_memory(data).ok()?
    };
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    let src = rgba.as_raw();
    let dst = pixmap.data_mut();
    for (src_px, dst_px) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = src_px[3];
        dst_px[0] = premul_u8(src_px[0], a);
        dst_px[1] = premul_u8(src_px[1], a);
        dst_px[2] = premul_u8(src_px[2], a);
        dst_px[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    if !uri.starts_with("data:") {
        return None;
    }
    let (header, payload) = uri.split_once(',')?;
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut pixmap = Pixmap::new(width, height).unwrap();
        pixmap.fill(tiny_skia::Color::from_rgba8(10, 20, 30, 255));
        pixmap.encode_png().unwrap()
    }

    #[test]
    fn insert_bytes_decodes_eagerly() {
        let mut store = ImageStore::new();
        store.insert_bytes("logo", &png_bytes(4, 2)).unwrap();
        let pixmap = store.get("logo").unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (4, 2));
    }

    #[test]
    fn insert_bytes_rejects_garbage() {
        let mut store = ImageStore::new();
        let err = store.insert_bytes("bad", b"not an image").unwrap_err();
        assert!(matches!(err, CarnetPressError::Asset(_)));
        assert!(!store.contains("bad"));
    }

    #[test]
    fn load_source_accepts_base64_data_uri() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes(2, 2));
        let uri = format!("data:image/png;base64,{}", encoded);
        let mut store = ImageStore::new();
        store.load_source(&uri).unwrap();
        assert!(store.contains(&uri));
    }

    #[test]
    fn load_source_fails_on_missing_file() {
        let mut store = ImageStore::new();
        let err = store.load_source("/no/such/portrait.png").unwrap_err();
        assert!(matches!(err, CarnetPressError::Asset(_)));
    }

    #[test]
    fn ensure_loaded_skips_already_present_ids() {
        let mut store = ImageStore::new();
        store.insert_bytes("pattern", &png_bytes(2, 2)).unwrap();
        // Would fail as a file path if it were re-loaded.
        store.ensure_loaded(["pattern"]).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn parse_data_uri_extracts_mime() {
        let (mime, data) = parse_data_uri("data:image/png;base64,AAAA").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(data, vec![0, 0, 0]);
        assert!(parse_data_uri("/plain/path.png").is_none());
    }
}
