use crate::error::CarnetPressError;
use log::debug;
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use ttf_parser::GlyphId;

#[derive(Debug)]
pub struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
}

/// Font registry with normalized family-name lookup. Registration
/// happens once at setup; `ensure_ready` is the per-batch readiness
/// barrier the orchestrator awaits before the first card render.
#[derive(Debug, Default)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn register_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let Ok(entries) = fs::read_dir(path) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                self.register_file(path);
            }
        }
    }

    pub fn register_file(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
            return;
        };
        let ext = ext.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" {
            return;
        }
        let Ok(data) = fs::read(path) else {
            return;
        };
        let source = path.to_string_lossy().to_string();
        let _ = self.register_bytes(data, Some(&source));
    }

    pub fn register_bytes(
        &mut self,
        data: Vec<u8>,
        source_name: Option<&str>,
    ) -> Result<String, CarnetPressError> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
            return Err(CarnetPressError::Asset(format!(
                "invalid font data for {source}"
            )));
        };

        let (name, aliases) = font_names(&face, Path::new(source));
        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data,
        });

        let mut all_aliases = Vec::new();
        all_aliases.push(name.clone());
        all_aliases.extend(aliases);
        for alias in all_aliases {
            let key = normalize_name(&alias);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, index);
        }
        debug!("registered font {:?} from {}", name, source);
        Ok(name)
    }

    pub fn resolve(&self, family: &str) -> Option<&RegisteredFont> {
        let key = normalize_name(family);
        self.lookup.get(&key).map(|index| &self.fonts[*index])
    }

    /// Readiness barrier: every family the batch will draw with must
    /// resolve before the first render. Missing fonts would silently
    /// distort text metrics, so absence is fatal.
    pub fn ensure_ready(&self, families: &[&str]) -> Result<(), CarnetPressError> {
        for family in families {
            if self.resolve(family).is_none() {
                return Err(CarnetPressError::FontUnavailable((*family).to_string()));
            }
        }
        debug!("font families ready: {:?}", families);
        Ok(())
    }

    /// Shapes `text` for the given family at `font_size` px, applying
    /// `letter_spacing` after every cluster. Returns baseline-relative
    /// glyph placements plus the advanced width.
    pub(crate) fn shape(
        &self,
        family: &str,
        text: &str,
        font_size: f32,
        letter_spacing: f32,
    ) -> Result<ShapedRun<'_>, CarnetPressError> {
        let font = self
            .resolve(family)
            .ok_or_else(|| CarnetPressError::FontUnavailable(family.to_string()))?;
        let glyphs = shape_glyphs(&font.data, text, font_size, letter_spacing);
        let width = glyphs.last().map(|g| g.pen_after).unwrap_or(0.0);
        let scale = face_scale(&font.data, font_size);
        Ok(ShapedRun {
            font,
            glyphs,
            width,
            scale,
        })
    }

}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ShapedGlyph {
    pub glyph_id: u16,
    /// Pen offset from the run origin, before this glyph.
    pub x: f32,
    /// Vertical shaping offset; positive raises above the baseline.
    pub y: f32,
    /// Pen position after this glyph, letter spacing included.
    pub pen_after: f32,
}

#[derive(Debug)]
pub(crate) struct ShapedRun<'a> {
    pub font: &'a RegisteredFont,
    pub glyphs: Vec<ShapedGlyph>,
    pub width: f32,
    pub scale: f32,
}

fn face_scale(font_data: &[u8], font_size: f32) -> f32 {
    match ttf_parser::Face::parse(font_data, 0) {
        Ok(face) => font_size / face.units_per_em().max(1) as f32,
        Err(_) => 0.0,
    }
}

fn shape_glyphs(font_data: &[u8], text: &str, font_size: f32, letter_spacing: f32) -> Vec<ShapedGlyph> {
    let Some(face) = HbFace::from_slice(font_data, 0) else {
        return shape_glyphs_unshaped(font_data, text, font_size, letter_spacing);
    };
    let units = face.units_per_em().max(1) as f32;
    let mut buffer = UnicodeBuffer::new();
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();
    if infos.is_empty() || infos.len() != positions.len() {
        return shape_glyphs_unshaped(font_data, text, font_size, letter_spacing);
    }

    let mut out = Vec::with_capacity(infos.len());
    let mut pen_x = 0.0f32;
    for (info, pos) in infos.iter().zip(positions.iter()) {
        let advance = (pos.x_advance as f32 / units) * font_size + letter_spacing;
        let gid = info.glyph_id as u16;
        if gid == 0 {
            pen_x += advance;
            continue;
        }
        let x_off = (pos.x_offset as f32 / units) * font_size;
        let y_off = (pos.y_offset as f32 / units) * font_size;
        out.push(ShapedGlyph {
            glyph_id: gid,
            x: pen_x + x_off,
            y: y_off,
            pen_after: pen_x + advance,
        });
        pen_x += advance;
    }
    out
}

fn shape_glyphs_unshaped(
    font_data: &[u8],
    text: &str,
    font_size: f32,
    letter_spacing: f32,
) -> Vec<ShapedGlyph> {
    let Ok(face) = ttf_parser::Face::parse(font_data, 0) else {
        return Vec::new();
    };
    let units = face.units_per_em().max(1) as f32;

    let mut out = Vec::new();
    let mut pen_x = 0.0f32;
    for ch in text.chars() {
        let gid = face.glyph_index(ch).map(|id| id.0).unwrap_or(0);
        if gid == 0 {
            pen_x += font_size * 0.5 + letter_spacing;
            continue;
        }
        let advance_units = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0) as f32;
        let mut advance = (advance_units / units) * font_size;
        if advance <= 0.0 {
            advance = font_size * 0.5;
        }
        advance += letter_spacing;
        out.push(ShapedGlyph {
            glyph_id: gid,
            x: pen_x,
            y: 0.0,
            pen_after: pen_x + advance,
        });
        pen_x += advance;
    }
    out
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            _ => {}
        }
    }

    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    let primary = family
        .clone()
        .or_else(|| full.clone())
        .or_else(|| post.clone())
        .or_else(|| stem.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());

    let mut aliases = Vec::new();
    for alias in [full, post, stem].into_iter().flatten() {
        if alias != primary {
            aliases.push(alias);
        }
    }
    (primary, aliases)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}
