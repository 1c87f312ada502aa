use crate::assets::ImageStore;
use crate::canvas::{Command, Scene, TextAnchor, TextSpan};
use crate::card::{self, CARD_HEIGHT_PX, CARD_WIDTH_PX, CardFace, CardSpec};
use crate::error::CarnetPressError;
use crate::font::FontRegistry;
use crate::types::{Color, ShadingStop};
use log::trace;
use tiny_skia::{
    FillRule, FilterQuality, GradientStop, LinearGradient, Mask, Paint, Path, PathBuilder, Pixmap,
    PixmapPaint, Point, SpreadMode, Stroke, Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

/// The "descriptor → raster" port: turns one face of a card render
/// descriptor into an encoded PNG. The assembler only depends on this
/// boundary, so a different rendering backend can be substituted
/// without touching pagination or PDF output.
pub trait FaceRenderer {
    fn render(
        &mut self,
        spec: &CardSpec<'_>,
        face: CardFace,
    ) -> Result<RenderedFace, CarnetPressError>;
}

/// One captured face at the fixed raster resolution. Produced once and
/// embedded immediately; never cached across runs.
#[derive(Debug, Clone)]
pub struct RenderedFace {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone)]
struct RasterState {
    fill_color: Color,
    opacity: f32,
    font_name: String,
    font_size: f32,
    letter_spacing: f32,
    clip_mask: Option<Mask>,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            opacity: 1.0,
            font_name: String::new(),
            font_size: 16.0,
            letter_spacing: 0.0,
            clip_mask: None,
        }
    }
}

/// Production renderer: tiny-skia over a single reusable scratch
/// pixmap. Rendering is strictly sequential, with one face in flight
/// at any instant, which bounds peak memory to one pixmap plus one
/// encoded PNG.
pub struct SceneRasterizer<'a> {
    fonts: &'a FontRegistry,
    images: &'a ImageStore,
    scratch: Pixmap,
}

impl<'a> SceneRasterizer<'a> {
    pub fn new(
        fonts: &'a FontRegistry,
        images: &'a ImageStore,
    ) -> Result<Self, CarnetPressError> {
        let scratch = Pixmap::new(CARD_WIDTH_PX, CARD_HEIGHT_PX).ok_or_else(|| {
            CarnetPressError::Raster(format!(
                "invalid scratch size {}x{}",
                CARD_WIDTH_PX, CARD_HEIGHT_PX
            ))
        })?;
        Ok(Self {
            fonts,
            images,
            scratch,
        })
    }

    /// Rasterizes a recorded scene to PNG bytes over a white ground.
    pub fn render_scene(&mut self, scene: &Scene) -> Result<Vec<u8>, CarnetPressError> {
        if scene.width != self.scratch.width() || scene.height != self.scratch.height() {
            self.scratch = Pixmap::new(scene.width, scene.height).ok_or_else(|| {
                CarnetPressError::Raster(format!(
                    "invalid scene size {}x{}",
                    scene.width, scene.height
                ))
            })?;
        }
        self.scratch.fill(tiny_skia::Color::WHITE);

        let mut state = RasterState::default();
        let mut stack: Vec<RasterState> = Vec::new();
        for command in &scene.commands {
            self.apply(command, &mut state, &mut stack)?;
        }

        self.scratch
            .encode_png()
            .map_err(|e| CarnetPressError::Raster(format!("png encode failed: {e}")))
    }

    fn apply(
        &mut self,
        command: &Command,
        state: &mut RasterState,
        stack: &mut Vec<RasterState>,
    ) -> Result<(), CarnetPressError> {
        match command {
            Command::SaveState => stack.push(state.clone()),
            Command::RestoreState => {
                if let Some(restored) = stack.pop() {
                    *state = restored;
                }
            }
            Command::SetFillColor(color) => state.fill_color = *color,
            Command::SetOpacity(opacity) => state.opacity = opacity.clamp(0.0, 1.0),
            Command::SetFontName(name) => state.font_name = name.clone(),
            Command::SetFontSize(size) => state.font_size = *size,
            Command::SetLetterSpacing(spacing) => state.letter_spacing = *spacing,
            Command::ClipCircle { cx, cy, radius } => {
                let mut builder = PathBuilder::new();
                builder.push_circle(*cx, *cy, *radius);
                if let Some(path) = builder.finish() {
                    self.apply_clip(state, &path);
                }
            }
            Command::FillRect {
                x,
                y,
                width,
                height,
            } => {
                if let Some(rect) = tiny_skia::Rect::from_xywh(*x, *y, *width, *height) {
                    let path = PathBuilder::from_rect(rect);
                    self.fill(state, &path);
                }
            }
            Command::FillRoundRect {
                x,
                y,
                width,
                height,
                radius,
            } => {
                if let Some(path) = round_rect_path(*x, *y, *width, *height, *radius) {
                    self.fill(state, &path);
                }
            }
            Command::FillCircle { cx, cy, radius } => {
                let mut builder = PathBuilder::new();
                builder.push_circle(*cx, *cy, *radius);
                if let Some(path) = builder.finish() {
                    self.fill(state, &path);
                }
            }
            Command::StrokeCircle {
                cx,
                cy,
                radius,
                line_width,
            } => {
                let mut builder = PathBuilder::new();
                builder.push_circle(*cx, *cy, *radius);
                if let Some(path) = builder.finish() {
                    let paint = fill_paint(state.fill_color, state.opacity);
                    let stroke = Stroke {
                        width: line_width.max(0.0),
                        ..Stroke::default()
                    };
                    self.scratch.stroke_path(
                        &path,
                        &paint,
                        &stroke,
                        Transform::identity(),
                        state.clip_mask.as_ref(),
                    );
                }
            }
            Command::ShadeRect {
                x,
                y,
                width,
                height,
                stops,
            } => {
                let Some(rect) = tiny_skia::Rect::from_xywh(*x, *y, *width, *height) else {
                    return Ok(());
                };
                let path = PathBuilder::from_rect(rect);
                let Some(shader) = LinearGradient::new(
                    Point::from_xy(*x, *y),
                    Point::from_xy(x + width, *y),
                    shading_stops(stops, state.opacity),
                    SpreadMode::Pad,
                    Transform::identity(),
                ) else {
                    return Ok(());
                };
                let mut paint = Paint::default();
                paint.shader = shader;
                paint.anti_alias = true;
                self.scratch.fill_path(
                    &path,
                    &paint,
                    FillRule::Winding,
                    Transform::identity(),
                    state.clip_mask.as_ref(),
                );
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                let image = self.images.get(resource_id).ok_or_else(|| {
                    CarnetPressError::Asset(format!("image {:?} is not decoded", resource_id))
                })?;
                let src_w = image.width() as f32;
                let src_h = image.height() as f32;
                if src_w <= 0.0 || src_h <= 0.0 {
                    return Ok(());
                }
                let transform =
                    Transform::from_row(width / src_w, 0.0, 0.0, height / src_h, *x, *y);
                let mut paint = PixmapPaint::default();
                paint.quality = FilterQuality::Bilinear;
                paint.opacity = state.opacity.clamp(0.0, 1.0);
                self.scratch.draw_pixmap(
                    0,
                    0,
                    image.as_ref(),
                    &paint,
                    transform,
                    state.clip_mask.as_ref(),
                );
            }
            Command::DrawText { x, y, text, anchor } => {
                self.draw_span(
                    state,
                    *x,
                    *y,
                    *anchor,
                    &TextSpan::new(text.clone(), state.font_size),
                )?;
            }
            Command::DrawTextRun { x, y, spans } => {
                let mut pen_x = *x;
                for span in spans {
                    let advanced = self.draw_span(state, pen_x, *y, TextAnchor::Start, span)?;
                    pen_x += advanced;
                }
            }
        }
        Ok(())
    }

    /// Draws one span at its baseline and returns the advanced width.
    fn draw_span(
        &mut self,
        state: &RasterState,
        x: f32,
        baseline: f32,
        anchor: TextAnchor,
        span: &TextSpan,
    ) -> Result<f32, CarnetPressError> {
        if span.text.is_empty() {
            return Ok(0.0);
        }
        let run = self.fonts.shape(
            &state.font_name,
            &span.text,
            span.font_size,
            state.letter_spacing,
        )?;
        let face = ttf_parser::Face::parse(&run.font.data, 0)
            .map_err(|e| CarnetPressError::Raster(format!("font face parse failed: {e}")))?;

        let origin_x = match anchor {
            TextAnchor::Start => x,
            TextAnchor::Middle => x - run.width / 2.0,
            TextAnchor::End => x - run.width,
        };
        let opacity = (span.opacity * state.opacity).clamp(0.0, 1.0);
        let paint = fill_paint(state.fill_color, opacity);

        trace!(
            "draw span {:?} at ({origin_x:.1},{baseline:.1}) size {}",
            span.text, span.font_size
        );
        for glyph in &run.glyphs {
            let mut builder = GlyphPathBuilder::new(
                origin_x + glyph.x,
                baseline - glyph.y,
                run.scale,
            );
            if face
                .outline_glyph(GlyphId(glyph.glyph_id), &mut builder)
                .is_none()
            {
                continue;
            }
            let Some(path) = builder.finish() else {
                continue;
            };
            self.scratch.fill_path(
                &path,
                &paint,
                FillRule::Winding,
                Transform::identity(),
                state.clip_mask.as_ref(),
            );
        }
        Ok(run.width)
    }

    fn fill(&mut self, state: &RasterState, path: &Path) {
        let paint = fill_paint(state.fill_color, state.opacity);
        self.scratch.fill_path(
            path,
            &paint,
            FillRule::Winding,
            Transform::identity(),
            state.clip_mask.as_ref(),
        );
    }

    fn apply_clip(&self, state: &mut RasterState, path: &Path) {
        if let Some(mask) = state.clip_mask.as_mut() {
            mask.intersect_path(path, FillRule::Winding, true, Transform::identity());
            return;
        }
        let Some(mut mask) = Mask::new(self.scratch.width(), self.scratch.height()) else {
            return;
        };
        mask.fill_path(path, FillRule::Winding, true, Transform::identity());
        state.clip_mask = Some(mask);
    }
}

impl FaceRenderer for SceneRasterizer<'_> {
    fn render(
        &mut self,
        spec: &CardSpec<'_>,
        face: CardFace,
    ) -> Result<RenderedFace, CarnetPressError> {
        let scene = card::scene(spec, face)?;
        let png = self.render_scene(&scene)?;
        Ok(RenderedFace {
            png,
            width: scene.width,
            height: scene.height,
        })
    }
}

/// Cubic-arc corner approximation constant.
const KAPPA: f32 = 0.552_284_8;

fn round_rect_path(x: f32, y: f32, width: f32, height: f32, radius: f32) -> Option<Path> {
    if !(width > 0.0 && height > 0.0) {
        return None;
    }
    let r = radius.min(width / 2.0).min(height / 2.0).max(0.0);
    if r == 0.0 {
        return tiny_skia::Rect::from_xywh(x, y, width, height).map(PathBuilder::from_rect);
    }
    let k = KAPPA * r;
    let (right, bottom) = (x + width, y + height);
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(right - r, y);
    pb.cubic_to(right - r + k, y, right, y + r - k, right, y + r);
    pb.line_to(right, bottom - r);
    pb.cubic_to(right, bottom - r + k, right - r + k, bottom, right - r, bottom);
    pb.line_to(x + r, bottom);
    pb.cubic_to(x + r - k, bottom, x, bottom - r + k, x, bottom - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
}

fn shading_stops(stops: &[ShadingStop], opacity: f32) -> Vec<GradientStop> {
    stops
        .iter()
        .map(|stop| {
            GradientStop::new(
                stop.offset.clamp(0.0, 1.0),
                to_sk_color(stop.color, opacity),
            )
        })
        .collect()
}

fn fill_paint(color: Color, opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color, opacity));
    paint.anti_alias = true;
    paint
}

fn to_sk_color(color: Color, opacity: f32) -> tiny_skia::Color {
    let r = color.r.clamp(0.0, 1.0);
    let g = color.g.clamp(0.0, 1.0);
    let b = color.b.clamp(0.0, 1.0);
    let a = opacity.clamp(0.0, 1.0);
    tiny_skia::Color::from_rgba(r, g, b, a)
        .unwrap_or_else(|| tiny_skia::Color::from_rgba8(0, 0, 0, 255))
}

/// Builds a tiny-skia path from glyph outlines. Font units are y-up;
/// scenes are y-down, so the vertical axis flips around the baseline.
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x2 * self.scale,
            self.origin_y - y2 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}
