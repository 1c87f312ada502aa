use crate::canvas::{Canvas, Scene, TextAnchor, TextSpan};
use crate::error::CarnetPressError;
use crate::model::{Level, Settings, Student, grade_section_display, series_label};
use crate::qr;
use crate::types::{Color, ShadingStop};

/// Fixed raster contract: every face renders at exactly this many
/// pixels, regardless of the printed card size.
pub const CARD_WIDTH_PX: u32 = 1004;
pub const CARD_HEIGHT_PX: u32 = 626;

const HEADER_HEIGHT: f32 = 168.0;
const HEADER_PAD_X: f32 = 24.0;
const HEADER_PAD_Y: f32 = 14.0;
const LOGO_SIZE: f32 = 112.0;
const LOGO_GAP: f32 = 18.0;

const DIVIDER_HEIGHT: f32 = 10.0;
const DIVIDER_MARGIN_X: f32 = 20.0;
const DIVIDER_MARGIN_TOP: f32 = 6.0;
const DIVIDER_MARGIN_BOTTOM: f32 = 16.0;

const BODY_PAD_X: f32 = 20.0;
const BODY_COLUMN_GAP: f32 = 24.0;
const PORTRAIT_SIZE: f32 = 260.0;
const PORTRAIT_RING: f32 = 8.0;
const QR_FRAME_RADIUS: f32 = 12.0;
const QR_FRAME_PAD: f32 = 14.0;

const FIELD_LABEL_SIZE: f32 = 34.0;
const FIELD_VALUE_SIZE: f32 = 46.0;
const FIELD_ROW_GAP: f32 = 8.0;
const FIELD_LINE_HEIGHT: f32 = 1.15;

const TEXT_SLATE: Color = Color {
    r: 0x0f as f32 / 255.0,
    g: 0x17 as f32 / 255.0,
    b: 0x2a as f32 / 255.0,
};
const AVATAR_BG: Color = Color {
    r: 0xdb as f32 / 255.0,
    g: 0xea as f32 / 255.0,
    b: 0xfe as f32 / 255.0,
};
const AVATAR_TEXT: Color = Color {
    r: 0x88 as f32 / 255.0,
    g: 0x88 as f32 / 255.0,
    b: 0x88 as f32 / 255.0,
};

/// Everything that determines one card's two faces: the student, the
/// global 1-based batch position, the batch size and the branding.
#[derive(Clone, Copy)]
pub struct CardSpec<'a> {
    pub student: &'a Student,
    pub serial: usize,
    pub total: usize,
    pub settings: &'a Settings,
}

impl CardSpec<'_> {
    pub fn series_label(&self) -> String {
        series_label(self.serial, self.total)
    }

    pub fn level(&self) -> Level {
        Level::from_grade(&self.student.grade)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardFace {
    Front,
    Back,
}

/// Builds the scene for one face. Pure: the same spec always records
/// the same command list.
pub fn scene(spec: &CardSpec<'_>, face: CardFace) -> Result<Scene, CarnetPressError> {
    let mut canvas = Canvas::new(CARD_WIDTH_PX, CARD_HEIGHT_PX);
    canvas.set_font_name(&spec.settings.font_family);

    if let Some(pattern) = &spec.settings.pattern {
        canvas.draw_image(
            0.0,
            0.0,
            CARD_WIDTH_PX as f32,
            CARD_HEIGHT_PX as f32,
            pattern.clone(),
        );
    }

    draw_header(&mut canvas, spec);
    draw_divider(&mut canvas);
    match face {
        CardFace::Front => draw_portrait(&mut canvas, spec),
        CardFace::Back => draw_qr_panel(&mut canvas, spec)?,
    }
    draw_identity_fields(&mut canvas, spec);

    Ok(canvas.finish())
}

fn gradient_stops(spec: &CardSpec<'_>) -> Vec<ShadingStop> {
    let pair = spec.settings.gradient_for(spec.level());
    vec![
        ShadingStop {
            offset: 0.0,
            color: pair.from,
        },
        ShadingStop {
            offset: 1.0,
            color: pair.to,
        },
    ]
}

fn line_baseline(top: f32, line_height: f32, font_size: f32) -> f32 {
    top + (line_height - font_size) / 2.0 + font_size * 0.8
}

fn draw_header(canvas: &mut Canvas, spec: &CardSpec<'_>) {
    canvas.shade_rect(
        0.0,
        0.0,
        CARD_WIDTH_PX as f32,
        HEADER_HEIGHT,
        gradient_stops(spec),
    );

    canvas.save_state();
    canvas.set_fill_color(Color::WHITE);
    canvas.set_letter_spacing(0.2);

    let content_height = HEADER_HEIGHT - 2.0 * HEADER_PAD_Y;
    if let Some(logo) = &spec.settings.logo {
        canvas.draw_image(
            HEADER_PAD_X,
            HEADER_PAD_Y + (content_height - LOGO_SIZE) / 2.0,
            LOGO_SIZE,
            LOGO_SIZE,
            logo.clone(),
        );
    }

    // Branding block: four upper-cased lines at 1.1 line height with a
    // 4 px row gap, vertically centered in the header content box.
    let text_x = HEADER_PAD_X + LOGO_SIZE + LOGO_GAP;
    let sizes = [22.0f32, 42.0, 18.0, 18.0];
    let row_gap = 4.0;
    let block_height: f32 =
        sizes.iter().map(|s| s * 1.1).sum::<f32>() + row_gap * (sizes.len() - 1) as f32;
    let mut line_top = HEADER_PAD_Y + (content_height - block_height) / 2.0;
    let settings = spec.settings;
    let lines = [
        settings.institution_name.as_str(),
        settings.institution_title.as_str(),
        settings.institution_levels.as_str(),
        settings.institution_ugel.as_str(),
    ];
    for (text, size) in lines.into_iter().zip(sizes) {
        canvas.set_font_size(size);
        canvas.draw_text(
            text_x,
            line_baseline(line_top, size * 1.1, size),
            text.to_uppercase(),
            TextAnchor::Start,
        );
        line_top += size * 1.1 + row_gap;
    }

    // Year / level / series column, right-justified against the
    // padding edge.
    let right_x = CARD_WIDTH_PX as f32 - HEADER_PAD_X;
    canvas.set_font_size(104.0);
    canvas.draw_text(
        right_x,
        88.0,
        spec.settings.school_year.to_string(),
        TextAnchor::End,
    );
    canvas.set_font_size(44.0);
    canvas.draw_text(
        right_x,
        130.0,
        spec.level().label().to_uppercase(),
        TextAnchor::End,
    );
    canvas.set_font_size(22.0);
    canvas.draw_text(right_x, 152.0, spec.series_label(), TextAnchor::End);

    canvas.restore_state();
}

fn draw_divider(canvas: &mut Canvas) {
    canvas.save_state();
    canvas.set_fill_color(Color::WHITE);
    canvas.fill_round_rect(
        DIVIDER_MARGIN_X,
        HEADER_HEIGHT + DIVIDER_MARGIN_TOP,
        CARD_WIDTH_PX as f32 - 2.0 * DIVIDER_MARGIN_X,
        DIVIDER_HEIGHT,
        DIVIDER_HEIGHT / 2.0,
    );
    canvas.restore_state();
}

fn body_top() -> f32 {
    HEADER_HEIGHT + DIVIDER_MARGIN_TOP + DIVIDER_HEIGHT + DIVIDER_MARGIN_BOTTOM
}

fn body_center_y() -> f32 {
    (body_top() + CARD_HEIGHT_PX as f32) / 2.0
}

fn draw_portrait(canvas: &mut Canvas, spec: &CardSpec<'_>) {
    let radius = PORTRAIT_SIZE / 2.0;
    let cx = BODY_PAD_X + radius;
    let cy = body_center_y();

    canvas.save_state();
    canvas.set_fill_color(AVATAR_BG);
    canvas.fill_circle(cx, cy, radius);

    match &spec.student.photo {
        Some(photo) => {
            canvas.save_state();
            canvas.clip_circle(cx, cy, radius);
            canvas.draw_image(
                cx - radius,
                cy - radius,
                PORTRAIT_SIZE,
                PORTRAIT_SIZE,
                photo.clone(),
            );
            canvas.restore_state();
        }
        None => {
            // Placeholder avatar keyed by the student's name, matching
            // the web app's generated fallback.
            let initials = avatar_initials(spec.student);
            let initials_size = PORTRAIT_SIZE * 0.5;
            canvas.set_fill_color(AVATAR_TEXT);
            canvas.set_font_size(initials_size);
            canvas.draw_text(cx, cy + initials_size * 0.35, initials, TextAnchor::Middle);
        }
    }

    // White ring over the portrait edge, as the CSS border renders.
    canvas.set_fill_color(Color::WHITE);
    canvas.stroke_circle(cx, cy, radius + PORTRAIT_RING / 2.0, PORTRAIT_RING);
    canvas.restore_state();
}

fn avatar_initials(student: &Student) -> String {
    [&student.names, &student.paternal_last_name]
        .into_iter()
        .filter_map(|part| part.trim().chars().next())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

fn draw_qr_panel(canvas: &mut Canvas, spec: &CardSpec<'_>) -> Result<(), CarnetPressError> {
    let x = BODY_PAD_X;
    let y = body_center_y() - PORTRAIT_SIZE / 2.0;

    canvas.save_state();
    canvas.set_fill_color(Color::WHITE);
    canvas.fill_round_rect(x, y, PORTRAIT_SIZE, PORTRAIT_SIZE, QR_FRAME_RADIUS);
    canvas.restore_state();

    qr::draw_qr(
        canvas,
        &spec.student.document_number,
        x + QR_FRAME_PAD,
        y + QR_FRAME_PAD,
        PORTRAIT_SIZE - 2.0 * QR_FRAME_PAD,
    )
}

fn draw_identity_fields(canvas: &mut Canvas, spec: &CardSpec<'_>) {
    let student = spec.student;
    let rows = [
        ("Nombres: ", student.names.to_uppercase()),
        ("Apellidos: ", student.surnames().to_uppercase()),
        (
            "Grado y Sección: ",
            grade_section_display(&student.grade, &student.section).to_uppercase(),
        ),
    ];

    let x = BODY_PAD_X + PORTRAIT_SIZE + BODY_COLUMN_GAP;
    let row_height = FIELD_VALUE_SIZE * FIELD_LINE_HEIGHT;
    let block_height = rows.len() as f32 * row_height + (rows.len() - 1) as f32 * FIELD_ROW_GAP;
    let mut row_top = body_center_y() - block_height / 2.0;

    canvas.save_state();
    canvas.set_fill_color(TEXT_SLATE);
    canvas.set_letter_spacing(0.5);
    for (label, value) in rows {
        let baseline = line_baseline(row_top, row_height, FIELD_VALUE_SIZE);
        canvas.draw_text_run(
            x,
            baseline,
            vec![
                TextSpan::new(label.to_uppercase(), FIELD_LABEL_SIZE).with_opacity(0.92),
                TextSpan::new(value, FIELD_VALUE_SIZE),
            ],
        );
        row_top += row_height + FIELD_ROW_GAP;
    }
    canvas.restore_state();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;

    fn student() -> Student {
        Student {
            document_number: "71234567".to_string(),
            names: "María José".to_string(),
            paternal_last_name: "Quispe".to_string(),
            maternal_last_name: "Huamán".to_string(),
            full_name: "Quispe Huamán, María José".to_string(),
            grade: "3er Grado".to_string(),
            section: "B".to_string(),
            photo: None,
        }
    }

    fn spec_for<'a>(student: &'a Student, settings: &'a Settings) -> CardSpec<'a> {
        CardSpec {
            student,
            serial: 11,
            total: 12,
            settings,
        }
    }

    fn drawn_texts(scene: &Scene) -> Vec<String> {
        scene
            .commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawText { text, .. } => Some(text.clone()),
                Command::DrawTextRun { spans, .. } => {
                    Some(spans.iter().map(|s| s.text.as_str()).collect::<String>())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn front_scene_is_idempotent() {
        let student = student();
        let settings = Settings::default();
        let spec = spec_for(&student, &settings);
        let first = scene(&spec, CardFace::Front).unwrap();
        let second = scene(&spec, CardFace::Front).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn scene_uses_fixed_canvas_dimensions() {
        let student = student();
        let settings = Settings::default();
        let spec = spec_for(&student, &settings);
        let scene = scene(&spec, CardFace::Back).unwrap();
        assert_eq!((scene.width, scene.height), (1004, 626));
    }

    #[test]
    fn front_carries_series_label_and_year() {
        let student = student();
        let settings = Settings::default();
        let spec = spec_for(&student, &settings);
        let texts = drawn_texts(&scene(&spec, CardFace::Front).unwrap());
        assert!(texts.iter().any(|t| t == "011"));
        assert!(texts.iter().any(|t| t == "2025"));
        assert!(texts.iter().any(|t| t == "PRIMARIA"));
    }

    #[test]
    fn identity_fields_are_upper_cased() {
        let student = student();
        let settings = Settings::default();
        let spec = spec_for(&student, &settings);
        let texts = drawn_texts(&scene(&spec, CardFace::Front).unwrap());
        assert!(texts.iter().any(|t| t.contains("MARÍA JOSÉ")));
        assert!(texts.iter().any(|t| t.contains("QUISPE HUAMÁN")));
        assert!(texts.iter().any(|t| t.contains("3° B")));
    }

    #[test]
    fn initial_level_grade_selects_inicial_gradient() {
        let mut student = student();
        student.grade = "5 AÑOS".to_string();
        let settings = Settings::default();
        let spec = spec_for(&student, &settings);
        let scene = scene(&spec, CardFace::Front).unwrap();
        let stops = scene
            .commands
            .iter()
            .find_map(|cmd| match cmd {
                Command::ShadeRect { stops, .. } => Some(stops.clone()),
                _ => None,
            })
            .expect("header gradient present");
        assert_eq!(stops[0].color, settings.gradient_inicial.from);
        assert_eq!(stops[1].color, settings.gradient_inicial.to);
    }

    #[test]
    fn missing_photo_renders_placeholder_avatar() {
        let student = student();
        let settings = Settings::default();
        let spec = spec_for(&student, &settings);
        let scene = scene(&spec, CardFace::Front).unwrap();
        assert!(
            !scene
                .commands
                .iter()
                .any(|cmd| matches!(cmd, Command::DrawImage { .. }))
        );
        let texts = drawn_texts(&scene);
        assert!(texts.iter().any(|t| t == "MQ"));
    }

    #[test]
    fn photo_source_is_placed_clipped_to_circle() {
        let mut student = student();
        student.photo = Some("photos/71234567.jpg".to_string());
        let settings = Settings::default();
        let spec = spec_for(&student, &settings);
        let scene = scene(&spec, CardFace::Front).unwrap();
        let placed = scene.commands.iter().any(|cmd| {
            matches!(cmd, Command::DrawImage { resource_id, .. } if resource_id == "photos/71234567.jpg")
        });
        assert!(placed);
        assert!(
            scene
                .commands
                .iter()
                .any(|cmd| matches!(cmd, Command::ClipCircle { .. }))
        );
    }

    #[test]
    fn back_replaces_portrait_with_qr_modules() {
        let student = student();
        let settings = Settings::default();
        let spec = spec_for(&student, &settings);
        let scene = scene(&spec, CardFace::Back).unwrap();
        assert!(
            !scene
                .commands
                .iter()
                .any(|cmd| matches!(cmd, Command::ClipCircle { .. }))
        );
        let module_rects = scene
            .commands
            .iter()
            .filter(|cmd| matches!(cmd, Command::FillRect { .. }))
            .count();
        // The QR matrix contributes hundreds of dark modules.
        assert!(module_rects > 100, "got {module_rects} module rects");
    }

    #[test]
    fn back_shares_header_and_identity_fields_with_front() {
        let student = student();
        let settings = Settings::default();
        let spec = spec_for(&student, &settings);
        let front = scene(&spec, CardFace::Front).unwrap();
        let back = scene(&spec, CardFace::Back).unwrap();
        assert_eq!(drawn_texts(&front)[..4], drawn_texts(&back)[..4]);
    }
}
