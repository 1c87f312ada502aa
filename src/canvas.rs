use crate::types::{Color, ShadingStop};

/// Horizontal reference for anchored text. The renderer measures the
/// shaped run and shifts accordingly, so templates stay metrics-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    Middle,
    End,
}

/// One fragment of a mixed-size text line. Spans share the baseline of
/// the enclosing run and flow left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub font_size: f32,
    pub opacity: f32,
}

impl TextSpan {
    pub fn new(text: impl Into<String>, font_size: f32) -> Self {
        Self {
            text: text.into(),
            font_size,
            opacity: 1.0,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }
}

/// Drawing command in card space: top-left origin, y grows downward,
/// units are card pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    SetFillColor(Color),
    SetOpacity(f32),
    SetFontName(String),
    SetFontSize(f32),
    SetLetterSpacing(f32),
    ClipCircle {
        cx: f32,
        cy: f32,
        radius: f32,
    },
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    FillRoundRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        radius: f32,
    },
    FillCircle {
        cx: f32,
        cy: f32,
        radius: f32,
    },
    StrokeCircle {
        cx: f32,
        cy: f32,
        radius: f32,
        line_width: f32,
    },
    /// Axial gradient across the rect, left edge to right edge.
    ShadeRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        stops: Vec<ShadingStop>,
    },
    DrawImage {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        resource_id: String,
    },
    /// Single-style text at the current font state; `y` is the baseline.
    DrawText {
        x: f32,
        y: f32,
        text: String,
        anchor: TextAnchor,
    },
    DrawTextRun {
        x: f32,
        y: f32,
        spans: Vec<TextSpan>,
    },
}

/// The fully recorded command list for one card face.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    opacity: f32,
    font_name: String,
    font_size: f32,
    letter_spacing: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            opacity: 1.0,
            font_name: String::new(),
            font_size: 16.0,
            letter_spacing: 0.0,
        }
    }
}

/// Records card-face drawing into a [`Scene`]. State setters are
/// deduplicated against the tracked graphics state so identical specs
/// always record identical command lists.
pub struct Canvas {
    width: u32,
    height: u32,
    commands: Vec<Command>,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
            state_stack: Vec::new(),
            current_state: GraphicsState::default(),
        }
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.commands.push(Command::RestoreState);
        }
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.commands.push(Command::SetFillColor(color));
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        if self.current_state.opacity == opacity {
            return;
        }
        self.current_state.opacity = opacity;
        self.commands.push(Command::SetOpacity(opacity));
    }

    pub fn set_font_name(&mut self, name: &str) {
        if self.current_state.font_name == name {
            return;
        }
        self.current_state.font_name = name.to_string();
        self.commands
            .push(Command::SetFontName(self.current_state.font_name.clone()));
    }

    pub fn set_font_size(&mut self, size: f32) {
        if self.current_state.font_size == size {
            return;
        }
        self.current_state.font_size = size;
        self.commands.push(Command::SetFontSize(size));
    }

    pub fn set_letter_spacing(&mut self, spacing: f32) {
        if self.current_state.letter_spacing == spacing {
            return;
        }
        self.current_state.letter_spacing = spacing;
        self.commands.push(Command::SetLetterSpacing(spacing));
    }

    pub fn clip_circle(&mut self, cx: f32, cy: f32, radius: f32) {
        self.commands.push(Command::ClipCircle { cx, cy, radius });
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.commands.push(Command::FillRect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn fill_round_rect(&mut self, x: f32, y: f32, width: f32, height: f32, radius: f32) {
        self.commands.push(Command::FillRoundRect {
            x,
            y,
            width,
            height,
            radius,
        });
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32) {
        self.commands.push(Command::FillCircle { cx, cy, radius });
    }

    pub fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, line_width: f32) {
        self.commands.push(Command::StrokeCircle {
            cx,
            cy,
            radius,
            line_width,
        });
    }

    pub fn shade_rect(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        stops: Vec<ShadingStop>,
    ) {
        self.commands.push(Command::ShadeRect {
            x,
            y,
            width,
            height,
            stops,
        });
    }

    pub fn draw_image(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        resource_id: impl Into<String>,
    ) {
        self.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.into(),
        });
    }

    pub fn draw_text(&mut self, x: f32, y: f32, text: impl Into<String>, anchor: TextAnchor) {
        self.commands.push(Command::DrawText {
            x,
            y,
            text: text.into(),
            anchor,
        });
    }

    pub fn draw_text_run(&mut self, x: f32, y: f32, spans: Vec<TextSpan>) {
        self.commands.push(Command::DrawTextRun { x, y, spans });
    }

    pub fn finish(self) -> Scene {
        Scene {
            width: self.width,
            height: self.height,
            commands: self.commands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_setters_deduplicate() {
        let mut canvas = Canvas::new(100, 50);
        canvas.set_fill_color(Color::WHITE);
        canvas.set_fill_color(Color::WHITE);
        canvas.set_font_size(20.0);
        canvas.set_font_size(20.0);
        let scene = canvas.finish();
        assert_eq!(
            scene.commands,
            vec![
                Command::SetFillColor(Color::WHITE),
                Command::SetFontSize(20.0),
            ]
        );
    }

    #[test]
    fn restore_resets_dedup_baseline() {
        let mut canvas = Canvas::new(100, 50);
        canvas.set_fill_color(Color::WHITE);
        canvas.save_state();
        canvas.set_fill_color(Color::BLACK);
        canvas.restore_state();
        // Back to white after restore; setting white again is a no-op,
        // black records once more.
        canvas.set_fill_color(Color::WHITE);
        canvas.set_fill_color(Color::BLACK);
        let scene = canvas.finish();
        assert_eq!(
            scene.commands,
            vec![
                Command::SetFillColor(Color::WHITE),
                Command::SaveState,
                Command::SetFillColor(Color::BLACK),
                Command::RestoreState,
                Command::SetFillColor(Color::BLACK),
            ]
        );
    }

    #[test]
    fn restore_without_save_is_ignored() {
        let mut canvas = Canvas::new(10, 10);
        canvas.restore_state();
        assert!(canvas.finish().commands.is_empty());
    }

    #[test]
    fn finish_carries_canvas_dimensions() {
        let scene = Canvas::new(1004, 626).finish();
        assert_eq!((scene.width, scene.height), (1004, 626));
    }
}
