use crate::canvas::Canvas;
use crate::error::CarnetPressError;
use crate::types::Color;
use qrcode::QrCode;

/// Draws the QR module matrix for `data` into the square
/// `(x, y, size, size)`, dark modules only. The caller provides the
/// light background (the card back paints a white frame first).
pub fn draw_qr(
    canvas: &mut Canvas,
    data: &str,
    x: f32,
    y: f32,
    size: f32,
) -> Result<(), CarnetPressError> {
    let code = QrCode::new(data.as_bytes())
        .map_err(|e| CarnetPressError::Asset(format!("qr encode failed for {:?}: {}", data, e)))?;
    let modules = code.to_colors();
    let count = code.width() as u32;
    if count == 0 {
        return Err(CarnetPressError::Asset("qr matrix is empty".to_string()));
    }
    let module = size / count as f32;

    canvas.save_state();
    canvas.set_fill_color(Color::BLACK);
    for (i, color) in modules.iter().enumerate() {
        if *color != qrcode::Color::Dark {
            continue;
        }
        let col = (i as u32) % count;
        let row = (i as u32) / count;
        canvas.fill_rect(
            x + col as f32 * module,
            y + row as f32 * module,
            module,
            module,
        );
    }
    canvas.restore_state();
    Ok(())
}
