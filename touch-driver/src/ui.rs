//! Drawing helpers for the calibration screen and touch canvases.

use core::fmt::{self, Write};

use embedded_graphics::{
    mono_font::{ascii::FONT_8X13, MonoTextStyle},
    pixelcolor::Rgb565,
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
    Pixel,
};
use heapless::String;

pub const BACKGROUND: Rgb565 = Rgb565::WHITE;
pub const FOREGROUND: Rgb565 = Rgb565::RED;
pub const HIGHLIGHT: Rgb565 = Rgb565::BLUE;

/// Arm length of the calibration crosshair, measured left/up of the center.
const ARM: i32 = 12;
const RING_DIAMETER: u32 = 13;
const LINE_HEIGHT: i32 = 16;

fn at((x, y): crate::Point) -> Point {
    Point::new(x as i32, y as i32)
}

/// Crosshair with a ring, centered on `center`.
pub fn draw_target<D>(display: &mut D, center: crate::Point, color: Rgb565) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let c = at(center);
    let style = PrimitiveStyle::with_stroke(color, 1);

    Line::new(c - Point::new(ARM, 0), c + Point::new(ARM + 1, 0))
        .into_styled(style)
        .draw(display)?;
    Line::new(c - Point::new(0, ARM), c + Point::new(0, ARM + 1))
        .into_styled(style)
        .draw(display)?;

    for offset in [(1, 1), (-1, 1), (1, -1), (-1, -1)] {
        Pixel(c + Point::from(offset), color).draw(display)?;
    }

    Circle::with_center(c, RING_DIAMETER)
        .into_styled(style)
        .draw(display)
}

/// 2x2 pixel dot with its top-left corner at `point`.
pub fn draw_big_point<D>(display: &mut D, point: crate::Point, color: Rgb565) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    Rectangle::new(at(point), Size::new(2, 2))
        .into_styled(PrimitiveStyle::with_fill(color))
        .draw(display)
}

/// Draws `text` with its top-left corner at `origin`.
pub fn draw_text<D>(
    display: &mut D,
    origin: crate::Point,
    text: &str,
    color: Rgb565,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let style = MonoTextStyle::new(&FONT_8X13, color);
    Text::with_baseline(text, at(origin), style, Baseline::Top).draw(display)?;
    Ok(())
}

/// Formats a short label. Overlong labels are cut short.
fn label<const N: usize>(args: fmt::Arguments) -> String<N> {
    let mut text = String::new();
    let _ = text.write_fmt(args);
    text
}

const PROMPT: [&str; 5] = [
    "Please use the stylus to",
    "click the cross on the",
    "screen. The cross will",
    "keep moving until the",
    "adjustment is complete.",
];

pub(crate) fn draw_prompt<D>(display: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    for (line, text) in PROMPT.iter().enumerate() {
        let y = 40 + line as i32 * LINE_HEIGHT;
        draw_text(display, (40, y as u16), text, FOREGROUND)?;
    }
    Ok(())
}

/// Shows the raw samples of a rejected calibration and both axis ratios.
pub(crate) fn draw_calibration_info<D>(
    display: &mut D,
    samples: &[crate::Point; 5],
    x_ratio: f64,
    y_ratio: f64,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let width = display.bounding_box().size.width;
    let row = |i: usize| (160 + i * 20) as u16;

    for (i, &(x, y)) in samples.iter().enumerate() {
        let text: String<16> = label(format_args!("x{}:{}", i + 1, x));
        draw_text(display, (40, row(i)), &text, FOREGROUND)?;
        let text: String<16> = label(format_args!("y{}:{}", i + 1, y));
        draw_text(display, (120, row(i)), &text, FOREGROUND)?;
    }

    let ratios = row(samples.len());
    Rectangle::new(
        Point::new(40, ratios as i32),
        Size::new(width.saturating_sub(41), LINE_HEIGHT as u32),
    )
    .into_styled(PrimitiveStyle::with_fill(BACKGROUND))
    .draw(display)?;

    let mut text: String<32> = label(format_args!("px:{:.2}", x_ratio));
    text.truncate(7);
    draw_text(display, (40, ratios), &text, FOREGROUND)?;
    let mut text: String<32> = label(format_args!("py:{:.2}", y_ratio));
    text.truncate(7);
    draw_text(display, (120, ratios), &text, FOREGROUND)
}
