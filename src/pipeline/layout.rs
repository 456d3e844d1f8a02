//! Fixed-coordinate envelope layout.
//!
//! All positions are millimetres measured from the top-left corner of the
//! page, the way a print designer measures a #10 envelope. The renderer flips
//! them into PDF user space (origin bottom-left) at the last moment, so layout
//! can be unit-tested without pdfium.
//!
//! Text placement reproduces the classic cell model: a line is drawn inside a
//! cell of fixed height, its baseline sits at `top + h/2 + 0.3·font_size`, and
//! left-aligned text is inset by a 1 mm cell margin.

use crate::pipeline::resolve::EnvelopeAddressee;
use serde::{Deserialize, Serialize};

/// Millimetres per PostScript point.
pub const MM_PER_PT: f32 = 25.4 / 72.0;

/// A rectangle on the page, top-left origin, millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One line of text ready to be drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedText {
    pub text: String,
    /// Left edge of the glyph run.
    pub x: f32,
    /// Baseline, measured from the top of the page.
    pub baseline: f32,
    pub font_size_pt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Center,
}

/// A stack of single-line cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub x: f32,
    pub y: f32,
    /// Cell width; `None` stretches to the right page margin.
    pub width: Option<f32>,
    pub cell_height: f32,
    /// Distance between consecutive cell tops.
    pub line_spacing: f32,
    pub font_size_pt: f32,
    pub align: Align,
}

/// Every coordinate and font size used to draw an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeLayout {
    pub page_width: f32,
    pub page_height: f32,
    /// Right page margin, used by stretch-to-margin cells.
    pub right_margin: f32,
    /// Horizontal inset for left-aligned text.
    pub cell_margin: f32,
    pub logo_x: f32,
    pub logo_y: f32,
    pub logo_width: f32,
    pub return_address: TextBlock,
    pub delivery: TextBlock,
}

impl Default for EnvelopeLayout {
    /// A #10 envelope (241 × 105 mm, landscape).
    fn default() -> Self {
        let page_width = 241.0;
        let delivery_width = 90.0;
        Self {
            page_width,
            page_height: 105.0,
            right_margin: 10.0,
            cell_margin: 1.0,
            logo_x: 10.0,
            logo_y: 2.0,
            logo_width: 30.0,
            return_address: TextBlock {
                x: 40.0,
                y: 7.5,
                width: None,
                cell_height: 5.0,
                line_spacing: 4.5,
                font_size_pt: 10.0,
                align: Align::Left,
            },
            delivery: TextBlock {
                x: (page_width - delivery_width) / 2.0,
                y: 62.7,
                width: Some(delivery_width),
                cell_height: 6.0,
                line_spacing: 6.0,
                font_size_pt: 12.0,
                align: Align::Center,
            },
        }
    }
}

impl EnvelopeLayout {
    /// Logo rectangle for an image of the given pixel dimensions; height
    /// follows the aspect ratio.
    pub fn logo_rect(&self, pixel_width: u32, pixel_height: u32) -> Rect {
        let height = if pixel_width == 0 {
            0.0
        } else {
            self.logo_width * pixel_height as f32 / pixel_width as f32
        };
        Rect {
            x: self.logo_x,
            y: self.logo_y,
            width: self.logo_width,
            height,
        }
    }

    pub fn return_address_lines<S: AsRef<str>>(&self, lines: &[S]) -> Vec<PlacedText> {
        self.place(&self.return_address, lines)
    }

    pub fn delivery_lines(&self, addressee: &EnvelopeAddressee) -> Vec<PlacedText> {
        self.place(&self.delivery, &addressee.lines())
    }

    fn place<S: AsRef<str>>(&self, block: &TextBlock, lines: &[S]) -> Vec<PlacedText> {
        let font_mm = block.font_size_pt * MM_PER_PT;
        let cell_width = block
            .width
            .unwrap_or(self.page_width - self.right_margin - block.x);

        lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let text = line.as_ref();
                let top = block.y + i as f32 * block.line_spacing;
                let dx = match block.align {
                    Align::Left => self.cell_margin,
                    Align::Center => (cell_width - text_width_mm(text, block.font_size_pt)) / 2.0,
                };
                PlacedText {
                    text: text.to_string(),
                    x: block.x + dx,
                    baseline: top + 0.5 * block.cell_height + 0.3 * font_mm,
                    font_size_pt: block.font_size_pt,
                }
            })
            .collect()
    }

    /// Reject layouts that cannot produce a page.
    pub fn validate(&self) -> Result<(), String> {
        if self.page_width <= 0.0 || self.page_height <= 0.0 {
            return Err(format!(
                "page size must be positive, got {}×{} mm",
                self.page_width, self.page_height
            ));
        }
        if self.logo_width <= 0.0 {
            return Err("logo width must be positive".into());
        }
        for block in [&self.return_address, &self.delivery] {
            if block.font_size_pt <= 0.0 {
                return Err(format!("font size must be positive, got {}", block.font_size_pt));
            }
        }
        Ok(())
    }
}

/// Width of `text` set in Helvetica at `font_size_pt`, in millimetres.
pub fn text_width_mm(text: &str, font_size_pt: f32) -> f32 {
    let units: u32 = text.chars().map(helvetica_width).sum();
    units as f32 / 1000.0 * font_size_pt * MM_PER_PT
}

/// Helvetica advance widths (1/1000 em) from the standard AFM metrics.
fn helvetica_width(c: char) -> u32 {
    const ASCII: [u16; 95] = [
        278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
        556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
        1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
        667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
        333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
        556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
    ];
    match c as u32 {
        code @ 32..=126 => ASCII[(code - 32) as usize] as u32,
        _ => 556,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    fn addressee() -> EnvelopeAddressee {
        EnvelopeAddressee {
            name: "Ada Lovelace".into(),
            street: "12 Analytical Way".into(),
            city_state_zip: "Mount Horeb, WI 53572".into(),
            file_label: "Ada Lovelace".into(),
        }
    }

    #[test]
    fn default_delivery_column_is_centred() {
        let layout = EnvelopeLayout::default();
        assert!(approx(layout.delivery.x, 75.5));
        assert_eq!(layout.delivery.width, Some(90.0));
    }

    #[test]
    fn text_width_uses_helvetica_metrics() {
        // "Hi" = 722 + 222 units
        let w = text_width_mm("Hi", 12.0);
        assert!(approx(w, 0.944 * 12.0 * MM_PER_PT));
        assert!(approx(text_width_mm("", 12.0), 0.0));
        assert!(text_width_mm("WWW", 10.0) > text_width_mm("iii", 10.0));
    }

    #[test]
    fn delivery_lines_are_centred_and_stacked() {
        let layout = EnvelopeLayout::default();
        let lines = layout.delivery_lines(&addressee());
        assert_eq!(lines.len(), 3);

        let font_mm = 12.0 * MM_PER_PT;
        for (i, line) in lines.iter().enumerate() {
            let width = text_width_mm(&line.text, 12.0);
            assert!(approx(line.x + width / 2.0, 75.5 + 45.0), "line {i} not centred");
            let expected = 62.7 + i as f32 * 6.0 + 3.0 + 0.3 * font_mm;
            assert!(approx(line.baseline, expected), "line {i} baseline {}", line.baseline);
        }
        assert_eq!(lines[1].text, "12 Analytical Way");
    }

    #[test]
    fn return_address_is_left_aligned_with_margin() {
        let layout = EnvelopeLayout::default();
        let lines = layout.return_address_lines(&["Friends", "PO Box 287", "Mount Horeb, WI"]);
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| approx(l.x, 41.0)));
        assert!(approx(lines[1].baseline - lines[0].baseline, 4.5));
        assert!(approx(lines[0].baseline, 7.5 + 2.5 + 0.3 * 10.0 * MM_PER_PT));
    }

    #[test]
    fn logo_keeps_aspect_ratio() {
        let layout = EnvelopeLayout::default();
        let r = layout.logo_rect(600, 300);
        assert_eq!((r.x, r.y, r.width), (10.0, 2.0, 30.0));
        assert!(approx(r.height, 15.0));
        assert_eq!(layout.logo_rect(0, 10).height, 0.0);
    }

    #[test]
    fn layout_round_trips_through_json_with_defaults() {
        let layout: EnvelopeLayout =
            serde_json::from_str(r#"{ "page_width": 229.0, "logo_width": 25.0 }"#).unwrap();
        assert_eq!(layout.page_width, 229.0);
        assert_eq!(layout.page_height, 105.0);
        assert_eq!(layout.delivery.align, Align::Center);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn validate_rejects_degenerate_layouts() {
        let mut layout = EnvelopeLayout::default();
        layout.page_height = 0.0;
        assert!(layout.validate().is_err());

        let mut layout = EnvelopeLayout::default();
        layout.delivery.font_size_pt = 0.0;
        assert!(layout.validate().unwrap_err().contains("font size"));
    }
}
