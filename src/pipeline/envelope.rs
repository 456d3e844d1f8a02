//! Envelope rendering: draw one addressee onto a fixed-size pdfium page.
//!
//! pdfium wraps a C++ library with thread-local state, so callers run this
//! inside `spawn_blocking` and keep one [`Pdfium`] binding per batch.
//! Coordinates come from [`EnvelopeLayout`] in top-left millimetres and are
//! flipped into PDF user space here.

use crate::error::MailMergeError;
use crate::pipeline::layout::{EnvelopeLayout, PlacedText};
use crate::pipeline::resolve::EnvelopeAddressee;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// Decode the logo drawn in the top-left corner of every envelope.
pub fn load_logo(path: &Path) -> Result<DynamicImage, MailMergeError> {
    if !path.is_file() {
        return Err(MailMergeError::LogoUnavailable {
            path: path.to_path_buf(),
            detail: "file not found".into(),
        });
    }
    image::open(path).map_err(|e| MailMergeError::LogoUnavailable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

pub struct EnvelopeRenderer<'a> {
    pdfium: &'a Pdfium,
    layout: EnvelopeLayout,
    logo: DynamicImage,
    return_address: Vec<String>,
}

impl<'a> EnvelopeRenderer<'a> {
    pub fn new(
        pdfium: &'a Pdfium,
        layout: EnvelopeLayout,
        logo: DynamicImage,
        return_address: Vec<String>,
    ) -> Self {
        Self {
            pdfium,
            layout,
            logo,
            return_address,
        }
    }

    /// Every line drawn for `addressee`: return address first, then delivery.
    pub fn placed_text(&self, addressee: &EnvelopeAddressee) -> Vec<PlacedText> {
        let mut lines = self.layout.return_address_lines(&self.return_address);
        lines.extend(self.layout.delivery_lines(addressee));
        lines
    }

    /// Render a single-page envelope PDF to `output`.
    pub fn render(
        &self,
        addressee: &EnvelopeAddressee,
        output: &Path,
    ) -> Result<(), MailMergeError> {
        let fail = |e: PdfiumError| MailMergeError::RenderFailed {
            path: output.to_path_buf(),
            detail: format!("{:?}", e),
        };
        let layout = &self.layout;
        let mm = PdfPoints::from_mm;
        // PDF user space grows upwards from the bottom edge.
        let from_top = |y: f32| mm(layout.page_height - y);

        let mut document = self.pdfium.create_new_pdf().map_err(fail)?;
        let helvetica = document.fonts_mut().helvetica();
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(
                mm(layout.page_width),
                mm(layout.page_height),
            ))
            .map_err(fail)?;

        let logo = layout.logo_rect(self.logo.width(), self.logo.height());
        page.objects_mut()
            .create_image_object(
                mm(logo.x),
                from_top(logo.y + logo.height),
                &self.logo,
                Some(mm(logo.width)),
                Some(mm(logo.height)),
            )
            .map_err(fail)?;

        for line in self.placed_text(addressee) {
            if line.text.is_empty() {
                continue;
            }
            page.objects_mut()
                .create_text_object(
                    mm(line.x),
                    from_top(line.baseline),
                    &line.text,
                    helvetica,
                    PdfPoints::new(line.font_size_pt),
                )
                .map_err(fail)?;
        }
        drop(page);

        document.save_to_file(output).map_err(fail)?;
        debug!("Rendered envelope → {}", output.display());
        Ok(())
    }
}
