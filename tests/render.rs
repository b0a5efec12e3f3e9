//! pdfium-backed rendering. Skipped unless a pdfium library can be bound,
//! either from `PDFIUM_LIB_PATH` or the system library path.
//!
//! Run with:
//!   PDFIUM_LIB_PATH=/opt/pdfium/lib cargo test --test render -- --nocapture

mod common;

use common::{CallLog, FakeTableau, FakeUploader};
use gslidegen::{
    ErrorKind, ExportConfig, ExportPipeline, PdfiumRasterizer, Rasterizer, RunStatus, WorkbookDocument,
};
use image::GenericImageView;
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test when pdfium cannot be bound.
macro_rules! pdfium_or_skip {
    () => {{
        let r = PdfiumRasterizer::new(std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));
        if let Err(e) = r.probe() {
            println!("SKIP: pdfium not available: {e}");
            return;
        }
        r
    }};
}

/// A Letter-landscape PDF (792 × 612 pt) with one filled rectangle per page.
fn letter_landscape_pdf(pages: usize) -> Vec<u8> {
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", 3 + i * 2)).collect();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages),
    ];
    for i in 0..pages {
        let content = format!("0.1 0.3 0.8 rg {} 80 240 160 re f", 60 + i * 40);
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 792 612] /Contents {} 0 R >>",
            4 + i * 2
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, obj).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    out
}

fn document(pages: usize) -> WorkbookDocument {
    WorkbookDocument::new("wb-42", "Sales", letter_landscape_pdf(pages))
}

// ── Rasteriser ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn counts_pages_of_generated_pdf() {
    let r = pdfium_or_skip!();
    assert_eq!(r.page_count(&document(3)).await.unwrap(), 3);
}

#[tokio::test]
async fn render_is_deterministic() {
    let r = pdfium_or_skip!();
    let doc = document(2);

    let a = r.render(&doc, 2, 144).await.unwrap();
    let b = r.render(&doc, 2, 144).await.unwrap();

    assert_eq!(a.png, b.png, "same page and DPI must give identical bytes");
    assert!(a.png.starts_with(b"\x89PNG\r\n\x1a\n"));
    assert_eq!(a.page_number, 2);
    assert_eq!(a.dpi, 144);
}

#[tokio::test]
async fn dpi_sets_pixel_size() {
    let r = pdfium_or_skip!();
    let img = r.render(&document(1), 1, 144).await.unwrap();

    // 792 × 612 pt at 2 px/pt.
    assert!(img.width.abs_diff(1584) <= 1, "width {}", img.width);
    assert!(img.height.abs_diff(1224) <= 1, "height {}", img.height);

    let decoded = image::load_from_memory(&img.png).unwrap();
    assert_eq!(decoded.dimensions(), (img.width, img.height));
}

#[tokio::test]
async fn longest_edge_is_capped() {
    let r = pdfium_or_skip!().with_max_rendered_pixels(500);
    let img = r.render(&document(1), 1, 600).await.unwrap();
    assert!(img.width <= 500 && img.height <= 500, "{}x{}", img.width, img.height);
}

#[tokio::test]
async fn page_outside_document_is_out_of_range() {
    let r = pdfium_or_skip!();
    let doc = document(3);
    for page in [0, 4] {
        let err = r.render(&doc, page, 72).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PageOutOfRange, "page {page}");
    }
}

#[tokio::test]
async fn truncated_pdf_is_malformed() {
    let r = pdfium_or_skip!();
    let doc = WorkbookDocument::new("wb", "wb", b"%PDF-1.4\n1 0 obj\n<< /Type /Cat".to_vec());
    let err = r.page_count(&doc).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDocument);
}

// ── Whole pipeline with real rendering ───────────────────────────────────────

#[tokio::test]
async fn pipeline_uploads_real_pngs() {
    let r = pdfium_or_skip!();
    let log = CallLog::new();
    let tableau = FakeTableau {
        pdf: letter_landscape_pdf(2),
        ..FakeTableau::new(Arc::clone(&log))
    };
    let uploader = Arc::new(FakeUploader::new(Arc::clone(&log)));
    let config = ExportConfig::builder()
        .workbook_id("wb-42")
        .dpi(72)
        .build()
        .unwrap();

    let pipeline = ExportPipeline::new(
        Arc::new(tableau),
        Arc::new(r),
        Arc::clone(&uploader) as Arc<dyn gslidegen::Uploader>,
        "F123",
        config,
    );
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.status(), RunStatus::Succeeded);
    let received = uploader.received.lock().unwrap();
    assert_eq!(received.len(), 2);
    for (_, png) in received.iter() {
        let img = image::load_from_memory(png).unwrap();
        assert!(img.width().abs_diff(792) <= 1);
    }
    assert_ne!(received[0].1, received[1].1, "pages differ");
}
