//! Integration tests for edgequake-docextract.
//!
//! Everything except the last test runs offline: the model is replaced by a
//! scripted [`ExtractionBackend`] that returns canned replies and counts how
//! often it was asked. PDF tests need a pdfium library; they skip when none
//! can be bound (set `PDFIUM_LIB_PATH` to run them).
//!
//! The live test makes a real API call and is gated behind `E2E_ENABLED`:
//!   E2E_ENABLED=1 cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use edgequake_docextract::pipeline::render::bind_pdfium;
use edgequake_docextract::{
    preview, process, process_file, BackendError, DocExtractError, DocumentCategory, Extraction,
    ExtractionBackend, ExtractionConfig, ExtractionProgressCallback, ExtractionRequest,
    ExtractionStatus, MediaType, PageSelection, ToolCallReply, ToolReply, ToolRequest,
    UploadedFile,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Replays one reply per call (the last one repeats) and records requests.
struct ScriptedBackend {
    replies: Vec<Result<ToolReply, String>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<ToolRequest>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<Result<ToolReply, String>>) -> Arc<Self> {
        Arc::new(Self {
            replies,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn always(reply: ToolReply) -> Arc<Self> {
        Self::new(vec![Ok(reply)])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn call(&self, request: &ToolRequest) -> Result<ToolReply, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .get(n)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_else(|| Ok(ToolReply::default()));
        reply.map_err(|message| BackendError {
            backend: "scripted".into(),
            message,
        })
    }
}

fn tool_reply(tool: &str, arguments: serde_json::Value) -> ToolReply {
    ToolReply {
        content: String::new(),
        tool_calls: vec![ToolCallReply {
            name: tool.to_string(),
            arguments: arguments.to_string(),
        }],
        input_tokens: 1200,
        output_tokens: 80,
    }
}

fn png_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 30, Rgba([250, 250, 250, 200])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("png encode");
    buf
}

fn config_with(backend: Arc<ScriptedBackend>) -> ExtractionConfig {
    ExtractionConfig::builder()
        .backend(backend)
        .retry_backoff_ms(1)
        .build()
        .expect("valid config")
}

/// A syntactically valid PDF with `pages` blank A4 pages.
fn blank_pdf(pages: usize) -> Vec<u8> {
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            (0..pages)
                .map(|i| format!("{} 0 R", i + 3))
                .collect::<Vec<_>>()
                .join(" "),
            pages
        ),
    ];
    for _ in 0..pages {
        objects.push("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] >>".to_string());
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        write!(out, "{} 0 obj\n{}\nendobj\n", i + 1, body).unwrap();
    }
    let xref = out.len();
    write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).unwrap();
    for off in offsets {
        write!(out, "{:010} 00000 n \n", off).unwrap();
    }
    write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref
    )
    .unwrap();
    out
}

macro_rules! skip_without_pdfium {
    () => {
        if bind_pdfium().is_err() {
            println!("SKIP: no pdfium library (set PDFIUM_LIB_PATH)");
            return;
        }
    };
}

// ── Single-image uploads ─────────────────────────────────────────────────────

#[tokio::test]
async fn png_invoice_returns_fields() {
    let backend = ScriptedBackend::always(tool_reply(
        "extract_invoice_fields",
        serde_json::json!({
            "invoice_number": "INV-0042",
            "invoice_date": "2024-03-01",
            "supplier_name": "Acme Ltd",
            "customer_name": "Globex",
            "total_amount": 118.5,
            "currency": "EUR"
        }),
    ));
    let request = ExtractionRequest::new("inv.png", MediaType::Png, png_bytes(), "Invoice");

    let response = process(&request, &config_with(backend.clone()))
        .await
        .expect("process");

    assert_eq!(response.status, ExtractionStatus::Extracted);
    assert_eq!(response.category, Some(DocumentCategory::Invoice));
    assert_eq!(response.images.len(), 1);
    assert_eq!(response.pages.len(), 1);
    assert_eq!(backend.calls(), 1);

    let page = response.page(1).expect("page 1");
    match page.extraction.as_ref().expect("extraction") {
        Extraction::Fields {
            tool,
            fields,
            missing_required,
        } => {
            assert_eq!(tool, "extract_invoice_fields");
            assert_eq!(fields["invoice_number"], "INV-0042");
            assert_eq!(fields["total_amount"], 118.5);
            assert!(missing_required.is_empty());
        }
        other => panic!("expected fields, got {other:?}"),
    }
    assert_eq!(response.stats.extracted_pages, 1);
    assert_eq!(response.stats.total_input_tokens, 1200);
}

#[tokio::test]
async fn request_carries_jpeg_image_and_category_tool() {
    let backend = ScriptedBackend::always(ToolReply::default());
    let request = ExtractionRequest::new("c.png", MediaType::Png, png_bytes(), "credit note");

    process(&request, &config_with(backend.clone()))
        .await
        .expect("process");

    let seen = backend.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].tool.name, "extract_credit_note_fields");
    assert_eq!(seen[0].image.mime_type, "image/jpeg");
    assert_eq!(seen[0].tool.parameters["type"], "object");
}

#[tokio::test]
async fn unlisted_document_type_never_calls_the_model() {
    let backend = ScriptedBackend::always(ToolReply::default());
    let request = ExtractionRequest::new("po.png", MediaType::Png, png_bytes(), "Purchase Order");

    let response = process(&request, &config_with(backend.clone()))
        .await
        .expect("unsupported type is not an error");

    assert_eq!(backend.calls(), 0);
    assert!(response.pages.is_empty());
    assert_eq!(response.images.len(), 1, "images are still produced");
    match response.status {
        ExtractionStatus::UnsupportedDocumentType { message } => {
            assert!(message.contains("not yet supported"));
        }
        other => panic!("unexpected status {other:?}"),
    }
}

#[tokio::test]
async fn prose_answer_becomes_no_tool_invoked() {
    let backend = ScriptedBackend::always(ToolReply {
        content: "This looks like a restaurant menu.".into(),
        ..Default::default()
    });
    let request = ExtractionRequest::new("m.png", MediaType::Png, png_bytes(), "Invoice");

    let response = process(&request, &config_with(backend.clone()))
        .await
        .expect("declining is not an error");

    assert_eq!(backend.calls(), 1, "declining is not retried");
    match response.pages[0].extraction.as_ref().unwrap() {
        Extraction::NoToolInvoked { message, model_text } => {
            assert!(!message.is_empty());
            assert_eq!(model_text, "This looks like a restaurant menu.");
        }
        other => panic!("expected fallback, got {other:?}"),
    }
    assert_eq!(response.stats.no_tool_pages, 1);
}

#[tokio::test]
async fn missing_required_fields_are_reported_not_enforced() {
    let backend = ScriptedBackend::always(tool_reply(
        "extract_statement_of_account_fields",
        serde_json::json!({ "supplier_name": "Acme Ltd", "closing_balance": null }),
    ));
    let request =
        ExtractionRequest::new("s.png", MediaType::Png, png_bytes(), "Statement of Account");

    let response = process(&request, &config_with(backend)).await.unwrap();
    match response.pages[0].extraction.as_ref().unwrap() {
        Extraction::Fields {
            missing_required, ..
        } => {
            assert!(missing_required.contains(&"statement_date".to_string()));
            assert!(missing_required.contains(&"closing_balance".to_string()));
            assert!(!missing_required.contains(&"supplier_name".to_string()));
        }
        other => panic!("expected fields, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let backend = ScriptedBackend::new(vec![
        Err("503 overloaded".into()),
        Ok(tool_reply(
            "extract_invoice_fields",
            serde_json::json!({ "invoice_number": "A1" }),
        )),
    ]);
    let request = ExtractionRequest::new("i.png", MediaType::Png, png_bytes(), "Invoice");

    let response = process(&request, &config_with(backend.clone())).await.unwrap();
    assert_eq!(backend.calls(), 2);
    assert_eq!(response.pages[0].retries, 1);
    assert!(response.pages[0].error.is_none());
}

#[tokio::test]
async fn every_page_failing_is_fatal() {
    let backend = ScriptedBackend::new(vec![Err("401 unauthorized".into())]);
    let config = ExtractionConfig::builder()
        .backend(backend.clone())
        .max_retries(1)
        .retry_backoff_ms(1)
        .build()
        .unwrap();
    let request = ExtractionRequest::new("i.png", MediaType::Png, png_bytes(), "Invoice");

    let err = process(&request, &config).await.unwrap_err();
    assert_eq!(backend.calls(), 2);
    match err {
        DocExtractError::AllPagesFailed {
            total, first_error, ..
        } => {
            assert_eq!(total, 1);
            assert!(first_error.contains("401"));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn malformed_arguments_are_a_page_error() {
    let backend = ScriptedBackend::always(ToolReply {
        tool_calls: vec![ToolCallReply {
            name: "extract_invoice_fields".into(),
            arguments: "[1, 2, 3]".into(),
        }],
        ..Default::default()
    });
    let request = ExtractionRequest::new("i.png", MediaType::Png, png_bytes(), "Invoice");

    // The only page fails, so the run as a whole fails.
    let err = process(&request, &config_with(backend.clone()))
        .await
        .unwrap_err();
    assert_eq!(backend.calls(), 1, "malformed arguments are not retried");
    match err {
        DocExtractError::AllPagesFailed { first_error, .. } => {
            assert!(first_error.contains("malformed arguments"));
            assert!(first_error.contains("array"));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn rgba_png_converts_to_jpeg_preview() {
    let request = ExtractionRequest::new("a.png", MediaType::Png, png_bytes(), "Invoice");
    let response = preview(&request, &ExtractionConfig::default())
        .await
        .expect("preview needs no provider");

    assert_eq!(response.status, ExtractionStatus::PreviewOnly);
    let image = &response.images[0];
    assert_eq!((image.width, image.height), (40, 30));
    let decoded =
        image::load_from_memory_with_format(&image.jpeg, ImageFormat::Jpeg).expect("valid jpeg");
    assert_eq!(decoded.width(), 40);
}

#[tokio::test]
async fn png_uploaded_as_jpg_still_converts() {
    let upload = UploadedFile {
        file_name: "scan.jpg".into(),
        declared_mime: None,
        bytes: png_bytes(),
    };
    let request = upload.into_request(None, "Invoice").expect("jpg is supported");
    assert_eq!(request.media_type, MediaType::Jpeg);

    let response = preview(&request, &ExtractionConfig::default())
        .await
        .expect("content decides the decoder");
    assert_eq!(response.images.len(), 1);
    assert_eq!((response.images[0].width, response.images[0].height), (40, 30));
}

#[test]
fn unsupported_mime_is_rejected_up_front() {
    let err = ExtractionRequest::from_mime("a.tiff", "image/tiff", vec![0; 8], "Invoice")
        .unwrap_err();
    match err {
        DocExtractError::UnsupportedFormat { media_type } => assert_eq!(media_type, "image/tiff"),
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn corrupt_jpeg_is_fatal() {
    let backend = ScriptedBackend::always(ToolReply::default());
    let request = ExtractionRequest::new(
        "x.jpg",
        MediaType::Jpeg,
        vec![0xFF, 0xD8, 0xFF, 0x00, 0x01],
        "Invoice",
    );
    let err = process(&request, &config_with(backend.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, DocExtractError::CorruptImage { .. }));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn process_file_detects_png_from_disk() {
    let mut tmp = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("tempfile");
    tmp.write_all(&png_bytes()).unwrap();

    let backend = ScriptedBackend::always(ToolReply::default());
    let response = process_file(
        tmp.path().to_str().unwrap(),
        "Invoice",
        None,
        &config_with(backend),
    )
    .await
    .expect("process_file");
    assert_eq!(response.media_type, MediaType::Png);
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl ExtractionProgressCallback for RecordingProgress {
    fn on_extraction_start(&self, total_pages: usize) {
        self.events.lock().unwrap().push(format!("start:{total_pages}"));
    }
    fn on_page_complete(&self, page_num: usize, _total: usize, field_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("page:{page_num}:{field_count}"));
    }
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done:{success_count}/{total_pages}"));
    }
}

#[tokio::test]
async fn progress_events_follow_page_order() {
    let progress = Arc::new(RecordingProgress::default());
    let backend = ScriptedBackend::always(tool_reply(
        "extract_invoice_fields",
        serde_json::json!({ "invoice_number": "1", "currency": "USD" }),
    ));
    let config = ExtractionConfig::builder()
        .backend(backend)
        .progress_callback(progress.clone())
        .build()
        .unwrap();
    let request = ExtractionRequest::new("i.png", MediaType::Png, png_bytes(), "Invoice");

    process(&request, &config).await.unwrap();
    assert_eq!(
        *progress.events.lock().unwrap(),
        vec!["start:1", "page:1:2", "done:1/1"]
    );
}

// ── PDF uploads (need pdfium) ────────────────────────────────────────────────

#[tokio::test]
async fn pdf_pages_are_extracted_in_order() {
    skip_without_pdfium!();

    let backend = ScriptedBackend::always(tool_reply(
        "extract_invoice_fields",
        serde_json::json!({ "invoice_number": "P" }),
    ));
    let request = ExtractionRequest::new("three.pdf", MediaType::Pdf, blank_pdf(3), "Invoice");

    let response = process(&request, &config_with(backend.clone()))
        .await
        .expect("process");

    assert_eq!(response.stats.total_pages, 3);
    assert_eq!(response.images.len(), 3);
    assert_eq!(backend.calls(), 3);
    let order: Vec<usize> = response.pages.iter().map(|p| p.page_num).collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[tokio::test]
async fn pdf_first_page_only() {
    skip_without_pdfium!();

    let backend = ScriptedBackend::always(ToolReply::default());
    let config = ExtractionConfig::builder()
        .backend(backend.clone())
        .pages(PageSelection::Single(1))
        .build()
        .unwrap();
    let request = ExtractionRequest::new("three.pdf", MediaType::Pdf, blank_pdf(3), "Invoice");

    let response = process(&request, &config).await.unwrap();
    assert_eq!(response.stats.total_pages, 3);
    assert_eq!(response.images.len(), 1);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn pdf_page_out_of_range() {
    skip_without_pdfium!();

    let config = ExtractionConfig::builder()
        .pages(PageSelection::Single(7))
        .extract(false)
        .build()
        .unwrap();
    let request = ExtractionRequest::new("one.pdf", MediaType::Pdf, blank_pdf(1), "Invoice");

    let err = process(&request, &config).await.unwrap_err();
    assert!(matches!(
        err,
        DocExtractError::PageOutOfRange { page: 7, total: 1 }
    ));
}

#[tokio::test]
async fn garbage_pdf_is_corrupt() {
    skip_without_pdfium!();

    let request = ExtractionRequest::new(
        "bad.pdf",
        MediaType::Pdf,
        b"%PDF-1.4\nthis is not a pdf".to_vec(),
        "Invoice",
    );
    let err = preview(&request, &ExtractionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DocExtractError::CorruptPdf { .. }));
}

// ── Live model (needs API key) ───────────────────────────────────────────────

#[tokio::test]
async fn live_invoice_extraction() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
        return;
    }

    let request = ExtractionRequest::new("blank.png", MediaType::Png, png_bytes(), "Invoice");
    let config = ExtractionConfig::builder()
        .max_retries(1)
        .build()
        .expect("valid config");

    let response = process(&request, &config)
        .await
        .expect("live extraction should succeed");

    // A blank image gives the model nothing to extract; either outcome is
    // acceptable, but the page must not error.
    assert_eq!(response.pages.len(), 1);
    assert!(response.pages[0].error.is_none());
    println!(
        "{}",
        serde_json::to_string_pretty(&response).expect("response serialises")
    );
}
