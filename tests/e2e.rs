//! End-to-end tests against live providers.
//!
//! These make real LLM and speech API calls, so they are gated behind the
//! `E2E_ENABLED` environment variable and skip themselves otherwise.
//!
//! Run with:
//!   E2E_ENABLED=1 OPENAI_API_KEY=sk-... cargo test --test e2e -- --nocapture
//!
//! The scanned-PDF test also needs a PDFium library on the loader path and a
//! file at `test_cases/scan.pdf`.

use book2audio::providers::llm::{LlmTranslator, ProviderSelection};
use book2audio::providers::speech::HttpSpeech;
use book2audio::providers::vision::VisionOcr;
use book2audio::{
    Capabilities, FsStore, MemoryJobStore, ObjectMeta, ObjectStore, Pipeline, PipelineConfig,
    SpeechProvider, Stores, TranslationProvider,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

/// Skip this test if E2E_ENABLED is not set *or* there is no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        e2e_skip_unless_enabled!();
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// MP3 streams open with an ID3v2 tag or an MPEG frame sync.
fn assert_looks_like_mp3(bytes: &[u8], context: &str) {
    assert!(
        bytes.len() > 1_000,
        "[{context}] Audio suspiciously short: {} bytes",
        bytes.len()
    );
    let tagged = bytes.starts_with(b"ID3");
    let framed = bytes.len() > 1 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0;
    assert!(
        tagged || framed,
        "[{context}] Audio does not start like MP3: {:02X?}",
        &bytes[..4.min(bytes.len())]
    );
    println!("[{context}] ✓  {} bytes of MP3", bytes.len());
}

fn live_pipeline(root: &std::path::Path) -> Pipeline {
    let selection = ProviderSelection::default();
    let capabilities = Capabilities::new(
        Arc::new(VisionOcr::from_selection(&selection).expect("LLM provider configured")),
        Arc::new(LlmTranslator::from_selection(&selection).expect("LLM provider configured")),
        Arc::new(HttpSpeech::from_env(None, None).expect("speech provider configured")),
    );
    Pipeline::new(
        PipelineConfig::default(),
        capabilities,
        Stores::single(Arc::new(FsStore::new(root))),
        Arc::new(MemoryJobStore::new()),
    )
}

// ── Single capabilities ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_live_translation() {
    e2e_skip_unless_enabled!();

    let translator = LlmTranslator::from_selection(&ProviderSelection::default())
        .expect("LLM provider configured");
    let out = translator
        .translate("Good morning, my friend. The library opens at nine.", "auto", "es")
        .await
        .expect("translation should succeed");

    println!("es: {out}");
    assert!(!out.trim().is_empty());
    assert!(!out.starts_with("```"), "fences should be stripped");
    assert_ne!(out, "Good morning, my friend. The library opens at nine.");
}

#[tokio::test]
async fn test_live_speech() {
    e2e_skip_unless_enabled!();

    let speech = HttpSpeech::from_env(None, None).expect("speech provider configured");
    let audio = speech
        .synthesize("Testing one, two, three.", "alloy")
        .await
        .expect("synthesis should succeed");

    assert_looks_like_mp3(&audio, "speech");
}

// ── Full runs ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_live_text_book_to_spanish_audio() {
    e2e_skip_unless_enabled!();

    let dir = tempfile::tempdir().expect("temp dir");
    let pipeline = live_pipeline(dir.path());
    let store = FsStore::new(dir.path());
    store
        .put(
            "fable.txt",
            b"The fox saw the grapes.\nThey were too high, so he called them sour.".to_vec(),
            ObjectMeta::new("text/plain").with_tag("target_lang", "es"),
        )
        .await
        .expect("stage source");

    let result = pipeline.submit("fable.txt").await.expect("job store");
    assert!(result.is_done(), "job failed: {:?}", result.error);
    assert_eq!(result.audio_key.as_deref(), Some("fable_es.mp3"));

    let translated = std::fs::read_to_string(
        dir.path()
            .join("translated/fable.txt_es_translated.txt"),
    )
    .expect("translated text persisted");
    println!("translated: {translated}");
    assert!(!translated.trim().is_empty());

    let audio = std::fs::read(dir.path().join("fable_es.mp3")).expect("audio persisted");
    assert_looks_like_mp3(&audio, "fable_es");
}

#[tokio::test]
async fn test_live_scanned_pdf() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scan.pdf"));

    let dir = tempfile::tempdir().expect("temp dir");
    let pipeline = live_pipeline(dir.path());
    let bytes = std::fs::read(&path).expect("read scan.pdf");
    FsStore::new(dir.path())
        .put("scan.pdf", bytes, ObjectMeta::new("application/pdf"))
        .await
        .expect("stage source");

    let job = pipeline.ingest("scan.pdf", "fr").await.expect("job store");
    let result = pipeline
        .run(&job.id, &job.source_key, &job.target_lang)
        .await
        .expect("job store");

    assert!(result.is_done(), "job failed: {:?}", result.error);
    println!(
        "scan.pdf: {} chars OCR'd in {}ms, {} synthesis chunk(s)",
        result.stats.extracted_chars, result.stats.extract_ms, result.stats.synthesis_chunks
    );
    let audio = std::fs::read(dir.path().join("scan_fr.mp3")).expect("audio persisted");
    assert_looks_like_mp3(&audio, "scan_fr");
}

#[tokio::test]
async fn test_live_unsupported_format_never_calls_providers() {
    e2e_skip_unless_enabled!();

    let dir = tempfile::tempdir().expect("temp dir");
    let pipeline = live_pipeline(dir.path());
    FsStore::new(dir.path())
        .put(
            "slides.pptx",
            b"PK\x03\x04".to_vec(),
            ObjectMeta::new("application/octet-stream"),
        )
        .await
        .expect("stage source");

    let job = pipeline.ingest("slides.pptx", "es").await.expect("job store");
    let result = pipeline
        .run(&job.id, &job.source_key, &job.target_lang)
        .await
        .expect("job store");

    assert_eq!(result.error_kind.as_deref(), Some("unsupported_format"));
    assert!(!dir.path().join("slides_es.mp3").exists());
}
