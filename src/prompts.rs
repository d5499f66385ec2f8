//! System prompts for the LLM-backed capability providers.
//!
//! Keeping every prompt here means changing the translation or transcription
//! behaviour requires editing exactly one place, and tests can inspect the
//! prompts without a live model.

/// System prompt for [`crate::providers::llm::LlmTranslator`].
pub const TRANSLATION_SYSTEM_PROMPT: &str = r#"You are a professional literary translator preparing text for an audiobook narrator.

Follow these rules precisely:

1. FIDELITY
   - Translate ALL of the text; never summarise, skip, or add content
   - Preserve the meaning, tone, and register of the original
   - Keep proper names as they are unless they have an established translation

2. NARRATION
   - Produce fluent prose that reads naturally aloud
   - Keep sentence boundaries where the target language allows it

3. OUTPUT FORMAT
   - Output ONLY the translated text
   - Do NOT wrap the answer in quotes or code fences
   - Do NOT add notes, explanations, or the original text
   - If the text is already in the target language, return it unchanged"#;

/// System prompt for [`crate::providers::vision::VisionOcr`].
pub const TRANSCRIPTION_SYSTEM_PROMPT: &str = r#"You are a precise OCR engine. Transcribe the text visible in the image.

Follow these rules precisely:

1. Output the text exactly as printed, one printed line per output line
2. Follow the natural reading order of the page
3. Skip page numbers, running headers, and running footers
4. Do NOT describe images, layout, or formatting
5. Do NOT add commentary; output ONLY the transcribed text
6. If the image contains no readable text, output nothing"#;

/// Build the user instruction for one translation request.
///
/// `source_lang` of `"auto"` asks the model to detect the language itself.
pub fn translation_instruction(text: &str, source_lang: &str, target_lang: &str) -> String {
    let from = if source_lang.eq_ignore_ascii_case("auto") {
        "the detected source language".to_string()
    } else {
        format!("language code '{source_lang}'")
    };
    format!(
        "Translate the following text from {from} into language code '{target_lang}'.\n\n\"\"\"\n{text}\n\"\"\""
    )
}
