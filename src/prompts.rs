//! Prompts and fixed user-facing messages.
//!
//! Callers can override the system prompt via
//! [`crate::config::ExtractionConfig::system_prompt`]; everything else here
//! is constant.

use crate::schema::DocumentSchema;

/// Default system prompt for field extraction from a document image.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a meticulous accounts-payable assistant. You are given an image of one page of a business document.

Follow these rules precisely:

1. Use the provided tool to record the fields you can read on the page.
2. Copy values exactly as printed. Do not guess values that are not visible.
3. Leave out fields that do not appear on the page rather than inventing them.
4. Amounts are plain numbers without currency symbols or thousands separators.
5. Dates are written as YYYY-MM-DD when the printed date is unambiguous.
6. If the page is not the kind of document described by the tool, do not call the tool; say briefly what the page shows instead."#;

/// Shown when the selected document type has no schema.
pub const UNSUPPORTED_DOCUMENT_TYPE_MESSAGE: &str =
    "This document type is not yet supported for extraction.";

/// Shown when the model answers without calling the extraction tool.
pub const NO_TOOL_INVOKED_MESSAGE: &str =
    "The model did not return structured fields for this page.";

/// User-turn instruction that accompanies the page image.
pub fn user_instruction(schema: &DocumentSchema) -> String {
    format!(
        "This page is from a document the user identified as a {}. \
Extract its fields with the `{}` tool.",
        schema.category.label().to_lowercase(),
        schema.tool_name
    )
}
