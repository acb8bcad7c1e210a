//! Static field catalogs for the three supported document categories.
//!
//! Each catalog is a [`DocumentSchema`]: a fixed list of named fields with a
//! primitive type tag and a human-readable description, plus the subset of
//! field names the model is asked to always fill in. The catalogs are plain
//! `static` data; nothing here validates what the model sends back.
//!
//! [`DocumentSchema::tool_parameters`] renders a catalog as the JSON Schema
//! object handed to the VLM as the parameters of an extraction tool.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// The kind of business document the user says they uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Invoice,
    CreditNote,
    StatementOfAccount,
}

impl DocumentCategory {
    /// Every category, in the order offered to the user.
    pub const ALL: [DocumentCategory; 3] = [
        DocumentCategory::StatementOfAccount,
        DocumentCategory::CreditNote,
        DocumentCategory::Invoice,
    ];

    /// Human-readable label, e.g. `"Credit Note"`.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentCategory::Invoice => "Invoice",
            DocumentCategory::CreditNote => "Credit Note",
            DocumentCategory::StatementOfAccount => "Statement of Account",
        }
    }

    /// Machine key, e.g. `"credit_note"`.
    pub fn key(&self) -> &'static str {
        match self {
            DocumentCategory::Invoice => "invoice",
            DocumentCategory::CreditNote => "credit_note",
            DocumentCategory::StatementOfAccount => "statement_of_account",
        }
    }

    /// Match a user selection against the known categories.
    ///
    /// Accepts the label or the key, ignoring case and surrounding
    /// whitespace. Returns `None` for anything else; callers treat that as
    /// "not yet supported" rather than an error.
    pub fn from_label(selection: &str) -> Option<Self> {
        let wanted = selection.trim();
        Self::ALL.into_iter().find(|c| {
            c.label().eq_ignore_ascii_case(wanted) || c.key().eq_ignore_ascii_case(wanted)
        })
    }

    /// The static catalog for this category.
    pub fn schema(&self) -> &'static DocumentSchema {
        match self {
            DocumentCategory::Invoice => &INVOICE,
            DocumentCategory::CreditNote => &CREDIT_NOTE,
            DocumentCategory::StatementOfAccount => &STATEMENT_OF_ACCOUNT,
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Primitive JSON type tag for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
}

impl FieldType {
    /// The JSON Schema `type` keyword for this tag.
    pub fn as_json_type(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
        }
    }
}

/// One named field in a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub description: &'static str,
}

const fn field(name: &'static str, field_type: FieldType, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        field_type,
        description,
    }
}

/// A static extraction catalog for one [`DocumentCategory`].
#[derive(Debug, PartialEq, Eq)]
pub struct DocumentSchema {
    pub category: DocumentCategory,
    /// Name of the tool offered to the model.
    pub tool_name: &'static str,
    /// Tool description shown to the model.
    pub description: &'static str,
    pub properties: &'static [FieldSpec],
    pub required: &'static [&'static str],
}

impl DocumentSchema {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.properties.iter().find(|f| f.name == name)
    }

    /// Required names that do not appear in `properties`.
    ///
    /// Empty for every shipped catalog; exposed so the invariant can be
    /// asserted in tests and by callers that build their own schemas.
    pub fn undeclared_required(&self) -> Vec<&'static str> {
        self.required
            .iter()
            .copied()
            .filter(|name| self.field(name).is_none())
            .collect()
    }

    /// Render the catalog as a JSON Schema object suitable for tool parameters.
    pub fn tool_parameters(&self) -> Value {
        let mut properties = Map::with_capacity(self.properties.len());
        for f in self.properties {
            properties.insert(
                f.name.to_string(),
                json!({
                    "type": f.field_type.as_json_type(),
                    "description": f.description,
                }),
            );
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
        })
    }

    /// Full tool definition (name, description, input schema) as JSON.
    pub fn tool_definition_json(&self) -> Value {
        json!({
            "name": self.tool_name,
            "description": self.description,
            "input_schema": self.tool_parameters(),
        })
    }
}

// ── Catalogs ─────────────────────────────────────────────────────────────

pub static INVOICE: DocumentSchema = DocumentSchema {
    category: DocumentCategory::Invoice,
    tool_name: "extract_invoice_fields",
    description: "Record the key fields printed on an invoice.",
    properties: &[
        field("invoice_number", FieldType::String, "Invoice number or reference as printed"),
        field("invoice_date", FieldType::String, "Date the invoice was issued, as YYYY-MM-DD when possible"),
        field("due_date", FieldType::String, "Payment due date, as YYYY-MM-DD when possible"),
        field("supplier_name", FieldType::String, "Name of the company issuing the invoice"),
        field("supplier_address", FieldType::String, "Postal address of the issuing company"),
        field("supplier_tax_id", FieldType::String, "VAT / GST / tax registration number of the supplier"),
        field("customer_name", FieldType::String, "Name of the customer being billed"),
        field("customer_address", FieldType::String, "Billing address of the customer"),
        field("purchase_order_number", FieldType::String, "Customer purchase order number, if shown"),
        field("currency", FieldType::String, "ISO 4217 currency code of the amounts"),
        field("subtotal", FieldType::Number, "Total before tax"),
        field("tax_amount", FieldType::Number, "Total tax charged"),
        field("total_amount", FieldType::Number, "Grand total payable"),
        field("payment_terms", FieldType::String, "Payment terms, e.g. 'Net 30'"),
    ],
    required: &[
        "invoice_number",
        "invoice_date",
        "supplier_name",
        "customer_name",
        "total_amount",
    ],
};

pub static CREDIT_NOTE: DocumentSchema = DocumentSchema {
    category: DocumentCategory::CreditNote,
    tool_name: "extract_credit_note_fields",
    description: "Record the key fields printed on a credit note.",
    properties: &[
        field("credit_note_number", FieldType::String, "Credit note number or reference as printed"),
        field("credit_note_date", FieldType::String, "Date the credit note was issued, as YYYY-MM-DD when possible"),
        field("original_invoice_number", FieldType::String, "Number of the invoice being credited"),
        field("supplier_name", FieldType::String, "Name of the company issuing the credit note"),
        field("supplier_tax_id", FieldType::String, "VAT / GST / tax registration number of the supplier"),
        field("customer_name", FieldType::String, "Name of the customer receiving the credit"),
        field("reason", FieldType::String, "Reason given for the credit"),
        field("currency", FieldType::String, "ISO 4217 currency code of the amounts"),
        field("subtotal", FieldType::Number, "Credited amount before tax"),
        field("tax_amount", FieldType::Number, "Tax credited"),
        field("total_amount", FieldType::Number, "Total amount credited"),
    ],
    required: &[
        "credit_note_number",
        "credit_note_date",
        "supplier_name",
        "customer_name",
        "total_amount",
    ],
};

pub static STATEMENT_OF_ACCOUNT: DocumentSchema = DocumentSchema {
    category: DocumentCategory::StatementOfAccount,
    tool_name: "extract_statement_of_account_fields",
    description: "Record the key fields printed on a statement of account.",
    properties: &[
        field("statement_date", FieldType::String, "Date of the statement, as YYYY-MM-DD when possible"),
        field("account_number", FieldType::String, "Customer account number with the supplier"),
        field("supplier_name", FieldType::String, "Name of the company issuing the statement"),
        field("customer_name", FieldType::String, "Name of the customer the statement is addressed to"),
        field("period_start", FieldType::String, "First day covered by the statement"),
        field("period_end", FieldType::String, "Last day covered by the statement"),
        field("currency", FieldType::String, "ISO 4217 currency code of the amounts"),
        field("opening_balance", FieldType::Number, "Balance brought forward at the start of the period"),
        field("closing_balance", FieldType::Number, "Balance at the end of the period"),
        field("total_due", FieldType::Number, "Total amount currently due"),
        field("overdue_amount", FieldType::Number, "Portion of the balance that is past due"),
        field("transaction_count", FieldType::Integer, "Number of transaction lines listed"),
    ],
    required: &[
        "statement_date",
        "supplier_name",
        "customer_name",
        "closing_balance",
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_required_field_is_declared() {
        for category in DocumentCategory::ALL {
            let schema = category.schema();
            assert!(
                schema.undeclared_required().is_empty(),
                "{category}: undeclared required fields {:?}",
                schema.undeclared_required()
            );
        }
    }

    #[test]
    fn schema_is_tagged_with_its_category() {
        for category in DocumentCategory::ALL {
            assert_eq!(category.schema().category, category);
        }
    }

    #[test]
    fn from_label_accepts_labels_and_keys() {
        assert_eq!(
            DocumentCategory::from_label("Invoice"),
            Some(DocumentCategory::Invoice)
        );
        assert_eq!(
            DocumentCategory::from_label("  credit note "),
            Some(DocumentCategory::CreditNote)
        );
        assert_eq!(
            DocumentCategory::from_label("statement_of_account"),
            Some(DocumentCategory::StatementOfAccount)
        );
        assert_eq!(DocumentCategory::from_label("Receipt"), None);
        assert_eq!(DocumentCategory::from_label(""), None);
    }

    #[test]
    fn tool_parameters_lists_every_field() {
        let params = INVOICE.tool_parameters();
        assert_eq!(params["type"], "object");
        let props = params["properties"].as_object().expect("properties object");
        assert_eq!(props.len(), INVOICE.properties.len());
        assert_eq!(props["total_amount"]["type"], "number");
        assert_eq!(params["required"].as_array().map(|a| a.len()), Some(5));
    }

    #[test]
    fn tool_names_are_distinct() {
        let mut names: Vec<_> = DocumentCategory::ALL
            .iter()
            .map(|c| c.schema().tool_name)
            .collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn undeclared_required_detects_gaps() {
        static BROKEN: DocumentSchema = DocumentSchema {
            category: DocumentCategory::Invoice,
            tool_name: "broken",
            description: "",
            properties: &[field("a", FieldType::String, "")],
            required: &["a", "b"],
        };
        assert_eq!(BROKEN.undeclared_required(), vec!["b"]);
    }
}
