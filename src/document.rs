//! Document types and their field schemas.
//!
//! Centralising every per-type column list and label alias here serves two
//! purposes:
//!
//! 1. **Single source of truth** — the instruction templates, the export
//!    renderer and the record log all agree on one canonical label set per
//!    document type, instead of each call site carrying its own
//!    `get(a, get(b, ...))` fallback chain.
//!
//! 2. **One-shot canonicalisation** — label aliases the model sometimes
//!    emits ("Payor Name" instead of "1st Payor First Name") are folded
//!    into the canonical labels exactly once, right after parsing, by
//!    [`canonicalize`]. Downstream code only ever sees canonical labels.

use crate::pipeline::parse::FieldMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of supported document types.
///
/// Unrecognised tags are NOT an error at submission time: the extractor
/// falls back to the passport template and the export renderer falls back
/// to a generic two-column schema. [`DocumentType::from_tag`] returns
/// `None` for such tags so each consumer can pick its own fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Passport,
    Check,
    Invoice,
}

impl DocumentType {
    /// Resolve a caller-supplied tag, case-insensitively.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "passport" => Some(Self::Passport),
            "check" => Some(Self::Check),
            "invoice" => Some(Self::Invoice),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passport => "passport",
            Self::Check => "check",
            Self::Invoice => "invoice",
        }
    }

    /// The export schema for this document type.
    pub fn schema(&self) -> &'static FieldSchema {
        match self {
            Self::Passport => &PASSPORT_SCHEMA,
            Self::Check => &CHECK_SCHEMA,
            Self::Invoice => &INVOICE_SCHEMA,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column of an export schema.
#[derive(Debug)]
pub struct FieldSpec {
    /// Canonical column label. Label strings are a contract: the instruction
    /// templates promise them and downstream spreadsheets key on them.
    pub label: &'static str,
    /// Whether the instruction template asks the model for this field.
    ///
    /// Check exports carry bookkeeping columns (Pic Date, Market, …) that
    /// no template mentions; the flat-text renderer leaves those blank
    /// while prompted-but-missing fields render as "NA".
    pub prompted: bool,
}

/// The export schema of one document type: ordered columns plus the alias
/// table folded by [`canonicalize`].
#[derive(Debug)]
pub struct FieldSchema {
    pub fields: &'static [FieldSpec],
    /// `(alias, canonical)` pairs. Applied once, after parsing.
    pub aliases: &'static [(&'static str, &'static str)],
}

impl FieldSchema {
    /// Number of data columns (excluding the leading Filename column every
    /// table export carries).
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over the canonical column labels.
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.label)
    }
}

const fn prompted(label: &'static str) -> FieldSpec {
    FieldSpec {
        label,
        prompted: true,
    }
}

const fn bookkeeping(label: &'static str) -> FieldSpec {
    FieldSpec {
        label,
        prompted: false,
    }
}

/// 17 passport columns, in the fixed export order.
pub static PASSPORT_SCHEMA: FieldSchema = FieldSchema {
    fields: &[
        prompted("Passport Country Code"),
        prompted("Passport Type"),
        prompted("Passport Number"),
        prompted("First Name"),
        prompted("Family Name"),
        prompted("Date of Birth Day"),
        prompted("Date of Birth Month"),
        prompted("Date of Birth Year"),
        prompted("Place of Birth"),
        prompted("Gender"),
        prompted("Date of Issue Day"),
        prompted("Date of Issue Month"),
        prompted("Date of Issue Year"),
        prompted("Date of Expiration Day"),
        prompted("Date of Expiration Month"),
        prompted("Date of Expiration Year"),
        prompted("Authority"),
    ],
    aliases: &[],
};

/// 27 check columns. Only seven are prompted; the rest are bookkeeping
/// columns filled in downstream of extraction.
///
/// "Payor Zip code" / "Payee Zip Code" casing is inconsistent on purpose —
/// the receiving spreadsheets key on these exact strings.
pub static CHECK_SCHEMA: FieldSchema = FieldSchema {
    fields: &[
        bookkeeping("Link to The file"),
        bookkeeping("Pic Date"),
        bookkeeping("Download Date"),
        bookkeeping("Check Type"),
        prompted("Bank Name"),
        prompted("1st Payor First Name"),
        bookkeeping("1st Payor Family Name"),
        bookkeeping("2nd Payor First Name"),
        bookkeeping("2nd Payor Family Name"),
        prompted("Payor Street Address"),
        bookkeeping("Payor City"),
        bookkeeping("Payor State"),
        bookkeeping("Payor Zip code"),
        prompted("Check Amount"),
        bookkeeping("Account Number"),
        bookkeeping("Routing Number"),
        bookkeeping("Payee Type"),
        prompted("1st Payee First Name"),
        bookkeeping("1st Payee Family Name"),
        bookkeeping("2nd Payee First Name"),
        bookkeeping("2nd Payee Family Name"),
        prompted("Check Number"),
        prompted("Payee Street Address"),
        bookkeeping("Payee City"),
        bookkeeping("Payee State"),
        bookkeeping("Payee Zip Code"),
        bookkeeping("Market"),
    ],
    aliases: &[
        ("Payor Name", "1st Payor First Name"),
        ("Payor Address", "Payor Street Address"),
        ("Amount", "Check Amount"),
        ("Payee Name", "1st Payee First Name"),
        ("Payee Address", "Payee Street Address"),
    ],
};

/// 7 invoice columns. The template asks for more fields (Subtotal, Tax, …)
/// than the export carries; extra parsed labels simply stay in the field
/// map for the reviewer and the record log.
pub static INVOICE_SCHEMA: FieldSchema = FieldSchema {
    fields: &[
        prompted("Invoice Number"),
        prompted("Date"),
        prompted("Due Date"),
        prompted("Total Amount"),
        prompted("Vendor Name"),
        prompted("Customer Name"),
        prompted("Payment Terms"),
    ],
    aliases: &[
        ("Invoice Date", "Date"),
        ("Vendor/Seller", "Vendor Name"),
        ("Customer", "Customer Name"),
    ],
};

/// Header row used when the document type is unrecognised.
pub static GENERIC_HEADERS: [&str; 2] = ["Filename", "Extraction Data"];

/// Fold label aliases into their canonical labels, in place.
///
/// For each `(alias, canonical)` pair of the schema: if the canonical label
/// is absent, the alias entry is renamed (keeping its position); if the
/// canonical label is already present, the alias entry is dropped (the
/// canonical value wins, matching the original lookup precedence).
///
/// No-op for unrecognised document types.
pub fn canonicalize(fields: &mut FieldMap, doc: Option<DocumentType>) {
    let Some(doc) = doc else { return };
    for (alias, canonical) in doc.schema().aliases {
        if fields.get(alias).is_none() {
            continue;
        }
        if fields.get(canonical).is_some() {
            fields.remove(alias);
        } else {
            fields.rename(alias, canonical);
        }
    }
}
