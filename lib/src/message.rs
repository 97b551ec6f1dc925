//! Decoded signalling messages as handed to the analysis engine.
//!
//! A [Message] is produced by an external dissector: it carries the dissected
//! field tree flattened into `name -> value` pairs (Wireshark display-filter
//! names such as `nas_eps.nas_msg_emm_type`), the summary line and the raw
//! bytes. Analysis only ever appends to a message: categories are added and
//! findings accumulate, but nothing is removed.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Procedure categories a message can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    RrcConnectionEstablishment,
    AttachProcedure,
    InformationTransfer,
    IdentityRequestResponse,
    AuthenticationProcedure,
    SecurityModeCommand,
    UeCapabilityInformation,
    Analysed,
    Unassigned,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::RrcConnectionEstablishment => "RRC Connection Establishment",
            Category::AttachProcedure => "Attach Procedure",
            Category::InformationTransfer => "Information Transfer",
            Category::IdentityRequestResponse => "Identity Request/Response",
            Category::AuthenticationProcedure => "Authentication Procedure",
            Category::SecurityModeCommand => "Security Mode Command",
            Category::UeCapabilityInformation => "UE Capability Information",
            Category::Analysed => "Analysed",
            Category::Unassigned => "Unassigned",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An insertion-ordered set of categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Categories(Vec<Category>);

impl Categories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `category` unless it is already present. Returns whether it was added.
    pub fn insert(&mut self, category: Category) -> bool {
        if self.contains(category) {
            return false;
        }
        self.0.push(category);
        true
    }

    pub fn remove(&mut self, category: Category) {
        self.0.retain(|c| *c != category);
    }

    pub fn contains(&self, category: Category) -> bool {
        self.0.contains(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Category> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[Category] {
        &self.0
    }
}

impl FromIterator<Category> for Categories {
    fn from_iter<I: IntoIterator<Item = Category>>(iter: I) -> Self {
        let mut categories = Categories::new();
        for category in iter {
            categories.insert(category);
        }
        categories
    }
}

/// How bad a finding is. The numeric value is what gets summed into a
/// message's severity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Note = 0,
    Warning = 1,
    SeriousWarning = 2,
    Error = 3,
    SeriousError = 4,
}

impl Severity {
    pub fn score(&self) -> u32 {
        *self as u32
    }

    /// Prefix used when a finding has no custom label. Serious variants are
    /// shouted.
    pub fn prefix(&self) -> &'static str {
        match self {
            Severity::Note => "Note",
            Severity::Warning => "Warning",
            Severity::SeriousWarning => "WARNING",
            Severity::Error => "Error",
            Severity::SeriousError => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    severity: Severity,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

impl Finding {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
            label: None,
        }
    }

    pub fn with_label(severity: Severity, text: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
            label: Some(label.into()),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.label.as_deref().unwrap_or(self.severity.prefix());
        write!(f, "{prefix}: {}", self.text)
    }
}

/// Flattened dissection tree of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, String>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Fields(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: usize,
    summary: String,
    #[serde(default)]
    fields: Fields,
    #[serde(default)]
    raw: Vec<u8>,
    #[serde(skip_deserializing)]
    categories: Categories,
    #[serde(skip_deserializing)]
    findings: Vec<Finding>,
    #[serde(skip_deserializing)]
    severity: u32,
}

impl Message {
    pub fn new(id: usize, summary: impl Into<String>) -> Self {
        Self {
            id,
            summary: summary.into(),
            fields: Fields::new(),
            raw: Vec::new(),
            categories: Categories::new(),
            findings: Vec::new(),
            severity: 0,
        }
    }

    /// Builder-style helper for dissector adapters and tests.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name, value);
        self
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_raw(mut self, raw: Vec<u8>) -> Self {
        self.raw = raw;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    pub fn categories(&self) -> &Categories {
        &self.categories
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.categories.contains(category)
    }

    pub fn add_category(&mut self, category: Category) {
        self.categories.insert(category);
    }

    pub(crate) fn set_categories(&mut self, categories: Categories) {
        self.categories = categories;
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn severity(&self) -> u32 {
        self.severity
    }

    pub fn add_finding(&mut self, finding: Finding) {
        self.severity += finding.severity().score();
        self.findings.push(finding);
    }

    pub fn note(&mut self, text: impl Into<String>) {
        self.add_finding(Finding::new(Severity::Note, text));
    }

    pub fn flag(&mut self, severity: Severity, text: impl Into<String>) {
        self.add_finding(Finding::new(severity, text));
    }
}
