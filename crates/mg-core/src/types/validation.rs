//! Validation messages and their aggregate summary.

use serde::{Deserialize, Serialize};

/// Severity of a validation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Does not make the model invalid.
    Warning,
    /// Makes the model invalid.
    Error,
}

/// A single validation finding.
///
/// Field messages name the property they concern; business-rule messages
/// concern the model as a whole and carry no field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessage {
    /// How serious the finding is.
    pub severity: Severity,
    /// The property concerned, if any.
    pub field: Option<String>,
    /// Human-readable text.
    pub message: String,
}

impl ValidationMessage {
    /// Returns `true` for [`Severity::Error`].
    #[inline]
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

/// The validation results held by one model node.
///
/// # Examples
///
/// ```
/// use mg_core::ValidationResults;
///
/// let mut results = ValidationResults::new();
/// results.add_field_error("Name", "required");
/// results.add_business_warning("no orders yet");
///
/// let summary = results.summary();
/// assert!(summary.has_errors);
/// assert!(summary.has_warnings);
/// assert_eq!(results.for_field("Name").count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResults {
    messages: Vec<ValidationMessage>,
}

impl ValidationResults {
    /// Creates an empty result set.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Appends a message.
    pub fn push(&mut self, message: ValidationMessage) {
        self.messages.push(message);
    }

    /// Appends an error about `field`.
    pub fn add_field_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.add(Severity::Error, Some(field.into()), message.into());
    }

    /// Appends a warning about `field`.
    pub fn add_field_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.add(Severity::Warning, Some(field.into()), message.into());
    }

    /// Appends a business-rule error.
    pub fn add_business_error(&mut self, message: impl Into<String>) {
        self.add(Severity::Error, None, message.into());
    }

    /// Appends a business-rule warning.
    pub fn add_business_warning(&mut self, message: impl Into<String>) {
        self.add(Severity::Warning, None, message.into());
    }

    fn add(&mut self, severity: Severity, field: Option<String>, message: String) {
        self.messages.push(ValidationMessage {
            severity,
            field,
            message,
        });
    }

    /// Returns `true` if any message is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(ValidationMessage::is_error)
    }

    /// Returns `true` if any message is a warning.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.messages.iter().any(|m| !m.is_error())
    }

    /// Error messages, in insertion order.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationMessage> {
        self.messages.iter().filter(|m| m.is_error())
    }

    /// Warning messages, in insertion order.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationMessage> {
        self.messages.iter().filter(|m| !m.is_error())
    }

    /// Messages about `field`.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationMessage> {
        self.messages
            .iter()
            .filter(move |m| m.field.as_deref() == Some(field))
    }

    /// All messages, in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, ValidationMessage> {
        self.messages.iter()
    }

    /// Number of messages.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if there are no messages.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The error/warning flags of these results alone.
    #[must_use]
    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary {
            has_errors: self.has_errors(),
            has_warnings: self.has_warnings(),
        }
    }
}

impl<'a> IntoIterator for &'a ValidationResults {
    type Item = &'a ValidationMessage;
    type IntoIter = std::slice::Iter<'a, ValidationMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Aggregated validation flags of a node and everything beneath it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// At least one error on the node or a descendant.
    pub has_errors: bool,
    /// At least one warning on the node or a descendant.
    pub has_warnings: bool,
}

impl ValidationSummary {
    /// Returns `true` if there are no errors.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        !self.has_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_results_are_valid() {
        let results = ValidationResults::new();
        assert!(results.is_empty());
        assert!(results.summary().is_valid());
        assert!(!results.summary().has_warnings);
    }

    #[test]
    fn test_warnings_do_not_invalidate() {
        let mut results = ValidationResults::new();
        results.add_field_warning("Email", "looks unusual");
        assert!(results.summary().is_valid());
        assert!(results.has_warnings());
        assert_eq!(results.warnings().count(), 1);
        assert_eq!(results.errors().count(), 0);
    }

    #[test]
    fn test_business_errors_have_no_field() {
        let mut results = ValidationResults::new();
        results.add_business_error("total must be positive");
        let message = results.iter().next().unwrap();
        assert!(message.is_error());
        assert!(message.field.is_none());
    }
}
