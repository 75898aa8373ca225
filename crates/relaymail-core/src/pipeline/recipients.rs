//! Recipient Processor - validation, dedup, and variable substitution
//!
//! Turns a raw recipient list (and, in template mode, a subject/body with
//! `{{variable}}` placeholders) into per-recipient prepared emails plus an
//! error list. Original input order is preserved among retained recipients.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use relaymail_common::types::EmailAddress;

/// One raw recipient as submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientInput {
    pub email: String,

    /// Per-recipient template variables (template mode)
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Subject/body pair placeholders are substituted into
#[derive(Debug, Clone)]
pub struct TemplateContent {
    pub subject: String,
    pub body_html: String,
}

/// A validated, rendered email ready for dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedEmail {
    pub to: String,
    pub subject: String,
    pub body_html: String,
}

/// Why a recipient was dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientError {
    /// Index into the original input list
    pub index: usize,
    pub email: String,
    pub reason: String,
}

/// Result of recipient processing
#[derive(Debug, Clone, Default)]
pub struct ProcessedRecipients {
    pub prepared: Vec<PreparedEmail>,
    pub errors: Vec<RecipientError>,
    pub duplicates: usize,
}

/// Replace every `{{key}}` occurrence with the matching variable value.
///
/// Unknown keys are left as the literal `{{key}}`: a typo in one recipient's
/// variables must never fail the batch.
pub fn render_variables(content: &str, variables: &HashMap<String, String>) -> String {
    let mut result = content.to_string();
    for (key, value) in variables {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

/// Validate, deduplicate, and render a recipient list.
///
/// In raw mode the caller passes the inline subject/body as the content;
/// variables are rendered in both modes so they behave identically.
pub fn process(
    recipients: &[RecipientInput],
    template: &TemplateContent,
) -> ProcessedRecipients {
    let mut out = ProcessedRecipients::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(recipients.len());

    for (index, recipient) in recipients.iter().enumerate() {
        let Some(address) = EmailAddress::parse(recipient.email.trim()) else {
            out.errors.push(RecipientError {
                index,
                email: recipient.email.clone(),
                reason: "invalid email address".to_string(),
            });
            continue;
        };

        // Case-insensitive dedup, first occurrence wins
        if !seen.insert(address.normalized()) {
            out.duplicates += 1;
            out.errors.push(RecipientError {
                index,
                email: recipient.email.clone(),
                reason: "duplicate in batch".to_string(),
            });
            continue;
        }

        out.prepared.push(PreparedEmail {
            to: address.to_string(),
            subject: render_variables(&template.subject, &recipient.variables),
            body_html: render_variables(&template.body_html, &recipient.variables),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn input(email: &str, vars: &[(&str, &str)]) -> RecipientInput {
        RecipientInput {
            email: email.to_string(),
            variables: vars
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn template(subject: &str, body: &str) -> TemplateContent {
        TemplateContent {
            subject: subject.to_string(),
            body_html: body.to_string(),
        }
    }

    #[test]
    fn test_renders_variables() {
        let result = process(
            &[input("ann@example.com", &[("name", "Ann")])],
            &template("Hi {{name}}", "<p>Hello {{name}}, welcome!</p>"),
        );

        assert_eq!(result.prepared.len(), 1);
        assert_eq!(result.prepared[0].subject, "Hi Ann");
        assert_eq!(result.prepared[0].body_html, "<p>Hello Ann, welcome!</p>");
    }

    #[test]
    fn test_unknown_variable_stays_literal() {
        let result = process(
            &[input("bob@example.com", &[])],
            &template("Hi {{name}}", "<p>{{name}}</p>"),
        );

        assert_eq!(result.prepared[0].subject, "Hi {{name}}");
        assert_eq!(result.prepared[0].body_html, "<p>{{name}}</p>");
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_invalid_recipients_recorded_with_index() {
        let result = process(
            &[
                input("good@example.com", &[]),
                input("not-an-email", &[]),
                input("also@bad", &[]),
            ],
            &template("s", "b"),
        );

        assert_eq!(result.prepared.len(), 1);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].index, 1);
        assert_eq!(result.errors[0].reason, "invalid email address");
        assert_eq!(result.errors[1].index, 2);
    }

    #[test]
    fn test_case_insensitive_dedup_first_wins() {
        let result = process(
            &[
                input("Ann@Example.com", &[("name", "first")]),
                input("ann@example.com", &[("name", "second")]),
            ],
            &template("{{name}}", "b"),
        );

        assert_eq!(result.prepared.len(), 1);
        assert_eq!(result.prepared[0].subject, "first");
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.errors[0].reason, "duplicate in batch");
    }

    #[test]
    fn test_preserves_input_order() {
        let result = process(
            &[
                input("c@example.com", &[]),
                input("a@example.com", &[]),
                input("b@example.com", &[]),
            ],
            &template("s", "b"),
        );

        let order: Vec<&str> = result.prepared.iter().map(|p| p.to.as_str()).collect();
        assert_eq!(
            order,
            vec!["c@example.com", "a@example.com", "b@example.com"]
        );
    }

    #[test]
    fn test_total_partition() {
        // total == retained + |errors|
        let recipients = vec![
            input("a@example.com", &[]),
            input("a@example.com", &[]),
            input("broken", &[]),
            input("b@example.com", &[]),
        ];
        let result = process(&recipients, &template("s", "b"));

        assert_eq!(
            recipients.len(),
            result.prepared.len() + result.errors.len()
        );
        assert_eq!(result.duplicates, 1);
    }
}
