//! Ticket-export cleaning and preparation
//!
//! The raw ServiceNow export contains names, NetIDs, email addresses, and
//! cluster paths. Cleaning anonymizes those and strips boilerplate;
//! preparation flattens each cleaned record into the `{text, metadata}`
//! shape the corpus loader consumes.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::corpus::Document;
use crate::error::{RagmarkError, Result};

/// Record fields that receive PII anonymization
const ANONYMIZED_FIELDS: &[&str] = &[
    "sys_updated_by",
    "sys_created_by",
    "short_description",
    "watch_list",
];

/// Raw export shape: a single object with a `records` array
#[derive(Debug, Serialize, Deserialize)]
pub struct TicketExport {
    #[serde(default)]
    pub records: Vec<Map<String, Value>>,
}

/// Compiled anonymization and cleanup patterns
pub struct TicketCleaner {
    email: Regex,
    full_name: Regex,
    netid: Regex,
    known_users: Regex,
    project_path: Regex,
    cluster_host: Regex,
    url: Regex,
    account_request: Regex,
    mail_footer: Regex,
    smartsheet_footer: Regex,
}

impl TicketCleaner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            email: compile(r"[\w\.-]+@[\w\.-]+")?,
            // Two or more Title Case words in sequence
            full_name: compile(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+\b")?,
            // NetID shapes observed in the export, e.g. rm1238, yw969
            netid: compile(r"\b[a-z]{2,3}\d{3,4}\b")?,
            known_users: compile(r"\b(?:pgarias|thackray)\b")?,
            project_path: compile(r"/projects/f_[a-z0-9]+_\d")?,
            cluster_host: compile(r"amarel\.rutgers\.edu")?,
            url: compile(r"https?://\S+")?,
            account_request: compile(r"(?s)#+\s*Below is the original account request\s*#+.*")?,
            mail_footer: compile(r"(?s)You are receiving this email because.*")?,
            smartsheet_footer: compile(r"(?s)Powered by Smartsheet Inc\..*")?,
        })
    }

    /// Replace PII with bracketed placeholders
    pub fn anonymize(&self, text: &str) -> String {
        let text = self.email.replace_all(text, "[EMAIL]");
        let text = self.full_name.replace_all(&text, "[NAME]");
        let text = self.netid.replace_all(&text, "[USER]");
        let text = self.known_users.replace_all(&text, "[USER]");
        let text = self
            .project_path
            .replace_all(&text, "/projects/[USER_PROJECT]");
        let text = self.cluster_host.replace_all(&text, "[CLUSTER_HOSTNAME]");
        let text = self.url.replace_all(&text, "[URL]");
        text.into_owned()
    }

    /// Strip boilerplate tails and collapse whitespace
    pub fn clean_description(&self, text: &str) -> String {
        let text = self.account_request.replace(text, "");
        let text = self.mail_footer.replace(&text, "");
        let text = self.smartsheet_footer.replace(&text, "");
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Clean one record
    ///
    /// Anonymization applies only to the listed fields; `description` is
    /// additionally de-boilerplated. Values cleaned down to the empty
    /// string are dropped; non-string values pass through untouched.
    pub fn clean_record(&self, record: &Map<String, Value>) -> Map<String, Value> {
        let mut cleaned = Map::new();
        for (key, value) in record {
            let processed = match value.as_str() {
                Some(text) if ANONYMIZED_FIELDS.contains(&key.as_str()) => {
                    Value::String(self.anonymize(text))
                }
                Some(text) if key == "description" => {
                    Value::String(self.clean_description(&self.anonymize(text)))
                }
                _ => value.clone(),
            };

            if processed == Value::String(String::new()) {
                continue;
            }
            cleaned.insert(key.clone(), processed);
        }
        cleaned
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| RagmarkError::Config(format!("Invalid cleaning pattern: {}", e)))
}

fn read_export(path: &Path) -> Result<TicketExport> {
    let content = std::fs::read_to_string(path).map_err(|e| RagmarkError::Io {
        source: e,
        context: format!("Failed to read ticket export: {:?}", path),
    })?;
    serde_json::from_str(&content).map_err(|e| RagmarkError::Json {
        source: e,
        context: path.display().to_string(),
    })
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| RagmarkError::Io {
                source: e,
                context: format!("Failed to create output directory: {:?}", parent),
            })?;
        }
    }
    Ok(())
}

/// Clean a raw export file, writing the same `{records: [...]}` structure
///
/// Returns the number of cleaned records.
pub fn clean_export_file(input: &Path, output: &Path) -> Result<usize> {
    let export = read_export(input)?;
    if export.records.is_empty() {
        warn!(
            "No records found in {}. Writing an empty records file.",
            input.display()
        );
    }

    let cleaner = TicketCleaner::new()?;
    let cleaned = TicketExport {
        records: export
            .records
            .iter()
            .map(|record| cleaner.clean_record(record))
            .collect(),
    };

    if let Some(first) = cleaned.records.first() {
        if let Ok(rendered) = serde_json::to_string_pretty(first) {
            debug!("First cleaned entry for comparison:\n{}", rendered);
        }
    }

    ensure_parent_dir(output)?;
    let serialized = serde_json::to_string_pretty(&cleaned).map_err(|e| RagmarkError::Json {
        source: e,
        context: "serializing cleaned export".to_string(),
    })?;
    std::fs::write(output, serialized).map_err(|e| RagmarkError::Io {
        source: e,
        context: format!("Failed to write cleaned export: {:?}", output),
    })?;

    info!("Anonymized data written to {}", output.display());
    Ok(cleaned.records.len())
}

/// Flatten cleaned records into corpus documents, one JSON object per line
///
/// Each document's text is `Title: <short_description>` followed by the
/// description; the incident number (or sys_id) rides along as metadata.
/// Returns the number of prepared records; an empty input writes nothing.
pub fn prepare_for_embedding(input: &Path, output: &Path) -> Result<usize> {
    let export = read_export(input)?;
    if export.records.is_empty() {
        warn!(
            "No records found in {}. No output file will be generated.",
            input.display()
        );
        return Ok(0);
    }

    let mut lines = String::new();
    for record in &export.records {
        let short_description = record
            .get("short_description")
            .and_then(Value::as_str)
            .unwrap_or("");
        let description = record
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("");
        let combined = format!("Title: {}\n\n{}", short_description, description);

        let incident_number = record
            .get("number")
            .or_else(|| record.get("sys_id"))
            .and_then(Value::as_str)
            .unwrap_or("N/A");

        let document = Document::new(combined.trim().to_string())
            .with_metadata("incident_number", incident_number);

        let line = serde_json::to_string(&document).map_err(|e| RagmarkError::Json {
            source: e,
            context: "serializing prepared record".to_string(),
        })?;
        lines.push_str(&line);
        lines.push('\n');
    }

    ensure_parent_dir(output)?;
    std::fs::write(output, lines).map_err(|e| RagmarkError::Io {
        source: e,
        context: format!("Failed to write prepared records: {:?}", output),
    })?;

    info!(
        "Prepared {} records for embedding at {}",
        export.records.len(),
        output.display()
    );
    Ok(export.records.len())
}
