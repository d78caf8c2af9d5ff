//! GEDCOM import
//!
//! Two passes over the parsed records: the first mints an aggregate id for
//! every usable INDI/FAM pointer, the second issues creation commands,
//! persons before families. GEDCOM pointers never become domain ids.

use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{DomainError, OperationContext, RelationshipType};
use crate::error::{AppError, AppResult, ErrorKind};
use crate::handlers::{
    CreateFamilyCommand, CreatePersonCommand, FamilyCommandHandler, PersonCommandHandler,
};

use super::job::ImportJob;
use super::lexer::{parse_document, GedcomNode, ImportWarning};

/// Operation source recorded on every imported event
pub const IMPORT_SOURCE: &str = "gedcom-import";

/// Subrecords the person mapping reads; FAMS/FAMC are rebuilt from FAM records
const PERSON_TAGS: &[&str] = &["NAME", "SEX", "BIRT", "DEAT", "FAMS", "FAMC"];

const FAMILY_TAGS: &[&str] = &["HUSB", "WIFE", "CHIL", "MARR", "_REL"];

/// Subrecords of a record that the mapping drops
fn discarded<'a>(node: &'a GedcomNode, mapped: &'a [&'a str]) -> impl Iterator<Item = &'a GedcomNode> + 'a {
    node.children
        .iter()
        .filter(move |c| !mapped.contains(&c.tag.as_str()))
}

fn log_discarded(node: &GedcomNode, mapped: &[&str]) {
    for sub in discarded(node, mapped) {
        tracing::debug!(
            "GEDCOM line {}: {} under {} not imported",
            sub.line,
            sub.tag,
            node.tag
        );
    }
}

/// Outcome of an import run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportResult {
    pub created_count: usize,
    pub warnings: Vec<ImportWarning>,
}

impl ImportResult {
    fn warn(&mut self, line: usize, reason: impl Into<String>) {
        let warning = ImportWarning::new(line, reason);
        tracing::warn!("GEDCOM line {}: {}", warning.line, warning.reason);
        self.warnings.push(warning);
    }
}

/// Pointer of a record, or a line-based key for records without one
fn record_key(node: &GedcomNode) -> String {
    node.xref
        .clone()
        .unwrap_or_else(|| format!("line:{}", node.line))
}

/// Split `Given /Surname/ Suffix` into given name and surname
fn split_name(value: &str) -> (Option<String>, Option<String>) {
    let join = |parts: &[&str]| {
        let joined = parts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    };

    match (value.find('/'), value.rfind('/')) {
        (Some(open), Some(close)) if close > open => (
            join(&[&value[..open], &value[close + 1..]]),
            join(&[&value[open + 1..close]]),
        ),
        (Some(open), _) => (join(&[&value[..open]]), join(&[&value[open + 1..]])),
        _ => (join(&[value]), None),
    }
}

/// Imports GEDCOM text through the regular command handlers
#[derive(Clone)]
pub struct GedcomImporter {
    persons: PersonCommandHandler,
    families: FamilyCommandHandler,
}

impl GedcomImporter {
    pub fn new(persons: PersonCommandHandler, families: FamilyCommandHandler) -> Self {
        Self { persons, families }
    }

    /// Import a source from scratch
    pub async fn import(&self, text: &str, context: &OperationContext) -> AppResult<ImportResult> {
        let mut job = ImportJob::new(text);
        self.run(text, &mut job, context).await
    }

    /// Continue a job; records completed by earlier runs are skipped
    pub async fn resume(
        &self,
        text: &str,
        job: &mut ImportJob,
        context: &OperationContext,
    ) -> AppResult<ImportResult> {
        job.verify_source(text)?;
        self.run(text, job, context).await
    }

    async fn run(
        &self,
        text: &str,
        job: &mut ImportJob,
        context: &OperationContext,
    ) -> AppResult<ImportResult> {
        let document = parse_document(text);
        let mut result = ImportResult::default();
        for warning in document.warnings {
            result.warn(warning.line, warning.reason);
        }

        let mut context = context.clone().with_source(IMPORT_SOURCE);
        let correlation_id = context.ensure_correlation_id();
        tracing::info!(
            "GEDCOM import {} started: {} records, {} already completed",
            correlation_id,
            document.records.len(),
            job.completed_count()
        );

        // Pass 1: pick usable records and mint their ids
        let mut persons = Vec::new();
        let mut families = Vec::new();
        let mut seen = HashSet::new();

        for record in &document.records {
            let node = &record.node;
            if node.tag != "INDI" && node.tag != "FAM" {
                tracing::debug!("Skipping {} record at line {}", node.tag, node.line);
                continue;
            }
            if let Some(warning) = &record.malformed {
                result.warn(
                    warning.line,
                    format!("{} record at line {} skipped: {}", node.tag, node.line, warning.reason),
                );
                continue;
            }
            if node.tag == "INDI" && node.child("NAME").is_none() {
                result.warn(node.line, "INDI record without NAME skipped");
                continue;
            }

            let key = record_key(node);
            if !seen.insert(key.clone()) {
                result.warn(node.line, format!("duplicate record @{}@ skipped", key));
                continue;
            }
            job.mint(&key);

            if node.tag == "INDI" {
                persons.push(node);
            } else {
                families.push(node);
            }
        }

        // Pass 2: persons first so family references resolve
        for node in persons {
            let key = record_key(node);
            if job.is_completed(&key) {
                continue;
            }
            let command = self.person_command(node, job.mint(&key), &mut result);
            let outcome = self.persons.create(command, &context).await.map(|_| ());
            Self::settle(outcome, key, node.line, job, &mut result)?;
        }

        for node in families {
            let key = record_key(node);
            if job.is_completed(&key) {
                continue;
            }
            let command = self.family_command(node, job.mint(&key), job, &mut result);
            let outcome = self.families.create(command, &context).await.map(|_| ());
            Self::settle(outcome, key, node.line, job, &mut result)?;
        }

        tracing::info!(
            "GEDCOM import {} finished: {} created, {} warnings",
            correlation_id,
            result.created_count,
            result.warnings.len()
        );
        Ok(result)
    }

    /// Record the outcome of one creation command.
    ///
    /// Validation failures become warnings; storage failures abort the run
    /// and leave the job resumable.
    fn settle(
        outcome: AppResult<()>,
        key: String,
        line: usize,
        job: &mut ImportJob,
        result: &mut ImportResult,
    ) -> AppResult<()> {
        match outcome {
            Ok(()) => {
                job.mark_completed(key);
                result.created_count += 1;
                Ok(())
            }
            // created by an interrupted earlier run
            Err(AppError::Domain(DomainError::AlreadyExists { .. })) => {
                job.mark_completed(key);
                Ok(())
            }
            Err(e) if matches!(e.kind(), ErrorKind::Validation | ErrorKind::NotFound) => {
                result.warn(line, format!("record @{}@ not imported: {}", key, e));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Record mapping
    // =========================================================================

    fn person_command(
        &self,
        node: &GedcomNode,
        person_id: Uuid,
        result: &mut ImportResult,
    ) -> CreatePersonCommand {
        let mut command = CreatePersonCommand::with_id(person_id);
        log_discarded(node, PERSON_TAGS);

        if let Some(name) = node.child("NAME") {
            let (given, surname) = split_name(name.value.as_deref().unwrap_or_default());
            command.given_name = name.child_value("GIVN").map(str::to_string).or(given);
            command.surname = name.child_value("SURN").map(str::to_string).or(surname);
        }

        if let Some(sex) = node.child("SEX") {
            let value = sex.value.as_deref().unwrap_or_default().trim().to_ascii_uppercase();
            match value.as_str() {
                "M" | "F" | "U" => command.sex = Some(value.clone()),
                _ => result.warn(sex.line, format!("unknown SEX value {:?} imported as unknown", value)),
            }
        }

        if let Some(birth) = node.child("BIRT") {
            command.birth_date = birth.child_value("DATE").map(str::to_string);
            command.birth_place = birth.child_value("PLAC").map(str::to_string);
        }

        if let Some(death) = node.child("DEAT") {
            command.death_date = death.child_value("DATE").map(str::to_string);
            command.death_place = death.child_value("PLAC").map(str::to_string);
            command.living = Some(false);
        }

        command
    }

    /// Resolve a pointer to a person created by this job
    fn resolve_person(node: &GedcomNode, job: &ImportJob) -> Result<Uuid, String> {
        let pointer = node
            .pointer()
            .ok_or_else(|| format!("{} value {:?} is not a pointer", node.tag, node.value.as_deref().unwrap_or_default()))?;

        match job.resolve(pointer) {
            Some(id) if job.is_completed(pointer) => Ok(id),
            _ => Err(format!("{} @{}@ does not resolve to an imported person", node.tag, pointer)),
        }
    }

    fn family_command(
        &self,
        node: &GedcomNode,
        family_id: Uuid,
        job: &ImportJob,
        result: &mut ImportResult,
    ) -> CreateFamilyCommand {
        let mut command = CreateFamilyCommand::with_id(family_id);
        log_discarded(node, FAMILY_TAGS);

        for partner in node.children.iter().filter(|c| c.tag == "HUSB" || c.tag == "WIFE") {
            match Self::resolve_person(partner, job) {
                Ok(id) if command.partners.contains(&id) => {
                    result.warn(partner.line, "partner listed twice, dropped")
                }
                Ok(_) if command.partners.len() == 2 => {
                    result.warn(partner.line, "more than two partners, extra partner dropped")
                }
                Ok(id) => command.partners.push(id),
                Err(reason) => result.warn(partner.line, reason),
            }
        }

        for child in node.children_with("CHIL") {
            match Self::resolve_person(child, job) {
                Ok(id) if command.children.contains(&id) => {
                    result.warn(child.line, "child listed twice, dropped")
                }
                Ok(id) if command.partners.contains(&id) => {
                    result.warn(child.line, "child is also a partner, dropped")
                }
                Ok(id) => command.children.push(id),
                Err(reason) => result.warn(child.line, reason),
            }
        }

        if let Some(marriage) = node.child("MARR") {
            command.relationship = Some(RelationshipType::Marriage.to_string());
            command.marriage_date = marriage.child_value("DATE").map(str::to_string);
            command.marriage_place = marriage.child_value("PLAC").map(str::to_string);
        }

        if let Some(rel) = node.child("_REL") {
            let value = rel.value.as_deref().unwrap_or_default().trim();
            match value.parse::<RelationshipType>() {
                Ok(relationship) => command.relationship = Some(relationship.to_string()),
                Err(_) => result.warn(rel.line, format!("unknown _REL value {:?} ignored", value)),
            }
        }

        command
    }
}
