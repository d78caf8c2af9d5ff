//! GEDCOM export from the read models
//!
//! Pointers are assigned fresh on every export: persons in listing order,
//! families in id order. Deleted aggregates are left out.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{RelationshipType, Sex};
use crate::projection::{FamilyView, PersonView, ProjectionError, ReadModelStore};

/// Longest value written on one line before continuing with CONC
const MAX_VALUE_LEN: usize = 200;

const PAGE_SIZE: u64 = 500;

/// Line writer handling CONC/CONT continuation
#[derive(Default)]
struct GedcomWriter {
    out: String,
}

impl GedcomWriter {
    fn line(&mut self, level: u32, tag: &str, value: Option<&str>) {
        // writing into a String cannot fail
        let _ = match value.filter(|v| !v.is_empty()) {
            Some(value) => writeln!(self.out, "{} {} {}", level, tag, value),
            None => writeln!(self.out, "{} {}", level, tag),
        };
    }

    fn record(&mut self, xref: &str, tag: &str) {
        let _ = writeln!(self.out, "0 @{}@ {}", xref, tag);
    }

    /// Write a value, splitting newlines into CONT and long runs into CONC
    fn field(&mut self, level: u32, tag: &str, value: &str) {
        for (i, segment) in value.split('\n').enumerate() {
            let chars: Vec<char> = segment.chars().collect();
            let mut chunks = chars.chunks(MAX_VALUE_LEN).map(|c| c.iter().collect::<String>());

            let first = chunks.next().unwrap_or_default();
            if i == 0 {
                self.line(level, tag, Some(&first));
            } else {
                self.line(level + 1, "CONT", Some(&first));
            }
            for chunk in chunks {
                self.line(level + 1, "CONC", Some(&chunk));
            }
        }
    }

    fn event(&mut self, tag: &str, date: Option<String>, place: Option<&str>) {
        self.line(1, tag, None);
        if let Some(date) = date.filter(|d| !d.is_empty()) {
            self.field(2, "DATE", &date);
        }
        if let Some(place) = place {
            self.field(2, "PLAC", place);
        }
    }
}

/// Writes the active read models as a GEDCOM 5.5 document
#[derive(Clone)]
pub struct GedcomExporter {
    read_models: Arc<dyn ReadModelStore>,
}

impl GedcomExporter {
    pub fn new(read_models: Arc<dyn ReadModelStore>) -> Self {
        Self { read_models }
    }

    async fn all_persons(&self) -> Result<Vec<PersonView>, ProjectionError> {
        let mut persons = Vec::new();
        loop {
            let (page, total) = self.read_models.list_persons(persons.len() as u64, PAGE_SIZE).await?;
            let done = page.is_empty();
            persons.extend(page);
            if done || persons.len() as u64 >= total {
                return Ok(persons);
            }
        }
    }

    async fn all_families(&self) -> Result<Vec<FamilyView>, ProjectionError> {
        let mut families = Vec::new();
        loop {
            let (page, total) = self.read_models.list_families(families.len() as u64, PAGE_SIZE).await?;
            let done = page.is_empty();
            families.extend(page);
            if done || families.len() as u64 >= total {
                return Ok(families);
            }
        }
    }

    pub async fn export(&self) -> Result<String, ProjectionError> {
        let persons = self.all_persons().await?;
        let families = self.all_families().await?;

        let person_xrefs: HashMap<Uuid, String> = persons
            .iter()
            .enumerate()
            .map(|(n, p)| (p.id, format!("I{}", n + 1)))
            .collect();
        let family_index: HashMap<Uuid, usize> =
            families.iter().enumerate().map(|(n, f)| (f.id, n + 1)).collect();

        let mut writer = GedcomWriter::default();
        writer.line(0, "HEAD", None);
        writer.line(1, "SOUR", Some("GENEALOGY_LEDGER"));
        writer.line(1, "GEDC", None);
        writer.line(2, "VERS", Some("5.5"));
        writer.line(2, "FORM", Some("LINEAGE-LINKED"));
        writer.line(1, "CHAR", Some("UTF-8"));

        for person in &persons {
            let membership = self.read_models.memberships(person.id).await?;
            let fams = Self::exported_families(membership.as_partner.iter(), &family_index);
            let famc = Self::exported_families(membership.as_child.iter(), &family_index);
            Self::write_person(&mut writer, &person_xrefs[&person.id], person, &fams, &famc);
        }

        let sexes: HashMap<Uuid, Sex> = persons.iter().map(|p| (p.id, p.sex)).collect();
        for (n, family) in families.iter().enumerate() {
            Self::write_family(&mut writer, n + 1, family, &person_xrefs, &sexes);
        }

        writer.line(0, "TRLR", None);
        tracing::info!(
            "Exported {} persons and {} families as GEDCOM",
            persons.len(),
            families.len()
        );
        Ok(writer.out)
    }

    /// Family numbers of the memberships that are part of this export
    fn exported_families<'a>(
        ids: impl Iterator<Item = &'a Uuid>,
        family_index: &HashMap<Uuid, usize>,
    ) -> Vec<usize> {
        let mut numbers: Vec<usize> = ids.filter_map(|id| family_index.get(id).copied()).collect();
        numbers.sort_unstable();
        numbers
    }

    fn write_person(writer: &mut GedcomWriter, xref: &str, person: &PersonView, fams: &[usize], famc: &[usize]) {
        writer.record(xref, "INDI");

        let given = person.given_name.as_deref().unwrap_or_default();
        let name = match person.surname.as_deref() {
            Some(surname) if given.is_empty() => format!("/{}/", surname),
            Some(surname) => format!("{} /{}/", given, surname),
            None => given.to_string(),
        };
        writer.field(1, "NAME", &name);
        writer.line(1, "SEX", Some(person.sex.gedcom_code()));

        if person.birth_date.is_some() || person.birth_place.is_some() {
            writer.event(
                "BIRT",
                person.birth_date.as_ref().map(|d| d.format()),
                person.birth_place.as_deref(),
            );
        }

        if person.death_date.is_some() || person.death_place.is_some() {
            writer.event(
                "DEAT",
                person.death_date.as_ref().map(|d| d.format()),
                person.death_place.as_deref(),
            );
        } else if !person.living {
            writer.line(1, "DEAT", Some("Y"));
        }

        for n in fams {
            writer.line(1, "FAMS", Some(&format!("@F{}@", n)));
        }
        for n in famc {
            writer.line(1, "FAMC", Some(&format!("@F{}@", n)));
        }
    }

    fn write_family(
        writer: &mut GedcomWriter,
        number: usize,
        family: &FamilyView,
        person_xrefs: &HashMap<Uuid, String>,
        sexes: &HashMap<Uuid, Sex>,
    ) {
        writer.record(&format!("F{}", number), "FAM");

        let partners: Vec<Uuid> = family
            .partners
            .iter()
            .copied()
            .filter(|id| person_xrefs.contains_key(id))
            .collect();
        for (tag, id) in Self::partner_tags(&partners, sexes) {
            writer.line(1, tag, Some(&format!("@{}@", person_xrefs[&id])));
        }

        match family.relationship {
            RelationshipType::Marriage => {
                writer.event(
                    "MARR",
                    family.marriage_date.as_ref().map(|d| d.format()),
                    family.marriage_place.as_deref(),
                );
            }
            other => {
                writer.line(1, "_REL", Some(&other.to_string().to_ascii_uppercase()));
                if family.marriage_date.is_some() || family.marriage_place.is_some() {
                    writer.event(
                        "MARR",
                        family.marriage_date.as_ref().map(|d| d.format()),
                        family.marriage_place.as_deref(),
                    );
                }
            }
        }

        for child in family.children.iter().filter_map(|id| person_xrefs.get(id)) {
            writer.line(1, "CHIL", Some(&format!("@{}@", child)));
        }
    }

    /// HUSB/WIFE by sex, falling back to position
    fn partner_tags(partners: &[Uuid], sexes: &HashMap<Uuid, Sex>) -> Vec<(&'static str, Uuid)> {
        let sex = |id: &Uuid| sexes.get(id).copied().unwrap_or_default();
        match partners {
            [only] => {
                let tag = if sex(only) == Sex::Female { "WIFE" } else { "HUSB" };
                vec![(tag, *only)]
            }
            [first, second] => {
                if sex(first) == Sex::Female || sex(second) == Sex::Male {
                    vec![("HUSB", *second), ("WIFE", *first)]
                } else {
                    vec![("HUSB", *first), ("WIFE", *second)]
                }
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_values_are_continued() {
        let mut writer = GedcomWriter::default();
        let long = "x".repeat(450);

        writer.field(1, "NOTE", &format!("{}\nsecond", long));

        let lines: Vec<&str> = writer.out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], format!("1 NOTE {}", "x".repeat(200)));
        assert_eq!(lines[1], format!("2 CONC {}", "x".repeat(200)));
        assert_eq!(lines[2], format!("2 CONC {}", "x".repeat(50)));
        assert_eq!(lines[3], "2 CONT second");
    }

    #[test]
    fn test_empty_continuation_line_has_no_value() {
        let mut writer = GedcomWriter::default();
        writer.field(1, "NOTE", "a\n\nb");

        assert_eq!(writer.out, "1 NOTE a\n2 CONT\n2 CONT b\n");
    }

    #[test]
    fn test_partner_tags_follow_sex() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sexes = HashMap::new();
        sexes.insert(a, Sex::Female);
        sexes.insert(b, Sex::Male);

        assert_eq!(
            GedcomExporter::partner_tags(&[a, b], &sexes),
            vec![("HUSB", b), ("WIFE", a)]
        );

        let unknown = HashMap::new();
        assert_eq!(
            GedcomExporter::partner_tags(&[a, b], &unknown),
            vec![("HUSB", a), ("WIFE", b)]
        );
        assert_eq!(GedcomExporter::partner_tags(&[a], &sexes), vec![("WIFE", a)]);
    }
}
