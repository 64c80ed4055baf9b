// ----------------------------------------------------------------------------
// Every Banner page names a course offering differently. The ISQ page queried
// by course puts the instructor in each row and the course code in the page
// header; queried by instructor it is the other way around. The schedule page
// only gives a free-text instructor list. Everything here funnels those shapes
// into one CourseIdentity so the three sources can be joined.
// ----------------------------------------------------------------------------

use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    // "... John Smith (P)" or "... Maria de la Cruz (P), Jane Doe"
    static ref PRIMARY_INSTRUCTOR: Regex =
        Regex::new(r"(?:^|\s)((?:(?:de|Von)\s+(?:la\s+)?)?[\w'-]+)\s*\(P\)(?:,.*)?$").unwrap();
    // Same capture with the marker optional, for page headers
    static ref HEADER_INSTRUCTOR: Regex =
        Regex::new(r"(?:^|\s)((?:(?:de|Von)\s+(?:la\s+)?)?[\w'-]+)(?:\s*\(P\)(?:,.*)?)?\s*$").unwrap();
}

/// Which of the two ISQ page layouts a row came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PageVariant {
    /// Queried by course code: column 2 holds the instructor.
    ByCourse,
    /// Queried by instructor id: column 2 holds the course code.
    ByInstructor,
}

impl PageVariant {
    pub fn new_from_label(label: &str) -> PageVariant {
        if label.trim().trim_end_matches(':') == "Instructor" {
            PageVariant::ByInstructor
        } else {
            PageVariant::ByCourse
        }
    }
}

/// Composite key of one course offering.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CourseIdentity {
    course_code: String,
    term: String,
    section_id: String,
    instructor: Option<String>,
}

impl CourseIdentity {
    /// Builds a key from already-clean parts. Blank instructors become `None`.
    pub fn new(
        course_code: &str,
        term: &str,
        section_id: &str,
        instructor: Option<&str>,
    ) -> CourseIdentity {
        CourseIdentity {
            course_code: normalize_course_code(course_code),
            term: normalize_term(term),
            section_id: section_id.trim().to_string(),
            instructor: instructor
                .map(str::trim)
                .filter(|i| !i.is_empty())
                .map(str::to_string),
        }
    }

    pub fn get_course_code(&self) -> &str {
        &self.course_code
    }

    pub fn get_term(&self) -> &str {
        &self.term
    }

    pub fn get_section_id(&self) -> &str {
        &self.section_id
    }

    pub fn get_instructor(&self) -> Option<&str> {
        self.instructor.as_deref()
    }

    /// Subject prefix and course number, e.g. ("COT", "3100").
    pub fn get_subject_and_number(&self) -> Option<(&str, &str)> {
        split_course_code(&self.course_code)
    }
}

impl fmt::Display for CourseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} #{}", self.course_code, self.term, self.section_id)?;
        if let Some(instructor) = &self.instructor {
            write!(f, " ({})", instructor)?;
        }
        Ok(())
    }
}

pub fn normalize_course_code(raw: &str) -> String {
    raw.split_whitespace().collect::<String>()
}

pub fn normalize_term(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// "COT3100" -> ("COT", "3100"). The subject is everything before the first digit.
pub fn split_course_code(code: &str) -> Option<(&str, &str)> {
    let first_number = code.find(|c: char| c.is_ascii_digit())?;
    if first_number == 0 {
        return None;
    }
    Some(code.split_at(first_number))
}

/// Canonical CRN text. `strict` pages promise digits and fail otherwise;
/// elsewhere the trimmed text is kept as an opaque identifier.
pub fn canonical_crn(raw: &str, strict: bool) -> Result<String> {
    let trimmed = raw.trim();

    match trimmed.parse::<u32>() {
        Ok(crn) => Ok(crn.to_string()),
        Err(_) if !strict && !trimmed.is_empty() => Ok(trimmed.to_string()),
        Err(_) => Err(Error::MalformedKey {
            field: "crn",
            value: raw.to_string(),
        }),
    }
}

/// Extracts the primary instructor's last name from text ending in
/// `LASTNAME (P)` or `LASTNAME (P), <others>`.
pub fn instructor_last_name(text: &str) -> Result<String> {
    let text = text.trim();

    PRIMARY_INSTRUCTOR
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::InstructorParse {
            text: text.to_string(),
        })
}

/// Last name from an ISQ page header, where the `(P)` marker is optional.
pub fn header_last_name(text: &str) -> Result<String> {
    let text = text.trim();

    HEADER_INSTRUCTOR
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::InstructorParse {
            text: text.to_string(),
        })
}

/// Per-page state for turning ISQ/grade rows into keys.
///
/// The header is read once: on course pages it is the course code, on
/// instructor pages it is the instructor's name.
#[derive(Clone, Debug)]
pub struct KeyContext {
    variant: PageVariant,
    course_code: Option<String>,
    instructor: Option<String>,
}

impl KeyContext {
    pub fn for_page(variant: PageVariant, header_text: &str) -> Result<KeyContext> {
        match variant {
            PageVariant::ByCourse => {
                let course_code = normalize_course_code(header_text);
                if course_code.is_empty() {
                    return Err(Error::MalformedKey {
                        field: "course code",
                        value: header_text.to_string(),
                    });
                }
                Ok(KeyContext {
                    variant,
                    course_code: Some(course_code),
                    instructor: None,
                })
            }
            PageVariant::ByInstructor => Ok(KeyContext {
                variant,
                course_code: None,
                instructor: Some(header_last_name(header_text)?),
            }),
        }
    }

    pub fn get_variant(&self) -> PageVariant {
        self.variant
    }

    /// `row_field` is column 2 of the row: an instructor on course pages,
    /// a course code on instructor pages.
    pub fn normalize(&self, raw_term: &str, raw_crn: &str, row_field: &str) -> Result<CourseIdentity> {
        let term = normalize_term(raw_term);
        if term.is_empty() {
            return Err(Error::MalformedKey {
                field: "term",
                value: raw_term.to_string(),
            });
        }

        let (course_code, instructor, crn) = match self.variant {
            PageVariant::ByCourse => (
                self.course_code.clone().unwrap_or_default(),
                Some(row_field),
                canonical_crn(raw_crn, true)?,
            ),
            PageVariant::ByInstructor => (
                normalize_course_code(row_field),
                self.instructor.as_deref(),
                canonical_crn(raw_crn, false)?,
            ),
        };

        if course_code.is_empty() {
            return Err(Error::MalformedKey {
                field: "course code",
                value: row_field.to_string(),
            });
        }

        Ok(CourseIdentity::new(&course_code, &term, &crn, instructor))
    }
}

/// One-shot form of [`KeyContext::normalize`].
pub fn normalize(
    raw_term: &str,
    raw_crn: &str,
    row_field: &str,
    header_text: &str,
    variant: PageVariant,
) -> Result<CourseIdentity> {
    KeyContext::for_page(variant, header_text)?.normalize(raw_term, raw_crn, row_field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_name_from_trailing_marker() {
        assert_eq!(
            instructor_last_name("ABC123 Intro to Widgets John Smith (P)").unwrap(),
            "Smith"
        );
        assert_eq!(instructor_last_name("Smith (P)").unwrap(), "Smith");
        assert_eq!(
            instructor_last_name("Kevin O'Neil-Hart (P), Jane Doe").unwrap(),
            "O'Neil-Hart"
        );
    }

    #[test]
    fn last_name_with_particles() {
        assert_eq!(instructor_last_name("Maria de la Cruz (P)").unwrap(), "de la Cruz");
        assert_eq!(instructor_last_name("Ana de Souza (P)").unwrap(), "de Souza");
        assert_eq!(
            instructor_last_name("John Von Neumann (P), Oskar Morgenstern").unwrap(),
            "Von Neumann"
        );
    }

    #[test]
    fn last_name_requires_marker() {
        match instructor_last_name("TBA") {
            Err(Error::InstructorParse { text }) => assert_eq!(text, "TBA"),
            other => panic!("expected InstructorParse, got {:?}", other),
        }
        assert!(instructor_last_name("John Smith").is_err());
    }

    #[test]
    fn header_marker_is_optional() {
        assert_eq!(header_last_name("John Smith").unwrap(), "Smith");
        assert_eq!(header_last_name("John Smith (P)").unwrap(), "Smith");
        assert!(header_last_name("   ").is_err());
    }

    #[test]
    fn course_page_reads_instructor_from_row() {
        let key = normalize(" Fall 2017 ", "80123", " Smith ", "COT3100", PageVariant::ByCourse).unwrap();
        assert_eq!(key.get_course_code(), "COT3100");
        assert_eq!(key.get_term(), "Fall 2017");
        assert_eq!(key.get_section_id(), "80123");
        assert_eq!(key.get_instructor(), Some("Smith"));
    }

    #[test]
    fn instructor_page_reads_course_from_row() {
        let key = normalize("Fall 2017", "80123", "COT 3100", "John Smith", PageVariant::ByInstructor)
            .unwrap();
        assert_eq!(key.get_course_code(), "COT3100");
        assert_eq!(key.get_instructor(), Some("Smith"));

        // The same offering seen from the course page yields the same key
        let from_course = normalize("Fall 2017", "80123", "Smith", "COT3100", PageVariant::ByCourse).unwrap();
        assert_eq!(key, from_course);
    }

    #[test]
    fn blank_instructor_is_absent() {
        let key = normalize("Fall 2017", "80123", "  ", "COT3100", PageVariant::ByCourse).unwrap();
        assert_eq!(key.get_instructor(), None);
        assert_eq!(key, CourseIdentity::new("COT3100", "Fall 2017", "80123", None));
    }

    #[test]
    fn crn_must_be_numeric_on_course_pages() {
        match normalize("Fall 2017", "8O123", "Smith", "COT3100", PageVariant::ByCourse) {
            Err(Error::MalformedKey { field, .. }) => assert_eq!(field, "crn"),
            other => panic!("expected MalformedKey, got {:?}", other),
        }

        let key = normalize("Fall 2017", "8O123", "COT3100", "John Smith", PageVariant::ByInstructor)
            .unwrap();
        assert_eq!(key.get_section_id(), "8O123");
    }

    #[test]
    fn crn_is_canonicalized() {
        assert_eq!(canonical_crn(" 012345 ", true).unwrap(), "12345");
        assert!(canonical_crn("", false).is_err());
    }

    #[test]
    fn course_code_splits_at_first_digit() {
        assert_eq!(split_course_code("COT3100"), Some(("COT", "3100")));
        assert_eq!(split_course_code("MAC2311C"), Some(("MAC", "2311C")));
        assert_eq!(split_course_code("3100"), None);
    }

    #[test]
    fn variant_from_header_label() {
        assert_eq!(PageVariant::new_from_label("Instructor: "), PageVariant::ByInstructor);
        assert_eq!(PageVariant::new_from_label("Course: "), PageVariant::ByCourse);
    }
}
