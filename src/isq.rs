// ----------------------------------------------------------------------------
// Parsers for the ISQ/grade page. Both tables live on one document, whether it
// was queried by course (wksfwbs.p_course_isq_grade) or by instructor
// (wksfwbs.p_instructor_isq_grade).
//
// Cell positions are fixed by the page layout. Shifting one of them does not
// fail, it silently puts numbers in the wrong columns, so the tests pin them.
// ----------------------------------------------------------------------------

use crate::course_key::*;
use crate::error::{Error, Result};
use crate::html::*;
use lazy_static::lazy_static;
use log::{debug, warn};
use scraper::{Html, Selector};
use std::collections::HashMap;

lazy_static! {
    static ref HEADER_LABEL: Selector =
        Selector::parse("table.datadisplaytable:nth-child(5) .ddlabel").unwrap();
    static ref HEADER_VALUE: Selector =
        Selector::parse("table.datadisplaytable:nth-child(5) .dddefault").unwrap();
    // Everything but the two header rows
    static ref ISQ_ROWS: Selector =
        Selector::parse("table.datadisplaytable:nth-child(9) tr:nth-child(n+3)").unwrap();
    static ref GRADE_ROWS: Selector =
        Selector::parse("table.datadisplaytable:nth-child(14) tr:nth-child(n+3)").unwrap();
    static ref CELL: Selector = Selector::parse("td").unwrap();
}

const TERM: usize = 0;
const CRN: usize = 1;
const INSTRUCTOR_OR_COURSE: usize = 2;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SatisfactionRecord {
    pub enrolled: u32,
    pub responded: u32,
    pub response_rate: f64,
    pub percent_5: f64,
    pub percent_4: f64,
    pub percent_3: f64,
    pub percent_2: f64,
    pub percent_1: f64,
    pub rating: f64,
}

impl SatisfactionRecord {
    fn new_from_cells(cells: &[String]) -> SatisfactionRecord {
        // Cell 11 is the "no response" share and is not kept
        SatisfactionRecord {
            enrolled: parse_u32(cell(cells, 3)),
            responded: parse_u32(cell(cells, 4)),
            response_rate: parse_f64(cell(cells, 5)),
            percent_5: parse_f64(cell(cells, 6)),
            percent_4: parse_f64(cell(cells, 7)),
            percent_3: parse_f64(cell(cells, 8)),
            percent_2: parse_f64(cell(cells, 9)),
            percent_1: parse_f64(cell(cells, 10)),
            rating: parse_f64(cell(cells, 12)),
        }
    }
}

/// Letter grade percentages with the plus/minus variants folded in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GradeDistribution {
    pub percent_a: f64,
    pub percent_b: f64,
    pub percent_c: f64,
    pub percent_d: f64,
    pub percent_f: f64,
    pub average_gpa: f64,
}

/// Raw per-variant percentages as they appear on the page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawGrades {
    pub a: f64,
    pub a_minus: f64,
    pub b_plus: f64,
    pub b: f64,
    pub b_minus: f64,
    pub c_plus: f64,
    pub c: f64,
    pub d: f64,
    pub f: f64,
}

impl RawGrades {
    fn new_from_cells(cells: &[String]) -> RawGrades {
        RawGrades {
            a: parse_f64(cell(cells, 4)),
            a_minus: parse_f64(cell(cells, 5)),
            b_plus: parse_f64(cell(cells, 6)),
            b: parse_f64(cell(cells, 7)),
            b_minus: parse_f64(cell(cells, 8)),
            c_plus: parse_f64(cell(cells, 9)),
            c: parse_f64(cell(cells, 10)),
            d: parse_f64(cell(cells, 11)),
            f: parse_f64(cell(cells, 12)),
        }
    }

    pub fn collapse(&self, average_gpa: f64) -> GradeDistribution {
        GradeDistribution {
            percent_a: self.a + self.a_minus,
            percent_b: self.b_plus + self.b + self.b_minus,
            percent_c: self.c_plus + self.c,
            percent_d: self.d,
            percent_f: self.f,
            average_gpa,
        }
    }
}

/// Both tables of one parsed ISQ/grade page.
pub struct IsqPage {
    document: Html,
    variant: PageVariant,
    header_text: String,
}

impl IsqPage {
    pub fn parse(body: &[u8]) -> IsqPage {
        let document = parse_document(body);

        // Instructor pages label the header "Instructor: "
        let variant = PageVariant::new_from_label(&first_text(&document, &HEADER_LABEL));
        let header_text = first_text(&document, &HEADER_VALUE);

        IsqPage {
            document,
            variant,
            header_text,
        }
    }

    pub fn get_variant(&self) -> PageVariant {
        self.variant
    }

    pub fn get_header_text(&self) -> &str {
        &self.header_text
    }

    pub fn satisfaction(&self) -> Result<HashMap<CourseIdentity, SatisfactionRecord>> {
        self.collect_rows(&ISQ_ROWS, "ISQs", |cells| SatisfactionRecord::new_from_cells(cells))
    }

    pub fn grades(&self) -> Result<HashMap<CourseIdentity, GradeDistribution>> {
        self.collect_rows(&GRADE_ROWS, "grades", |cells| {
            RawGrades::new_from_cells(cells).collapse(parse_f64(cell(cells, 14)))
        })
    }

    fn collect_rows<T, F>(
        &self,
        rows: &Selector,
        table: &'static str,
        build: F,
    ) -> Result<HashMap<CourseIdentity, T>>
    where
        F: Fn(&[String]) -> T,
    {
        let rows: Vec<Vec<String>> = self
            .document
            .select(rows)
            .map(|row| row_cells(&row, &CELL))
            .filter(|cells| !cells.is_empty())
            .collect();

        // An empty table means an unknown course/instructor or a changed layout
        if rows.is_empty() {
            return Err(Error::NoDataFound {
                table,
                subject: self.header_text.clone(),
            });
        }

        let context = KeyContext::for_page(self.variant, &self.header_text)?;
        let mut found = HashMap::new();

        for (i, cells) in rows.iter().enumerate() {
            let key = context.normalize(
                cell(cells, TERM),
                cell(cells, CRN),
                cell(cells, INSTRUCTOR_OR_COURSE),
            );

            let key = match key {
                Ok(key) => key,
                Err(e) => {
                    warn!("Skipping {} row {}: {}", table, i + 1, e);
                    continue;
                }
            };

            if found.insert(key.clone(), build(cells)).is_some() {
                debug!("Duplicate {} row for {}, keeping the later one", table, key);
            }
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BY_COURSE: &str = include_str!("../tests/fixtures/isq_course.html");
    const BY_INSTRUCTOR: &str = include_str!("../tests/fixtures/isq_instructor.html");
    const EMPTY: &str = include_str!("../tests/fixtures/isq_empty.html");

    fn key(course: &str, term: &str, crn: &str, instructor: Option<&str>) -> CourseIdentity {
        CourseIdentity::new(course, term, crn, instructor)
    }

    #[test]
    fn grade_variants_collapse_into_letters() {
        let raw = RawGrades {
            a: 10.,
            a_minus: 5.,
            b_plus: 8.,
            b: 12.,
            b_minus: 3.,
            c_plus: 4.,
            c: 6.,
            d: 2.,
            f: 1.,
        };
        let grades = raw.collapse(3.1);

        assert!((grades.percent_a - 15.).abs() < 1e-9);
        assert!((grades.percent_b - 23.).abs() < 1e-9);
        assert!((grades.percent_c - 10.).abs() < 1e-9);
        assert_eq!(grades.percent_d, 2.);
        assert_eq!(grades.percent_f, 1.);
        assert_eq!(grades.average_gpa, 3.1);
    }

    #[test]
    fn course_page_satisfaction_rows() {
        let page = IsqPage::parse(BY_COURSE.as_bytes());
        assert_eq!(page.get_variant(), PageVariant::ByCourse);
        assert_eq!(page.get_header_text(), "COT3100");

        let isqs = page.satisfaction().unwrap();
        assert_eq!(isqs.len(), 4);

        let smith = &isqs[&key("COT3100", "Fall 2017", "80001", Some("Smith"))];
        assert_eq!(smith.enrolled, 40);
        assert_eq!(smith.responded, 30);
        assert_eq!(smith.response_rate, 75.);
        assert_eq!(smith.percent_5, 50.);
        assert_eq!(smith.percent_1, 5.);
        assert_eq!(smith.rating, 4.15);
    }

    #[test]
    fn blank_cells_degrade_to_zero() {
        let page = IsqPage::parse(BY_COURSE.as_bytes());
        let isqs = page.satisfaction().unwrap();

        let jones = &isqs[&key("COT3100", "Spring 2018", "10002", Some("Jones"))];
        assert_eq!(jones.enrolled, 35);
        assert_eq!(jones.responded, 0);
        assert_eq!(jones.response_rate, 0.);
        assert_eq!(jones.rating, 0.);

        // Only the rating is blank here, the buckets survive
        let lab = &isqs[&key("COT3100", "Fall 2017", "80003", Some("Smith"))];
        assert_eq!(lab.rating, 0.);
        assert_eq!(lab.percent_5, 40.);
        assert_eq!(lab.responded, 10);
    }

    #[test]
    fn blank_instructor_rows_keep_an_absent_instructor() {
        let page = IsqPage::parse(BY_COURSE.as_bytes());
        let isqs = page.satisfaction().unwrap();
        assert!(isqs.contains_key(&key("COT3100", "Spring 2018", "10007", None)));
    }

    #[test]
    fn course_page_grade_rows() {
        let page = IsqPage::parse(BY_COURSE.as_bytes());
        let grades = page.grades().unwrap();
        assert_eq!(grades.len(), 4);

        let smith = &grades[&key("COT3100", "Fall 2017", "80001", Some("Smith"))];
        assert!((smith.percent_a - 15.).abs() < 1e-9);
        assert!((smith.percent_b - 23.).abs() < 1e-9);
        assert!((smith.percent_c - 42.).abs() < 1e-9);
        assert_eq!(smith.percent_d, 10.);
        assert_eq!(smith.percent_f, 10.);
        assert_eq!(smith.average_gpa, 2.45);
    }

    #[test]
    fn instructor_page_inverts_the_key_columns() {
        let page = IsqPage::parse(BY_INSTRUCTOR.as_bytes());
        assert_eq!(page.get_variant(), PageVariant::ByInstructor);

        let isqs = page.satisfaction().unwrap();
        let grades = page.grades().unwrap();

        let shared = key("COT3100", "Fall 2017", "80001", Some("Smith"));
        assert!(isqs.contains_key(&shared));
        assert!(grades.contains_key(&shared));
        assert!(isqs.contains_key(&key("COP2220", "Spring 2017", "10555", Some("Smith"))));

        // Same offering, same key as the course page produces
        let by_course = IsqPage::parse(BY_COURSE.as_bytes()).satisfaction().unwrap();
        assert!(by_course.contains_key(&shared));
    }

    #[test]
    fn malformed_crn_rows_are_skipped() {
        let page = IsqPage::parse(BY_INSTRUCTOR.as_bytes());
        let grades = page.grades().unwrap();
        // The instructor page tolerates the textual CRN "TBA1"
        assert!(grades.contains_key(&key("COP2220", "Spring 2017", "TBA1", Some("Smith"))));

        let course = IsqPage::parse(BY_COURSE.as_bytes());
        let grades = course.grades().unwrap();
        assert!(grades.keys().all(|k| k.get_section_id().parse::<u32>().is_ok()));
    }

    #[test]
    fn empty_tables_report_no_data() {
        let page = IsqPage::parse(EMPTY.as_bytes());

        match page.satisfaction() {
            Err(Error::NoDataFound { table, subject }) => {
                assert_eq!(table, "ISQs");
                assert_eq!(subject, "COT9999");
            }
            other => panic!("expected NoDataFound, got {:?}", other.map(|m| m.len())),
        }
        assert!(matches!(page.grades(), Err(Error::NoDataFound { .. })));
    }
}
