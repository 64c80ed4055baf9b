//! Flat CSV view of joined records, newest term first.

use crate::config::Config;
use crate::error::Result;
use crate::reconcile::JoinedRecord;
use crate::terms::term_to_code;
use log::info;
use serde::Serialize;
use std::cmp::Ordering;
use std::io;
use std::path::PathBuf;

pub const HEADER: [&str; 26] = [
    "course",
    "term",
    "crn",
    "instructor",
    "enrolled",
    "responded",
    "response_rate",
    "percent_5",
    "percent_4",
    "percent_3",
    "percent_2",
    "percent_1",
    "rating",
    "A",
    "B",
    "C",
    "D",
    "F",
    "average_gpa",
    "start_time",
    "duration",
    "days",
    "building",
    "room",
    "credits",
    "title",
];

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    course: &'a str,
    term: &'a str,
    crn: &'a str,
    instructor: Option<&'a str>,
    enrolled: u32,
    responded: u32,
    response_rate: f64,
    percent_5: f64,
    percent_4: f64,
    percent_3: f64,
    percent_2: f64,
    percent_1: f64,
    rating: f64,
    #[serde(rename = "A")]
    percent_a: f64,
    #[serde(rename = "B")]
    percent_b: f64,
    #[serde(rename = "C")]
    percent_c: f64,
    #[serde(rename = "D")]
    percent_d: f64,
    #[serde(rename = "F")]
    percent_f: f64,
    average_gpa: f64,
    start_time: String,
    duration: Option<i64>,
    days: String,
    building: &'a str,
    room: &'a str,
    credits: Option<u32>,
    title: &'a str,
}

impl<'a> ReportRow<'a> {
    fn new_from_record(record: &'a JoinedRecord) -> ReportRow<'a> {
        let identity = &record.identity;
        let satisfaction = &record.satisfaction;
        let grades = &record.grades;
        let schedule = record.schedule.as_ref();

        ReportRow {
            course: identity.get_course_code(),
            term: identity.get_term(),
            crn: identity.get_section_id(),
            instructor: identity.get_instructor(),
            enrolled: satisfaction.enrolled,
            responded: satisfaction.responded,
            response_rate: satisfaction.response_rate,
            percent_5: satisfaction.percent_5,
            percent_4: satisfaction.percent_4,
            percent_3: satisfaction.percent_3,
            percent_2: satisfaction.percent_2,
            percent_1: satisfaction.percent_1,
            rating: satisfaction.rating,
            percent_a: grades.percent_a,
            percent_b: grades.percent_b,
            percent_c: grades.percent_c,
            percent_d: grades.percent_d,
            percent_f: grades.percent_f,
            average_gpa: grades.average_gpa,
            start_time: schedule.map(|s| s.get_start_code()).unwrap_or_default(),
            duration: schedule.and_then(|s| s.duration),
            days: schedule.map(|s| s.get_days_code()).unwrap_or_default(),
            building: schedule.map(|s| s.location.get_building()).unwrap_or(""),
            room: schedule.map(|s| s.location.get_room()).unwrap_or(""),
            credits: schedule.and_then(|s| s.credits),
            title: schedule.map(|s| s.title.as_str()).unwrap_or(""),
        }
    }
}

fn compare_crns(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Most recent term first, CRN ascending within a term. Terms without a
/// code go last.
pub fn compare_records(a: &JoinedRecord, b: &JoinedRecord) -> Ordering {
    let a_term = term_to_code(a.identity.get_term()).ok();
    let b_term = term_to_code(b.identity.get_term()).ok();

    let by_term = match (a_term, b_term) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.identity.get_term().cmp(b.identity.get_term()),
    };

    by_term
        .then_with(|| compare_crns(a.identity.get_section_id(), b.identity.get_section_id()))
        .then_with(|| a.identity.cmp(&b.identity))
}

pub fn sort_records(records: &mut [JoinedRecord]) {
    records.sort_by(compare_records);
}

/// Writes the header and one row per record, in report order.
pub fn write_rows<W: io::Write>(writer: W, records: &[JoinedRecord]) -> Result<()> {
    let mut sorted: Vec<&JoinedRecord> = records.iter().collect();
    sorted.sort_by(|a, b| compare_records(a, b));

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    // Written by hand so an empty report still has its header
    writer.write_record(HEADER)?;

    for record in sorted {
        writer.serialize(ReportRow::new_from_record(record))?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes `<output_dir>/<name>.csv` and returns its path.
pub fn write_report(config: &Config, name: &str, records: &[JoinedRecord]) -> Result<PathBuf> {
    std::fs::create_dir_all(&config.output_dir)?;
    let path = config.output_dir.join(format!("{}.csv", name));

    let file = std::fs::File::create(&path)?;
    write_rows(file, records)?;

    info!("Wrote {} rows to {}", records.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course_key::CourseIdentity;
    use crate::isq::{GradeDistribution, SatisfactionRecord};
    use crate::schedule::{parse_days, Location, ScheduleDetail};
    use chrono::NaiveTime;

    fn record(term: &str, crn: &str, instructor: Option<&str>) -> JoinedRecord {
        JoinedRecord {
            identity: CourseIdentity::new("COT3100", term, crn, instructor),
            satisfaction: SatisfactionRecord::default(),
            grades: GradeDistribution::default(),
            schedule: None,
        }
    }

    fn csv_lines(records: &[JoinedRecord]) -> Vec<String> {
        let mut out = Vec::new();
        write_rows(&mut out, records).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn newest_term_first_then_crn() {
        let mut records = vec![
            record("Fall 2016", "80010", None),
            record("Spring 2018", "10020", None),
            record("Bogus Term", "1", None),
            record("Spring 2018", "9999", None),
            record("Fall 2017", "80001", None),
        ];
        sort_records(&mut records);

        let order: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.identity.get_term(), r.identity.get_section_id()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Spring 2018", "9999"),
                ("Spring 2018", "10020"),
                ("Fall 2017", "80001"),
                ("Fall 2016", "80010"),
                ("Bogus Term", "1"),
            ]
        );
    }

    #[test]
    fn empty_report_keeps_header() {
        let lines = csv_lines(&[]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("course,term,crn,instructor,enrolled"));
        assert!(lines[0].ends_with("credits,title"));
        assert_eq!(lines[0].split(',').count(), 26);
    }

    #[test]
    fn row_without_schedule_has_blank_schedule_columns() {
        let mut lecture = record("Fall 2017", "80001", None);
        lecture.satisfaction.enrolled = 40;
        lecture.grades.percent_a = 15.;

        let lines = csv_lines(&[lecture]);
        assert_eq!(
            lines[1],
            "COT3100,Fall 2017,80001,,40,0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,15.0,0.0,0.0,0.0,0.0,0.0,,,,,,,"
        );
    }

    #[test]
    fn row_with_schedule() {
        let mut lecture = record("Fall 2017", "80001", Some("Smith"));
        lecture.schedule = Some(ScheduleDetail {
            start_time: NaiveTime::from_hms_opt(15, 5, 0),
            duration: Some(75),
            days: parse_days("TR"),
            location: Location::new_from_string("15-Bldg Name 1201"),
            credits: Some(3),
            title: "Computational Structures".to_string(),
        });

        let lines = csv_lines(&[lecture]);
        assert!(lines[1].starts_with("COT3100,Fall 2017,80001,Smith,"));
        assert!(lines[1].ends_with(",1505,75,TR,15,1201,3,Computational Structures"));
    }

    #[test]
    fn report_file_is_named_after_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_dir: dir.path().join("out"),
            ..Config::default()
        };

        let path = write_report(&config, "COT3100", &[record("Fall 2017", "80001", None)]).unwrap();
        assert_eq!(path, dir.path().join("out").join("COT3100.csv"));
        assert_eq!(std::fs::read_to_string(path).unwrap().lines().count(), 2);
    }
}
