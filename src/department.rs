// ----------------------------------------------------------------------------
// Department schedule (wksfwbs.p_dept_schd): every section a department offers
// in one term, one table row per meeting. A row carrying a `td[colspan]` in
// place of the section columns is another meeting of the section above it.
// ----------------------------------------------------------------------------

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{Fetch, PageRequest};
use crate::html::*;
use crate::schedule::{parse_days, Day};
use crate::terms::Term;
use chrono::{NaiveDate, NaiveTime};
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use scraper::{ElementRef, Selector};
use serde::Serialize;
use std::path::PathBuf;

const TIME_FMT: &str = "%I:%M%p";
const DATE_FMT: &str = "%m-%d-%Y";

// Meeting cells sit this many columns further left on continuation rows
const CONTINUATION_OFFSET: usize = 4;

lazy_static! {
    static ref ROWS: Selector =
        Selector::parse(".pagebodydiv > .datadisplaytable tr:nth-child(n+2)").unwrap();
    static ref CELL: Selector = Selector::parse("td").unwrap();
    static ref SPANNING_CELL: Selector = Selector::parse("td[colspan]").unwrap();
    static ref LINK: Selector = Selector::parse("a[href]").unwrap();
    static ref INSTRUCTOR_ID: Regex = Regex::new(r"N\d{8}").unwrap();
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Meeting {
    pub kind: String,
    pub begin_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub days: Vec<Day>,
    pub begin_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub building: String,
    pub room: String,
}

impl Meeting {
    /// Meeting cells of a row, `offset` columns left of where a section row
    /// has them.
    fn new_from_cells(cells: &[String], offset: usize, year: u32) -> Meeting {
        let at = |i: usize| cell(cells, i - offset).trim();

        let date = |text: &str| {
            if text.is_empty() {
                return None;
            }
            NaiveDate::parse_from_str(&format!("{}-{}", text, year), DATE_FMT).ok()
        };
        let time = |text: &str| NaiveTime::parse_from_str(text, TIME_FMT).ok();

        Meeting {
            kind: at(11).to_string(),
            begin_date: date(at(6)),
            end_date: date(at(7)),
            days: parse_days(at(8)),
            begin_time: time(at(9)),
            end_time: time(at(10)),
            building: at(12).to_string(),
            room: at(13).to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Meeting::default()
    }

    pub fn get_days_code(&self) -> String {
        self.days.iter().map(Day::to_char).collect()
    }
}

/// One section as listed on the department schedule.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeptSection {
    pub status: Option<String>,
    pub crn: String,
    pub course: String,
    pub title: String,
    pub credits: u32,
    pub part_of_term: String,
    pub meetings: Vec<Meeting>,
    pub campus: String,
    pub wait_count: u32,
    pub approval: Option<String>,
    pub instructor: Option<String>,
    pub instructor_id: Option<String>,
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

impl DeptSection {
    fn new_from_row(row: &ElementRef, cells: &[String], meeting: Meeting) -> DeptSection {
        let instructor_id = row
            .select(&CELL)
            .nth(17)
            .and_then(|td| td.select(&LINK).next())
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| INSTRUCTOR_ID.find(href))
            .map(|m| m.as_str().to_string());

        // "3.000" -> 3; blank for variable credit sections
        let credits = cell(cells, 4)
            .trim()
            .split('.')
            .next()
            .and_then(|c| c.parse::<u32>().ok())
            .unwrap_or(0);

        DeptSection {
            status: non_empty(cell(cells, 0)),
            crn: cell(cells, 1).trim().to_string(),
            course: cell(cells, 2).trim().to_string(),
            title: cell(cells, 3).trim().to_string(),
            credits,
            part_of_term: cell(cells, 5)
                .split(" - ")
                .next()
                .unwrap_or("")
                .trim()
                .to_string(),
            meetings: if meeting.is_empty() { Vec::new() } else { vec![meeting] },
            campus: cell(cells, 14).trim().to_string(),
            wait_count: parse_u32(cell(cells, 15)),
            approval: non_empty(cell(cells, 16)),
            instructor: non_empty(cell(cells, 17)),
            instructor_id,
        }
    }
}

pub fn department_request(config: &Config, department: u32, term: &Term) -> PageRequest {
    PageRequest::post(
        config.endpoint("wksfwbs.p_dept_schd"),
        vec![
            ("pv_term".to_string(), term.code().to_string()),
            ("pv_dept".to_string(), department.to_string()),
            ("pv_ptrm".to_string(), String::new()),
            ("pv_campus".to_string(), String::new()),
            ("pv_sub".to_string(), "Submit".to_string()),
        ],
    )
}

pub fn parse_department(body: &[u8], term: &Term) -> Result<Vec<DeptSection>> {
    let document = parse_document(body);
    let mut sections: Vec<DeptSection> = Vec::new();

    for row in document.select(&ROWS) {
        let cells = row_cells(&row, &CELL);
        if cells.is_empty() {
            continue;
        }

        let continuation = row.select(&SPANNING_CELL).next().is_some();

        if continuation {
            let meeting = Meeting::new_from_cells(&cells, CONTINUATION_OFFSET, term.year());
            match sections.last_mut() {
                Some(parent) => parent.meetings.push(meeting),
                None => warn!("Skipping meeting row with no section above it"),
            }
        } else {
            let meeting = Meeting::new_from_cells(&cells, 0, term.year());
            sections.push(DeptSection::new_from_row(&row, &cells, meeting));
        }
    }

    if sections.is_empty() {
        return Err(Error::NoDataFound {
            table: "sections",
            subject: term.name().to_string(),
        });
    }

    Ok(sections)
}

pub async fn fetch_department<F: Fetch + ?Sized>(
    fetcher: &F,
    config: &Config,
    department: u32,
    term: &Term,
) -> Result<Vec<DeptSection>> {
    info!("Fetching department {} for {}", department, term);
    let body = fetcher.fetch(&department_request(config, department, term)).await?;
    let sections = parse_department(&body, term)?;
    info!("Found {} sections in department {}", sections.len(), department);
    Ok(sections)
}

#[derive(Debug, Default, Serialize)]
struct DepartmentRow<'a> {
    status: &'a str,
    crn: &'a str,
    course: &'a str,
    title: &'a str,
    credits: Option<u32>,
    part_of_term: &'a str,
    begin_date: String,
    end_date: String,
    days: String,
    begin_time: String,
    end_time: String,
    meet_type: &'a str,
    building: &'a str,
    room: &'a str,
    campus: &'a str,
    wait_count: Option<u32>,
    approval: &'a str,
    instructor: &'a str,
}

const DEPARTMENT_HEADER: [&str; 18] = [
    "status",
    "crn",
    "course",
    "title",
    "credits",
    "part_of_term",
    "begin_date",
    "end_date",
    "days",
    "begin_time",
    "end_time",
    "meet_type",
    "building",
    "room",
    "campus",
    "wait_count",
    "approval",
    "instructor",
];

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

fn format_time(time: Option<NaiveTime>) -> String {
    time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default()
}

/// One row per meeting. Only the first meeting of a section repeats the
/// section columns.
pub fn write_department_rows<W: std::io::Write>(writer: W, sections: &[DeptSection]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(DEPARTMENT_HEADER)?;

    for section in sections {
        for (i, meeting) in section.meetings.iter().enumerate() {
            let mut row = DepartmentRow {
                part_of_term: &section.part_of_term,
                begin_date: format_date(meeting.begin_date),
                end_date: format_date(meeting.end_date),
                days: meeting.get_days_code(),
                begin_time: format_time(meeting.begin_time),
                end_time: format_time(meeting.end_time),
                meet_type: &meeting.kind,
                building: &meeting.building,
                room: &meeting.room,
                campus: &section.campus,
                ..DepartmentRow::default()
            };

            if i == 0 {
                row.status = section.status.as_deref().unwrap_or("");
                row.crn = &section.crn;
                row.course = &section.course;
                row.title = &section.title;
                row.credits = Some(section.credits);
                row.wait_count = Some(section.wait_count);
                row.approval = section.approval.as_deref().unwrap_or("");
                row.instructor = section.instructor.as_deref().unwrap_or("");
            }

            writer.serialize(row)?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Writes `<output_dir>/<department>_<term code>.csv`.
pub fn write_department_report(
    config: &Config,
    department: u32,
    term: &Term,
    sections: &[DeptSection],
) -> Result<PathBuf> {
    std::fs::create_dir_all(&config.output_dir)?;
    let path = config
        .output_dir
        .join(format!("{}_{}.csv", department, term.code()));

    write_department_rows(std::fs::File::create(&path)?, sections)?;

    info!("Wrote department {} to {}", department, path.display());
    Ok(path)
}
