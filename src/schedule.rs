// ----------------------------------------------------------------------------
// Parser for the class schedule listing (bwckctlg.p_disp_listcrse), one page
// per course and term. Each section is a pair of rows in the outer table: a
// title row "Title - CRN - SUBJ NUMBER - SECTION" followed by a row holding
// the section's details and a nested table of meeting times.
// ----------------------------------------------------------------------------

use crate::config::Config;
use crate::course_key::*;
use crate::error::{Error, Result};
use crate::fetch::PageRequest;
use crate::html::*;
use crate::terms::Term;
use chrono::NaiveTime;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::fmt;

const TIME_FMT: &str = "%I:%M %p";

lazy_static! {
    static ref SECTION_ROWS: Selector =
        Selector::parse("table.datadisplaytable:nth-child(5) > tbody > tr:nth-child(even)").unwrap();
    static ref TERM_HEADER: Selector = Selector::parse(".staticheaders").unwrap();
    static ref MEETING_ROWS: Selector = Selector::parse("td table.datadisplaytable tr").unwrap();
    static ref CELL: Selector = Selector::parse("td").unwrap();
    static ref LOCATION: Regex = Regex::new(r"([\d]+[A-Z]?)-[a-zA-Z\s.&-]+(\d+)").unwrap();
    static ref CREDITS: Regex = Regex::new(r"(\d+)\.\d{3} Credits").unwrap();
    static ref TITLE_PREFIX: Regex = Regex::new(r"^.*(?:\(\w+\)|H-)\s*").unwrap();
}

// Locations that are not a building number
const LITERAL_LOCATIONS: [&str; 3] = ["Online", "Off Main Campus", "TBA"];

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub fn new_from_char(c: char) -> Option<Self> {
        match c {
            'M' => Some(Day::Monday),
            'T' => Some(Day::Tuesday),
            'W' => Some(Day::Wednesday),
            'R' => Some(Day::Thursday),
            'F' => Some(Day::Friday),
            'S' => Some(Day::Saturday),
            'U' => Some(Day::Sunday),
            _ => None,
        }
    }

    pub fn to_char(&self) -> char {
        match self {
            Day::Monday => 'M',
            Day::Tuesday => 'T',
            Day::Wednesday => 'W',
            Day::Thursday => 'R',
            Day::Friday => 'F',
            Day::Saturday => 'S',
            Day::Sunday => 'U',
        }
    }
}

/// "MWF" -> [Monday, Wednesday, Friday]. Anything that isn't purely day
/// letters ("TBA", blank) means no fixed days.
pub fn parse_days(text: &str) -> Vec<Day> {
    let text: String = text.split_whitespace().collect();
    text.chars()
        .map(Day::new_from_char)
        .collect::<Option<Vec<Day>>>()
        .unwrap_or_default()
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Location {
    building: String,
    room: String,
}

impl Location {
    /// "15-Bldg Name 1201" -> building 15, room 1201.
    pub fn new_from_string(text: &str) -> Location {
        let text = text.trim();

        if LITERAL_LOCATIONS.contains(&text) {
            return Location {
                building: text.to_string(),
                room: String::new(),
            };
        }

        match LOCATION.captures(text) {
            Some(c) => Location {
                building: c[1].to_string(),
                room: c[2].to_string(),
            },
            None => {
                if !text.is_empty() {
                    warn!("Unrecognized location {:?}", text);
                }
                Location::default()
            }
        }
    }

    pub fn get_building(&self) -> &str {
        &self.building
    }

    pub fn get_room(&self) -> &str {
        &self.room
    }
}

/// Start time and length of a meeting, `None` for both when it is "TBA".
pub fn parse_time_range(text: &str) -> (Option<NaiveTime>, Option<i64>) {
    let text = text.trim();
    if text == "TBA" {
        return (None, None);
    }

    let mut split = text.split(" - ");
    let start = split
        .next()
        .and_then(|t| NaiveTime::parse_from_str(t.trim(), TIME_FMT).ok());
    let end = split
        .next()
        .and_then(|t| NaiveTime::parse_from_str(t.trim(), TIME_FMT).ok());

    match (start, end) {
        (Some(start), Some(end)) => (Some(start), Some((end - start).num_minutes())),
        (Some(start), None) => (Some(start), None),
        _ => {
            warn!("Unrecognized meeting time {:?}", text);
            (None, None)
        }
    }
}

/// One section's regular class meeting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScheduleDetail {
    pub start_time: Option<NaiveTime>,
    /// Minutes.
    pub duration: Option<i64>,
    pub days: Vec<Day>,
    pub location: Location,
    pub credits: Option<u32>,
    pub title: String,
}

impl ScheduleDetail {
    /// 24-hour "HHMM", e.g. "1505".
    pub fn get_start_code(&self) -> String {
        self.start_time
            .map(|t| t.format("%H%M").to_string())
            .unwrap_or_default()
    }

    pub fn get_days_code(&self) -> String {
        self.days.iter().map(Day::to_char).collect()
    }
}

/// A schedule page to visit: one course in one term.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ScheduleQuery {
    course_code: String,
    term: Term,
}

impl ScheduleQuery {
    pub fn new(course_code: &str, term: Term) -> Result<ScheduleQuery> {
        let course_code = normalize_course_code(course_code);
        if split_course_code(&course_code).is_none() {
            return Err(Error::MalformedKey {
                field: "course code",
                value: course_code,
            });
        }
        Ok(ScheduleQuery { course_code, term })
    }

    pub fn get_course_code(&self) -> &str {
        &self.course_code
    }

    pub fn get_term(&self) -> &Term {
        &self.term
    }

    pub fn request(&self, config: &Config) -> PageRequest {
        // Checked in new()
        let (subject, number) = split_course_code(&self.course_code).unwrap_or_default();

        PageRequest::get(format!(
            "{}?schd_in=&subj_in={}&crse_in={}&term_in={}",
            config.endpoint("bwckctlg.p_disp_listcrse"),
            subject,
            number,
            self.term.code()
        ))
    }
}

impl fmt::Display for ScheduleQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.course_code, self.term)
    }
}

/// Title row parts. Titles can contain " - " themselves, so the fixed
/// fields are taken from the end.
struct SectionTitle {
    title: String,
    crn: String,
    course_code: String,
}

impl SectionTitle {
    fn parse(text: &str) -> Option<SectionTitle> {
        let parts: Vec<&str> = text.split(" - ").collect();
        if parts.len() < 4 {
            return None;
        }

        let n = parts.len();
        let title = parts[..n - 3].join(" - ");

        Some(SectionTitle {
            title: TITLE_PREFIX.replace(title.trim(), "").trim().to_string(),
            crn: parts[n - 3].trim().to_string(),
            course_code: normalize_course_code(parts[n - 2]),
        })
    }
}

fn previous_row<'a>(row: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    row.prev_siblings().find_map(ElementRef::wrap)
}

/// Term named in the page header, which must be the one that was asked for.
fn page_term(document: &Html, expected: &Term) -> Result<String> {
    // "Fall 2017<br>Jan 01, 2017": only the first line names the term
    let header = document
        .select(&TERM_HEADER)
        .next()
        .and_then(|header| header.text().next())
        .map(normalize_term)
        .unwrap_or_default();

    match Term::parse(&header) {
        Ok(term) if term == *expected => Ok(term.name().to_string()),
        _ => Err(Error::MalformedKey {
            field: "term",
            value: header,
        }),
    }
}

/// Parses every section on one schedule page listing `expected`.
///
/// Sections with no regular "Class" meeting (hybrid schedules) are left out
/// and logged. Sections with several are reduced to the first one.
pub fn parse_schedule(
    body: &[u8],
    expected: &Term,
) -> Result<HashMap<CourseIdentity, ScheduleDetail>> {
    let document = parse_document(body);
    let term = page_term(&document, expected)?;

    let sections: Vec<ElementRef> = document.select(&SECTION_ROWS).collect();
    if sections.is_empty() {
        return Err(Error::NoDataFound {
            table: "schedules",
            subject: term,
        });
    }

    let mut schedules = HashMap::new();

    for section in sections {
        let title_text = previous_row(&section)
            .map(|row| cell_text(&row))
            .unwrap_or_default();

        let title = match SectionTitle::parse(&title_text) {
            Some(title) => title,
            None => {
                warn!("Skipping section with unrecognized title {:?}", title_text);
                continue;
            }
        };

        let crn = match canonical_crn(&title.crn, true) {
            Ok(crn) => crn,
            Err(e) => {
                warn!("Skipping section {:?}: {}", title_text, e);
                continue;
            }
        };

        // Laboratory blocks are ignored
        let meetings: Vec<Vec<String>> = section
            .select(&MEETING_ROWS)
            .map(|row| row_cells(&row, &CELL))
            .filter(|cells| cell(cells, 0).contains("Class"))
            .collect();

        let course = format!("{} {} #{}", title.course_code, term, crn);

        let meeting = match meetings.len() {
            0 => {
                warn!("{} has a hybrid schedule; omitting scheduling data", course);
                continue;
            }
            1 => &meetings[0],
            _ => {
                warn!("{} met at uneven times; omitting additional blocks", course);
                &meetings[0]
            }
        };

        let instructor_text = meeting.last().map(String::as_str).unwrap_or("");
        let instructor = match instructor_last_name(instructor_text) {
            Ok(name) => Some(name),
            Err(e) => {
                debug!("{} has no primary instructor: {}", course, e);
                None
            }
        };

        let (start_time, duration) = parse_time_range(cell(meeting, 1));

        let section_text = cell_text(&section);
        let credits = CREDITS
            .captures(&section_text)
            .and_then(|c| c[1].parse::<u32>().ok());

        let key = CourseIdentity::new(&title.course_code, &term, &crn, instructor.as_deref());
        let detail = ScheduleDetail {
            start_time,
            duration,
            days: parse_days(cell(meeting, 2)),
            location: Location::new_from_string(cell(meeting, 3)),
            credits,
            title: title.title,
        };

        if schedules.insert(key.clone(), detail).is_some() {
            debug!("Duplicate schedule for {}, keeping the later one", key);
        }
    }

    Ok(schedules)
}
