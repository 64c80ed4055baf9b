// ----------------------------------------------------------------------------
// Harvest pipeline for one course or instructor:
//
//   ISQ/grade page ─┬─> satisfaction (anchor)
//                   └─> grades
//   distinct (course, term) of both ──> schedule pages ──> schedules
//
//   join: satisfaction ⋈ grades ⟕ schedules
//
// Only the anchor is allowed to fail the run. Everything downstream of it
// degrades to less enrichment and is logged.
// ----------------------------------------------------------------------------

use crate::config::Config;
use crate::course_key::*;
use crate::error::{Error, Result};
use crate::fetch::{Fetch, PageRequest};
use crate::isq::*;
use crate::schedule::*;
use crate::terms::Term;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

lazy_static! {
    static ref COURSE_CODE: Regex = Regex::new(r"^[A-Z]{3}\d{4}[A-Z]?$").unwrap();
    static ref INSTRUCTOR_ID: Regex = Regex::new(r"^N\d{8}$").unwrap();
}

/// What a harvest is run for.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum QueryTarget {
    /// e.g. "COT3100"
    Course(String),
    /// e.g. "N00123456"
    Instructor(String),
}

impl QueryTarget {
    pub fn parse(raw: &str) -> Result<QueryTarget> {
        let target = normalize_course_code(raw).to_uppercase();

        if COURSE_CODE.is_match(&target) {
            Ok(QueryTarget::Course(target))
        } else if INSTRUCTOR_ID.is_match(&target) {
            Ok(QueryTarget::Instructor(target))
        } else {
            Err(Error::InvalidTarget(raw.to_string()))
        }
    }

    pub fn name(&self) -> &str {
        match self {
            QueryTarget::Course(code) => code,
            QueryTarget::Instructor(id) => id,
        }
    }

    pub fn variant(&self) -> PageVariant {
        match self {
            QueryTarget::Course(_) => PageVariant::ByCourse,
            QueryTarget::Instructor(_) => PageVariant::ByInstructor,
        }
    }

    pub fn isq_request(&self, config: &Config) -> PageRequest {
        let url = match self {
            QueryTarget::Course(code) => format!(
                "{}?pv_course_id={}",
                config.endpoint("wksfwbs.p_course_isq_grade"),
                code
            ),
            QueryTarget::Instructor(id) => format!(
                "{}?pv_instructor={}",
                config.endpoint("wksfwbs.p_instructor_isq_grade"),
                id
            ),
        };
        PageRequest::get(url)
    }
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryTarget::Course(code) => write!(f, "course {}", code),
            QueryTarget::Instructor(id) => write!(f, "instructor {}", id),
        }
    }
}

/// One feature set attached to a course offering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Feature<'a> {
    Satisfaction(&'a SatisfactionRecord),
    Grades(&'a GradeDistribution),
    Schedule(&'a ScheduleDetail),
}

/// A course offering with all of the data that could be matched to it.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinedRecord {
    pub identity: CourseIdentity,
    pub satisfaction: SatisfactionRecord,
    pub grades: GradeDistribution,
    pub schedule: Option<ScheduleDetail>,
}

impl JoinedRecord {
    pub fn features(&self) -> Vec<Feature<'_>> {
        let mut features = vec![
            Feature::Satisfaction(&self.satisfaction),
            Feature::Grades(&self.grades),
        ];
        if let Some(schedule) = &self.schedule {
            features.push(Feature::Schedule(schedule));
        }
        features
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OmissionReason {
    /// Labs report satisfaction but never grades.
    NoGradeData,
}

impl fmt::Display for OmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OmissionReason::NoGradeData => f.write_str("no grade data"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Omission {
    pub identity: CourseIdentity,
    pub reason: OmissionReason,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct JoinOutcome {
    pub records: Vec<JoinedRecord>,
    pub omitted: Vec<Omission>,
}

/// Inner join of satisfaction and grades, left join of schedules. Output is
/// ordered by key.
pub fn join(
    satisfaction: HashMap<CourseIdentity, SatisfactionRecord>,
    mut grades: HashMap<CourseIdentity, GradeDistribution>,
    mut schedules: HashMap<CourseIdentity, ScheduleDetail>,
) -> JoinOutcome {
    let mut anchor: Vec<(CourseIdentity, SatisfactionRecord)> = satisfaction.into_iter().collect();
    anchor.sort_by(|a, b| a.0.cmp(&b.0));

    let mut outcome = JoinOutcome::default();

    for (identity, satisfaction) in anchor {
        let grades = match grades.remove(&identity) {
            Some(grades) => grades,
            None => {
                info!("Omitting {}: {}", identity, OmissionReason::NoGradeData);
                outcome.omitted.push(Omission {
                    identity,
                    reason: OmissionReason::NoGradeData,
                });
                continue;
            }
        };

        let schedule = schedules.remove(&identity);

        outcome.records.push(JoinedRecord {
            identity,
            satisfaction,
            grades,
            schedule,
        });
    }

    outcome
}

/// Schedule page that could not be used.
#[derive(Debug)]
pub struct ScheduleFailure {
    pub query: ScheduleQuery,
    pub error: Error,
}

/// Everything one run produced.
#[derive(Debug)]
pub struct Harvest {
    pub target: QueryTarget,
    pub records: Vec<JoinedRecord>,
    pub omitted: Vec<Omission>,
    pub schedule_failures: Vec<ScheduleFailure>,
}

/// Distinct schedule pages needed to cover `keys`. Terms that don't
/// translate to a code only lose their schedule lookup.
pub fn schedule_queries<'k, I>(keys: I) -> Vec<ScheduleQuery>
where
    I: IntoIterator<Item = &'k CourseIdentity>,
{
    let mut queries = BTreeSet::new();
    let mut rejected = HashSet::new();

    for key in keys {
        let term = match Term::parse(key.get_term()) {
            Ok(term) => term,
            Err(e) => {
                if rejected.insert(key.get_term().to_string()) {
                    warn!("No schedule lookup for {}: {}", key.get_term(), e);
                }
                continue;
            }
        };

        match ScheduleQuery::new(key.get_course_code(), term) {
            Ok(query) => {
                queries.insert(query);
            }
            Err(e) => {
                if rejected.insert(key.get_course_code().to_string()) {
                    warn!("No schedule lookup for {}: {}", key, e);
                }
            }
        }
    }

    queries.into_iter().collect()
}

/// Adds one page's schedules to `schedules`, the later page winning on a
/// repeated key. Returns how many were replaced.
pub fn merge_schedules(
    schedules: &mut HashMap<CourseIdentity, ScheduleDetail>,
    found: HashMap<CourseIdentity, ScheduleDetail>,
) -> usize {
    let mut replaced = 0;

    for (key, detail) in found {
        if schedules.insert(key.clone(), detail).is_some() {
            debug!("Duplicate schedule for {}, keeping the later one", key);
            replaced += 1;
        }
    }

    replaced
}

fn parse_isq_page(
    body: &[u8],
    target: &QueryTarget,
) -> Result<(
    HashMap<CourseIdentity, SatisfactionRecord>,
    HashMap<CourseIdentity, GradeDistribution>,
)> {
    let page = IsqPage::parse(body);

    if page.get_variant() != target.variant() {
        warn!(
            "Asked for {} but got a {:?} page for {:?}",
            target,
            page.get_variant(),
            page.get_header_text()
        );
    }

    let satisfaction = page.satisfaction()?;

    let grades = match page.grades() {
        Ok(grades) => grades,
        Err(e @ Error::NoDataFound { .. }) => {
            warn!("{}", e);
            HashMap::new()
        }
        Err(e) => return Err(e),
    };

    Ok((satisfaction, grades))
}

pub struct Reconciler<'a, F: Fetch + ?Sized> {
    fetcher: &'a F,
    config: &'a Config,
}

impl<'a, F: Fetch + ?Sized> Reconciler<'a, F> {
    pub fn new(fetcher: &'a F, config: &'a Config) -> Self {
        Reconciler { fetcher, config }
    }

    pub async fn run(&self, target: &QueryTarget) -> Result<Harvest> {
        info!("Harvesting ISQs and grades for {}", target);

        let body = self.fetcher.fetch(&target.isq_request(self.config)).await?;
        let (satisfaction, grades) = parse_isq_page(&body, target)?;

        info!(
            "Found {} ISQ and {} grade rows for {}",
            satisfaction.len(),
            grades.len(),
            target
        );

        let queries = schedule_queries(satisfaction.keys().chain(grades.keys()));
        let mut schedules = HashMap::new();
        let mut schedule_failures = Vec::new();

        // One page at a time, the fetcher paces them
        for query in queries {
            match self.fetch_schedule(&query).await {
                Ok(found) => {
                    info!("Found {} schedules for {}", found.len(), query);
                    merge_schedules(&mut schedules, found);
                }
                Err(error) => {
                    warn!("Skipping schedules for {}: {}", query, error);
                    schedule_failures.push(ScheduleFailure { query, error });
                }
            }
        }

        let outcome = join(satisfaction, grades, schedules);

        info!(
            "Joined {} records for {} ({} omitted, {} schedule pages failed)",
            outcome.records.len(),
            target,
            outcome.omitted.len(),
            schedule_failures.len()
        );

        Ok(Harvest {
            target: target.clone(),
            records: outcome.records,
            omitted: outcome.omitted,
            schedule_failures,
        })
    }

    async fn fetch_schedule(&self, query: &ScheduleQuery) -> Result<HashMap<CourseIdentity, ScheduleDetail>> {
        let body = self.fetcher.fetch(&query.request(self.config)).await?;
        parse_schedule(&body, query.get_term())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(term: &str, crn: &str, instructor: Option<&str>) -> CourseIdentity {
        CourseIdentity::new("COT3100", term, crn, instructor)
    }

    fn satisfaction(rating: f64) -> SatisfactionRecord {
        SatisfactionRecord {
            enrolled: 30,
            responded: 20,
            rating,
            ..SatisfactionRecord::default()
        }
    }

    fn grades(gpa: f64) -> GradeDistribution {
        GradeDistribution {
            percent_a: 40.,
            average_gpa: gpa,
            ..GradeDistribution::default()
        }
    }

    #[test]
    fn targets_by_pattern() {
        assert_eq!(
            QueryTarget::parse("COT3100").unwrap(),
            QueryTarget::Course("COT3100".to_string())
        );
        assert_eq!(
            QueryTarget::parse("cot 3100").unwrap(),
            QueryTarget::Course("COT3100".to_string())
        );
        assert_eq!(
            QueryTarget::parse("MAC2311C").unwrap(),
            QueryTarget::Course("MAC2311C".to_string())
        );
        assert_eq!(
            QueryTarget::parse("N00123456").unwrap(),
            QueryTarget::Instructor("N00123456".to_string())
        );
        assert!(matches!(
            QueryTarget::parse("N0012"),
            Err(Error::InvalidTarget(_))
        ));
        assert!(QueryTarget::parse("John Smith").is_err());
    }

    #[test]
    fn isq_request_per_variant() {
        let config = Config {
            base_url: "http://banner.test".to_string(),
            ..Config::default()
        };

        let course = QueryTarget::parse("COT3100").unwrap();
        assert_eq!(
            course.isq_request(&config).get_url(),
            "http://banner.test/wksfwbs.p_course_isq_grade?pv_course_id=COT3100"
        );
        assert_eq!(course.variant(), PageVariant::ByCourse);

        let instructor = QueryTarget::parse("N00123456").unwrap();
        assert_eq!(
            instructor.isq_request(&config).get_url(),
            "http://banner.test/wksfwbs.p_instructor_isq_grade?pv_instructor=N00123456"
        );
        assert_eq!(instructor.variant(), PageVariant::ByInstructor);
    }

    #[test]
    fn missing_grades_omit_the_record() {
        let lab = key("Fall 2017", "80003", Some("Smith"));
        let lecture = key("Fall 2017", "80001", Some("Smith"));

        let outcome = join(
            HashMap::from([(lab.clone(), satisfaction(4.)), (lecture.clone(), satisfaction(3.))]),
            HashMap::from([(lecture.clone(), grades(3.2))]),
            HashMap::new(),
        );

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].identity, lecture);
        assert_eq!(
            outcome.omitted,
            vec![Omission {
                identity: lab,
                reason: OmissionReason::NoGradeData
            }]
        );
        assert_eq!(OmissionReason::NoGradeData.to_string(), "no grade data");
    }

    #[test]
    fn missing_schedule_keeps_the_record() {
        let lecture = key("Spring 2018", "10002", Some("Jones"));

        let outcome = join(
            HashMap::from([(lecture.clone(), satisfaction(4.5))]),
            HashMap::from([(lecture.clone(), grades(3.))]),
            HashMap::new(),
        );

        assert!(outcome.omitted.is_empty());
        let record = &outcome.records[0];
        assert_eq!(record.schedule, None);
        assert_eq!(record.satisfaction.rating, 4.5);
        assert_eq!(record.grades.average_gpa, 3.);
        assert_eq!(record.features().len(), 2);
    }

    #[test]
    fn schedule_is_attached_on_full_key_match() {
        let lecture = key("Fall 2017", "80001", Some("Smith"));
        let detail = ScheduleDetail {
            title: "Computational Structures".to_string(),
            ..ScheduleDetail::default()
        };

        let outcome = join(
            HashMap::from([(lecture.clone(), satisfaction(4.))]),
            HashMap::from([(lecture.clone(), grades(3.))]),
            HashMap::from([
                (lecture.clone(), detail.clone()),
                // Same section, different instructor: not this offering
                (key("Fall 2017", "80001", Some("Jones")), ScheduleDetail::default()),
            ]),
        );

        let record = &outcome.records[0];
        assert_eq!(record.schedule.as_ref(), Some(&detail));
        assert!(matches!(record.features()[2], Feature::Schedule(s) if s.title == detail.title));
    }

    #[test]
    fn absent_instructor_joins_absent_instructor() {
        let from_isq = CourseIdentity::new("COT3100", "Fall 2017", "80006", Some(""));
        let from_grades = CourseIdentity::new("COT3100", "Fall 2017", "80006", None);

        let outcome = join(
            HashMap::from([(from_isq, satisfaction(4.))]),
            HashMap::from([(from_grades.clone(), grades(3.))]),
            HashMap::from([(from_grades, ScheduleDetail::default())]),
        );

        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.records[0].schedule.is_some());
    }

    #[test]
    fn grade_only_keys_are_ignored() {
        let outcome = join(
            HashMap::new(),
            HashMap::from([(key("Fall 2017", "80009", Some("Lee")), grades(2.))]),
            HashMap::new(),
        );
        assert_eq!(outcome, JoinOutcome::default());
    }

    #[test]
    fn later_schedule_page_wins_on_repeated_key() {
        let lecture = key("Fall 2017", "80001", Some("Smith"));
        let first = ScheduleDetail {
            title: "Discrete Math".to_string(),
            ..ScheduleDetail::default()
        };
        let second = ScheduleDetail {
            title: "Computational Structures".to_string(),
            ..ScheduleDetail::default()
        };

        let mut schedules = HashMap::new();
        assert_eq!(merge_schedules(&mut schedules, HashMap::from([(lecture.clone(), first)])), 0);
        assert_eq!(
            merge_schedules(
                &mut schedules,
                HashMap::from([
                    (lecture.clone(), second.clone()),
                    (key("Fall 2017", "80004", Some("Jones")), ScheduleDetail::default()),
                ])
            ),
            1
        );

        assert_eq!(schedules.len(), 2);
        assert_eq!(schedules[&lecture], second);
    }

    #[test]
    fn one_query_per_course_and_term() {
        let keys = vec![
            key("Fall 2017", "80001", Some("Smith")),
            key("Fall 2017", "80003", Some("Smith")),
            key("Spring 2018", "10002", Some("Jones")),
            key("Winter 2018", "10009", None),
            CourseIdentity::new("COP2220", "Fall 2017", "80100", None),
        ];

        let queries: Vec<String> = schedule_queries(&keys).iter().map(|q| q.to_string()).collect();
        assert_eq!(
            queries,
            vec!["COP2220 Fall 2017", "COT3100 Fall 2017", "COT3100 Spring 2018"]
        );
    }
}
