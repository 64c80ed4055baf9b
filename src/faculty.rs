// Resolves a person's name to their instructor id through the public faculty
// directory, so "John Smith" can be harvested like "N00123456".

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{Fetch, PageRequest};
use crate::reconcile::QueryTarget;
use lazy_static::lazy_static;
use log::info;
use regex::Regex;

lazy_static! {
    static ref INSTRUCTOR_ID: Regex = Regex::new(r"N\d{8}").unwrap();
    static ref PERSON_NAME: Regex = Regex::new(r"^[A-Za-z][A-Za-z .'-]*[A-Za-z.]$").unwrap();
}

/// Whether `raw` could be someone's name rather than a mistyped id.
pub fn looks_like_name(raw: &str) -> bool {
    let raw = raw.trim();
    raw.len() > 2 && PERSON_NAME.is_match(raw) && !INSTRUCTOR_ID.is_match(raw)
}

pub fn faculty_request(config: &Config, name: &str) -> Result<PageRequest> {
    let url = reqwest::Url::parse_with_params(
        &config.faculty_url,
        &[("searchLimit", "1"), ("searchTerm", name.trim())],
    )
    .map_err(|e| Error::Config(format!("faculty url {:?}: {}", config.faculty_url, e)))?;

    Ok(PageRequest::get(url.to_string()))
}

/// First instructor id anywhere in a directory response.
pub fn find_instructor_id(body: &[u8]) -> Option<String> {
    INSTRUCTOR_ID
        .find(&String::from_utf8_lossy(body))
        .map(|m| m.as_str().to_string())
}

/// Course code or instructor id as given, otherwise a directory lookup by name.
pub async fn resolve_target<F: Fetch + ?Sized>(
    fetcher: &F,
    config: &Config,
    raw: &str,
) -> Result<QueryTarget> {
    match QueryTarget::parse(raw) {
        Ok(target) => return Ok(target),
        Err(e) if !looks_like_name(raw) => return Err(e),
        Err(_) => {}
    }

    info!("Looking up {:?} in the faculty directory", raw);
    let body = fetcher.fetch(&faculty_request(config, raw)?).await?;

    let id = find_instructor_id(&body).ok_or_else(|| Error::InvalidTarget(raw.to_string()))?;
    info!("{:?} is instructor {}", raw, id);

    Ok(QueryTarget::Instructor(id))
}
