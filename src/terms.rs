// ----------------------------------------------------------------------------
// Banner identifies a term by a numeric code (Fall 2017 is 201780). The
// season digit moved from the ones place to the tens place after Spring 2014,
// so "Spring 2014" is the last term encoded with a single digit.
// ----------------------------------------------------------------------------

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

const SCHEME_CHANGE_YEAR: u32 = 2014;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Season {
    Spring,
    Summer,
    Fall,
}

impl Season {
    pub fn new_from_string(s: &str) -> Option<Season> {
        match s {
            "Spring" => Some(Season::Spring),
            "Summer" => Some(Season::Summer),
            "Fall" => Some(Season::Fall),
            _ => None,
        }
    }

    pub fn new_from_digit(d: u32) -> Option<Season> {
        match d {
            1 => Some(Season::Spring),
            5 => Some(Season::Summer),
            8 => Some(Season::Fall),
            _ => None,
        }
    }

    pub fn to_digit(&self) -> u32 {
        match self {
            Season::Spring => 1,
            Season::Summer => 5,
            Season::Fall => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
        }
    }
}

fn is_scaled(season: Season, year: u32) -> bool {
    year >= SCHEME_CHANGE_YEAR && !(season == Season::Spring && year == SCHEME_CHANGE_YEAR)
}

/// Translates a term like "Fall 2017" into its Banner code (201780).
pub fn term_to_code(term: &str) -> Result<u32> {
    let invalid = || Error::InvalidTerm {
        term: term.to_string(),
    };

    let mut split = term.split_whitespace();

    let season = split
        .next()
        .and_then(Season::new_from_string)
        .ok_or_else(invalid)?;

    let year = split
        .next()
        .filter(|y| y.len() == 4)
        .and_then(|y| y.parse::<u32>().ok())
        .ok_or_else(invalid)?;

    if split.next().is_some() {
        return Err(invalid());
    }

    let mut digit = season.to_digit();
    if is_scaled(season, year) {
        digit *= 10;
    }

    Ok(year * 100 + digit)
}

/// Inverse of [`term_to_code`]: 201780 becomes "Fall 2017".
pub fn code_to_term(code: u32) -> Result<String> {
    let invalid = || Error::InvalidTerm {
        term: code.to_string(),
    };

    let year = code / 100;
    let suffix = code % 100;

    if !(1000..=9999).contains(&year) {
        return Err(invalid());
    }

    let (digit, scaled) = if suffix >= 10 && suffix % 10 == 0 {
        (suffix / 10, true)
    } else {
        (suffix, false)
    };

    let season = Season::new_from_digit(digit).ok_or_else(invalid)?;

    // Each term has exactly one valid encoding
    if is_scaled(season, year) != scaled {
        return Err(invalid());
    }

    Ok(format!("{} {}", season.name(), year))
}

/// A validated term, ordered chronologically through its code.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Term {
    name: String,
    code: u32,
}

impl Term {
    pub fn parse(term: &str) -> Result<Term> {
        let code = term_to_code(term)?;
        // Re-derive the name so "Fall  2017" and "Fall 2017" compare equal
        let name = code_to_term(code)?;
        Ok(Term { name, code })
    }

    pub fn from_code(code: u32) -> Result<Term> {
        let name = code_to_term(code)?;
        Ok(Term { name, code })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn year(&self) -> u32 {
        self.code / 100
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code.cmp(&other.code)
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
