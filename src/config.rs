use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://banner.unf.edu/pls/nfpo/";
pub const DEFAULT_FACULTY_URL: &str = "https://webapps.unf.edu/faculty/bio/api/v1/faculty";
pub const DEFAULT_CACHE_DIR: &str = ".isq_harvest/web-cache";
pub const DEFAULT_DB_PATH: &str = ".isq_harvest/isq.db";

const USER_AGENT: &str = concat!("isq-harvest/", env!("CARGO_PKG_VERSION"));

/// Everything a harvest run needs to know about its surroundings.
#[derive(Clone, Debug)]
pub struct Config {
    pub base_url: String,
    pub faculty_url: String,
    /// `None` bypasses the web cache entirely.
    pub cache_dir: Option<PathBuf>,
    pub db_path: PathBuf,
    pub output_dir: PathBuf,
    /// Pause before every network request after the first one.
    pub request_delay: Duration,
    /// Upper bound of the random extra pause added to `request_delay`.
    pub request_jitter: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: DEFAULT_BASE_URL.to_string(),
            faculty_url: DEFAULT_FACULTY_URL.to_string(),
            cache_dir: Some(PathBuf::from(DEFAULT_CACHE_DIR)),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            output_dir: PathBuf::from("."),
            request_delay: Duration::from_millis(1000),
            request_jitter: Duration::from_millis(100),
            timeout: Duration::from_secs(30),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Absolute URL of a Banner procedure, e.g. `endpoint("wksfwbs.p_dept_schd")`.
    pub fn endpoint(&self, procedure: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            procedure.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_with_one_slash() {
        let mut config = Config::default();
        assert_eq!(
            config.endpoint("wksfwbs.p_dept_schd"),
            "https://banner.unf.edu/pls/nfpo/wksfwbs.p_dept_schd"
        );

        config.base_url = "http://127.0.0.1:4000".to_string();
        assert_eq!(config.endpoint("/a?b=c"), "http://127.0.0.1:4000/a?b=c");
    }
}
