use time::format_description::well_known::Iso8601;
use time::OffsetDateTime;

pub trait TimeSource {
    // Return an ISO timestamp
    fn current_time(&self) -> String;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn current_time(&self) -> String {
        let now = OffsetDateTime::now_utc();
        // Formatting a UTC timestamp with the default ISO 8601 config only fails
        // for years outside +-9999.
        now.format(&Iso8601::DEFAULT)
            .unwrap_or_else(|_| now.unix_timestamp().to_string())
    }
}

/// Always returns the same timestamp.
#[derive(Clone)]
pub struct FixedTime {
    pub time: String,
}

impl TimeSource for FixedTime {
    fn current_time(&self) -> String {
        self.time.to_string()
    }
}
