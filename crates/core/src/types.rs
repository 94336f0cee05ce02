/// All event timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
