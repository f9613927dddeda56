pub mod container;
pub mod crawler;
pub mod image;
pub mod policy;

use regex::Regex;
use sea_orm::DatabaseConnection;

pub use container::ContainerRecord;
pub use image::ImageRecord;
pub use policy::PolicyRecord;

/// Durable store for images, containers, policies, and crawl runs. All
/// mutations are idempotent upserts keyed by the natural keys, so concurrent
/// writers converge; the connection pool is the serialization point.
#[derive(Clone)]
pub struct Datastore {
    db: DatabaseConnection,
}

impl Datastore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Database reachability, used by the health endpoint.
    pub async fn ping(&self) -> bool {
        self.db.ping().await.is_ok()
    }
}

/// Builds the `last_seen` window clauses for list queries. Only inputs
/// matching `YYYY-MM-DD` produce a clause; anything else is dropped before it
/// can reach the SQL string.
pub(crate) fn seen_window_filters(date_start: &str, date_end: &str) -> Vec<String> {
    let date = Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern must be valid");

    let mut clauses = Vec::new();
    if date.is_match(date_start) {
        clauses.push(format!("last_seen >= '{date_start}'::date"));
    }
    if date.is_match(date_end) {
        clauses.push(format!(
            "(last_seen < '{date_end}'::date + '1 day'::interval)"
        ));
    }
    clauses
}

/// Accepts a row limit only when the input is all digits.
pub(crate) fn parse_row_limit(limit: &str) -> Option<u64> {
    let digits = Regex::new(r"^\d+$").expect("limit pattern must be valid");
    if digits.is_match(limit) {
        limit.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_filters_pass_well_formed_dates() {
        let clauses = seen_window_filters("2023-01-02", "2023-02-03");
        assert_eq!(clauses.len(), 2);
        assert!(clauses[0].contains("'2023-01-02'::date"));
        assert!(clauses[1].contains("'2023-02-03'::date"));
    }

    #[test]
    fn window_filters_drop_malformed_dates() {
        assert!(seen_window_filters("", "").is_empty());
        assert!(seen_window_filters("2023-1-2", "03/02/2023").is_empty());
        assert!(seen_window_filters("2023-01-02'; DROP TABLE image_pa;--", "").is_empty());
    }

    #[test]
    fn row_limit_requires_digits() {
        assert_eq!(parse_row_limit("25"), Some(25));
        assert_eq!(parse_row_limit(""), None);
        assert_eq!(parse_row_limit("25; SELECT"), None);
        assert_eq!(parse_row_limit("-1"), None);
    }
}
