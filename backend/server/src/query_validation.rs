use chrono::NaiveDate;

/// Required format for date query parameters.
pub const DATE_LAYOUT: &str = "%Y-%m-%d";

/// Validates a `date_start`/`date_end` query parameter. Empty means the
/// filter is unused; anything else must parse as `YYYY-MM-DD`.
pub fn validate_date_param(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Ok(());
    }
    NaiveDate::parse_from_str(value, DATE_LAYOUT)
        .map(|_| ())
        .map_err(|err| {
            format!("Error: {err} - Dates must be in the following format YYYY-MM-DD")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dates_are_allowed() {
        assert!(validate_date_param("").is_ok());
    }

    #[test]
    fn well_formed_dates_pass() {
        assert!(validate_date_param("2023-11-05").is_ok());
    }

    #[test]
    fn malformed_dates_name_the_layout() {
        let err = validate_date_param("11/05/2023").unwrap_err();
        assert!(err.contains("YYYY-MM-DD"));
        assert!(validate_date_param("2023-13-45").is_err());
    }
}
