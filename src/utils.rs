use axum::http::StatusCode;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::constants::*;
use crate::models::Bill;

pub fn db_error() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ERR_DATABASE_OPERATION.to_string(),
    )
}

pub fn db_error_with_context(context: &str) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Database error: {}", context),
    )
}

pub fn validate_string_length(
    value: &str,
    field_name: &str,
    max_length: usize,
) -> Result<(), (StatusCode, String)> {
    if value.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} cannot be empty", field_name),
        ));
    }
    if value.len() > max_length {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} must be less than {} characters", field_name, max_length),
        ));
    }
    Ok(())
}

pub fn validate_amount(amount: f64) -> Result<(), (StatusCode, String)> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_limit(limit: Option<u32>, default: u32) -> Result<u32, (StatusCode, String)> {
    match limit {
        Some(l) => {
            if l == 0 {
                Err((
                    StatusCode::BAD_REQUEST,
                    "Limit must be greater than 0".to_string(),
                ))
            } else if l > MAX_LIMIT {
                Err((
                    StatusCode::BAD_REQUEST,
                    format!("Limit cannot exceed {}", MAX_LIMIT),
                ))
            } else {
                Ok(l)
            }
        }
        None => Ok(default),
    }
}

/// Display rounding for amounts: whole units from 1000 up, one decimal below.
/// Stored split shares keep two decimals; this is presentation only.
pub fn format_amount(amount: f64) -> String {
    let value = if amount.is_finite() { amount } else { 0.0 };
    if value.abs() >= 1000.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

/// "earliest bill date to today", or "to date" when there are no bills.
pub fn date_range(bills: &[Bill]) -> String {
    let format = format_description!("[year]-[month]-[day]");
    let today = OffsetDateTime::now_utc()
        .date()
        .format(&format)
        .unwrap_or_default();

    let earliest = bills
        .iter()
        .map(|b| b.bill_time)
        .min()
        .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok());

    match earliest {
        Some(date) => {
            let start = date.date().format(&format).unwrap_or_default();
            format!("{} to {}", start, today)
        }
        None => "to date".to_string(),
    }
}
