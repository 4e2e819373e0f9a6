//! Shape checks and sanitisation for incoming reports.
//!
//! Everything here is pure: no check consults the store, and the order in
//! which [`validate_report`] applies them is fixed so that a report with
//! several problems is always rejected for the same reason.

use std::collections::HashSet;

use uuid::Uuid;

use crate::takedown::observer::error::{CountriesReason, FieldReason, Rejection};
use crate::takedown::observer::model::{DATA_FORMAT_VERSION, ReportRequest};

pub const MAX_ACCOUNT_ID_LENGTH: usize = 40;
pub const MAX_ACCOUNT_NAME_LENGTH: usize = 30;
pub const MAX_COUNTRIES: usize = 252;
pub const COUNTRY_CODE_LENGTH: usize = 2;

const CANONICAL_UUID_LENGTH: usize = 36;

/// A report that passed every check, with free text already sanitised.
///
/// Only [`validate_report`] produces values of this type, so holding one is
/// proof that the report may be handed to the aggregation core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intake {
    client_id: String,
    account_id: String,
    account_name: String,
    countries: Vec<String>,
    data_format_version: String,
}

impl Intake {
    /// Client identifier in lowercase hyphenated form.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn countries(&self) -> &[String] {
        &self.countries
    }

    pub fn data_format_version(&self) -> &str {
        &self.data_format_version
    }
}

/// Validates a wire report and turns it into an [`Intake`].
///
/// Checks run in the order client id, format version, account id, account
/// name, countries; the first failure wins.
pub fn validate_report(report: &ReportRequest) -> Result<Intake, Rejection> {
    let client_id = validate_client_id(&report.client_id)?;
    validate_format_version(&report.data_format_version)?;
    validate_account_id(&report.account.id)?;
    validate_account_name(&report.account.name)?;
    validate_countries(&report.account.countries)?;

    Ok(Intake {
        client_id,
        account_id: sanitize_string(&report.account.id),
        account_name: sanitize_string(&report.account.name),
        countries: report.account.countries.clone(),
        data_format_version: report.data_format_version.clone(),
    })
}

/// Accepts a UUID in canonical 8-4-4-4-12 form, in any letter case, and
/// returns it normalised to lowercase.
pub fn validate_client_id(value: &str) -> Result<String, Rejection> {
    if value.len() != CANONICAL_UUID_LENGTH {
        return Err(Rejection::InvalidClientId);
    }
    let uuid = Uuid::try_parse(value).map_err(|_| Rejection::InvalidClientId)?;
    Ok(uuid.hyphenated().to_string())
}

/// Returns `true` when `value` is a canonical UUID in any letter case.
pub fn is_valid_uuid(value: &str) -> bool {
    validate_client_id(value).is_ok()
}

pub fn validate_format_version(version: &str) -> Result<(), Rejection> {
    if version == DATA_FORMAT_VERSION {
        Ok(())
    } else {
        Err(Rejection::UnsupportedVersion)
    }
}

pub fn validate_account_id(id: &str) -> Result<(), Rejection> {
    check_identifier(id, MAX_ACCOUNT_ID_LENGTH, |c| {
        c.is_ascii_alphanumeric() || c == '_' || c == '='
    })
    .map_err(Rejection::InvalidAccountId)
}

pub fn validate_account_name(name: &str) -> Result<(), Rejection> {
    check_identifier(name, MAX_ACCOUNT_NAME_LENGTH, |c| {
        c.is_ascii_alphanumeric() || c == '_'
    })
    .map_err(Rejection::InvalidAccountName)
}

fn check_identifier(
    value: &str,
    max_length: usize,
    allowed: impl Fn(char) -> bool,
) -> Result<(), FieldReason> {
    if value.is_empty() {
        return Err(FieldReason::Empty);
    }
    if value.chars().count() > max_length {
        return Err(FieldReason::TooLong { max: max_length });
    }
    if !value.chars().all(allowed) {
        return Err(FieldReason::InvalidCharacters);
    }
    Ok(())
}

/// Checks a country list: non-empty, bounded, uppercase two-letter codes
/// without exact duplicates. The first offending entry is reported.
pub fn validate_countries(countries: &[String]) -> Result<(), Rejection> {
    if countries.is_empty() {
        return Err(Rejection::InvalidCountries(CountriesReason::Empty));
    }
    if countries.len() > MAX_COUNTRIES {
        return Err(Rejection::InvalidCountries(CountriesReason::TooMany {
            max: MAX_COUNTRIES,
        }));
    }

    let mut seen = HashSet::with_capacity(countries.len());
    for (index, code) in countries.iter().enumerate() {
        if code.chars().count() != COUNTRY_CODE_LENGTH {
            return Err(Rejection::InvalidCountries(CountriesReason::BadLength {
                index,
            }));
        }
        if !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(Rejection::InvalidCountries(CountriesReason::BadFormat {
                index,
            }));
        }
        if !seen.insert(code.as_str()) {
            return Err(Rejection::InvalidCountries(CountriesReason::Duplicate {
                code: code.clone(),
            }));
        }
    }

    Ok(())
}

/// Strips control characters (below U+0020 and U+007F) and surrounding
/// whitespace, then escapes the HTML metacharacters `& < > " '`.
pub fn sanitize_string(input: &str) -> String {
    let stripped: String = input
        .chars()
        .filter(|c| !is_stripped_control(*c))
        .collect();
    escape_html(stripped.trim())
}

fn is_stripped_control(c: char) -> bool {
    (c as u32) < 0x20 || c == '\u{7f}'
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
