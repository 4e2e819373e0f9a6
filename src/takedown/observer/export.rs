use std::io::Write;

use chrono::SecondsFormat;
use tracing::{debug, instrument};

use crate::takedown::observer::error::Result;
use crate::takedown::observer::store::AccountStore;

/// Column names of the CSV export, in order.
pub const EXPORT_HEADER: [&str; 5] = [
    "Account ID",
    "Username",
    "Countries",
    "Last Reported At",
    "Data Format Version",
];

/// Separator placed between country codes inside the countries column.
pub const COUNTRY_SEPARATOR: &str = ", ";

/// Renders every stored account as a CSV document, most recently reported
/// first.
///
/// The whole document is built in memory so a store failure never yields a
/// truncated file.
#[instrument(level = "info", skip_all)]
pub fn export_csv(store: &AccountStore) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let rows = write_csv(store, &mut buffer)?;
    debug!(rows, bytes = buffer.len(), "export rendered");
    Ok(buffer)
}

/// Writes the CSV export to `output` and returns the number of account rows.
pub fn write_csv<W: Write>(store: &AccountStore, output: W) -> Result<usize> {
    let accounts = store.scan_all()?;

    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(EXPORT_HEADER)?;
    for account in &accounts {
        let countries = account.countries.join(COUNTRY_SEPARATOR);
        let reported_at = account
            .last_reported_at
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        writer.write_record([
            account.id.as_str(),
            account.name.as_str(),
            countries.as_str(),
            reported_at.as_str(),
            account.data_format_version.as_str(),
        ])?;
    }
    writer.flush()?;

    Ok(accounts.len())
}
