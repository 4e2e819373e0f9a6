use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::takedown::observer::error::Result;
use crate::takedown::observer::model::{Account, Outcome};
use crate::takedown::observer::store::AccountStore;
use crate::takedown::observer::validation::Intake;

/// Applies a validated report to the store as one atomic read-modify-write.
///
/// The lookup, the merge decision and the write share a single transaction,
/// so concurrent submissions for the same account id serialise and never
/// lose a reporter.
#[instrument(
    level = "info",
    skip_all,
    fields(account_id = %intake.account_id(), client_id = %intake.client_id())
)]
pub fn submit(store: &AccountStore, intake: &Intake) -> Result<Outcome> {
    submit_at(store, intake, Utc::now())
}

/// Same as [`submit`] with an explicit server time.
pub fn submit_at(store: &AccountStore, intake: &Intake, now: DateTime<Utc>) -> Result<Outcome> {
    let (account, outcome) = store.transaction(|tx| {
        let existing = tx.get(intake.account_id())?;
        let (account, outcome) = merge(existing, intake, now);
        tx.upsert(&account)?;
        Ok((account, outcome))
    })?;

    match outcome {
        Outcome::Created => info!(account_id = %account.id, "tracking new account"),
        Outcome::Updated => info!(
            account_id = %account.id,
            report_count = account.report_count,
            "refreshed account"
        ),
    }
    Ok(outcome)
}

/// Decides the new state of an account for one report.
///
/// Descriptive fields always take the report's values. The reporter list and
/// count only grow when the client has not reported this account before.
pub fn merge(existing: Option<Account>, intake: &Intake, now: DateTime<Utc>) -> (Account, Outcome) {
    match existing {
        None => (
            Account {
                id: intake.account_id().to_string(),
                name: intake.account_name().to_string(),
                countries: intake.countries().to_vec(),
                last_reported_at: now,
                report_count: 1,
                reported_by: vec![intake.client_id().to_string()],
                data_format_version: intake.data_format_version().to_string(),
            },
            Outcome::Created,
        ),
        Some(mut account) => {
            if account.is_reported_by(intake.client_id()) {
                debug!(account_id = %account.id, "repeat report from known client");
            } else {
                account.reported_by.push(intake.client_id().to_string());
                account.report_count += 1;
            }

            account.name = intake.account_name().to_string();
            account.countries = intake.countries().to_vec();
            account.last_reported_at = account.last_reported_at.max(now);
            account.data_format_version = intake.data_format_version().to_string();
            (account, Outcome::Updated)
        }
    }
}
