use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The only report format the service accepts.
pub const DATA_FORMAT_VERSION: &str = "1.0";

/// Opaque identifier of a tracked account as reported by clients.
pub type AccountId = String;

/// A reported account as persisted by the store.
///
/// `report_count` always equals `reported_by.len()`. The reporter list is
/// internal bookkeeping and is never serialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub countries: Vec<String>,
    pub last_reported_at: DateTime<Utc>,
    pub report_count: u64,
    #[serde(skip)]
    pub reported_by: Vec<String>,
    pub data_format_version: String,
}

impl Account {
    /// Returns `true` when `client_id` has already been credited to this account.
    pub fn is_reported_by(&self, client_id: &str) -> bool {
        self.reported_by.iter().any(|known| known == client_id)
    }
}

/// Account payload carried inside a [`ReportRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedAccount {
    pub id: String,
    pub name: String,
    pub countries: Vec<String>,
}

/// Wire shape of a single report submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub client_id: String,
    pub account: ReportedAccount,
    pub data_format_version: String,
}

/// One page of the account listing together with the global country facet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsPage {
    pub accounts: Vec<Account>,
    pub total_count: u64,
    pub current_page: u64,
    pub total_pages: u64,
    pub unique_countries: Vec<String>,
}

/// Result of applying a report to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// First accepted report for an unseen account id.
    Created,
    /// The account already existed and was refreshed.
    Updated,
}
