use tracing::instrument;

use crate::takedown::observer::error::Result;
use crate::takedown::observer::model::AccountsPage;
use crate::takedown::observer::store::{AccountFilter, AccountStore};

/// Number of accounts returned per listing page.
pub const PAGE_SIZE: u64 = 20;

/// Parameters of one listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: AccountFilter,
    /// 1-based page number. Zero is treated as the first page.
    pub page: u64,
}

impl ListQuery {
    /// Builds a query from raw request values. A missing, unparsable or
    /// non-positive page selects page 1.
    pub fn from_params(page: Option<&str>, country: Option<&str>, search: Option<&str>) -> Self {
        let page = page
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|page| *page >= 1)
            .map_or(1, |page| page as u64);
        Self {
            filter: AccountFilter::new(country, search),
            page,
        }
    }
}

/// Builds one listing page plus the global country facet.
///
/// The facet is computed over every stored account, independently of the
/// filter, so the filter UI always offers the whole corpus.
#[instrument(level = "debug", skip(store))]
pub fn list_accounts(store: &AccountStore, query: &ListQuery) -> Result<AccountsPage> {
    let page = query.page.max(1);
    let offset = (page - 1).saturating_mul(PAGE_SIZE);

    let (accounts, total_count) = store.list_page(&query.filter, offset, PAGE_SIZE)?;
    let unique_countries = store.distinct_countries()?;

    Ok(AccountsPage {
        accounts,
        total_count,
        current_page: page,
        total_pages: total_count.div_ceil(PAGE_SIZE),
        unique_countries,
    })
}
