//! # Query filters
//!
//! Parsing of pagination and admin user-filter query strings, and the
//! predicate that applies a parsed filter to a user.
//!
//! Empty values count as absent. Integer parsing accepts an optional sign;
//! booleans accept `1 t T TRUE true True 0 f F FALSE false False`.

use crate::response::Page;
use crate::users::User;
use crate::{CoreError, CoreResult, IndustryId, Reader, Role, Timestamp};
use std::collections::BTreeMap;

/// Default page size.
pub const DEFAULT_LIMIT: usize = 10;

/// Raw query string parameters.
pub type QueryMap = BTreeMap<String, String>;

fn value<'a>(query: &'a QueryMap, key: &str) -> Option<&'a str> {
    query.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn parse_int(raw: &str, key: &str) -> CoreResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| CoreError::Invalid(format!("invalid {key}")))
}

/// Parse a boolean the way query strings spell them.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|v| v.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

// =============================================================================
// PAGINATION
// =============================================================================

/// `page` / `limit` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    /// `limit` defaults to 10 (also for values <= 0), `page` to 0 (also for
    /// negative values). Non-integers are rejected.
    pub fn parse(query: &QueryMap) -> CoreResult<Self> {
        let limit = match value(query, "limit") {
            Some(raw) => match parse_int(raw, "limit")? {
                n if n <= 0 => DEFAULT_LIMIT,
                n => usize::try_from(n).unwrap_or(DEFAULT_LIMIT),
            },
            None => DEFAULT_LIMIT,
        };
        let page = match value(query, "page") {
            Some(raw) => usize::try_from(parse_int(raw, "page")?.max(0)).unwrap_or(0),
            None => 0,
        };
        Ok(Self { page, limit })
    }

    #[must_use]
    pub fn apply<T>(self, all: Vec<T>) -> Page<T> {
        Page::slice(all, self.page, self.limit)
    }
}

/// Optional `searchText`, trimmed and lower-cased.
#[must_use]
pub fn search_text(query: &QueryMap) -> Option<String> {
    value(query, "searchText")
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

/// Case-insensitive containment used by every `searchText` filter.
#[must_use]
pub fn matches_search(needle: Option<&str>, haystacks: &[&str]) -> bool {
    match needle {
        None => true,
        Some(needle) => haystacks
            .iter()
            .any(|h| h.to_lowercase().contains(needle)),
    }
}

// =============================================================================
// USER FILTERS
// =============================================================================

/// Admin user-list filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilterQueries {
    pub pagination: Pagination,
    pub countries: Vec<String>,
    pub states: Vec<String>,
    pub genders: Vec<String>,
    pub from_age: Option<i64>,
    pub to_age: Option<i64>,
    pub industries: Vec<IndustryId>,
    pub is_verified: Option<bool>,
    pub is_completed: Option<bool>,
    pub search_text: Option<String>,
}

impl UserFilterQueries {
    /// Parse the admin user filters.
    ///
    /// A non-integer `fromAge` or `toAge` ends parsing early: the filters
    /// read so far are returned and the remaining keys are ignored.
    pub fn parse(query: &QueryMap) -> CoreResult<Self> {
        let mut filters = Self {
            pagination: Pagination::parse(query)?,
            countries: split_list(value(query, "countries")),
            states: split_list(value(query, "states")),
            genders: split_list(value(query, "gender")),
            ..Self::default()
        };

        if let Some(raw) = value(query, "fromAge") {
            match raw.parse::<i64>() {
                Ok(age) => filters.from_age = Some(age),
                Err(_) => return Ok(filters),
            }
        }
        if let Some(raw) = value(query, "toAge") {
            match raw.parse::<i64>() {
                Ok(age) => filters.to_age = Some(age),
                Err(_) => return Ok(filters),
            }
        }

        if let Some(raw) = value(query, "industries") {
            filters.industries = raw
                .split(',')
                .map(|s| {
                    s.trim()
                        .parse::<u64>()
                        .map(IndustryId)
                        .map_err(|_| CoreError::invalid("invalid industries"))
                })
                .collect::<CoreResult<_>>()?;
        }
        if let Some(raw) = value(query, "isVerified") {
            filters.is_verified =
                Some(parse_bool(raw).ok_or_else(|| CoreError::invalid("invalid isVerified"))?);
        }
        if let Some(raw) = value(query, "isCompleted") {
            filters.is_completed =
                Some(parse_bool(raw).ok_or_else(|| CoreError::invalid("invalid isCompleted"))?);
        }
        filters.search_text = search_text(query);
        Ok(filters)
    }

    /// True if `user` passes every filter. Ages are taken on `now`'s date;
    /// users without a birth date fail any age bound.
    #[must_use]
    pub fn matches(&self, user: &User, now: Timestamp) -> bool {
        let in_list = |list: &[String], value: Option<&str>| {
            list.is_empty()
                || value.is_some_and(|v| list.iter().any(|item| item.trim().eq_ignore_ascii_case(v)))
        };
        if !in_list(&self.countries, user.country.as_deref())
            || !in_list(&self.states, user.state.as_deref())
            || !in_list(&self.genders, Some(user.gender.as_str()))
        {
            return false;
        }
        if self.from_age.is_some() || self.to_age.is_some() {
            let Some(age) = user.age_on(now.date_naive()).map(i64::from) else {
                return false;
            };
            if self.from_age.is_some_and(|from| age < from)
                || self.to_age.is_some_and(|to| age > to)
            {
                return false;
            }
        }
        if !self.industries.is_empty()
            && !user.industry_ids.iter().any(|id| self.industries.contains(id))
        {
            return false;
        }
        if self
            .is_verified
            .is_some_and(|want| want != user.email_verified_at.is_some())
        {
            return false;
        }
        if self
            .is_completed
            .is_some_and(|want| want != user.is_profile_completed())
        {
            return false;
        }
        matches_search(self.search_text.as_deref(), &[&user.name, &user.email])
    }

    /// Every live, non-admin user that matches, newest first (unpaged).
    pub fn select(&self, tx: &impl Reader, now: Timestamp) -> CoreResult<Vec<User>> {
        let mut users = tx.filter::<User>(|u| {
            !u.is_deleted() && u.role == Role::User && self.matches(u, now)
        })?;
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(users)
    }

    /// One page of [`select`](Self::select).
    pub fn page(&self, tx: &impl Reader, now: Timestamp) -> CoreResult<Page<User>> {
        Ok(self.pagination.apply(self.select(tx, now)?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Store;
    use crate::users::tests::{new_user, now};
    use crate::users::{Gender, ProfileEdit, edit_profile};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn query(pairs: &[(&str, &str)]) -> QueryMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let f = UserFilterQueries::parse(&QueryMap::new()).unwrap();
        assert_eq!(f.pagination, Pagination { page: 0, limit: 10 });
        assert!(f.countries.is_empty() && f.genders.is_empty());
        assert!(f.is_verified.is_none());
    }

    #[test]
    fn limit_and_page_rules() {
        let f = Pagination::parse(&query(&[("limit", "0"), ("page", "-3")])).unwrap();
        assert_eq!(f, Pagination { page: 0, limit: 10 });
        let f = Pagination::parse(&query(&[("limit", "25"), ("page", "2")])).unwrap();
        assert_eq!(f, Pagination { page: 2, limit: 25 });
        assert!(Pagination::parse(&query(&[("limit", "ten")])).is_err());
        assert!(Pagination::parse(&query(&[("page", "1.5")])).is_err());
        // Empty values are treated as absent.
        assert_eq!(
            Pagination::parse(&query(&[("limit", "")])).unwrap(),
            Pagination::default()
        );
    }

    #[test]
    fn lists_are_split() {
        let f = UserFilterQueries::parse(&query(&[
            ("countries", "India,Kenya"),
            ("states", "Goa"),
            ("gender", "male,female"),
            ("industries", "1,2"),
        ]))
        .unwrap();
        assert_eq!(f.countries, vec!["India", "Kenya"]);
        assert_eq!(f.states, vec!["Goa"]);
        assert_eq!(f.genders, vec!["male", "female"]);
        assert_eq!(f.industries, vec![IndustryId(1), IndustryId(2)]);
    }

    #[test]
    fn bad_age_stops_parsing_without_error() {
        let f = UserFilterQueries::parse(&query(&[
            ("countries", "India"),
            ("fromAge", "abc"),
            ("industries", "x"),
            ("isVerified", "maybe"),
        ]))
        .unwrap();
        assert_eq!(f.countries, vec!["India"]);
        assert!(f.from_age.is_none());
        assert!(f.industries.is_empty());
        assert!(f.is_verified.is_none());

        let f = UserFilterQueries::parse(&query(&[("fromAge", "20"), ("toAge", "x")])).unwrap();
        assert_eq!(f.from_age, Some(20));
        assert!(f.to_age.is_none());
    }

    #[test]
    fn bad_industries_and_bools_fail() {
        assert!(UserFilterQueries::parse(&query(&[("industries", "1,x")])).is_err());
        assert!(UserFilterQueries::parse(&query(&[("isVerified", "yes")])).is_err());
        assert!(UserFilterQueries::parse(&query(&[("isCompleted", "tRuE")])).is_err());
        let f = UserFilterQueries::parse(&query(&[("isVerified", "T"), ("isCompleted", "0")]))
            .unwrap();
        assert_eq!(f.is_verified, Some(true));
        assert_eq!(f.is_completed, Some(false));
    }

    #[test]
    fn filters_select_users() {
        let store = Store::in_memory().unwrap();
        let ann = new_user(&store, "Ann");
        let ben = new_user(&store, "Ben");
        store
            .write(|tx| {
                edit_profile(
                    tx,
                    ann.id,
                    ProfileEdit {
                        gender: Some(Gender::Female),
                        date_of_birth: NaiveDate::from_ymd_opt(1990, 6, 1),
                        country: Some("India".into()),
                        ..ProfileEdit::default()
                    },
                    now().date_naive(),
                )
            })
            .unwrap();

        let f = UserFilterQueries::parse(&query(&[("countries", "india"), ("fromAge", "30")]))
            .unwrap();
        let found = store.read(|tx| f.select(tx, now())).unwrap();
        assert_eq!(found.iter().map(|u| u.id).collect::<Vec<_>>(), vec![ann.id]);

        let f = UserFilterQueries::parse(&query(&[("toAge", "30")])).unwrap();
        assert!(store.read(|tx| f.select(tx, now())).unwrap().is_empty());

        let f = UserFilterQueries::parse(&query(&[("searchText", "BEN")])).unwrap();
        let found = store.read(|tx| f.select(tx, now())).unwrap();
        assert_eq!(found.iter().map(|u| u.id).collect::<Vec<_>>(), vec![ben.id]);

        let all = UserFilterQueries::default();
        let page = store.read(|tx| all.page(tx, now())).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].id, ben.id);
    }

    proptest! {
        #[test]
        fn non_positive_limits_fall_back(limit in i64::MIN..=0) {
            let p = Pagination::parse(&query(&[("limit", &limit.to_string())])).unwrap();
            prop_assert_eq!(p.limit, DEFAULT_LIMIT);
        }

        #[test]
        fn positive_limits_are_kept(limit in 1i64..100_000) {
            let p = Pagination::parse(&query(&[("limit", &limit.to_string())])).unwrap();
            prop_assert_eq!(p.limit as i64, limit);
        }

        #[test]
        fn negative_pages_clamp(page in i64::MIN..0) {
            let p = Pagination::parse(&query(&[("page", &page.to_string())])).unwrap();
            prop_assert_eq!(p.page, 0);
        }
    }
}
