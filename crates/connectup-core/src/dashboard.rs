//! # Dashboard
//!
//! Admin statistics over the whole store, plus the admin user list
//! helpers (filter options and CSV export).
//!
//! Buckets are computed from a single pass over the records; ordering is
//! deterministic (count descending, then label).

use crate::catalog::Industry;
use crate::filters::UserFilterQueries;
use crate::formats::CsvWriter;
use crate::groups::Group;
use crate::posts::Post;
use crate::showcase::{CompanyProfile, CompanyStatus};
use crate::users::User;
use crate::{CoreResult, IndustryId, Reader, Role, Timestamp};
use chrono::{Duration, Timelike};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Window for "active" users.
pub const ACTIVE_WINDOW_HOURS: i64 = 24;

/// Default length of the signups chart.
pub const DEFAULT_CHART_DAYS: u32 = 7;

/// Cap on the signups chart.
pub const MAX_CHART_DAYS: u32 = 366;

/// Entries in the top industries chart.
pub const TOP_INDUSTRIES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardDetails {
    pub total_users: usize,
    pub active_users: usize,
    pub verified_users: usize,
    pub total_groups: usize,
    pub total_posts: usize,
    pub total_profiles: usize,
    pub pending_profiles: usize,
}

/// One labelled count in a chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub label: String,
    pub count: usize,
}

fn members(tx: &impl Reader) -> CoreResult<Vec<User>> {
    tx.filter::<User>(|u| u.role == Role::User && !u.is_deleted())
}

fn is_active(user: &User, now: Timestamp) -> bool {
    user.last_seen_at
        .is_some_and(|seen| now - seen <= Duration::hours(ACTIVE_WINDOW_HOURS))
}

pub fn details(tx: &impl Reader, now: Timestamp) -> CoreResult<DashboardDetails> {
    let users = members(tx)?;
    let profiles = tx.filter::<CompanyProfile>(|c| !c.deleted)?;
    Ok(DashboardDetails {
        total_users: users.len(),
        active_users: users.iter().filter(|u| is_active(u, now)).count(),
        verified_users: users.iter().filter(|u| u.email_verified_at.is_some()).count(),
        total_groups: tx.filter::<Group>(|g| !g.deleted)?.len(),
        total_posts: tx.filter::<Post>(|p| !p.deleted)?.len(),
        pending_profiles: profiles
            .iter()
            .filter(|c| c.status == CompanyStatus::Pending)
            .count(),
        total_profiles: profiles.len(),
    })
}

/// Sign-ups per day for the last `days` days (today included), oldest first.
pub fn signups_per_day(tx: &impl Reader, days: Option<u32>, now: Timestamp) -> CoreResult<Vec<Bucket>> {
    let days = days.unwrap_or(DEFAULT_CHART_DAYS).clamp(1, MAX_CHART_DAYS);
    let today = now.date_naive();
    let mut counts: BTreeMap<chrono::NaiveDate, usize> = (0..days)
        .map(|back| (today - Duration::days(i64::from(back)), 0))
        .collect();
    for user in members(tx)? {
        if let Some(count) = counts.get_mut(&user.created_at.date_naive()) {
            *count += 1;
        }
    }
    Ok(counts
        .into_iter()
        .map(|(day, count)| Bucket {
            label: day.format("%Y-%m-%d").to_string(),
            count,
        })
        .collect())
}

fn ranked(counts: BTreeMap<String, usize>) -> Vec<Bucket> {
    let mut out: Vec<Bucket> = counts
        .into_iter()
        .map(|(label, count)| Bucket { label, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    out
}

/// Industries by number of users, top entries only.
pub fn top_industries(tx: &impl Reader) -> CoreResult<Vec<Bucket>> {
    let names: BTreeMap<IndustryId, String> = tx
        .all::<Industry>()?
        .into_iter()
        .map(|i| (i.id, i.name))
        .collect();
    let mut counts = BTreeMap::new();
    for user in members(tx)? {
        for id in &user.industry_ids {
            if let Some(name) = names.get(id) {
                *counts.entry(name.clone()).or_insert(0) += 1;
            }
        }
    }
    let mut out = ranked(counts);
    out.truncate(TOP_INDUSTRIES);
    Ok(out)
}

fn by_location(
    tx: &impl Reader,
    now: Timestamp,
    active_only: bool,
    field: fn(&User) -> Option<&str>,
) -> CoreResult<Vec<Bucket>> {
    let mut counts = BTreeMap::new();
    for user in members(tx)? {
        if active_only && !is_active(&user, now) {
            continue;
        }
        if let Some(label) = field(&user).map(str::trim).filter(|s| !s.is_empty()) {
            *counts.entry(label.to_string()).or_insert(0) += 1;
        }
    }
    Ok(ranked(counts))
}

pub fn users_per_country(tx: &impl Reader, now: Timestamp) -> CoreResult<Vec<Bucket>> {
    by_location(tx, now, false, |u| u.country.as_deref())
}

pub fn active_users_per_country(tx: &impl Reader, now: Timestamp) -> CoreResult<Vec<Bucket>> {
    by_location(tx, now, true, |u| u.country.as_deref())
}

pub fn users_per_state(tx: &impl Reader, now: Timestamp) -> CoreResult<Vec<Bucket>> {
    by_location(tx, now, false, |u| u.state.as_deref())
}

pub fn active_users_per_state(tx: &impl Reader, now: Timestamp) -> CoreResult<Vec<Bucket>> {
    by_location(tx, now, true, |u| u.state.as_deref())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveHours {
    /// Hour (UTC, 0-23) with the most users last seen, if anyone was seen.
    pub most_active_hour: Option<u32>,
    /// 24 entries, one per hour.
    pub hours: Vec<usize>,
}

/// Distribution of users' last activity over the hours of the day.
pub fn most_active_time(tx: &impl Reader) -> CoreResult<ActiveHours> {
    let mut hours = vec![0usize; 24];
    for user in members(tx)? {
        if let Some(seen) = user.last_seen_at {
            if let Some(slot) = hours.get_mut(seen.hour() as usize) {
                *slot += 1;
            }
        }
    }
    let most_active_hour = hours
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
        .map(|(hour, _)| hour as u32);
    Ok(ActiveHours {
        most_active_hour,
        hours,
    })
}

// =============================================================================
// ADMIN USER LIST
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilterOptions {
    pub countries: Vec<String>,
    pub states: Vec<String>,
    pub genders: Vec<String>,
    pub industries: Vec<Industry>,
}

/// Distinct values the admin user list can be filtered on.
pub fn user_filter_options(tx: &impl Reader) -> CoreResult<UserFilterOptions> {
    let mut countries = BTreeSet::new();
    let mut states = BTreeSet::new();
    let mut genders = BTreeSet::new();
    let mut industries = BTreeSet::new();
    for user in members(tx)? {
        countries.extend(user.country.clone().filter(|c| !c.is_empty()));
        states.extend(user.state.clone().filter(|s| !s.is_empty()));
        genders.insert(user.gender.as_str().to_string());
        industries.extend(user.industry_ids.iter().copied());
    }
    Ok(UserFilterOptions {
        countries: countries.into_iter().collect(),
        states: states.into_iter().collect(),
        genders: genders.into_iter().collect(),
        industries: tx.filter::<Industry>(|i| industries.contains(&i.id))?,
    })
}

/// CSV export of every user matching the filters (pagination ignored).
pub fn export_users_csv(
    tx: &impl Reader,
    filters: &UserFilterQueries,
    now: Timestamp,
) -> CoreResult<String> {
    let mut csv = CsvWriter::with_header(&[
        "id",
        "name",
        "email",
        "phone",
        "gender",
        "date_of_birth",
        "country",
        "state",
        "email_verified",
        "profile_completed",
        "suspended",
        "created_at",
    ]);
    for user in filters.select(tx, now)? {
        csv.row([
            user.id.to_string(),
            user.name.clone(),
            user.email.clone(),
            user.phone.clone().unwrap_or_default(),
            user.gender.as_str().to_string(),
            user.date_of_birth
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            user.country.clone().unwrap_or_default(),
            user.state.clone().unwrap_or_default(),
            user.email_verified_at.is_some().to_string(),
            user.is_profile_completed().to_string(),
            user.suspended.to_string(),
            user.created_at.to_rfc3339(),
        ]);
    }
    Ok(csv.finish())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Store;
    use crate::catalog::{IndustryCategory, IndustryInput, create_industry};
    use crate::filters::QueryMap;
    use crate::users::tests::{new_user, now};
    use crate::users::{mark_email_verified, ping, set_industries, set_location};

    #[test]
    fn details_count_live_records() {
        let store = Store::in_memory().unwrap();
        let ann = new_user(&store, "Ann").id;
        new_user(&store, "Ben");
        store
            .write(|tx| {
                ping(tx, ann, now())?;
                mark_email_verified(tx, ann, now())
            })
            .unwrap();
        let stats = store.read(|tx| details(tx, now())).unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.active_users, 1);
        assert_eq!(stats.verified_users, 1);
        assert_eq!(stats.total_groups, 0);

        let later = now() + Duration::hours(ACTIVE_WINDOW_HOURS + 1);
        assert_eq!(store.read(|tx| details(tx, later)).unwrap().active_users, 0);
    }

    #[test]
    fn signups_cover_requested_days() {
        let store = Store::in_memory().unwrap();
        new_user(&store, "Ann");
        let chart = store.read(|tx| signups_per_day(tx, None, now())).unwrap();
        assert_eq!(chart.len(), DEFAULT_CHART_DAYS as usize);
        assert_eq!(chart.last().unwrap().label, "2024-05-01");
        assert_eq!(chart.last().unwrap().count, 1);
        assert_eq!(chart[0].count, 0);

        let one = store.read(|tx| signups_per_day(tx, Some(0), now())).unwrap();
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn location_and_industry_rankings() {
        let store = Store::in_memory().unwrap();
        let ann = new_user(&store, "Ann").id;
        let ben = new_user(&store, "Ben").id;
        let cid = new_user(&store, "Cid").id;
        store
            .write(|tx| {
                let tech = create_industry(
                    tx,
                    IndustryInput {
                        name: "Tech".into(),
                        category: IndustryCategory::ConnectionsAndGroups,
                        image_id: None,
                    },
                    now(),
                )?;
                set_location(tx, ann, "India", "Goa")?;
                set_location(tx, ben, "India", "Kerala")?;
                set_location(tx, cid, "Chile", "Maule")?;
                set_industries(tx, ann, &[tech.id])?;
                set_industries(tx, ben, &[tech.id])?;
                ping(tx, cid, now())
            })
            .unwrap();

        let countries = store.read(|tx| users_per_country(tx, now())).unwrap();
        assert_eq!(countries[0], Bucket { label: "India".into(), count: 2 });
        let active = store.read(|tx| active_users_per_country(tx, now())).unwrap();
        assert_eq!(active, vec![Bucket { label: "Chile".into(), count: 1 }]);
        let states = store.read(|tx| users_per_state(tx, now())).unwrap();
        assert_eq!(states.len(), 3);

        let top = store.read(|tx| top_industries(tx)).unwrap();
        assert_eq!(top[0].count, 2);

        let hours = store.read(|tx| most_active_time(tx)).unwrap();
        assert_eq!(hours.most_active_hour, Some(12));
        assert_eq!(hours.hours.len(), 24);

        let options = store.read(|tx| user_filter_options(tx)).unwrap();
        assert_eq!(options.countries, vec!["Chile".to_string(), "India".to_string()]);
        assert_eq!(options.industries.len(), 1);
    }

    #[test]
    fn user_export_follows_filters() {
        let store = Store::in_memory().unwrap();
        new_user(&store, "Ann");
        new_user(&store, "Ben");
        let mut query = QueryMap::new();
        query.insert("searchText".into(), "ann".into());
        let filters = UserFilterQueries::parse(&query).unwrap();
        let csv = store.read(|tx| export_users_csv(tx, &filters, now())).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("ann@example.com"));
    }
}
