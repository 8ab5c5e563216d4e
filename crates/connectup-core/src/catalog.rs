//! # Catalog
//!
//! Admin-managed reference data (industries, report types, FAQs), user
//! feedback and broadcast history.

use crate::filters::{Pagination, QueryMap, UserFilterQueries, matches_search};
use crate::notifications::{self, Draft, NotificationKind, Notified};
use crate::response::Page;
use crate::storage::{Record, RecordTable};
use crate::users::User;
use crate::{
    BroadcastId, CoreError, CoreResult, IndustryId, Reader, ReportTypeId, Timestamp, UploadId,
    UserId, WriteTx,
};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};

// =============================================================================
// INDUSTRIES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndustryCategory {
    #[default]
    ConnectionsAndGroups,
    Showcase,
}

impl IndustryCategory {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        match raw {
            "connections_and_groups" => Ok(Self::ConnectionsAndGroups),
            "showcase" => Ok(Self::Showcase),
            _ => Err(CoreError::invalid("invalid category")),
        }
    }

    #[must_use]
    pub fn all() -> [Self; 2] {
        [Self::ConnectionsAndGroups, Self::Showcase]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Industry {
    pub id: IndustryId,
    pub name: String,
    pub category: IndustryCategory,
    pub image_id: Option<UploadId>,
    pub created_at: Timestamp,
}

impl Record for Industry {
    const TABLE: RecordTable = TableDefinition::new("industries");
    const KIND: &'static str = "industry";
    fn key(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndustryInput {
    pub name: String,
    #[serde(default)]
    pub category: IndustryCategory,
    #[serde(default)]
    pub image_id: Option<UploadId>,
}

fn check_industry_name(
    tx: &impl Reader,
    name: &str,
    category: IndustryCategory,
    except: Option<IndustryId>,
) -> CoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::invalid("name cannot be empty"));
    }
    let taken = tx
        .find::<Industry>(|i| {
            i.category == category && i.name.eq_ignore_ascii_case(name) && Some(i.id) != except
        })?
        .is_some();
    if taken {
        return Err(CoreError::conflict("industry already exists"));
    }
    Ok(name.to_string())
}

pub fn create_industry(tx: &WriteTx, input: IndustryInput, now: Timestamp) -> CoreResult<Industry> {
    let name = check_industry_name(tx, &input.name, input.category, None)?;
    let industry = Industry {
        id: IndustryId(tx.next_id::<Industry>()?),
        name,
        category: input.category,
        image_id: input.image_id,
        created_at: now,
    };
    tx.put(&industry)?;
    Ok(industry)
}

pub fn update_industry(tx: &WriteTx, id: IndustryId, input: IndustryInput) -> CoreResult<Industry> {
    let mut industry: Industry = tx.require(id.0)?;
    industry.name = check_industry_name(tx, &input.name, input.category, Some(id))?;
    industry.category = input.category;
    if input.image_id.is_some() {
        industry.image_id = input.image_id;
    }
    tx.put(&industry)?;
    Ok(industry)
}

/// Delete an industry and drop it from every user.
pub fn delete_industry(tx: &WriteTx, id: IndustryId) -> CoreResult<()> {
    let _: Industry = tx.require(id.0)?;
    tx.remove::<Industry>(id.0)?;
    for mut user in tx.filter::<User>(|u| u.industry_ids.contains(&id))? {
        user.industry_ids.retain(|i| *i != id);
        tx.put(&user)?;
    }
    Ok(())
}

/// Admin listing: `page`, `limit`, `searchText`, `category`.
pub fn industries(tx: &impl Reader, query: &QueryMap) -> CoreResult<Page<Industry>> {
    let pagination = Pagination::parse(query)?;
    let search = crate::filters::search_text(query);
    let category = match query.get("category").filter(|c| !c.is_empty()) {
        Some(raw) => Some(IndustryCategory::parse(raw)?),
        None => None,
    };
    let all = tx.filter::<Industry>(|i| {
        category.is_none_or(|c| i.category == c) && matches_search(search.as_deref(), &[&i.name])
    })?;
    Ok(pagination.apply(all))
}

/// Every industry of a category, by name.
pub fn industries_in(tx: &impl Reader, category: IndustryCategory) -> CoreResult<Vec<Industry>> {
    let mut all = tx.filter::<Industry>(|i| i.category == category)?;
    all.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(all)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndustriesCount {
    pub connections_and_groups: usize,
    pub showcase: usize,
    pub total: usize,
}

pub fn industries_count(tx: &impl Reader) -> CoreResult<IndustriesCount> {
    let all = tx.all::<Industry>()?;
    let showcase = all
        .iter()
        .filter(|i| i.category == IndustryCategory::Showcase)
        .count();
    Ok(IndustriesCount {
        connections_and_groups: all.len() - showcase,
        showcase,
        total: all.len(),
    })
}

// =============================================================================
// REPORT TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportTarget {
    Group,
    Post,
    Comment,
    Profile,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportType {
    pub id: ReportTypeId,
    pub name: String,
    pub target: ReportTarget,
}

impl Record for ReportType {
    const TABLE: RecordTable = TableDefinition::new("report_types");
    const KIND: &'static str = "report type";
    fn key(&self) -> u64 {
        self.id.0
    }
}

pub fn create_report_type(tx: &WriteTx, name: &str, target: ReportTarget) -> CoreResult<ReportType> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::invalid("name cannot be empty"));
    }
    if tx
        .find::<ReportType>(|r| r.target == target && r.name.eq_ignore_ascii_case(name))?
        .is_some()
    {
        return Err(CoreError::conflict("report type already exists"));
    }
    let report_type = ReportType {
        id: ReportTypeId(tx.next_id::<ReportType>()?),
        name: name.to_string(),
        target,
    };
    tx.put(&report_type)?;
    Ok(report_type)
}

pub fn report_types(tx: &impl Reader, target: Option<ReportTarget>) -> CoreResult<Vec<ReportType>> {
    tx.filter::<ReportType>(|r| target.is_none_or(|t| r.target == t))
}

/// Check a report type exists and applies to `target`.
pub fn require_report_type(
    tx: &impl Reader,
    id: ReportTypeId,
    target: ReportTarget,
) -> CoreResult<ReportType> {
    let report_type: ReportType = tx.require(id.0)?;
    if report_type.target != target {
        return Err(CoreError::invalid("report type does not apply here"));
    }
    Ok(report_type)
}

// =============================================================================
// FAQS AND FEEDBACK
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faq {
    pub id: u64,
    pub question: String,
    pub answer: String,
}

impl Record for Faq {
    const TABLE: RecordTable = TableDefinition::new("faqs");
    const KIND: &'static str = "faq";
    fn key(&self) -> u64 {
        self.id
    }
}

pub fn create_faq(tx: &WriteTx, question: &str, answer: &str) -> CoreResult<Faq> {
    if question.trim().is_empty() || answer.trim().is_empty() {
        return Err(CoreError::invalid("question and answer are required"));
    }
    let faq = Faq {
        id: tx.next_id::<Faq>()?,
        question: question.trim().to_string(),
        answer: answer.trim().to_string(),
    };
    tx.put(&faq)?;
    Ok(faq)
}

pub fn delete_faq(tx: &WriteTx, id: u64) -> CoreResult<()> {
    let _: Faq = tx.require(id)?;
    tx.remove::<Faq>(id)
}

/// Every FAQ in creation order.
pub fn faqs(tx: &impl Reader) -> CoreResult<Vec<Faq>> {
    tx.all::<Faq>()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: u64,
    pub user_id: Option<UserId>,
    pub email: Option<String>,
    pub message: String,
    pub created_at: Timestamp,
}

impl Record for Feedback {
    const TABLE: RecordTable = TableDefinition::new("feedback");
    const KIND: &'static str = "feedback";
    fn key(&self) -> u64 {
        self.id
    }
}

pub fn submit_feedback(
    tx: &WriteTx,
    user_id: Option<UserId>,
    email: Option<String>,
    message: &str,
    now: Timestamp,
) -> CoreResult<Feedback> {
    let message = message.trim();
    if message.is_empty() {
        return Err(CoreError::invalid("message cannot be empty"));
    }
    let feedback = Feedback {
        id: tx.next_id::<Feedback>()?,
        user_id,
        email: email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()),
        message: message.to_string(),
        created_at: now,
    };
    tx.put(&feedback)?;
    Ok(feedback)
}

pub fn feedback(tx: &impl Reader, pagination: Pagination) -> CoreResult<Page<Feedback>> {
    let mut all = tx.all::<Feedback>()?;
    all.reverse();
    Ok(pagination.apply(all))
}

// =============================================================================
// BROADCASTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    pub id: BroadcastId,
    pub title: String,
    pub body: String,
    /// Filter query the audience was selected with.
    pub audience: QueryMap,
    pub recipients: u64,
    pub sent_by: UserId,
    pub created_at: Timestamp,
}

impl Record for Broadcast {
    const TABLE: RecordTable = TableDefinition::new("broadcasts");
    const KIND: &'static str = "broadcast";
    fn key(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastInput {
    pub title: String,
    pub body: String,
    /// User filter keys (`countries`, `gender`, `industries`, ...).
    #[serde(default)]
    pub audience: QueryMap,
}

/// Notify every active user matching the audience and record the broadcast.
pub fn broadcast(
    tx: &WriteTx,
    admin: UserId,
    input: BroadcastInput,
    now: Timestamp,
) -> CoreResult<Notified<Broadcast>> {
    if input.title.trim().is_empty() || input.body.trim().is_empty() {
        return Err(CoreError::invalid("title and body are required"));
    }
    let filters = UserFilterQueries::parse(&input.audience)?;
    let recipients: Vec<UserId> = filters
        .select(tx, now)?
        .into_iter()
        .filter(User::is_active)
        .map(|u| u.id)
        .collect();

    let id = BroadcastId(tx.next_id::<Broadcast>()?);
    let draft = Draft::new(NotificationKind::Broadcast, input.title.trim(), input.body.trim())
        .data("broadcastId", id);
    let created = notifications::notify_all(tx, Some(admin), recipients, &draft, now)?;

    let record = Broadcast {
        id,
        title: input.title.trim().to_string(),
        body: input.body.trim().to_string(),
        audience: input.audience,
        recipients: created.len() as u64,
        sent_by: admin,
        created_at: now,
    };
    tx.put(&record)?;
    Ok(Notified {
        value: record,
        notifications: created,
    })
}

pub fn broadcasts(tx: &impl Reader, pagination: Pagination) -> CoreResult<Page<Broadcast>> {
    let mut all = tx.all::<Broadcast>()?;
    all.reverse();
    Ok(pagination.apply(all))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Store;
    use crate::users::tests::{new_user, now};

    fn input(name: &str, category: IndustryCategory) -> IndustryInput {
        IndustryInput {
            name: name.into(),
            category,
            image_id: None,
        }
    }

    #[test]
    fn industry_names_unique_per_category() {
        let store = Store::in_memory().unwrap();
        store
            .write(|tx| create_industry(tx, input("Fintech", IndustryCategory::Showcase), now()))
            .unwrap();
        let dup = store.write(|tx| {
            create_industry(tx, input("fintech", IndustryCategory::Showcase), now())
        });
        assert!(matches!(dup, Err(CoreError::Conflict(_))));
        store
            .write(|tx| {
                create_industry(tx, input("Fintech", IndustryCategory::ConnectionsAndGroups), now())
            })
            .unwrap();
        let counts = store.read(|tx| industries_count(tx)).unwrap();
        assert_eq!((counts.showcase, counts.total), (1, 2));
    }

    #[test]
    fn industry_listing_filters() {
        let store = Store::in_memory().unwrap();
        for name in ["Health", "Hardware", "Retail"] {
            store
                .write(|tx| {
                    create_industry(tx, input(name, IndustryCategory::ConnectionsAndGroups), now())
                })
                .unwrap();
        }
        let query: QueryMap = [("searchText".to_string(), "h".to_string())].into();
        let page = store.read(|tx| industries(tx, &query)).unwrap();
        assert_eq!(page.total, 2);
        let query: QueryMap = [("category".to_string(), "showcase".to_string())].into();
        assert_eq!(store.read(|tx| industries(tx, &query)).unwrap().total, 0);
        let query: QueryMap = [("category".to_string(), "bogus".to_string())].into();
        assert!(store.read(|tx| industries(tx, &query)).is_err());
    }

    #[test]
    fn deleting_industry_updates_users() {
        let store = Store::in_memory().unwrap();
        let user = new_user(&store, "Ann");
        let industry = store
            .write(|tx| create_industry(tx, input("Agri", IndustryCategory::default()), now()))
            .unwrap();
        store
            .write(|tx| crate::users::set_industries(tx, user.id, &[industry.id]))
            .unwrap();
        store
            .write(|tx| delete_industry(tx, industry.id))
            .unwrap();
        let user: User = store.read(|tx| tx.require(user.id.0)).unwrap();
        assert!(user.industry_ids.is_empty());
    }

    #[test]
    fn report_type_target_is_checked() {
        let store = Store::in_memory().unwrap();
        let spam = store
            .write(|tx| create_report_type(tx, "Spam", ReportTarget::Post))
            .unwrap();
        assert!(
            store
                .read(|tx| require_report_type(tx, spam.id, ReportTarget::Post))
                .is_ok()
        );
        assert!(
            store
                .read(|tx| require_report_type(tx, spam.id, ReportTarget::Group))
                .is_err()
        );
        assert_eq!(
            store
                .read(|tx| report_types(tx, Some(ReportTarget::Group)))
                .unwrap()
                .len(),
            0
        );
    }

    #[test]
    fn broadcast_reaches_matching_users() {
        let store = Store::in_memory().unwrap();
        let admin = new_user(&store, "Root");
        let ann = new_user(&store, "Ann");
        new_user(&store, "Ben");
        let sent = store
            .write(|tx| {
                broadcast(
                    tx,
                    admin.id,
                    BroadcastInput {
                        title: "Hello".into(),
                        body: "News".into(),
                        audience: [("searchText".to_string(), "ann".to_string())].into(),
                    },
                    now(),
                )
            })
            .unwrap();
        assert_eq!(sent.value.recipients, 1);
        assert_eq!(sent.notifications[0].user_id, ann.id);
        let history = store
            .read(|tx| broadcasts(tx, Pagination::default()))
            .unwrap();
        assert_eq!(history.items[0].id, sent.value.id);
    }

    #[test]
    fn feedback_requires_message() {
        let store = Store::in_memory().unwrap();
        assert!(
            store
                .write(|tx| submit_feedback(tx, None, None, "  ", now()))
                .is_err()
        );
        store
            .write(|tx| submit_feedback(tx, None, Some("A@B.com".into()), "great", now()))
            .unwrap();
        let page = store.read(|tx| feedback(tx, Pagination::default())).unwrap();
        assert_eq!(page.items[0].email.as_deref(), Some("a@b.com"));
    }
}
