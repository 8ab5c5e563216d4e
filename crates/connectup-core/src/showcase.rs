//! # Showcase
//!
//! Company profiles users publish to attract interest and investment.
//! A profile starts `pending` and only shows up in explore and trending
//! lists once an admin approves it. Owners always see their own profiles.

use crate::catalog::{self, Industry, ReportTarget};
use crate::filters::{Pagination, QueryMap, matches_search, search_text};
use crate::formats::CsvWriter;
use crate::notifications::{self, Draft, NotificationKind, Notified};
use crate::response::Page;
use crate::storage::{Record, RecordTable};
use crate::users::{self, User, UserSummary};
use crate::{
    CompanyId, CoreError, CoreResult, IndustryId, InvestmentId, QuestionId, Reader, ReportTypeId,
    Timestamp, UploadId, UserId, WriteTx, parse_id_list,
};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl CompanyStatus {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        match raw {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(CoreError::Invalid(format!("invalid company status: {raw}"))),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub id: CompanyId,
    pub owner: UserId,
    pub name: String,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub industry_ids: Vec<IndustryId>,
    pub website: Option<String>,
    pub logo_id: Option<UploadId>,
    pub funding_goal: u64,
    pub status: CompanyStatus,
    pub archived: bool,
    pub deleted: bool,
    pub views: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CompanyProfile {
    /// Visible in explore and trending lists.
    #[must_use]
    pub fn is_listed(&self) -> bool {
        self.status == CompanyStatus::Approved && !self.archived && !self.deleted
    }
}

impl Record for CompanyProfile {
    const TABLE: RecordTable = TableDefinition::new("companies");
    const KIND: &'static str = "company profile";
    fn key(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyLike {
    pub id: u64,
    pub company_id: CompanyId,
    pub user_id: UserId,
    pub created_at: Timestamp,
}

impl Record for CompanyLike {
    const TABLE: RecordTable = TableDefinition::new("company_likes");
    const KIND: &'static str = "company like";
    fn key(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: u64,
    pub company_id: CompanyId,
    pub user_id: UserId,
    pub created_at: Timestamp,
}

impl Record for Bookmark {
    const TABLE: RecordTable = TableDefinition::new("company_bookmarks");
    const KIND: &'static str = "bookmark";
    fn key(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub company_id: CompanyId,
    pub author: UserId,
    pub body: String,
    /// Question this one answers.
    pub parent: Option<QuestionId>,
    pub archived: bool,
    pub created_at: Timestamp,
}

impl Record for Question {
    const TABLE: RecordTable = TableDefinition::new("questions");
    const KIND: &'static str = "question";
    fn key(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentStatus {
    Requested,
    Approved,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Investment {
    pub id: InvestmentId,
    pub company_id: CompanyId,
    pub investor: UserId,
    pub amount: u64,
    pub status: InvestmentStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Record for Investment {
    const TABLE: RecordTable = TableDefinition::new("investments");
    const KIND: &'static str = "investment";
    fn key(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyReport {
    pub id: u64,
    pub company_id: CompanyId,
    pub reported_by: UserId,
    pub report_type_id: ReportTypeId,
    pub reason: Option<String>,
    pub created_at: Timestamp,
}

impl Record for CompanyReport {
    const TABLE: RecordTable = TableDefinition::new("company_reports");
    const KIND: &'static str = "company report";
    fn key(&self) -> u64 {
        self.id
    }
}

// =============================================================================
// GUARDS
// =============================================================================

fn live_company(tx: &impl Reader, id: CompanyId) -> CoreResult<CompanyProfile> {
    let company: CompanyProfile = tx.require(id.0)?;
    if company.deleted {
        return Err(CoreError::NotFound(CompanyProfile::KIND));
    }
    Ok(company)
}

/// A profile the viewer may see: the owner sees everything, others only
/// approved profiles.
fn visible_company(tx: &impl Reader, id: CompanyId, viewer: UserId) -> CoreResult<CompanyProfile> {
    let company = live_company(tx, id)?;
    if company.owner != viewer && company.status != CompanyStatus::Approved {
        return Err(CoreError::NotFound(CompanyProfile::KIND));
    }
    Ok(company)
}

fn owned_company(tx: &impl Reader, id: CompanyId, user: UserId) -> CoreResult<CompanyProfile> {
    let company = live_company(tx, id)?;
    if company.owner != user {
        return Err(CoreError::forbidden("only the owner can manage this profile"));
    }
    Ok(company)
}

// =============================================================================
// PROFILES
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInput {
    pub name: String,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub industry_ids: Vec<IndustryId>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub logo_id: Option<UploadId>,
    #[serde(default)]
    pub funding_goal: u64,
}

fn check_input(tx: &impl Reader, input: &CompanyInput) -> CoreResult<String> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(CoreError::invalid("name cannot be empty"));
    }
    for id in &input.industry_ids {
        let _: Industry = tx.require(id.0)?;
    }
    Ok(name.to_string())
}

pub fn create_profile(
    tx: &WriteTx,
    owner: UserId,
    input: CompanyInput,
    now: Timestamp,
) -> CoreResult<CompanyProfile> {
    users::require_live(tx, owner)?;
    let name = check_input(tx, &input)?;
    let company = CompanyProfile {
        id: CompanyId(tx.next_id::<CompanyProfile>()?),
        owner,
        name,
        tagline: input.tagline,
        description: input.description,
        industry_ids: input.industry_ids,
        website: input.website,
        logo_id: input.logo_id,
        funding_goal: input.funding_goal,
        status: CompanyStatus::Pending,
        archived: false,
        deleted: false,
        views: 0,
        created_at: now,
        updated_at: now,
    };
    tx.put(&company)?;
    Ok(company)
}

pub fn edit(
    tx: &WriteTx,
    id: CompanyId,
    user: UserId,
    input: CompanyInput,
    now: Timestamp,
) -> CoreResult<CompanyProfile> {
    let mut company = owned_company(tx, id, user)?;
    company.name = check_input(tx, &input)?;
    company.tagline = input.tagline;
    company.description = input.description;
    company.industry_ids = input.industry_ids;
    company.website = input.website;
    if input.logo_id.is_some() {
        company.logo_id = input.logo_id;
    }
    company.funding_goal = input.funding_goal;
    company.updated_at = now;
    tx.put(&company)?;
    Ok(company)
}

/// Returns true if the profile is now archived.
pub fn toggle_archive(tx: &WriteTx, id: CompanyId, user: UserId) -> CoreResult<bool> {
    let mut company = owned_company(tx, id, user)?;
    company.archived = !company.archived;
    tx.put(&company)?;
    Ok(company.archived)
}

pub fn delete(tx: &WriteTx, id: CompanyId, user: UserId) -> CoreResult<()> {
    let mut company = owned_company(tx, id, user)?;
    company.deleted = true;
    tx.put(&company)
}

pub fn increase_views(tx: &WriteTx, id: CompanyId, viewer: UserId) -> CoreResult<u64> {
    let mut company = visible_company(tx, id, viewer)?;
    company.views = company.views.saturating_add(1);
    tx.put(&company)?;
    Ok(company.views)
}

/// Like or unlike. Returns true if now liked.
pub fn toggle_like(tx: &WriteTx, id: CompanyId, user: UserId, now: Timestamp) -> CoreResult<Notified<bool>> {
    let company = visible_company(tx, id, user)?;
    if let Some(like) = tx.find::<CompanyLike>(|l| l.company_id == id && l.user_id == user)? {
        tx.remove::<CompanyLike>(like.id)?;
        return Ok(Notified::new(false));
    }
    tx.put(&CompanyLike {
        id: tx.next_id::<CompanyLike>()?,
        company_id: id,
        user_id: user,
        created_at: now,
    })?;
    let liker = users::require_live(tx, user)?;
    let draft = Draft::new(
        NotificationKind::CompanyLike,
        "New like",
        format!("{} liked {}", liker.name, company.name),
    )
    .data("companyId", id);
    let notification = notifications::notify(tx, Some(user), company.owner, draft, now)?;
    Ok(Notified::new(true).with(notification))
}

/// Returns true if now bookmarked.
pub fn toggle_bookmark(tx: &WriteTx, id: CompanyId, user: UserId, now: Timestamp) -> CoreResult<bool> {
    visible_company(tx, id, user)?;
    if let Some(mark) = tx.find::<Bookmark>(|b| b.company_id == id && b.user_id == user)? {
        tx.remove::<Bookmark>(mark.id)?;
        return Ok(false);
    }
    tx.put(&Bookmark {
        id: tx.next_id::<Bookmark>()?,
        company_id: id,
        user_id: user,
        created_at: now,
    })?;
    Ok(true)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySummary {
    #[serde(flatten)]
    pub company: CompanyProfile,
    pub like_count: usize,
    pub is_liked: bool,
    pub is_bookmarked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDetail {
    #[serde(flatten)]
    pub summary: CompanySummary,
    pub is_owner: bool,
    pub owner_profile: Option<UserSummary>,
    pub industries: Vec<Industry>,
    pub question_count: usize,
    pub investor_count: usize,
}

fn summarize(
    tx: &impl Reader,
    companies: Vec<CompanyProfile>,
    viewer: UserId,
) -> CoreResult<Vec<CompanySummary>> {
    let likes = tx.all::<CompanyLike>()?;
    let bookmarks = tx.filter::<Bookmark>(|b| b.user_id == viewer)?;
    Ok(companies
        .into_iter()
        .map(|company| {
            let liked: Vec<&CompanyLike> = likes.iter().filter(|l| l.company_id == company.id).collect();
            CompanySummary {
                like_count: liked.len(),
                is_liked: liked.iter().any(|l| l.user_id == viewer),
                is_bookmarked: bookmarks.iter().any(|b| b.company_id == company.id),
                company,
            }
        })
        .collect())
}

fn summary_page(
    tx: &impl Reader,
    all: Vec<CompanyProfile>,
    viewer: UserId,
    pagination: Pagination,
) -> CoreResult<Page<CompanySummary>> {
    let page = pagination.apply(all);
    Ok(Page {
        items: summarize(tx, page.items, viewer)?,
        total: page.total,
        page: page.page,
        limit: page.limit,
    })
}

pub fn detail(tx: &impl Reader, id: CompanyId, viewer: UserId) -> CoreResult<CompanyDetail> {
    let company = visible_company(tx, id, viewer)?;
    let owner = company.owner;
    let mut industries = Vec::new();
    for industry in &company.industry_ids {
        industries.extend(tx.get::<Industry>(industry.0)?);
    }
    let summary = summarize(tx, vec![company], viewer)?
        .pop()
        .ok_or(CoreError::NotFound(CompanyProfile::KIND))?;
    Ok(CompanyDetail {
        summary,
        is_owner: owner == viewer,
        owner_profile: tx.get::<User>(owner.0)?.map(|u| UserSummary::from(&u)),
        industries,
        question_count: tx
            .filter::<Question>(|q| q.company_id == id && q.parent.is_none() && !q.archived)?
            .len(),
        investor_count: tx
            .filter::<Investment>(|i| i.company_id == id && i.status == InvestmentStatus::Approved)?
            .len(),
    })
}

pub fn bookmarked(tx: &impl Reader, user: UserId, pagination: Pagination) -> CoreResult<Page<CompanySummary>> {
    let marked: BTreeSet<CompanyId> = tx
        .filter::<Bookmark>(|b| b.user_id == user)?
        .into_iter()
        .map(|b| b.company_id)
        .collect();
    let mut all = tx.filter::<CompanyProfile>(|c| {
        marked.contains(&c.id) && !c.deleted && (c.status == CompanyStatus::Approved || c.owner == user)
    })?;
    all.reverse();
    summary_page(tx, all, user, pagination)
}

pub fn created_profiles(tx: &impl Reader, user: UserId, pagination: Pagination) -> CoreResult<Page<CompanySummary>> {
    let mut all = tx.filter::<CompanyProfile>(|c| c.owner == user && !c.archived && !c.deleted)?;
    all.reverse();
    summary_page(tx, all, user, pagination)
}

pub fn archived_profiles(tx: &impl Reader, user: UserId, pagination: Pagination) -> CoreResult<Page<CompanySummary>> {
    let mut all = tx.filter::<CompanyProfile>(|c| c.owner == user && c.archived && !c.deleted)?;
    all.reverse();
    summary_page(tx, all, user, pagination)
}

/// Listed profiles, newest first. Query keys: `page`, `limit`,
/// `searchText`, `industries`.
pub fn explore(tx: &impl Reader, viewer: UserId, query: &QueryMap) -> CoreResult<Page<CompanySummary>> {
    let pagination = Pagination::parse(query)?;
    let search = search_text(query);
    let industries: Vec<IndustryId> = match query.get("industries") {
        Some(raw) => parse_id_list(raw)?,
        None => Vec::new(),
    };
    let mut all = tx.filter::<CompanyProfile>(|c| {
        c.is_listed()
            && (industries.is_empty() || c.industry_ids.iter().any(|i| industries.contains(i)))
            && matches_search(
                search.as_deref(),
                &[&c.name, c.tagline.as_deref().unwrap_or_default()],
            )
    })?;
    all.reverse();
    summary_page(tx, all, viewer, pagination)
}

/// Listed profiles ordered by `likes * 3 + views`, highest first.
pub fn trending(tx: &impl Reader, viewer: UserId, pagination: Pagination) -> CoreResult<Page<CompanySummary>> {
    let likes = tx.all::<CompanyLike>()?;
    let mut scored: Vec<(u64, CompanyProfile)> = tx
        .filter::<CompanyProfile>(CompanyProfile::is_listed)?
        .into_iter()
        .map(|c| {
            let count = likes.iter().filter(|l| l.company_id == c.id).count() as u64;
            (count.saturating_mul(3).saturating_add(c.views), c)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.id.cmp(&b.1.id)));
    let all = scored.into_iter().map(|(_, c)| c).collect();
    summary_page(tx, all, viewer, pagination)
}

// =============================================================================
// QUESTIONS
// =============================================================================

pub fn create_question(
    tx: &WriteTx,
    company: CompanyId,
    user: UserId,
    body: &str,
    now: Timestamp,
) -> CoreResult<Notified<Question>> {
    let record = visible_company(tx, company, user)?;
    let question = put_question(tx, company, user, body, None, now)?;
    let asker = users::require_live(tx, user)?;
    let draft = Draft::new(
        NotificationKind::CompanyQuestion,
        "New question",
        format!("{} asked a question about {}", asker.name, record.name),
    )
    .data("companyId", company)
    .data("questionId", question.id);
    let notification = notifications::notify(tx, Some(user), record.owner, draft, now)?;
    Ok(Notified::new(question).with(notification))
}

/// Answer a question. Only the company owner and the asker take part.
pub fn reply_to_question(
    tx: &WriteTx,
    company: CompanyId,
    question: QuestionId,
    user: UserId,
    body: &str,
    now: Timestamp,
) -> CoreResult<Notified<Question>> {
    let record = visible_company(tx, company, user)?;
    let parent = live_question(tx, company, question)?;
    if parent.parent.is_some() {
        return Err(CoreError::invalid("cannot reply to a reply"));
    }
    if user != record.owner && user != parent.author {
        return Err(CoreError::forbidden("only the owner or the asker can reply"));
    }
    let reply = put_question(tx, company, user, body, Some(question), now)?;
    let recipient = if user == record.owner {
        parent.author
    } else {
        record.owner
    };
    let replier = users::require_live(tx, user)?;
    let draft = Draft::new(
        NotificationKind::QuestionReply,
        "New reply",
        format!("{} replied to a question about {}", replier.name, record.name),
    )
    .data("companyId", company)
    .data("questionId", question);
    let notification = notifications::notify(tx, Some(user), recipient, draft, now)?;
    Ok(Notified::new(reply).with(notification))
}

fn put_question(
    tx: &WriteTx,
    company: CompanyId,
    author: UserId,
    body: &str,
    parent: Option<QuestionId>,
    now: Timestamp,
) -> CoreResult<Question> {
    let body = body.trim();
    if body.is_empty() {
        return Err(CoreError::invalid("question cannot be empty"));
    }
    let question = Question {
        id: QuestionId(tx.next_id::<Question>()?),
        company_id: company,
        author,
        body: body.to_string(),
        parent,
        archived: false,
        created_at: now,
    };
    tx.put(&question)?;
    Ok(question)
}

fn live_question(tx: &impl Reader, company: CompanyId, id: QuestionId) -> CoreResult<Question> {
    let question: Question = tx.require(id.0)?;
    if question.company_id != company || question.archived {
        return Err(CoreError::NotFound(Question::KIND));
    }
    Ok(question)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    #[serde(flatten)]
    pub question: Question,
    pub author_profile: Option<UserSummary>,
    pub reply_count: usize,
}

fn view_questions(tx: &impl Reader, questions: Vec<Question>) -> CoreResult<Vec<QuestionView>> {
    let replies = tx.filter::<Question>(|q| q.parent.is_some() && !q.archived)?;
    let mut out = Vec::with_capacity(questions.len());
    for question in questions {
        out.push(QuestionView {
            author_profile: tx.get::<User>(question.author.0)?.map(|u| UserSummary::from(&u)),
            reply_count: replies.iter().filter(|r| r.parent == Some(question.id)).count(),
            question,
        });
    }
    Ok(out)
}

/// Top-level questions, newest first.
pub fn questions(
    tx: &impl Reader,
    company: CompanyId,
    viewer: UserId,
    pagination: Pagination,
) -> CoreResult<Page<QuestionView>> {
    visible_company(tx, company, viewer)?;
    let mut all = tx.filter::<Question>(|q| q.company_id == company && q.parent.is_none() && !q.archived)?;
    all.reverse();
    let page = pagination.apply(all);
    Ok(Page {
        items: view_questions(tx, page.items)?,
        total: page.total,
        page: page.page,
        limit: page.limit,
    })
}

/// Replies oldest first.
pub fn question_replies(
    tx: &impl Reader,
    company: CompanyId,
    question: QuestionId,
    viewer: UserId,
) -> CoreResult<Vec<QuestionView>> {
    visible_company(tx, company, viewer)?;
    live_question(tx, company, question)?;
    let all = tx.filter::<Question>(|q| q.parent == Some(question) && !q.archived)?;
    view_questions(tx, all)
}

/// A top-level question with its replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionThread {
    #[serde(flatten)]
    pub question: QuestionView,
    pub replies: Vec<QuestionView>,
}

/// Every live question of a company, newest first, each with its replies
/// oldest first.
pub fn all_questions(
    tx: &impl Reader,
    company: CompanyId,
    viewer: UserId,
) -> CoreResult<Vec<QuestionThread>> {
    visible_company(tx, company, viewer)?;
    let live = tx.filter::<Question>(|q| q.company_id == company && !q.archived)?;
    let (top, replies): (Vec<Question>, Vec<Question>) =
        live.into_iter().partition(|q| q.parent.is_none());
    let mut replies = view_questions(tx, replies)?;

    let mut out = Vec::with_capacity(top.len());
    for question in view_questions(tx, top)?.into_iter().rev() {
        let id = question.question.id;
        let (mine, rest): (Vec<QuestionView>, Vec<QuestionView>) =
            replies.into_iter().partition(|r| r.question.parent == Some(id));
        replies = rest;
        out.push(QuestionThread {
            question,
            replies: mine,
        });
    }
    Ok(out)
}

/// Hide a question or reply. Allowed for its author and the company owner.
pub fn archive_question(tx: &WriteTx, question: QuestionId, user: UserId) -> CoreResult<()> {
    let mut record: Question = tx.require(question.0)?;
    let company = live_company(tx, record.company_id)?;
    if record.author != user && company.owner != user {
        return Err(CoreError::forbidden("only the author or the owner can archive this question"));
    }
    record.archived = true;
    tx.put(&record)
}

// =============================================================================
// INVESTMENTS
// =============================================================================

pub fn invest(
    tx: &WriteTx,
    company: CompanyId,
    investor: UserId,
    amount: u64,
    now: Timestamp,
) -> CoreResult<Notified<Investment>> {
    let record = visible_company(tx, company, investor)?;
    if amount == 0 {
        return Err(CoreError::invalid("amount must be greater than zero"));
    }
    if record.owner == investor {
        return Err(CoreError::invalid("cannot invest in your own company"));
    }
    let pending = tx.find::<Investment>(|i| {
        i.company_id == company && i.investor == investor && i.status == InvestmentStatus::Requested
    })?;
    if pending.is_some() {
        return Err(CoreError::conflict("investment request already pending"));
    }
    let investment = Investment {
        id: InvestmentId(tx.next_id::<Investment>()?),
        company_id: company,
        investor,
        amount,
        status: InvestmentStatus::Requested,
        created_at: now,
        updated_at: now,
    };
    tx.put(&investment)?;
    let user = users::require_live(tx, investor)?;
    let draft = Draft::new(
        NotificationKind::CompanyInvestment,
        "New investment request",
        format!("{} wants to invest in {}", user.name, record.name),
    )
    .data("companyId", company)
    .data("investmentId", investment.id);
    let notification = notifications::notify(tx, Some(investor), record.owner, draft, now)?;
    Ok(Notified::new(investment).with(notification))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentView {
    #[serde(flatten)]
    pub investment: Investment,
    pub investor_profile: Option<UserSummary>,
    pub company_name: String,
}

fn view_investments(tx: &impl Reader, all: Vec<Investment>) -> CoreResult<Vec<InvestmentView>> {
    let mut out = Vec::with_capacity(all.len());
    for investment in all {
        out.push(InvestmentView {
            investor_profile: tx.get::<User>(investment.investor.0)?.map(|u| UserSummary::from(&u)),
            company_name: tx
                .get::<CompanyProfile>(investment.company_id.0)?
                .map(|c| c.name)
                .unwrap_or_default(),
            investment,
        });
    }
    Ok(out)
}

/// The owner sees every investment, anyone else the approved ones.
pub fn all_investors(tx: &impl Reader, company: CompanyId, viewer: UserId) -> CoreResult<Vec<InvestmentView>> {
    let record = visible_company(tx, company, viewer)?;
    let is_owner = record.owner == viewer;
    let all = tx.filter::<Investment>(|i| {
        i.company_id == company && (is_owner || i.status == InvestmentStatus::Approved)
    })?;
    view_investments(tx, all)
}

pub fn set_investment_status(
    tx: &WriteTx,
    investment: InvestmentId,
    owner: UserId,
    status: InvestmentStatus,
    now: Timestamp,
) -> CoreResult<Notified<Investment>> {
    if status == InvestmentStatus::Requested {
        return Err(CoreError::invalid("status must be approved or declined"));
    }
    let mut record: Investment = tx.require(investment.0)?;
    let company = owned_company(tx, record.company_id, owner)?;
    if record.status != InvestmentStatus::Requested {
        return Err(CoreError::conflict("investment already answered"));
    }
    record.status = status;
    record.updated_at = now;
    tx.put(&record)?;
    let verb = match status {
        InvestmentStatus::Approved => "approved",
        _ => "declined",
    };
    let draft = Draft::new(
        NotificationKind::InvestmentStatus,
        "Investment update",
        format!("{} {} your investment request", company.name, verb),
    )
    .data("companyId", company.id)
    .data("investmentId", record.id)
    .data("status", verb);
    let notification = notifications::notify(tx, Some(owner), record.investor, draft, now)?;
    Ok(Notified::new(record).with(notification))
}

/// The viewer's own investment in a company, if any.
pub fn investment_detail(tx: &impl Reader, company: CompanyId, viewer: UserId) -> CoreResult<Option<Investment>> {
    visible_company(tx, company, viewer)?;
    Ok(tx
        .filter::<Investment>(|i| i.company_id == company && i.investor == viewer)?
        .pop())
}

/// Companies the user invested in, with their latest investment.
pub fn invested_companies(tx: &impl Reader, user: UserId) -> CoreResult<Vec<InvestmentView>> {
    let mut all = tx.filter::<Investment>(|i| i.investor == user)?;
    all.reverse();
    let mut seen = BTreeSet::new();
    all.retain(|i| seen.insert(i.company_id));
    view_investments(tx, all)
}

/// Pending investment requests on the owner's companies.
pub fn investment_requests(tx: &impl Reader, owner: UserId) -> CoreResult<Vec<InvestmentView>> {
    let owned: BTreeSet<CompanyId> = tx
        .filter::<CompanyProfile>(|c| c.owner == owner && !c.deleted)?
        .into_iter()
        .map(|c| c.id)
        .collect();
    let all = tx.filter::<Investment>(|i| {
        owned.contains(&i.company_id) && i.status == InvestmentStatus::Requested
    })?;
    view_investments(tx, all)
}

/// Users with at least one approved investment, optionally filtered by name.
pub fn investors(tx: &impl Reader, query: &QueryMap) -> CoreResult<Page<UserSummary>> {
    let pagination = Pagination::parse(query)?;
    let search = search_text(query);
    let ids: BTreeSet<UserId> = tx
        .filter::<Investment>(|i| i.status == InvestmentStatus::Approved)?
        .into_iter()
        .map(|i| i.investor)
        .collect();
    let mut out = Vec::new();
    for id in ids {
        if let Some(user) = tx.get::<User>(id.0)? {
            if !user.is_deleted() && matches_search(search.as_deref(), &[&user.name]) {
                out.push(UserSummary::from(&user));
            }
        }
    }
    Ok(pagination.apply(out))
}

// =============================================================================
// REPORTS AND INVITES
// =============================================================================

pub fn report_profile(
    tx: &WriteTx,
    company: CompanyId,
    user: UserId,
    report_type: ReportTypeId,
    reason: Option<String>,
    now: Timestamp,
) -> CoreResult<CompanyReport> {
    visible_company(tx, company, user)?;
    catalog::require_report_type(tx, report_type, ReportTarget::Profile)?;
    if tx
        .find::<CompanyReport>(|r| r.company_id == company && r.reported_by == user)?
        .is_some()
    {
        return Err(CoreError::conflict("already reported"));
    }
    let report = CompanyReport {
        id: tx.next_id::<CompanyReport>()?,
        company_id: company,
        reported_by: user,
        report_type_id: report_type,
        reason: reason.filter(|r| !r.trim().is_empty()),
        created_at: now,
    };
    tx.put(&report)?;
    Ok(report)
}

/// Point other users at a profile. Self, unknown, deleted and blocked users
/// are skipped; the value is the number of users notified.
pub fn invite_users(
    tx: &WriteTx,
    company: CompanyId,
    user: UserId,
    invitees: &[UserId],
    now: Timestamp,
) -> CoreResult<Notified<usize>> {
    let record = visible_company(tx, company, user)?;
    let inviter = users::require_live(tx, user)?;
    let mut recipients = BTreeSet::new();
    for &id in invitees {
        if id == user || users::is_blocked_between(tx, user, id)? {
            continue;
        }
        if tx.get::<User>(id.0)?.is_some_and(|u| !u.is_deleted()) {
            recipients.insert(id);
        }
    }
    let draft = Draft::new(
        NotificationKind::CompanyInvite,
        "Check this out",
        format!("{} invited you to view {}", inviter.name, record.name),
    )
    .data("companyId", company);
    let created = notifications::notify_all(tx, Some(user), recipients, &draft, now)?;
    Ok(Notified {
        value: created.len(),
        notifications: created,
    })
}

// =============================================================================
// ADMIN
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCompanyRow {
    #[serde(flatten)]
    pub company: CompanyProfile,
    pub like_count: usize,
    pub report_count: usize,
    pub investment_count: usize,
}

fn admin_row(
    company: CompanyProfile,
    likes: &[CompanyLike],
    reports: &[CompanyReport],
    investments: &[Investment],
) -> AdminCompanyRow {
    AdminCompanyRow {
        like_count: likes.iter().filter(|l| l.company_id == company.id).count(),
        report_count: reports.iter().filter(|r| r.company_id == company.id).count(),
        investment_count: investments.iter().filter(|i| i.company_id == company.id).count(),
        company,
    }
}

fn admin_rows(tx: &impl Reader, query: &QueryMap) -> CoreResult<Vec<AdminCompanyRow>> {
    let search = search_text(query);
    let status = query.get("status").map(String::as_str).unwrap_or_default();
    let likes = tx.all::<CompanyLike>()?;
    let reports = tx.all::<CompanyReport>()?;
    let investments = tx.all::<Investment>()?;
    let mut rows: Vec<AdminCompanyRow> = tx
        .filter::<CompanyProfile>(|c| {
            let status_ok = match status {
                "archived" => c.archived && !c.deleted,
                "deleted" => c.deleted,
                "" => !c.deleted,
                other => !c.deleted && c.status.as_str() == other,
            };
            status_ok
                && matches_search(
                    search.as_deref(),
                    &[&c.name, c.tagline.as_deref().unwrap_or_default()],
                )
        })?
        .into_iter()
        .map(|c| admin_row(c, &likes, &reports, &investments))
        .collect();
    rows.reverse();
    Ok(rows)
}

/// Query keys: `page`, `limit`, `searchText`, `status`
/// (`pending|approved|rejected|archived|deleted`).
pub fn admin_companies(tx: &impl Reader, query: &QueryMap) -> CoreResult<Page<AdminCompanyRow>> {
    Ok(Pagination::parse(query)?.apply(admin_rows(tx, query)?))
}

pub fn admin_detail(tx: &impl Reader, id: CompanyId) -> CoreResult<AdminCompanyRow> {
    let company: CompanyProfile = tx.require(id.0)?;
    Ok(admin_row(
        company,
        &tx.filter::<CompanyLike>(|l| l.company_id == id)?,
        &tx.filter::<CompanyReport>(|r| r.company_id == id)?,
        &tx.filter::<Investment>(|i| i.company_id == id)?,
    ))
}

/// Set the review status and tell the owner.
pub fn update_company_status(
    tx: &WriteTx,
    id: CompanyId,
    status: CompanyStatus,
    now: Timestamp,
) -> CoreResult<Notified<CompanyProfile>> {
    let mut company = live_company(tx, id)?;
    company.status = status;
    company.updated_at = now;
    tx.put(&company)?;
    let draft = Draft::new(
        NotificationKind::CompanyStatus,
        "Profile review",
        format!("{} is now {}", company.name, status.as_str()),
    )
    .data("companyId", id)
    .data("status", status.as_str());
    let notification = notifications::notify(tx, None, company.owner, draft, now)?;
    Ok(Notified::new(company).with(notification))
}

/// Returns true if the profile is now archived.
pub fn admin_toggle_archive(tx: &WriteTx, id: CompanyId) -> CoreResult<bool> {
    let mut company = live_company(tx, id)?;
    company.archived = !company.archived;
    tx.put(&company)?;
    Ok(company.archived)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyCounts {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub archived: usize,
}

pub fn company_counts(tx: &impl Reader) -> CoreResult<CompanyCounts> {
    let all = tx.filter::<CompanyProfile>(|c| !c.deleted)?;
    let with = |status: CompanyStatus| all.iter().filter(|c| c.status == status).count();
    Ok(CompanyCounts {
        total: all.len(),
        pending: with(CompanyStatus::Pending),
        approved: with(CompanyStatus::Approved),
        rejected: with(CompanyStatus::Rejected),
        archived: all.iter().filter(|c| c.archived).count(),
    })
}

pub fn export_csv(tx: &impl Reader, query: &QueryMap) -> CoreResult<String> {
    let mut csv = CsvWriter::with_header(&[
        "id", "name", "owner", "status", "archived", "likes", "views", "reports", "investments",
        "funding_goal", "created_at",
    ]);
    for row in admin_rows(tx, query)? {
        csv.row([
            row.company.id.to_string(),
            row.company.name.clone(),
            row.company.owner.to_string(),
            row.company.status.as_str().to_string(),
            row.company.archived.to_string(),
            row.like_count.to_string(),
            row.company.views.to_string(),
            row.report_count.to_string(),
            row.investment_count.to_string(),
            row.company.funding_goal.to_string(),
            row.company.created_at.to_rfc3339(),
        ]);
    }
    Ok(csv.finish())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Store;
    use crate::users::tests::{new_user, now};

    fn company(store: &Store, owner: UserId, name: &str) -> CompanyProfile {
        store
            .write(|tx| {
                create_profile(
                    tx,
                    owner,
                    CompanyInput {
                        name: name.into(),
                        funding_goal: 1000,
                        ..CompanyInput::default()
                    },
                    now(),
                )
            })
            .unwrap()
    }

    fn approve(store: &Store, id: CompanyId) {
        store
            .write(|tx| update_company_status(tx, id, CompanyStatus::Approved, now()))
            .unwrap();
    }

    #[test]
    fn pending_profiles_are_private_to_the_owner() {
        let store = Store::in_memory().unwrap();
        let ann = new_user(&store, "Ann").id;
        let ben = new_user(&store, "Ben").id;
        let acme = company(&store, ann, "Acme");
        assert_eq!(acme.status, CompanyStatus::Pending);

        assert!(store.read(|tx| detail(tx, acme.id, ann)).unwrap().is_owner);
        let hidden = store.read(|tx| detail(tx, acme.id, ben));
        assert!(matches!(hidden, Err(CoreError::NotFound(_))));

        approve(&store, acme.id);
        let seen = store.read(|tx| detail(tx, acme.id, ben)).unwrap();
        assert!(!seen.is_owner);
        let page = store
            .read(|tx| explore(tx, ben, &QueryMap::new()))
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn owner_only_edits() {
        let store = Store::in_memory().unwrap();
        let ann = new_user(&store, "Ann").id;
        let ben = new_user(&store, "Ben").id;
        let acme = company(&store, ann, "Acme");
        approve(&store, acme.id);
        let err = store
            .write(|tx| toggle_archive(tx, acme.id, ben))
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
        assert!(store.write(|tx| toggle_archive(tx, acme.id, ann)).unwrap());
        let archived = store
            .read(|tx| archived_profiles(tx, ann, Pagination::default()))
            .unwrap();
        assert_eq!(archived.total, 1);
        assert_eq!(
            store
                .read(|tx| explore(tx, ben, &QueryMap::new()))
                .unwrap()
                .total,
            0
        );
    }

    #[test]
    fn trending_weighs_likes_over_views() {
        let store = Store::in_memory().unwrap();
        let ann = new_user(&store, "Ann").id;
        let ben = new_user(&store, "Ben").id;
        let a = company(&store, ann, "Acme");
        let b = company(&store, ann, "Bolt");
        approve(&store, a.id);
        approve(&store, b.id);
        for _ in 0..2 {
            store.write(|tx| increase_views(tx, a.id, ben)).unwrap();
        }
        let liked = store
            .write(|tx| toggle_like(tx, b.id, ben, now()))
            .unwrap();
        assert!(liked.value);
        assert_eq!(liked.notifications[0].user_id, ann);

        let page = store
            .read(|tx| trending(tx, ben, Pagination::default()))
            .unwrap();
        assert_eq!(page.items[0].company.id, b.id);
        assert!(page.items[0].is_liked);
    }

    #[test]
    fn bookmarks_toggle() {
        let store = Store::in_memory().unwrap();
        let ann = new_user(&store, "Ann").id;
        let ben = new_user(&store, "Ben").id;
        let acme = company(&store, ann, "Acme");
        approve(&store, acme.id);
        assert!(store.write(|tx| toggle_bookmark(tx, acme.id, ben, now())).unwrap());
        let marked = store
            .read(|tx| bookmarked(tx, ben, Pagination::default()))
            .unwrap();
        assert!(marked.items[0].is_bookmarked);
        assert!(!store.write(|tx| toggle_bookmark(tx, acme.id, ben, now())).unwrap());
    }

    #[test]
    fn question_threads() {
        let store = Store::in_memory().unwrap();
        let ann = new_user(&store, "Ann").id;
        let ben = new_user(&store, "Ben").id;
        let cid = new_user(&store, "Cid").id;
        let acme = company(&store, ann, "Acme");
        approve(&store, acme.id);

        let asked = store
            .write(|tx| create_question(tx, acme.id, ben, "Revenue?", now()))
            .unwrap();
        assert_eq!(asked.notifications[0].user_id, ann);
        let q = asked.value.id;

        let stranger = store.write(|tx| reply_to_question(tx, acme.id, q, cid, "hi", now()));
        assert!(matches!(stranger, Err(CoreError::Forbidden(_))));

        let answer = store
            .write(|tx| reply_to_question(tx, acme.id, q, ann, "Growing", now()))
            .unwrap();
        assert_eq!(answer.notifications[0].user_id, ben);

        let listed = store
            .read(|tx| questions(tx, acme.id, cid, Pagination::default()))
            .unwrap();
        assert_eq!(listed.items[0].reply_count, 1);

        let later = store
            .write(|tx| create_question(tx, acme.id, cid, "Hiring?", now()))
            .unwrap()
            .value
            .id;
        let threads = store.read(|tx| all_questions(tx, acme.id, ben)).unwrap();
        let ids: Vec<QuestionId> = threads.iter().map(|t| t.question.question.id).collect();
        assert_eq!(ids, vec![later, q]);
        assert!(threads[0].replies.is_empty());
        assert_eq!(threads[1].replies[0].question.body, "Growing");

        store.write(|tx| archive_question(tx, q, ann)).unwrap();
        let gone = store.read(|tx| question_replies(tx, acme.id, q, ben));
        assert!(gone.is_err());
        assert_eq!(store.read(|tx| all_questions(tx, acme.id, ben)).unwrap().len(), 1);
    }

    #[test]
    fn investment_flow() {
        let store = Store::in_memory().unwrap();
        let ann = new_user(&store, "Ann").id;
        let ben = new_user(&store, "Ben").id;
        let acme = company(&store, ann, "Acme");
        approve(&store, acme.id);

        let zero = store.write(|tx| invest(tx, acme.id, ben, 0, now()));
        assert!(matches!(zero, Err(CoreError::Invalid(_))));
        let own = store.write(|tx| invest(tx, acme.id, ann, 10, now()));
        assert!(matches!(own, Err(CoreError::Invalid(_))));

        let req = store
            .write(|tx| invest(tx, acme.id, ben, 500, now()))
            .unwrap();
        assert_eq!(req.notifications[0].user_id, ann);
        let dup = store.write(|tx| invest(tx, acme.id, ben, 10, now()));
        assert!(matches!(dup, Err(CoreError::Conflict(_))));

        assert_eq!(store.read(|tx| investment_requests(tx, ann)).unwrap().len(), 1);
        assert!(store.read(|tx| all_investors(tx, acme.id, ben)).unwrap().is_empty());

        let not_owner = store.write(|tx| {
            set_investment_status(tx, req.value.id, ben, InvestmentStatus::Approved, now())
        });
        assert!(matches!(not_owner, Err(CoreError::Forbidden(_))));
        let approved = store
            .write(|tx| set_investment_status(tx, req.value.id, ann, InvestmentStatus::Approved, now()))
            .unwrap();
        assert_eq!(approved.notifications[0].user_id, ben);

        let listed = store.read(|tx| investors(tx, &QueryMap::new())).unwrap();
        assert_eq!(listed.items[0].id, ben);
        let mine = store.read(|tx| invested_companies(tx, ben)).unwrap();
        assert_eq!(mine[0].company_name, "Acme");
    }

    #[test]
    fn admin_listing_and_export() {
        let store = Store::in_memory().unwrap();
        let ann = new_user(&store, "Ann").id;
        let a = company(&store, ann, "Acme");
        company(&store, ann, "Bolt, Inc");
        approve(&store, a.id);

        let counts = store.read(|tx| company_counts(tx)).unwrap();
        assert_eq!((counts.total, counts.pending, counts.approved), (2, 1, 1));

        let mut query = QueryMap::new();
        query.insert("status".into(), "pending".into());
        let pending = store.read(|tx| admin_companies(tx, &query)).unwrap();
        assert_eq!(pending.items[0].company.name, "Bolt, Inc");

        let csv = store.read(|tx| export_csv(tx, &QueryMap::new())).unwrap();
        assert!(csv.starts_with("id,name,owner,status"));
        assert!(csv.contains("\"Bolt, Inc\""));
    }
}
