//! `/api/showcase` routes: company profiles, Q&A and investment requests.

use super::{ApiJson, ApiPath, ApiQuery, ApiResult, AppState, AuthUser, now};
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post, put},
};
use connectup_core::filters::Pagination;
use connectup_core::response::{Count, Message, Page};
use connectup_core::showcase::{
    self, CompanyDetail, CompanyInput, CompanyProfile, CompanyReport, CompanySummary, Investment,
    InvestmentStatus, InvestmentView, Question, QuestionThread, QuestionView,
};
use connectup_core::users::UserSummary;
use connectup_core::{CompanyId, InvestmentId, QuestionId, ReportTypeId, UserId};
use serde::Deserialize;
use serde_json::{Value, json};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create_profile", post(create_profile))
        .route("/bookmark", post(toggle_bookmark))
        .route("/report", post(report))
        .route("/archive", post(archive_question))
        .route("/question", put(archive_question))
        .route("/bookmarked_list", get(bookmarked))
        .route("/investors", get(investors))
        .route("/archived_list", get(archived))
        .route("/profiles", get(created))
        .route("/invested_company", get(invested_companies))
        .route("/invite_users/{company_id}", post(invite_users))
        .route("/explore", get(explore))
        .route("/requests", get(investment_requests))
        .route("/trending_profiles", get(trending))
        .route("/profile/{company_id}", get(detail).put(edit).delete(remove))
        .route("/profile/{company_id}/view", post(view))
        .route("/profile/{company_id}/like", post(like))
        .route("/profile/{company_id}/toggle_archive", put(toggle_archive))
        .route("/profile/{company_id}/question", post(ask))
        .route("/profile/{company_id}/question_reply", post(reply))
        .route("/profile/{company_id}/questions", get(questions))
        .route("/profile/{company_id}/all_questions", get(all_questions))
        .route("/profile/{company_id}/question_replies/{question_id}", get(question_replies))
        .route("/profile/{company_id}/invest", post(invest))
        .route("/profile/{company_id}/all_investors", get(all_investors))
        .route("/profile/{company_id}/investment_status", put(investment_status))
        .route("/profile/{company_id}/investment_detail", get(investment_detail))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyBody {
    pub company_id: CompanyId,
}

// =============================================================================
// PROFILES
// =============================================================================

async fn create_profile(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<CompanyInput>,
) -> ApiResult<Json<CompanyProfile>> {
    Ok(Json(state.write(|tx| showcase::create_profile(tx, ctx.id, body, now()))?))
}

async fn detail(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
) -> ApiResult<Json<CompanyDetail>> {
    Ok(Json(state.read(|tx| showcase::detail(tx, company, ctx.id))?))
}

async fn edit(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
    ApiJson(body): ApiJson<CompanyInput>,
) -> ApiResult<Json<CompanyProfile>> {
    Ok(Json(state.write(|tx| showcase::edit(tx, company, ctx.id, body, now()))?))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| showcase::delete(tx, company, ctx.id))?;
    Ok(Json(Message::success()))
}

async fn toggle_archive(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
) -> ApiResult<Json<Value>> {
    let archived = state.write(|tx| showcase::toggle_archive(tx, company, ctx.id))?;
    Ok(Json(json!({ "isArchived": archived })))
}

async fn view(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
) -> ApiResult<Json<Value>> {
    let views = state.write(|tx| showcase::increase_views(tx, company, ctx.id))?;
    Ok(Json(json!({ "views": views })))
}

async fn like(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
) -> ApiResult<Json<Value>> {
    let liked = state.write(|tx| showcase::toggle_like(tx, company, ctx.id, now()))?;
    state.deliver(liked.notifications);
    Ok(Json(json!({ "isLiked": liked.value })))
}

async fn toggle_bookmark(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<CompanyBody>,
) -> ApiResult<Json<Value>> {
    let bookmarked =
        state.write(|tx| showcase::toggle_bookmark(tx, body.company_id, ctx.id, now()))?;
    Ok(Json(json!({ "isBookmarked": bookmarked })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBody {
    pub company_id: CompanyId,
    pub report_type_id: ReportTypeId,
    #[serde(default)]
    pub reason: Option<String>,
}

async fn report(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<ReportBody>,
) -> ApiResult<Json<CompanyReport>> {
    Ok(Json(state.write(|tx| {
        showcase::report_profile(tx, body.company_id, ctx.id, body.report_type_id, body.reason, now())
    })?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteBody {
    pub user_ids: Vec<UserId>,
}

async fn invite_users(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
    ApiJson(body): ApiJson<InviteBody>,
) -> ApiResult<Json<Count>> {
    let invited =
        state.write(|tx| showcase::invite_users(tx, company, ctx.id, &body.user_ids, now()))?;
    state.deliver(invited.notifications);
    Ok(Json(Count { count: invited.value }))
}

// =============================================================================
// LISTINGS
// =============================================================================

async fn bookmarked(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<CompanySummary>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| showcase::bookmarked(tx, ctx.id, pagination))?))
}

async fn created(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<CompanySummary>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| showcase::created_profiles(tx, ctx.id, pagination))?))
}

async fn archived(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<CompanySummary>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| showcase::archived_profiles(tx, ctx.id, pagination))?))
}

async fn explore(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<CompanySummary>>> {
    Ok(Json(state.read(|tx| showcase::explore(tx, ctx.id, &query))?))
}

async fn trending(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<CompanySummary>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| showcase::trending(tx, ctx.id, pagination))?))
}

async fn investors(
    State(state): State<AppState>,
    AuthUser(_ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<UserSummary>>> {
    Ok(Json(state.read(|tx| showcase::investors(tx, &query))?))
}

// =============================================================================
// QUESTIONS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct QuestionBody {
    pub body: String,
}

async fn ask(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
    ApiJson(body): ApiJson<QuestionBody>,
) -> ApiResult<Json<Question>> {
    let asked =
        state.write(|tx| showcase::create_question(tx, company, ctx.id, &body.body, now()))?;
    state.deliver(asked.notifications);
    Ok(Json(asked.value))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyBody {
    pub question_id: QuestionId,
    pub body: String,
}

async fn reply(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
    ApiJson(body): ApiJson<ReplyBody>,
) -> ApiResult<Json<Question>> {
    let replied = state.write(|tx| {
        showcase::reply_to_question(tx, company, body.question_id, ctx.id, &body.body, now())
    })?;
    state.deliver(replied.notifications);
    Ok(Json(replied.value))
}

async fn questions(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<QuestionView>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| showcase::questions(tx, company, ctx.id, pagination))?))
}

async fn all_questions(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
) -> ApiResult<Json<Vec<QuestionThread>>> {
    Ok(Json(state.read(|tx| showcase::all_questions(tx, company, ctx.id))?))
}

async fn question_replies(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((company, question)): ApiPath<(CompanyId, QuestionId)>,
) -> ApiResult<Json<Vec<QuestionView>>> {
    Ok(Json(state.read(|tx| {
        showcase::question_replies(tx, company, question, ctx.id)
    })?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionIdBody {
    pub question_id: QuestionId,
}

async fn archive_question(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<QuestionIdBody>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| showcase::archive_question(tx, body.question_id, ctx.id))?;
    Ok(Json(Message::success()))
}

// =============================================================================
// INVESTMENTS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct InvestBody {
    pub amount: u64,
}

async fn invest(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
    ApiJson(body): ApiJson<InvestBody>,
) -> ApiResult<Json<Investment>> {
    let invested = state.write(|tx| showcase::invest(tx, company, ctx.id, body.amount, now()))?;
    state.deliver(invested.notifications);
    Ok(Json(invested.value))
}

async fn all_investors(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
) -> ApiResult<Json<Vec<InvestmentView>>> {
    Ok(Json(state.read(|tx| showcase::all_investors(tx, company, ctx.id))?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentStatusBody {
    pub investment_id: InvestmentId,
    pub status: InvestmentStatus,
}

async fn investment_status(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(_company): ApiPath<CompanyId>,
    ApiJson(body): ApiJson<InvestmentStatusBody>,
) -> ApiResult<Json<Investment>> {
    let updated = state.write(|tx| {
        showcase::set_investment_status(tx, body.investment_id, ctx.id, body.status, now())
    })?;
    state.deliver(updated.notifications);
    Ok(Json(updated.value))
}

async fn investment_detail(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(company): ApiPath<CompanyId>,
) -> ApiResult<Json<Option<Investment>>> {
    Ok(Json(state.read(|tx| showcase::investment_detail(tx, company, ctx.id))?))
}

async fn invested_companies(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Vec<InvestmentView>>> {
    Ok(Json(state.read(|tx| showcase::invested_companies(tx, ctx.id))?))
}

async fn investment_requests(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Vec<InvestmentView>>> {
    Ok(Json(state.read(|tx| showcase::investment_requests(tx, ctx.id))?))
}
