//! # Users
//!
//! Account records, profile views and the operations a user performs on
//! their own account (plus the admin-side account operations).

use crate::credentials::{check_password_strength, hash_password, new_token, verify_password};
use crate::storage::{Record, RecordTable, index};
use crate::{
    CoreError, CoreResult, IndustryId, Reader, Role, Timestamp, UploadId, UserId, WriteTx,
};
use chrono::{Duration, NaiveDate};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A user counts as online this long after their last ping.
pub const ONLINE_WINDOW_SECS: i64 = 60;

/// Gender as captured on the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    #[default]
    None,
}

impl Gender {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
            Self::None => "none",
        }
    }
}

/// Who may see a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileVisibility {
    #[default]
    Everyone,
    Connections,
}

/// Per-user preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub notifications_enabled: bool,
    pub show_online_status: bool,
    pub profile_visibility: ProfileVisibility,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            show_online_status: true,
            profile_visibility: ProfileVisibility::Everyone,
        }
    }
}

/// Stored account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub salt: String,
    pub role: Role,
    pub gender: Gender,
    pub date_of_birth: Option<NaiveDate>,
    pub profile_image_id: Option<UploadId>,
    pub about: Option<String>,
    pub headline: Option<String>,
    pub looking_for: String,
    pub current_position: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub industry_ids: Vec<IndustryId>,
    pub email_verified_at: Option<Timestamp>,
    pub phone_verified_at: Option<Timestamp>,
    pub phone_skipped: bool,
    pub suspended: bool,
    pub deleted_at: Option<Timestamp>,
    pub last_seen_at: Option<Timestamp>,
    pub rating_sum: u64,
    pub rating_count: u64,
    pub settings: UserSettings,
    pub blocked: BTreeSet<UserId>,
    pub declined_recommendations: BTreeSet<UserId>,
    pub auth_tokens: Vec<String>,
    pub created_at: Timestamp,
}

impl Record for User {
    const TABLE: RecordTable = TableDefinition::new("users");
    const KIND: &'static str = "user";
    fn key(&self) -> u64 {
        self.id.0
    }
}

impl User {
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Live account that may use the API.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_deleted() && !self.suspended
    }

    /// All the data needed to use the app has been provided.
    #[must_use]
    pub fn is_all_data_available(&self) -> bool {
        self.phone.is_some()
            && self.gender != Gender::None
            && self.date_of_birth.is_some()
            && !self.email.is_empty()
            && !self.name.is_empty()
    }

    /// Every profile field is filled in.
    #[must_use]
    pub fn is_profile_completed(&self) -> bool {
        !self.email.is_empty()
            && self.phone.is_some()
            && self.gender != Gender::None
            && self.date_of_birth.is_some()
            && self.profile_image_id.is_some()
            && self.about.is_some()
            && self.headline.is_some()
            && !self.looking_for.is_empty()
            && self.current_position.is_some()
    }

    /// Age in whole years on `today`.
    #[must_use]
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        self.date_of_birth.and_then(|dob| today.years_since(dob))
    }

    #[must_use]
    pub fn is_online(&self, now: Timestamp) -> bool {
        self.last_seen_at
            .is_some_and(|seen| now - seen <= Duration::seconds(ONLINE_WINDOW_SECS))
    }
}

// =============================================================================
// VIEWS
// =============================================================================

/// Compact user reference used in lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub headline: Option<String>,
    pub profile_image_id: Option<UploadId>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            headline: user.headline.clone(),
            profile_image_id: user.profile_image_id,
        }
    }
}

/// Profile fields safe to return to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub gender: Gender,
    pub date_of_birth: Option<NaiveDate>,
    pub profile_image_id: Option<UploadId>,
    pub about: Option<String>,
    pub headline: Option<String>,
    pub looking_for: String,
    pub current_position: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub industry_ids: Vec<IndustryId>,
    pub is_email_verified: bool,
    pub is_phone_verified: bool,
    pub is_phone_skipped: bool,
    pub is_suspended: bool,
    pub rating_sum: u64,
    pub rating_count: u64,
    pub created_at: Timestamp,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: user.role,
            gender: user.gender,
            date_of_birth: user.date_of_birth,
            profile_image_id: user.profile_image_id,
            about: user.about.clone(),
            headline: user.headline.clone(),
            looking_for: user.looking_for.clone(),
            current_position: user.current_position.clone(),
            country: user.country.clone(),
            state: user.state.clone(),
            industry_ids: user.industry_ids.clone(),
            is_email_verified: user.email_verified_at.is_some(),
            is_phone_verified: user.phone_verified_at.is_some(),
            is_phone_skipped: user.phone_skipped,
            is_suspended: user.suspended,
            rating_sum: user.rating_sum,
            rating_count: user.rating_count,
            created_at: user.created_at,
        }
    }
}

/// Runtime verification flags reported alongside the user info.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationFlags {
    pub is_email_verification_flow_needed: bool,
    pub is_email_verification_compulsory: bool,
    pub is_phone_verification_flow_needed: bool,
    pub is_phone_verification_compulsory: bool,
}

/// Response of `GET /api/user/info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub verification_flows: VerificationFlags,
    pub is_all_data_available: bool,
    pub is_profile_completed: bool,
}

#[must_use]
pub fn user_info(user: &User, flags: VerificationFlags) -> UserInfo {
    UserInfo {
        profile: UserProfile::from(user),
        verification_flows: flags,
        is_all_data_available: user.is_all_data_available(),
        is_profile_completed: user.is_profile_completed(),
    }
}

// =============================================================================
// REGISTRATION AND LOGIN
// =============================================================================

/// Input for a new account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Token issued on login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginGrant {
    pub token: String,
    pub user_id: UserId,
    pub role: Role,
}

/// Lower-case and validate an email address: a non-empty local part and
/// domain around a single '@'. Dotless domains such as `localhost` are fine.
pub fn normalize_email(raw: &str) -> CoreResult<String> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(CoreError::invalid("invalid email")),
    }
}

/// Strip separators and validate a phone number.
pub fn normalize_phone(raw: &str) -> CoreResult<String> {
    let phone: String = raw.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
    let digits = phone.trim_start_matches('+');
    if digits.len() < 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::invalid("invalid phone number"));
    }
    Ok(phone)
}

/// Live user owning an email, if any.
pub fn find_by_email(tx: &impl Reader, email: &str) -> CoreResult<Option<User>> {
    let email = email.trim().to_lowercase();
    match tx.lookup(index::EMAIL, &email)? {
        Some(id) => tx.get(id),
        None => Ok(None),
    }
}

/// Live user owning a phone number, if any.
pub fn find_by_phone(tx: &impl Reader, phone: &str) -> CoreResult<Option<User>> {
    let phone = normalize_phone(phone)?;
    match tx.lookup(index::PHONE, &phone)? {
        Some(id) => tx.get(id),
        None => Ok(None),
    }
}

/// Fetch a user that has not been deleted.
pub fn require_live(tx: &impl Reader, id: UserId) -> CoreResult<User> {
    let user: User = tx.require(id.0)?;
    if user.is_deleted() {
        return Err(CoreError::NotFound(User::KIND));
    }
    Ok(user)
}

/// Create an account with role `user`.
pub fn register(tx: &WriteTx, input: NewUser, now: Timestamp) -> CoreResult<User> {
    create_account(tx, input, Role::User, now)
}

/// Create an account with an explicit role.
pub fn create_account(
    tx: &WriteTx,
    input: NewUser,
    role: Role,
    now: Timestamp,
) -> CoreResult<User> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(CoreError::invalid("name cannot be empty"));
    }
    let email = normalize_email(&input.email)?;
    check_password_strength(&input.password)?;
    if tx.lookup(index::EMAIL, &email)?.is_some() {
        return Err(CoreError::conflict("email already registered"));
    }
    let phone = match input.phone.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => {
            let phone = normalize_phone(p)?;
            if tx.lookup(index::PHONE, &phone)?.is_some() {
                return Err(CoreError::conflict("phone already registered"));
            }
            Some(phone)
        }
        _ => None,
    };

    let digest = hash_password(&input.password);
    let id = UserId(tx.next_id::<User>()?);
    let user = User {
        id,
        name,
        email: email.clone(),
        phone: phone.clone(),
        password_hash: digest.hash,
        salt: digest.salt,
        role,
        gender: Gender::None,
        date_of_birth: None,
        profile_image_id: None,
        about: None,
        headline: None,
        looking_for: String::new(),
        current_position: None,
        country: None,
        state: None,
        industry_ids: Vec::new(),
        email_verified_at: None,
        phone_verified_at: None,
        phone_skipped: false,
        suspended: false,
        deleted_at: None,
        last_seen_at: None,
        rating_sum: 0,
        rating_count: 0,
        settings: UserSettings::default(),
        blocked: BTreeSet::new(),
        declined_recommendations: BTreeSet::new(),
        auth_tokens: Vec::new(),
        created_at: now,
    };
    tx.put(&user)?;
    tx.set_index(index::EMAIL, &email, id.0)?;
    if let Some(phone) = &phone {
        tx.set_index(index::PHONE, phone, id.0)?;
    }
    Ok(user)
}

/// Check credentials and issue a new auth token.
pub fn login(tx: &WriteTx, email: &str, password: &str) -> CoreResult<LoginGrant> {
    let invalid = || CoreError::unauthorized("invalid credentials");
    let mut user = find_by_email(tx, email)?.ok_or_else(invalid)?;
    if user.is_deleted() {
        return Err(invalid());
    }
    if !verify_password(password, &user.salt, &user.password_hash) {
        return Err(invalid());
    }
    if user.suspended {
        return Err(CoreError::forbidden("account suspended"));
    }
    let token = issue_auth_token(tx, &mut user)?;
    Ok(LoginGrant {
        token,
        user_id: user.id,
        role: user.role,
    })
}

/// Login restricted to admin accounts.
pub fn login_admin(tx: &WriteTx, email: &str, password: &str) -> CoreResult<LoginGrant> {
    let grant = login(tx, email, password)?;
    if grant.role != Role::Admin {
        revoke_auth_token(tx, &grant.token)?;
        return Err(CoreError::forbidden("admin access required"));
    }
    Ok(grant)
}

/// Issue an extra auth token for a user (used by the local-only token route).
pub fn issue_auth_token(tx: &WriteTx, user: &mut User) -> CoreResult<String> {
    let token = new_token();
    user.auth_tokens.push(token.clone());
    tx.put(user)?;
    tx.set_index(index::AUTH_TOKEN, &token, user.id.0)?;
    Ok(token)
}

fn revoke_auth_token(tx: &WriteTx, token: &str) -> CoreResult<()> {
    if let Some(id) = tx.lookup(index::AUTH_TOKEN, token)? {
        let mut user: User = tx.require(id)?;
        user.auth_tokens.retain(|t| t != token);
        tx.put(&user)?;
    }
    tx.remove_index(index::AUTH_TOKEN, token)
}

/// Remove every auth token of a user. Returns the revoked tokens.
pub fn revoke_all_auth_tokens(tx: &WriteTx, user: &mut User) -> CoreResult<Vec<String>> {
    let tokens = std::mem::take(&mut user.auth_tokens);
    for token in &tokens {
        tx.remove_index(index::AUTH_TOKEN, token)?;
    }
    tx.put(user)?;
    Ok(tokens)
}

/// Resolve an auth token to its user.
pub fn user_for_token(tx: &impl Reader, token: &str) -> CoreResult<Option<User>> {
    match tx.lookup(index::AUTH_TOKEN, token)? {
        Some(id) => tx.get(id),
        None => Ok(None),
    }
}

// =============================================================================
// PROFILE EDITS
// =============================================================================

/// Partial profile update; absent fields stay unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEdit {
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub about: Option<String>,
    pub headline: Option<String>,
    pub looking_for: Option<String>,
    pub current_position: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn edit_profile(
    tx: &WriteTx,
    id: UserId,
    edit: ProfileEdit,
    today: NaiveDate,
) -> CoreResult<User> {
    let mut user = require_live(tx, id)?;
    if let Some(name) = edit.name {
        user.name = non_empty(name).ok_or_else(|| CoreError::invalid("name cannot be empty"))?;
    }
    if let Some(gender) = edit.gender {
        user.gender = gender;
    }
    if let Some(dob) = edit.date_of_birth {
        if dob > today {
            return Err(CoreError::invalid("date of birth is in the future"));
        }
        user.date_of_birth = Some(dob);
    }
    if let Some(about) = edit.about {
        user.about = non_empty(about);
    }
    if let Some(headline) = edit.headline {
        user.headline = non_empty(headline);
    }
    if let Some(looking_for) = edit.looking_for {
        user.looking_for = looking_for.trim().to_string();
    }
    if let Some(position) = edit.current_position {
        user.current_position = non_empty(position);
    }
    if let Some(country) = edit.country {
        user.country = non_empty(country);
    }
    if let Some(state) = edit.state {
        user.state = non_empty(state);
    }
    tx.put(&user)?;
    Ok(user)
}

pub fn update_profile_image(tx: &WriteTx, id: UserId, image: UploadId) -> CoreResult<User> {
    let mut user = require_live(tx, id)?;
    let _: crate::uploads::Upload = tx.require(image.0)?;
    user.profile_image_id = Some(image);
    tx.put(&user)?;
    Ok(user)
}

/// Replace the phone number; clears phone verification.
pub fn change_phone(tx: &WriteTx, id: UserId, raw_phone: &str) -> CoreResult<User> {
    let mut user = require_live(tx, id)?;
    let phone = normalize_phone(raw_phone)?;
    if user.phone.as_deref() == Some(phone.as_str()) {
        return Ok(user);
    }
    if let Some(owner) = tx.lookup(index::PHONE, &phone)? {
        if owner != id.0 {
            return Err(CoreError::conflict("phone already registered"));
        }
    }
    if let Some(old) = user.phone.take() {
        tx.remove_index(index::PHONE, &old)?;
    }
    tx.set_index(index::PHONE, &phone, id.0)?;
    user.phone = Some(phone);
    user.phone_verified_at = None;
    user.phone_skipped = false;
    tx.put(&user)?;
    Ok(user)
}

/// Replace the email; clears email verification.
pub fn change_email(tx: &WriteTx, id: UserId, raw_email: &str) -> CoreResult<User> {
    let mut user = require_live(tx, id)?;
    let email = normalize_email(raw_email)?;
    if user.email == email {
        return Ok(user);
    }
    if tx.lookup(index::EMAIL, &email)?.is_some() {
        return Err(CoreError::conflict("email already registered"));
    }
    tx.remove_index(index::EMAIL, &user.email)?;
    tx.set_index(index::EMAIL, &email, id.0)?;
    user.email = email;
    user.email_verified_at = None;
    tx.put(&user)?;
    Ok(user)
}

pub fn skip_phone(tx: &WriteTx, id: UserId) -> CoreResult<User> {
    let mut user = require_live(tx, id)?;
    user.phone_skipped = true;
    tx.put(&user)?;
    Ok(user)
}

pub fn change_password(tx: &WriteTx, id: UserId, old: &str, new: &str) -> CoreResult<()> {
    let user = require_live(tx, id)?;
    if !verify_password(old, &user.salt, &user.password_hash) {
        return Err(CoreError::unauthorized("old password is incorrect"));
    }
    set_password(tx, user, new)
}

/// Overwrite the password without checking the old one.
pub fn set_password(tx: &WriteTx, mut user: User, new: &str) -> CoreResult<()> {
    check_password_strength(new)?;
    let digest = hash_password(new);
    user.password_hash = digest.hash;
    user.salt = digest.salt;
    tx.put(&user)
}

pub fn set_location(tx: &WriteTx, id: UserId, country: &str, state: &str) -> CoreResult<User> {
    let mut user = require_live(tx, id)?;
    user.country = non_empty(country.to_string());
    user.state = non_empty(state.to_string());
    tx.put(&user)?;
    Ok(user)
}

/// Replace the user's industries; every id must exist in the catalog.
pub fn set_industries(tx: &WriteTx, id: UserId, industries: &[IndustryId]) -> CoreResult<User> {
    let mut user = require_live(tx, id)?;
    let mut ids: Vec<IndustryId> = Vec::with_capacity(industries.len());
    for industry in industries {
        let _: crate::catalog::Industry = tx.require(industry.0)?;
        if !ids.contains(industry) {
            ids.push(*industry);
        }
    }
    user.industry_ids = ids;
    tx.put(&user)?;
    Ok(user)
}

pub fn update_settings(tx: &WriteTx, id: UserId, settings: UserSettings) -> CoreResult<UserSettings> {
    let mut user = require_live(tx, id)?;
    user.settings = settings;
    tx.put(&user)?;
    Ok(user.settings)
}

/// Rate another user 1..=5.
pub fn add_rating(tx: &WriteTx, rater: UserId, target: UserId, rating: u8) -> CoreResult<()> {
    if rater == target {
        return Err(CoreError::invalid("cannot rate yourself"));
    }
    if !(1..=5).contains(&rating) {
        return Err(CoreError::invalid("rating must be between 1 and 5"));
    }
    let mut user = require_live(tx, target)?;
    user.rating_sum = user.rating_sum.saturating_add(u64::from(rating));
    user.rating_count = user.rating_count.saturating_add(1);
    tx.put(&user)
}

// =============================================================================
// PRESENCE
// =============================================================================

pub fn ping(tx: &WriteTx, id: UserId, now: Timestamp) -> CoreResult<()> {
    let mut user = require_live(tx, id)?;
    user.last_seen_at = Some(now);
    tx.put(&user)
}

/// Online state of one user as seen by others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineStatus {
    pub user_id: UserId,
    pub is_online: bool,
    pub last_seen_at: Option<Timestamp>,
}

/// Online status for a list of users. Unknown ids are skipped; users hiding
/// their status always appear offline.
pub fn online_statuses(
    tx: &impl Reader,
    ids: &[UserId],
    now: Timestamp,
) -> CoreResult<Vec<OnlineStatus>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(user) = tx.get::<User>(id.0)? else {
            continue;
        };
        if user.is_deleted() {
            continue;
        }
        let visible = user.settings.show_online_status;
        out.push(OnlineStatus {
            user_id: user.id,
            is_online: visible && user.is_online(now),
            last_seen_at: if visible { user.last_seen_at } else { None },
        });
    }
    Ok(out)
}

// =============================================================================
// BLOCKING
// =============================================================================

/// True if either user blocked the other.
pub fn is_blocked_between(tx: &impl Reader, a: UserId, b: UserId) -> CoreResult<bool> {
    let ua: Option<User> = tx.get(a.0)?;
    let ub: Option<User> = tx.get(b.0)?;
    Ok(ua.is_some_and(|u| u.blocked.contains(&b)) || ub.is_some_and(|u| u.blocked.contains(&a)))
}

/// Block or unblock `target`. Returns true if now blocked.
pub fn toggle_block(tx: &WriteTx, id: UserId, target: UserId) -> CoreResult<bool> {
    if id == target {
        return Err(CoreError::invalid("cannot block yourself"));
    }
    require_live(tx, target)?;
    let mut user = require_live(tx, id)?;
    let blocked = if user.blocked.remove(&target) {
        false
    } else {
        user.blocked.insert(target);
        true
    };
    tx.put(&user)?;
    if blocked {
        crate::connections::sever(tx, id, target)?;
    }
    Ok(blocked)
}

/// Bulk block/unblock.
pub fn edit_blocked(
    tx: &WriteTx,
    id: UserId,
    block: &[UserId],
    unblock: &[UserId],
) -> CoreResult<Vec<UserId>> {
    let mut user = require_live(tx, id)?;
    for target in block {
        if *target != id && tx.get::<User>(target.0)?.is_some() && user.blocked.insert(*target) {
            crate::connections::sever(tx, id, *target)?;
        }
    }
    for target in unblock {
        user.blocked.remove(target);
    }
    tx.put(&user)?;
    Ok(user.blocked.iter().copied().collect())
}

pub fn blocked_profiles(tx: &impl Reader, id: UserId) -> CoreResult<Vec<UserSummary>> {
    let user = require_live(tx, id)?;
    let mut out = Vec::with_capacity(user.blocked.len());
    for blocked in &user.blocked {
        if let Some(other) = tx.get::<User>(blocked.0)? {
            out.push(UserSummary::from(&other));
        }
    }
    Ok(out)
}

/// Someone else's profile as seen by `viewer`.
pub fn profile_for_viewer(tx: &impl Reader, viewer: UserId, target: UserId) -> CoreResult<UserProfile> {
    let user = require_live(tx, target)?;
    if user.blocked.contains(&viewer) {
        return Err(CoreError::NotFound(User::KIND));
    }
    if viewer != target
        && user.settings.profile_visibility == ProfileVisibility::Connections
        && !crate::connections::are_connected(tx, viewer, target)?
    {
        return Err(CoreError::forbidden("profile is visible to connections only"));
    }
    Ok(UserProfile::from(&user))
}

// =============================================================================
// DELETION AND MODERATION
// =============================================================================

/// Tokens that stopped working because of an account change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevokedCredentials {
    pub auth_tokens: Vec<String>,
    pub session_tokens: Vec<String>,
}

/// Soft-delete an account and detach it from groups and chats.
pub fn delete_user(tx: &WriteTx, id: UserId, now: Timestamp) -> CoreResult<RevokedCredentials> {
    let mut user = require_live(tx, id)?;
    tx.remove_index(index::EMAIL, &user.email)?;
    if let Some(phone) = &user.phone {
        tx.remove_index(index::PHONE, phone)?;
    }
    user.deleted_at = Some(now);
    let auth_tokens = revoke_all_auth_tokens(tx, &mut user)?;
    let session_tokens = crate::sessions::end_all_for_user(tx, id, now)?;
    crate::groups::remove_user_everywhere(tx, id)?;
    crate::chat::depart_everywhere(tx, id)?;
    Ok(RevokedCredentials {
        auth_tokens,
        session_tokens,
    })
}

/// Toggle suspension. Suspending revokes every credential.
pub fn toggle_suspend(
    tx: &WriteTx,
    id: UserId,
    now: Timestamp,
) -> CoreResult<(bool, RevokedCredentials)> {
    let mut user = require_live(tx, id)?;
    user.suspended = !user.suspended;
    let revoked = if user.suspended {
        let auth_tokens = revoke_all_auth_tokens(tx, &mut user)?;
        let session_tokens = crate::sessions::end_all_for_user(tx, id, now)?;
        RevokedCredentials {
            auth_tokens,
            session_tokens,
        }
    } else {
        tx.put(&user)?;
        RevokedCredentials::default()
    };
    Ok((user.suspended, revoked))
}

/// Fields an admin may change on any account.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub headline: Option<String>,
    pub current_position: Option<String>,
}

pub fn admin_update(tx: &WriteTx, id: UserId, update: AdminUserUpdate) -> CoreResult<User> {
    if let Some(email) = &update.email {
        change_email(tx, id, email)?;
    }
    if let Some(phone) = &update.phone {
        change_phone(tx, id, phone)?;
    }
    let mut user = require_live(tx, id)?;
    if let Some(name) = update.name {
        user.name = non_empty(name).ok_or_else(|| CoreError::invalid("name cannot be empty"))?;
    }
    if let Some(role) = update.role {
        user.role = role;
    }
    if let Some(headline) = update.headline {
        user.headline = non_empty(headline);
    }
    if let Some(position) = update.current_position {
        user.current_position = non_empty(position);
    }
    tx.put(&user)?;
    Ok(user)
}

/// Mark a user's email verified.
pub fn mark_email_verified(tx: &WriteTx, id: UserId, now: Timestamp) -> CoreResult<()> {
    let mut user = require_live(tx, id)?;
    user.email_verified_at = Some(now);
    tx.put(&user)
}

/// Mark a user's phone verified.
pub fn mark_phone_verified(tx: &WriteTx, id: UserId, now: Timestamp) -> CoreResult<()> {
    let mut user = require_live(tx, id)?;
    user.phone_verified_at = Some(now);
    tx.put(&user)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::Store;
    use chrono::{TimeZone, Utc};

    pub(crate) fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap()
    }

    pub(crate) fn new_user(store: &Store, name: &str) -> User {
        store
            .write(|tx| {
                register(
                    tx,
                    NewUser {
                        name: name.to_string(),
                        email: format!("{}@example.com", name.to_lowercase()),
                        password: "password123".into(),
                        phone: None,
                    },
                    now(),
                )
            })
            .unwrap()
    }

    #[test]
    fn register_normalizes_and_rejects_duplicates() {
        let store = Store::in_memory().unwrap();
        let user = store
            .write(|tx| {
                register(
                    tx,
                    NewUser {
                        name: " Alice ".into(),
                        email: " Alice@Example.COM ".into(),
                        password: "password123".into(),
                        phone: Some("+1 555 0100".into()),
                    },
                    now(),
                )
            })
            .unwrap();
        assert_eq!(user.name, "Alice");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.phone.as_deref(), Some("+15550100"));

        let dup = store.write(|tx| {
            register(
                tx,
                NewUser {
                    name: "Other".into(),
                    email: "alice@example.com".into(),
                    password: "password123".into(),
                    phone: None,
                },
                now(),
            )
        });
        assert!(matches!(dup, Err(CoreError::Conflict(_))));
    }

    #[test]
    fn register_validates_input() {
        let store = Store::in_memory().unwrap();
        let bad_email = store.write(|tx| {
            register(
                tx,
                NewUser {
                    name: "A".into(),
                    email: "nope".into(),
                    password: "password123".into(),
                    phone: None,
                },
                now(),
            )
        });
        assert!(matches!(bad_email, Err(CoreError::Invalid(_))));

        let short_pw = store.write(|tx| {
            register(
                tx,
                NewUser {
                    name: "A".into(),
                    email: "a@example.com".into(),
                    password: "short".into(),
                    phone: None,
                },
                now(),
            )
        });
        assert!(matches!(short_pw, Err(CoreError::Invalid(_))));
    }

    #[test]
    fn normalize_email_accepts_dotless_domains() {
        assert_eq!(normalize_email(" Root@LocalHost ").unwrap(), "root@localhost");
        assert_eq!(normalize_email("a@b.co").unwrap(), "a@b.co");

        for bad in ["", "plain", "@localhost", "user@", "a@b@c"] {
            assert!(
                matches!(normalize_email(bad), Err(CoreError::Invalid(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn login_issues_token_and_rejects_bad_password() {
        let store = Store::in_memory().unwrap();
        let user = new_user(&store, "Bob");

        let grant = store
            .write(|tx| login(tx, "BOB@example.com", "password123"))
            .unwrap();
        assert_eq!(grant.user_id, user.id);
        let resolved = store.read(|tx| user_for_token(tx, &grant.token)).unwrap();
        assert_eq!(resolved.map(|u| u.id), Some(user.id));

        let bad = store.write(|tx| login(tx, "bob@example.com", "wrong-password"));
        assert!(matches!(bad, Err(CoreError::Unauthorized(_))));
    }

    #[test]
    fn admin_login_requires_admin_role() {
        let store = Store::in_memory().unwrap();
        new_user(&store, "Carol");
        let denied = store.write(|tx| login_admin(tx, "carol@example.com", "password123"));
        assert!(matches!(denied, Err(CoreError::Forbidden(_))));
    }

    #[test]
    fn profile_completion_flags() {
        let store = Store::in_memory().unwrap();
        let user = new_user(&store, "Dan");
        assert!(!user.is_all_data_available());
        assert!(!user.is_profile_completed());

        let mut full = user.clone();
        full.phone = Some("+15550100".into());
        full.gender = Gender::Male;
        full.date_of_birth = NaiveDate::from_ymd_opt(1990, 1, 1);
        assert!(full.is_all_data_available());
        assert!(!full.is_profile_completed());

        full.profile_image_id = Some(UploadId(1));
        full.about = Some("about".into());
        full.headline = Some("headline".into());
        full.looking_for = "co-founder".into();
        full.current_position = Some("CTO".into());
        assert!(full.is_profile_completed());
    }

    #[test]
    fn change_email_moves_index_and_clears_verification() {
        let store = Store::in_memory().unwrap();
        let user = new_user(&store, "Eve");
        store
            .write(|tx| mark_email_verified(tx, user.id, now()))
            .unwrap();
        let updated = store
            .write(|tx| change_email(tx, user.id, "eve2@example.com"))
            .unwrap();
        assert!(updated.email_verified_at.is_none());
        let old = store.read(|tx| find_by_email(tx, "eve@example.com")).unwrap();
        assert!(old.is_none());
        let new = store.read(|tx| find_by_email(tx, "eve2@example.com")).unwrap();
        assert_eq!(new.map(|u| u.id), Some(user.id));
    }

    #[test]
    fn online_status_respects_window_and_settings() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Fay");
        let b = new_user(&store, "Gus");
        store.write(|tx| ping(tx, a.id, now())).unwrap();
        store.write(|tx| ping(tx, b.id, now())).unwrap();
        store
            .write(|tx| {
                update_settings(
                    tx,
                    b.id,
                    UserSettings {
                        show_online_status: false,
                        ..UserSettings::default()
                    },
                )
            })
            .unwrap();

        let later = now() + Duration::seconds(30);
        let statuses = store
            .read(|tx| online_statuses(tx, &[a.id, b.id, UserId(99)], later))
            .unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].is_online);
        assert!(!statuses[1].is_online);
        assert!(statuses[1].last_seen_at.is_none());

        let much_later = now() + Duration::seconds(61);
        let statuses = store
            .read(|tx| online_statuses(tx, &[a.id], much_later))
            .unwrap();
        assert!(!statuses[0].is_online);
    }

    #[test]
    fn toggle_block_flips() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Hal");
        let b = new_user(&store, "Ida");
        assert!(store.write(|tx| toggle_block(tx, a.id, b.id)).unwrap());
        assert!(store.read(|tx| is_blocked_between(tx, b.id, a.id)).unwrap());
        assert!(!store.write(|tx| toggle_block(tx, a.id, b.id)).unwrap());
        assert!(store.write(|tx| toggle_block(tx, a.id, a.id)).is_err());
    }

    #[test]
    fn delete_frees_email_and_revokes_tokens() {
        let store = Store::in_memory().unwrap();
        let user = new_user(&store, "Jay");
        let grant = store
            .write(|tx| login(tx, "jay@example.com", "password123"))
            .unwrap();
        let revoked = store.write(|tx| delete_user(tx, user.id, now())).unwrap();
        assert_eq!(revoked.auth_tokens, vec![grant.token.clone()]);
        assert!(
            store
                .read(|tx| user_for_token(tx, &grant.token))
                .unwrap()
                .is_none()
        );
        // Email can be registered again.
        new_user(&store, "Jay");
    }

    #[test]
    fn suspension_blocks_login() {
        let store = Store::in_memory().unwrap();
        let user = new_user(&store, "Kim");
        let (suspended, _) = store
            .write(|tx| toggle_suspend(tx, user.id, now()))
            .unwrap();
        assert!(suspended);
        let denied = store.write(|tx| login(tx, "kim@example.com", "password123"));
        assert!(matches!(denied, Err(CoreError::Forbidden(_))));
    }

    #[test]
    fn ratings_are_bounded() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Lee");
        let b = new_user(&store, "Max");
        assert!(store.write(|tx| add_rating(tx, a.id, b.id, 6)).is_err());
        assert!(store.write(|tx| add_rating(tx, a.id, a.id, 3)).is_err());
        store.write(|tx| add_rating(tx, a.id, b.id, 4)).unwrap();
        let b: User = store.read(|tx| tx.require(b.id.0)).unwrap();
        assert_eq!((b.rating_sum, b.rating_count), (4, 1));
    }
}
