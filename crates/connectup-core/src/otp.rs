//! # One-time codes and email links
//!
//! Codes are six digits, valid for ten minutes and locked after five wrong
//! attempts. Issuing a code invalidates earlier unused codes for the same
//! target and reason.
//!
//! A wrong guess must be persisted even though the request fails, so
//! verification returns [`OtpCheck`] instead of an error; callers commit
//! and then convert it with [`OtpCheck::into_result`].

use crate::credentials::{constant_time_eq, new_otp_code, new_token};
use crate::storage::{Record, RecordTable, index};
use crate::users::{self, User, normalize_email, normalize_phone};
use crate::{CoreError, CoreResult, Reader, Timestamp, UserId, WriteTx};
use chrono::Duration;
use redb::TableDefinition;
use serde::{Deserialize, Serialize};

/// Validity of a one-time code.
pub const OTP_TTL_MINUTES: i64 = 10;

/// Wrong guesses allowed before a code locks.
pub const MAX_OTP_ATTEMPTS: u8 = 5;

/// Validity of an email verification link.
pub const EMAIL_LINK_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpReason {
    ResetPassword,
    VerifyPhone,
    VerifyEmail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Otp {
    pub id: u64,
    pub target: String,
    pub reason: OtpReason,
    pub code: String,
    pub attempts: u8,
    pub verified: bool,
    pub used: bool,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Record for Otp {
    const TABLE: RecordTable = TableDefinition::new("otps");
    const KIND: &'static str = "otp";
    fn key(&self) -> u64 {
        self.id
    }
}

/// Emails contain `@`; everything else is treated as a phone number.
pub fn normalize_target(raw: &str) -> CoreResult<String> {
    if raw.contains('@') {
        normalize_email(raw)
    } else {
        normalize_phone(raw)
    }
}

/// Issue a fresh code for `target`.
pub fn issue_otp(
    tx: &WriteTx,
    target: &str,
    reason: OtpReason,
    now: Timestamp,
) -> CoreResult<Otp> {
    let target = normalize_target(target)?;
    if reason == OtpReason::ResetPassword && users::find_by_email(tx, &target)?.is_none() {
        return Err(CoreError::NotFound(User::KIND));
    }
    for mut old in tx.filter::<Otp>(|o| o.target == target && o.reason == reason && !o.used)? {
        old.used = true;
        tx.put(&old)?;
    }
    let otp = Otp {
        id: tx.next_id::<Otp>()?,
        target,
        reason,
        code: new_otp_code(),
        attempts: 0,
        verified: false,
        used: false,
        created_at: now,
        expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
    };
    tx.put(&otp)?;
    Ok(otp)
}

/// Result of checking a code.
#[derive(Debug)]
pub enum OtpCheck {
    Accepted(Otp),
    Rejected(CoreError),
}

impl OtpCheck {
    pub fn into_result(self) -> CoreResult<Otp> {
        match self {
            Self::Accepted(otp) => Ok(otp),
            Self::Rejected(err) => Err(err),
        }
    }
}

fn latest_open(tx: &impl Reader, target: &str, reason: OtpReason) -> CoreResult<Option<Otp>> {
    Ok(tx
        .filter::<Otp>(|o| o.target == target && o.reason == reason && !o.used)?
        .pop())
}

/// Check `code` against the latest open code for `target`.
///
/// Wrong guesses are counted; an accepted code is marked verified.
pub fn verify_otp(
    tx: &WriteTx,
    target: &str,
    code: &str,
    reason: OtpReason,
    now: Timestamp,
) -> CoreResult<OtpCheck> {
    let target = normalize_target(target)?;
    let Some(mut otp) = latest_open(tx, &target, reason)? else {
        return Ok(OtpCheck::Rejected(CoreError::invalid("invalid otp")));
    };
    if now >= otp.expires_at {
        return Ok(OtpCheck::Rejected(CoreError::Expired("otp expired".into())));
    }
    if otp.attempts >= MAX_OTP_ATTEMPTS {
        return Ok(OtpCheck::Rejected(CoreError::TooManyAttempts));
    }
    if !constant_time_eq(&otp.code, code.trim()) {
        otp.attempts = otp.attempts.saturating_add(1);
        tx.put(&otp)?;
        return Ok(OtpCheck::Rejected(CoreError::invalid("invalid otp")));
    }
    otp.verified = true;
    tx.put(&otp)?;
    Ok(OtpCheck::Accepted(otp))
}

/// Verify the signed-in user's phone or email with a code.
pub fn verify_user_otp(
    tx: &WriteTx,
    user_id: UserId,
    code: &str,
    reason: OtpReason,
    now: Timestamp,
) -> CoreResult<OtpCheck> {
    let user = users::require_live(tx, user_id)?;
    let target = match reason {
        OtpReason::VerifyPhone => user
            .phone
            .clone()
            .ok_or_else(|| CoreError::invalid("phone number not set"))?,
        OtpReason::VerifyEmail => user.email.clone(),
        OtpReason::ResetPassword => return Err(CoreError::invalid("invalid otp reason")),
    };
    let check = verify_otp(tx, &target, code, reason, now)?;
    if let OtpCheck::Accepted(otp) = &check {
        let mut otp = otp.clone();
        otp.used = true;
        tx.put(&otp)?;
        match reason {
            OtpReason::VerifyPhone => users::mark_phone_verified(tx, user_id, now)?,
            _ => users::mark_email_verified(tx, user_id, now)?,
        }
    }
    Ok(check)
}

/// Reset a password with a code previously accepted by [`verify_otp`].
pub fn change_password_using_otp(
    tx: &WriteTx,
    email: &str,
    code: &str,
    new_password: &str,
    now: Timestamp,
) -> CoreResult<()> {
    let email = normalize_email(email)?;
    let mut otp = latest_open(tx, &email, OtpReason::ResetPassword)?
        .filter(|o| o.verified && constant_time_eq(&o.code, code.trim()))
        .ok_or_else(|| CoreError::invalid("invalid otp"))?;
    if now >= otp.expires_at {
        return Err(CoreError::Expired("otp expired".into()));
    }
    let user = users::find_by_email(tx, &email)?.ok_or(CoreError::NotFound(User::KIND))?;
    users::set_password(tx, user, new_password)?;
    otp.used = true;
    tx.put(&otp)
}

// =============================================================================
// EMAIL LINKS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailLink {
    pub id: u64,
    pub user_id: UserId,
    pub token: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub used_at: Option<Timestamp>,
}

impl Record for EmailLink {
    const TABLE: RecordTable = TableDefinition::new("email_links");
    const KIND: &'static str = "email link";
    fn key(&self) -> u64 {
        self.id
    }
}

/// Create a verification link token, expiring the user's earlier links.
pub fn issue_email_link(tx: &WriteTx, user_id: UserId, now: Timestamp) -> CoreResult<EmailLink> {
    let user = users::require_live(tx, user_id)?;
    if user.email_verified_at.is_some() {
        return Err(CoreError::invalid(
            "You are already Verified, Please reopen the app",
        ));
    }
    for mut old in tx.filter::<EmailLink>(|l| l.user_id == user_id && now < l.expires_at)? {
        old.expires_at = now;
        tx.put(&old)?;
    }
    let link = EmailLink {
        id: tx.next_id::<EmailLink>()?,
        user_id,
        token: new_token(),
        created_at: now,
        expires_at: now + Duration::hours(EMAIL_LINK_TTL_HOURS),
        used_at: None,
    };
    tx.put(&link)?;
    tx.set_index(index::EMAIL_LINK, &link.token, link.id)?;
    Ok(link)
}

/// Consume a link token and mark the owner's email verified.
pub fn verify_email_link(tx: &WriteTx, token: &str, now: Timestamp) -> CoreResult<UserId> {
    let invalid = || CoreError::invalid("invalid token");
    let id = tx.lookup(index::EMAIL_LINK, token)?.ok_or_else(invalid)?;
    let mut link: EmailLink = tx.get(id)?.ok_or_else(invalid)?;
    if link.used_at.is_some() || now >= link.expires_at {
        return Err(CoreError::Expired("token expired".into()));
    }
    link.used_at = Some(now);
    tx.put(&link)?;
    users::mark_email_verified(tx, link.user_id, now)?;
    Ok(link.user_id)
}
