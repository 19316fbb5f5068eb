//! Input sanitizing for the admin route handlers.
//!
//! Every write path goes through here before touching a store: strings are trimmed and
//! length-checked, identifiers are restricted to a safe alphabet, and request payloads are
//! turned into the typed records and patches the stores accept.

use std::collections::BTreeSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        ContentItem, ContentPatch, ContentStatus, CreateContentRequest, CreateProviderRequest,
        CreateRoleRequest, CreateStaffUserRequest, NewProvider, ProviderPatch, RoleDefinition,
        SecuritySettings, UpdateContentRequest, UpdateProviderRequest,
        UpdateSecuritySettingsRequest, UpdateUserRequest, UserPatch, UserRecord, UserStatus,
    },
    rbac::normalize_grants,
};

pub const MAX_TITLE: usize = 200;
pub const MAX_NAME: usize = 120;
pub const MAX_SUMMARY: usize = 500;
pub const MAX_BODY: usize = 100_000;
pub const MAX_TAGS: usize = 20;
pub const MAX_TAG: usize = 40;
pub const MAX_SEARCH: usize = 100;
pub const MAX_ID: usize = 128;

pub fn required_text(field: &str, value: &str, max: usize) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(field, format!("{} is required", field)));
    }
    if trimmed.chars().count() > max {
        return Err(ApiError::validation(
            field,
            format!("{} must be at most {} characters", field, max),
        ));
    }
    Ok(trimmed.to_string())
}

/// Blank optional strings become `None`.
pub fn optional_text(field: &str, value: Option<String>, max: usize) -> ApiResult<Option<String>> {
    match value {
        Some(v) if !v.trim().is_empty() => required_text(field, &v, max).map(Some),
        _ => Ok(None),
    }
}

/// Lowercases and shape-checks an email address.
pub fn email(field: &str, value: &str) -> ApiResult<String> {
    let value = required_text(field, value, 254)?.to_lowercase();
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::validation(field, "invalid email address"));
    }
    Ok(value)
}

/// Document ids: 1..=128 characters of `[A-Za-z0-9_-]`.
pub fn document_id(field: &str, value: &str) -> ApiResult<String> {
    let value = value.trim();
    let ok = !value.is_empty()
        && value.len() <= MAX_ID
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !ok {
        return Err(ApiError::validation(field, format!("invalid {}", field)));
    }
    Ok(value.to_string())
}

/// Role names: `[a-z0-9_]{2,32}`.
pub fn role_name(value: &str) -> ApiResult<String> {
    let value = value.trim();
    let ok = (2..=32).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !ok {
        return Err(ApiError::validation(
            "role",
            "role names are 2-32 characters of a-z, 0-9 and _",
        ));
    }
    Ok(value.to_string())
}

/// Lowercased, trimmed, deduplicated tags, order of first appearance kept.
pub fn tags(values: Vec<String>) -> ApiResult<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for raw in values {
        let tag = raw.trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().count() > MAX_TAG {
            return Err(ApiError::validation(
                "tags",
                format!("tags must be at most {} characters", MAX_TAG),
            ));
        }
        if seen.insert(tag.clone()) {
            out.push(tag);
        }
    }
    if out.len() > MAX_TAGS {
        return Err(ApiError::validation(
            "tags",
            format!("at most {} tags are allowed", MAX_TAGS),
        ));
    }
    Ok(out)
}

/// Two-letter US state code, uppercased.
pub fn state_code(value: &str) -> ApiResult<String> {
    let value = value.trim().to_uppercase();
    if value.len() != 2 || !value.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::validation("state", "state must be a two-letter code"));
    }
    Ok(value)
}

pub fn rating(value: Option<f64>) -> ApiResult<Option<f64>> {
    match value {
        Some(r) if !(0.0..=5.0).contains(&r) || r.is_nan() => Err(ApiError::validation(
            "rating",
            "rating must be between 0 and 5",
        )),
        other => Ok(other),
    }
}

pub fn ip_allowlist(values: Vec<String>) -> ApiResult<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    for raw in values {
        let ip: IpAddr = raw.trim().parse().map_err(|_| {
            ApiError::validation("ip_allowlist", format!("'{}' is not an IP address", raw.trim()))
        })?;
        let ip = ip.to_string();
        if !out.contains(&ip) {
            out.push(ip);
        }
    }
    Ok(out)
}

/// Free-text search input: trimmed, capped, `None` when blank.
pub fn search_term(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().chars().take(MAX_SEARCH).collect::<String>())
        .filter(|v| !v.is_empty())
}

/// Wraps a search term for `ILIKE`, escaping the pattern metacharacters.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// In-memory counterpart of `ILIKE like_pattern(term)`.
pub fn contains_ci(haystack: &str, term: &str) -> bool {
    haystack.to_lowercase().contains(&term.to_lowercase())
}

// --- Payload builders ---

pub fn new_staff_user(req: CreateStaffUserRequest, now: DateTime<Utc>) -> ApiResult<UserRecord> {
    let id = match req.id {
        Some(id) => document_id("id", &id)?,
        None => Uuid::new_v4().simple().to_string(),
    };
    Ok(UserRecord {
        id,
        email: email("email", &req.email)?,
        display_name: required_text("display_name", &req.display_name, MAX_NAME)?,
        role: role_name(&req.role)?,
        status: UserStatus::Active,
        subscription_tier: None,
        two_factor_enabled: false,
        created_at: now,
        updated_at: now,
        last_active_at: None,
    })
}

pub fn user_patch(req: UpdateUserRequest, now: DateTime<Utc>) -> ApiResult<UserPatch> {
    let display_name = match req.display_name {
        Some(name) => Some(required_text("display_name", &name, MAX_NAME)?),
        None => None,
    };
    Ok(UserPatch {
        display_name,
        status: req.status,
        subscription_tier: optional_text("subscription_tier", req.subscription_tier, 40)?,
        updated_at: now,
        ..UserPatch::default()
    })
}

pub fn new_content(
    req: CreateContentRequest,
    author_id: &str,
    now: DateTime<Utc>,
) -> ApiResult<ContentItem> {
    Ok(ContentItem {
        id: Uuid::new_v4().simple().to_string(),
        title: required_text("title", &req.title, MAX_TITLE)?,
        summary: optional_text("summary", req.summary, MAX_SUMMARY)?,
        body: required_text("body", &req.body, MAX_BODY)?,
        kind: req.kind,
        category: required_text("category", &req.category, MAX_NAME)?.to_lowercase(),
        tags: tags(req.tags)?,
        duration_minutes: duration(req.duration_minutes)?,
        media_key: optional_text("media_key", req.media_key, 256)?,
        status: ContentStatus::Draft,
        author_id: author_id.to_string(),
        created_at: now,
        updated_at: now,
        published_at: None,
    })
}

/// content_patch
///
/// `published_at` is stamped the first time an item moves to `published` and is kept
/// through later unpublish/republish cycles.
pub fn content_patch(
    req: UpdateContentRequest,
    existing: &ContentItem,
    now: DateTime<Utc>,
) -> ApiResult<ContentPatch> {
    let published_at = match req.status {
        Some(ContentStatus::Published) if existing.published_at.is_none() => Some(now),
        _ => None,
    };
    Ok(ContentPatch {
        title: req
            .title
            .map(|t| required_text("title", &t, MAX_TITLE))
            .transpose()?,
        summary: optional_text("summary", req.summary, MAX_SUMMARY)?,
        body: req
            .body
            .map(|b| required_text("body", &b, MAX_BODY))
            .transpose()?,
        kind: req.kind,
        category: req
            .category
            .map(|c| required_text("category", &c, MAX_NAME).map(|c| c.to_lowercase()))
            .transpose()?,
        tags: req.tags.map(tags).transpose()?,
        duration_minutes: duration(req.duration_minutes)?,
        media_key: optional_text("media_key", req.media_key, 256)?,
        status: req.status,
        published_at,
        updated_at: now,
    })
}

fn duration(minutes: Option<u32>) -> ApiResult<Option<u32>> {
    match minutes {
        Some(0) => Err(ApiError::validation(
            "duration_minutes",
            "duration must be positive",
        )),
        Some(m) if m > 24 * 60 => Err(ApiError::validation(
            "duration_minutes",
            "duration must be at most one day",
        )),
        other => Ok(other),
    }
}

pub fn new_provider(req: CreateProviderRequest) -> ApiResult<NewProvider> {
    Ok(NewProvider {
        name: required_text("name", &req.name, MAX_NAME)?,
        specialty: required_text("specialty", &req.specialty, MAX_NAME)?,
        credentials: optional_text("credentials", req.credentials, MAX_NAME)?,
        email: req
            .email
            .filter(|e| !e.trim().is_empty())
            .map(|e| email("email", &e))
            .transpose()?,
        phone: optional_text("phone", req.phone, 32)?,
        city: required_text("city", &req.city, MAX_NAME)?,
        state: state_code(&req.state)?,
        accepts_new_patients: req.accepts_new_patients,
        telehealth: req.telehealth,
        rating: rating(req.rating)?,
    })
}

pub fn provider_patch(req: UpdateProviderRequest) -> ApiResult<ProviderPatch> {
    Ok(ProviderPatch {
        name: req
            .name
            .map(|n| required_text("name", &n, MAX_NAME))
            .transpose()?,
        specialty: req
            .specialty
            .map(|s| required_text("specialty", &s, MAX_NAME))
            .transpose()?,
        credentials: optional_text("credentials", req.credentials, MAX_NAME)?,
        email: req
            .email
            .filter(|e| !e.trim().is_empty())
            .map(|e| email("email", &e))
            .transpose()?,
        phone: optional_text("phone", req.phone, 32)?,
        city: req
            .city
            .map(|c| required_text("city", &c, MAX_NAME))
            .transpose()?,
        state: req.state.map(|s| state_code(&s)).transpose()?,
        accepts_new_patients: req.accepts_new_patients,
        telehealth: req.telehealth,
        rating: rating(req.rating)?,
        active: req.active,
    })
}

pub fn new_role(req: CreateRoleRequest, now: DateTime<Utc>) -> ApiResult<RoleDefinition> {
    Ok(RoleDefinition {
        name: role_name(&req.name)?,
        description: req.description.trim().chars().take(MAX_SUMMARY).collect(),
        permissions: normalize_grants(req.permissions),
        system: false,
        created_at: now,
        updated_at: now,
    })
}

/// security_settings
///
/// Applies a partial update to the current settings. Timeouts are bounded: idle
/// 1..=1440 minutes, absolute age 1..=720 hours.
pub fn security_settings(
    req: UpdateSecuritySettingsRequest,
    current: SecuritySettings,
    actor_id: &str,
    now: DateTime<Utc>,
) -> ApiResult<SecuritySettings> {
    let mut next = current;
    if let Some(roles) = req.two_factor_required_roles {
        let mut names = roles
            .iter()
            .map(|r| role_name(r))
            .collect::<ApiResult<Vec<_>>>()?;
        names.sort();
        names.dedup();
        next.two_factor_required_roles = names;
    }
    if let Some(idle) = req.session_idle_timeout_minutes {
        if !(1..=1440).contains(&idle) {
            return Err(ApiError::validation(
                "session_idle_timeout_minutes",
                "idle timeout must be between 1 and 1440 minutes",
            ));
        }
        next.session_idle_timeout_minutes = idle;
    }
    if let Some(hours) = req.session_max_age_hours {
        if !(1..=720).contains(&hours) {
            return Err(ApiError::validation(
                "session_max_age_hours",
                "session age must be between 1 and 720 hours",
            ));
        }
        next.session_max_age_hours = hours;
    }
    if let Some(ips) = req.ip_allowlist {
        next.ip_allowlist = ip_allowlist(ips)?;
    }
    next.updated_at = Some(now);
    next.updated_by = Some(actor_id.to_string());
    Ok(next)
}
