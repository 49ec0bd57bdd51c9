use axum::{extract::FromRef, http::HeaderMap};
use chrono::{Duration, NaiveDate, NaiveTime, Utc};

use crate::{
    AppState,
    auth::Identity,
    error::{AppError, AppResult},
    models::{NewTimeEntry, TimeEntry, TimeEntryKind, TimeEntryRequest},
    repository::RepositoryState,
};

/// TimeClock
///
/// Records punches for the authenticated employee and lists them per UTC day.
/// Entries are always owned by the caller.
#[derive(Clone)]
pub struct TimeClock {
    repo: RepositoryState,
}

impl FromRef<AppState> for TimeClock {
    fn from_ref(state: &AppState) -> Self {
        TimeClock::new(state.repo.clone())
    }
}

impl TimeClock {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    pub async fn record(
        &self,
        caller: &Identity,
        request: TimeEntryRequest,
        source_ip: Option<String>,
        device: Option<String>,
    ) -> AppResult<TimeEntry> {
        let kind: TimeEntryKind = request
            .kind
            .trim()
            .parse()
            .map_err(AppError::invalid_input)?;

        if let Some(location) = &request.location {
            if !location.is_object() {
                return Err(AppError::invalid_input("location must be a JSON object"));
            }
        }

        let entry = NewTimeEntry {
            employee_id: caller.id,
            kind,
            recorded_at: request.recorded_at.unwrap_or_else(Utc::now),
            location: request.location,
            source_ip,
            device,
            note: request.note.filter(|n| !n.trim().is_empty()),
        };

        let entry = self.repo.insert_time_entry(entry).await?;
        tracing::info!(employee_id = caller.id, kind = ?entry.kind, "time entry recorded");
        Ok(entry)
    }

    /// Caller's entries on the given UTC day, oldest first.
    pub async fn list(&self, caller: &Identity, day: NaiveDate) -> AppResult<Vec<TimeEntry>> {
        let from = day.and_time(NaiveTime::MIN).and_utc();
        let to = from
            .checked_add_signed(Duration::days(1))
            .ok_or_else(|| AppError::invalid_input("date out of range"))?;
        Ok(self.repo.list_time_entries(caller.id, from, to).await?)
    }
}

/// First address in `X-Forwarded-For`, if any.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
