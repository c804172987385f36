use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{GatewayError, Result};
use crate::routes::foods::food_get_params;
use crate::server::server::AppState;
use crate::store::tracker::{DayLog, DayPatch, UserPatch};
use crate::upstream::client::{bearer_headers, Payload};
use crate::utils::constants::FOOD_CACHE_TTL_SECS;

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>> {
    match state.store.get_user(user_id).await? {
        Some(user) => Ok(Json(json!({ "success": true, "data": user }))),
        None => Err(GatewayError::NotFound("User not found".to_string())),
    }
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<Value>> {
    state.store.upsert_user(user_id, patch).await?;
    Ok(Json(json!({
        "success": true,
        "message": "User profile updated successfully",
    })))
}

pub async fn get_day(
    State(state): State<AppState>,
    Path((user_id, date)): Path<(i64, String)>,
) -> Result<Json<Value>> {
    let day = state
        .store
        .get_day(user_id, &date)
        .await?
        .unwrap_or_else(|| DayLog::empty(user_id, &date));
    Ok(Json(json!({ "success": true, "data": day })))
}

pub async fn update_day(
    State(state): State<AppState>,
    Path((user_id, date)): Path<(i64, String)>,
    Json(patch): Json<DayPatch>,
) -> Result<Json<Value>> {
    state.store.upsert_day(user_id, &date, patch).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Data updated successfully",
    })))
}

#[derive(Debug, Deserialize)]
pub struct DateRangeParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_days(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(params): Query<DateRangeParams>,
) -> Result<Json<Value>> {
    let summaries = state
        .store
        .list_days(
            user_id,
            params.start_date,
            params.end_date,
            params.limit.unwrap_or(30),
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "count": summaries.len(),
        "data": summaries,
    })))
}

/// Proxied `food.get` with a local cache, so repeat lookups of the same
/// food skip the upstream round trip for a day.
pub async fn cached_food(
    State(state): State<AppState>,
    Path(food_id): Path<String>,
) -> Result<Json<Value>> {
    if let Some(cached) = state.store.get_cached_food(&food_id).await? {
        info!("returning cached food data for {food_id}");
        return Ok(Json(cached));
    }

    info!("fetching fresh food data for {food_id}");
    let token = state.tokens.get_token(false).await?;
    let mut headers = bearer_headers(&token)?;
    let fresh = state
        .upstream
        .call(
            &state.settings.server_api_url(),
            &mut headers,
            &Payload::form(food_get_params(&food_id)),
        )
        .await?;

    state
        .store
        .put_cached_food(&food_id, &fresh, FOOD_CACHE_TTL_SECS)
        .await?;
    Ok(Json(fresh))
}
