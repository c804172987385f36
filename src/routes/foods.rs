use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::barcode::normalize_barcode;
use crate::error::{GatewayError, Result};
use crate::server::server::AppState;
use crate::upstream::client::{bearer_headers, Payload};
use crate::utils::constants::AUTOCOMPLETE_MAX_RESULTS;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub page: Option<String>,
    pub max_results: Option<String>,
}

pub async fn search_foods(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>> {
    let token = state.tokens.get_token(false).await?;
    let mut headers = bearer_headers(&token)?;

    let mut form = HashMap::new();
    form.insert("method".to_string(), "foods.search.v3".to_string());
    form.insert("search_expression".to_string(), params.query);
    form.insert("format".to_string(), "json".to_string());
    if let Some(page) = params.page {
        form.insert("page_number".to_string(), page);
    }
    if let Some(max_results) = params.max_results {
        form.insert("max_results".to_string(), max_results);
    }

    let body = state
        .upstream
        .call(&state.settings.server_api_url(), &mut headers, &Payload::form(form))
        .await?;
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct GetFoodParams {
    pub food_id: Option<String>,
}

pub async fn get_food(
    State(state): State<AppState>,
    Query(params): Query<GetFoodParams>,
) -> Result<Json<Value>> {
    let food_id = params
        .food_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            GatewayError::InvalidRequest("Missing required parameter: food_id".to_string())
        })?;

    let token = state.tokens.get_token(false).await?;
    let mut headers = bearer_headers(&token)?;
    let body = state
        .upstream
        .call(
            &state.settings.server_api_url(),
            &mut headers,
            &Payload::form(food_get_params(&food_id)),
        )
        .await?;
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct AutocompleteParams {
    pub expression: Option<String>,
    pub max_results: Option<String>,
    pub region: Option<String>,
}

pub async fn autocomplete_foods(
    State(state): State<AppState>,
    Query(params): Query<AutocompleteParams>,
) -> Result<Json<Value>> {
    let expression = params
        .expression
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            GatewayError::InvalidRequest("Missing required parameter: expression".to_string())
        })?;

    let token = state.tokens.get_token(false).await?;
    let mut headers = bearer_headers(&token)?;

    let mut form = HashMap::new();
    form.insert("method".to_string(), "foods.autocomplete".to_string());
    form.insert("expression".to_string(), expression);
    form.insert("format".to_string(), "json".to_string());
    if let Some(raw) = params.max_results {
        // The upstream caps suggestions at 10.
        let capped = raw
            .parse::<u32>()
            .unwrap_or(AUTOCOMPLETE_MAX_RESULTS)
            .min(AUTOCOMPLETE_MAX_RESULTS);
        form.insert("max_results".to_string(), capped.to_string());
    }
    if let Some(region) = params.region {
        form.insert("region".to_string(), region);
    }

    let body = state
        .upstream
        .call(&state.settings.server_api_url(), &mut headers, &Payload::form(form))
        .await?;
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct BarcodeParams {
    pub barcode: Option<String>,
    pub region: Option<String>,
    pub language: Option<String>,
}

pub async fn find_food_by_barcode(
    State(state): State<AppState>,
    Query(params): Query<BarcodeParams>,
) -> Result<Json<Value>> {
    let raw = params
        .barcode
        .filter(|b| !b.is_empty())
        .ok_or_else(|| {
            GatewayError::InvalidRequest("Missing required parameter: barcode".to_string())
        })?;

    let barcode = normalize_barcode(&raw)?;
    if barcode != raw {
        info!("normalized barcode {raw} to GTIN-13 {barcode}");
    }

    let token = state.tokens.get_token(false).await?;
    let mut headers = bearer_headers(&token)?;

    let mut form = HashMap::new();
    form.insert("method".to_string(), "food.find_id_for_barcode".to_string());
    form.insert("barcode".to_string(), barcode.clone());
    form.insert("format".to_string(), "json".to_string());
    if let Some(region) = params.region {
        form.insert("region".to_string(), region);
        // Language is only valid when a region is also specified.
        if let Some(language) = params.language {
            form.insert("language".to_string(), language);
        }
    }

    info!("looking up barcode: {barcode}");
    let api_url = state.settings.server_api_url();
    let lookup = state
        .upstream
        .call(&api_url, &mut headers, &Payload::form(form))
        .await?;

    match extract_food_id(&lookup) {
        Some(food_id) if food_id != "0" => {
            let details = state
                .upstream
                .call(&api_url, &mut headers, &Payload::form(food_get_params(&food_id)))
                .await?;
            Ok(Json(json!({
                "barcode": barcode,
                "food_id": food_id,
                "food_details": details,
            })))
        }
        _ => Ok(Json(json!({
            "barcode": barcode,
            "message": "No food found for this barcode",
            "raw_response": lookup,
        }))),
    }
}

/// Diagnostic barcode lookup: raw `food.find_id_for_barcode` responses for
/// the barcode as scanned and, for short numeric codes, its zero-padded
/// GTIN-13 variant. Each variant is sent once, with no retry, so the
/// response shows exactly what the upstream answered.
pub async fn debug_barcode(
    State(state): State<AppState>,
    Query(params): Query<BarcodeParams>,
) -> Result<Json<Value>> {
    let raw = params
        .barcode
        .filter(|b| !b.is_empty())
        .ok_or_else(|| {
            GatewayError::InvalidRequest("Missing required parameter: barcode".to_string())
        })?;

    let mut variants = vec![raw.clone()];
    if raw.len() < 13 && raw.chars().all(|c| c.is_ascii_digit()) {
        variants.push(format!("{raw:0>13}"));
    }

    let token = state.tokens.get_token(false).await?;
    let headers = bearer_headers(&token)?;
    let api_url = state.settings.server_api_url();

    let mut results = Vec::new();
    for variant in variants {
        let mut form = HashMap::new();
        form.insert("method".to_string(), "food.find_id_for_barcode".to_string());
        form.insert("barcode".to_string(), variant.clone());
        form.insert("format".to_string(), "json".to_string());
        if let Some(region) = &params.region {
            form.insert("region".to_string(), region.clone());
            if let Some(language) = &params.language {
                form.insert("language".to_string(), language.clone());
            }
        }

        info!("looking up barcode: {variant}");
        match state
            .upstream
            .call_once(&api_url, &headers, &Payload::form(form))
            .await
        {
            Ok((status_code, response)) => results.push(json!({
                "barcode": variant,
                "status_code": status_code,
                "response": response,
            })),
            Err(e) => results.push(json!({
                "barcode": variant,
                "error": e.to_string(),
            })),
        }
    }

    let (token_active, expires_in) = state.tokens.status().await;
    Ok(Json(json!({
        "results": results,
        "token_info": {
            "token_active": token_active,
            "expires_in": expires_in,
        },
    })))
}

pub(crate) fn food_get_params(food_id: &str) -> HashMap<String, String> {
    let mut form = HashMap::new();
    form.insert("method".to_string(), "food.get".to_string());
    form.insert("food_id".to_string(), food_id.to_string());
    form.insert("format".to_string(), "json".to_string());
    form
}

/// The barcode lookup answers either `{"food_id": {"value": "123"}}` or a
/// bare `{"food_id": "123"}`.
fn extract_food_id(lookup: &Value) -> Option<String> {
    let field = lookup.get("food_id")?;
    let value = field.get("value").unwrap_or(field);
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn food_id_extracted_from_both_shapes() {
        let wrapped = json!({"food_id": {"value": "4384"}});
        assert_eq!(extract_food_id(&wrapped).as_deref(), Some("4384"));

        let bare = json!({"food_id": 4384});
        assert_eq!(extract_food_id(&bare).as_deref(), Some("4384"));

        let missing = json!({"foods": []});
        assert_eq!(extract_food_id(&missing), None);
    }
}
