use axum::extract::State;
use axum::Json;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::error::{GatewayError, Result};
use crate::server::server::AppState;
use crate::upstream::client::{bearer_headers, Payload};
use crate::utils::constants::{IMAGE_B64_MAX_CHARS, NLP_MAX_INPUT_CHARS};

/// Processes a natural-language description of foods and returns the
/// structured foods the upstream identifies in it.
pub async fn process_food_text(
    State(state): State<AppState>,
    Json(request): Json<Value>,
) -> Result<Json<Value>> {
    let user_input = request
        .get("user_input")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            GatewayError::InvalidRequest("Missing required field: user_input".to_string())
        })?;

    if user_input.chars().count() > NLP_MAX_INPUT_CHARS {
        return Err(GatewayError::InvalidRequest(format!(
            "user_input exceeds maximum length of {NLP_MAX_INPUT_CHARS} characters"
        )));
    }

    let nlp_request = build_nlp_request(user_input, &request);

    let token = state.tokens.get_token(false).await?;
    let mut headers = bearer_headers(&token)?;
    let body = state
        .upstream
        .call(&state.settings.nlp_url(), &mut headers, &Payload::json(nlp_request))
        .await?;
    Ok(Json(body))
}

/// Convenience wrapper over the NLP endpoint for transcribed text: fills in
/// sensible defaults and wraps the result with request metadata.
pub async fn text_to_food(
    State(state): State<AppState>,
    Json(request): Json<Value>,
) -> Result<Json<Value>> {
    let text = request
        .get("text")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::InvalidRequest("Missing required field: text".to_string()))?;

    let region = request
        .get("region")
        .and_then(|v| v.as_str())
        .unwrap_or("US");
    let language = request
        .get("language")
        .and_then(|v| v.as_str())
        .unwrap_or("en");
    let include_food_data = request
        .get("include_food_data")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    info!("processing text: '{text}'");
    let nlp_request = json!({
        "user_input": text,
        "region": region,
        "language": language,
        "include_food_data": include_food_data,
    });

    let token = state.tokens.get_token(false).await?;
    let mut headers = bearer_headers(&token)?;
    let analysis = state
        .upstream
        .call(&state.settings.nlp_url(), &mut headers, &Payload::json(nlp_request))
        .await?;

    let foods_identified = analysis
        .get("food_response")
        .and_then(|v| v.as_array())
        .map(|foods| foods.len())
        .unwrap_or(0);
    info!("text analysis successful: {foods_identified} foods identified");

    Ok(Json(json!({
        "success": true,
        "text": text,
        "food_analysis": analysis,
        "metadata": {
            "foods_identified": foods_identified,
            "region": region,
            "language": language,
        },
    })))
}

/// Identifies food items and their nutrition from a base64-encoded image.
pub async fn recognize_food_image(
    State(state): State<AppState>,
    Json(request): Json<Value>,
) -> Result<Json<Value>> {
    let image_b64 = match request.get("image_b64") {
        Some(Value::String(s)) if !s.is_empty() => s.as_str(),
        Some(Value::String(_)) => {
            return Err(GatewayError::InvalidRequest(
                "image_b64 field is empty".to_string(),
            ))
        }
        Some(_) => {
            return Err(GatewayError::InvalidRequest(
                "image_b64 must be a string".to_string(),
            ))
        }
        None => {
            return Err(GatewayError::InvalidRequest(
                "Missing required field: image_b64".to_string(),
            ))
        }
    };

    if image_b64.len() > IMAGE_B64_MAX_CHARS {
        return Err(GatewayError::InvalidRequest(format!(
            "image_b64 exceeds maximum length of {IMAGE_B64_MAX_CHARS} characters"
        )));
    }
    if !image_b64
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
    {
        return Err(GatewayError::InvalidRequest(
            "image_b64 appears to be invalid base64 format".to_string(),
        ));
    }

    let mut recognition_request = Map::new();
    recognition_request.insert("image_b64".to_string(), Value::String(image_b64.to_string()));
    if let Some(region) = request.get("region").and_then(|v| v.as_str()) {
        recognition_request.insert("region".to_string(), Value::String(region.to_string()));
        if let Some(language) = request.get("language").and_then(|v| v.as_str()) {
            recognition_request.insert("language".to_string(), Value::String(language.to_string()));
        }
    }
    if let Some(include) = request.get("include_food_data") {
        recognition_request.insert(
            "include_food_data".to_string(),
            Value::Bool(include.as_bool().unwrap_or(false)),
        );
    }

    let token = state.tokens.get_token(false).await?;
    let mut headers = bearer_headers(&token)?;
    // `detect` keeps the image payload on the JSON path.
    let payload = Payload::detect(Value::Object(recognition_request));
    let body = state
        .upstream
        .call(&state.settings.image_recognition_url(), &mut headers, &payload)
        .await?;

    if let Some(foods) = body.get("food_response").and_then(|v| v.as_array()) {
        info!("image recognition successful: {} foods identified", foods.len());
    }
    Ok(Json(body))
}

/// Copies the optional NLP parameters the upstream understands, dropping
/// malformed `eaten_foods` entries instead of failing the whole request.
fn build_nlp_request(user_input: &str, request: &Value) -> Value {
    let mut nlp_request = Map::new();
    nlp_request.insert(
        "user_input".to_string(),
        Value::String(user_input.to_string()),
    );

    if let Some(region) = request.get("region").and_then(|v| v.as_str()) {
        nlp_request.insert("region".to_string(), Value::String(region.to_string()));
        if let Some(language) = request.get("language").and_then(|v| v.as_str()) {
            nlp_request.insert("language".to_string(), Value::String(language.to_string()));
        }
    }
    if let Some(include) = request.get("include_food_data") {
        nlp_request.insert("include_food_data".to_string(), include.clone());
    }

    if let Some(eaten) = request.get("eaten_foods").and_then(|v| v.as_array()) {
        let valid: Vec<Value> = eaten
            .iter()
            .filter_map(|food| {
                let obj = food.as_object()?;
                let food_id = obj.get("food_id")?;
                let food_name = obj.get("food_name")?;
                let mut entry = Map::new();
                entry.insert("food_id".to_string(), food_id.clone());
                entry.insert("food_name".to_string(), food_name.clone());
                for key in ["brand", "serving_description", "serving_size"] {
                    if let Some(v) = obj.get(key) {
                        entry.insert(key.to_string(), v.clone());
                    }
                }
                Some(Value::Object(entry))
            })
            .collect();
        if !valid.is_empty() {
            nlp_request.insert("eaten_foods".to_string(), Value::Array(valid));
        }
    }

    Value::Object(nlp_request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nlp_request_keeps_valid_eaten_foods_only() {
        let request = json!({
            "user_input": "an egg",
            "region": "US",
            "language": "en",
            "eaten_foods": [
                {"food_id": 3092, "food_name": "egg", "serving_size": 1},
                {"food_name": "mystery"},
                "not an object"
            ]
        });

        let built = build_nlp_request("an egg", &request);
        let eaten = built["eaten_foods"].as_array().unwrap();
        assert_eq!(eaten.len(), 1);
        assert_eq!(eaten[0]["food_id"], 3092);
        assert_eq!(built["region"], "US");
        assert_eq!(built["language"], "en");
    }

    #[test]
    fn language_is_dropped_without_region() {
        let request = json!({"user_input": "toast", "language": "en"});
        let built = build_nlp_request("toast", &request);
        assert!(built.get("language").is_none());
    }
}
