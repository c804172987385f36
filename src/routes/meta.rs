use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::server::server::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Service info page with the current token status.
pub async fn home(State(state): State<AppState>) -> Json<Value> {
    let (token_active, expires_in) = state.tokens.status().await;

    Json(json!({
        "name": "food-gateway",
        "description": "Proxy for the FatSecret Platform API with nutrition tracking",
        "endpoints": {
            "/api/foods/search": "Search for foods by name",
            "/api/food/get": "Get detailed information about a specific food by ID",
            "/api/food/barcode": "Find food information using a barcode",
            "/api/food/barcode/debug": "Raw barcode lookup responses for troubleshooting",
            "/api/foods/autocomplete": "Autocomplete food search suggestions",
            "/api/food/nlp": "Process natural language food descriptions (POST)",
            "/api/text-to-food": "Analyze text description of foods (POST)",
            "/api/food/image-recognition": "Identify food items from images (POST)",
            "/api/nutrition/user/{user_id}": "Get or update user profile",
            "/api/nutrition/user/{user_id}/date/{date}": "Get or update nutrition data for a date",
            "/api/nutrition/user/{user_id}/dates": "Get list of dates with data",
            "/api/nutrition/food/{food_id}": "Get cached food data"
        },
        "status": if token_active { "Token is active" } else { "Token is not initialized" },
        "expires_in": expires_in,
    }))
}
