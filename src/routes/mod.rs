//! Thin HTTP layer. Each handler validates its inputs, performs the explicit
//! token guard and delegates the outbound work to the call wrapper.

pub mod foods;
pub mod meta;
pub mod nlp;
pub mod tracker;

use axum::routing::{get, post};
use axum::Router;

use crate::server::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(meta::home))
        .route("/health", get(meta::health))
        .route("/api/foods/search", get(foods::search_foods))
        .route("/api/food/get", get(foods::get_food))
        .route("/api/foods/autocomplete", get(foods::autocomplete_foods))
        .route("/api/food/barcode", get(foods::find_food_by_barcode))
        .route("/api/food/barcode/debug", get(foods::debug_barcode))
        .route("/api/food/nlp", post(nlp::process_food_text))
        .route("/api/text-to-food", post(nlp::text_to_food))
        .route("/api/food/image-recognition", post(nlp::recognize_food_image))
        .route(
            "/api/nutrition/user/{user_id}",
            get(tracker::get_user)
                .post(tracker::update_user)
                .put(tracker::update_user),
        )
        .route(
            "/api/nutrition/user/{user_id}/date/{date}",
            get(tracker::get_day).put(tracker::update_day),
        )
        .route("/api/nutrition/user/{user_id}/dates", get(tracker::list_days))
        .route("/api/nutrition/food/{food_id}", get(tracker::cached_food))
}
