//! Shared constants and invariants

/// Legacy method-dispatch endpoint of the platform API.
pub const SERVER_API_PATH: &str = "/rest/server.api";
pub const NLP_PATH: &str = "/rest/natural-language-processing/v1";
pub const IMAGE_RECOGNITION_PATH: &str = "/rest/image-recognition/v2";

/// Upstream hard limit on `user_input` length for NLP requests.
pub const NLP_MAX_INPUT_CHARS: usize = 1000;
/// Upstream hard limit on the base64 image payload.
pub const IMAGE_B64_MAX_CHARS: usize = 1_148_549;
/// Autocomplete caps `max_results` server-side.
pub const AUTOCOMPLETE_MAX_RESULTS: u32 = 10;

/// How long proxied `food.get` responses stay in the local cache.
pub const FOOD_CACHE_TTL_SECS: i64 = 24 * 3600;

/// Payload key whose presence forces JSON encoding on proxied calls.
pub const IMAGE_PAYLOAD_KEY: &str = "image_b64";
