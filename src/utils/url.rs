//! Endpoint URL construction.
//!
//! Configured base URLs may or may not carry a trailing slash; every request
//! URL is built through these helpers so neither form yields `//`.

/// Strips trailing slashes from a base URL.
///
/// ```
/// use jamchat::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://openrouter.ai/api/v1/"), "https://openrouter.ai/api/v1");
/// assert_eq!(normalize_base_url("https://openrouter.ai/api/v1///"), "https://openrouter.ai/api/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Joins a base URL and an endpoint path with exactly one slash.
///
/// ```
/// use jamchat::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://openrouter.ai/api/v1/", "/chat/completions"),
///     "https://openrouter.ai/api/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{normalized_base}/{endpoint}")
}

/// URL of a model method on a generateContent-style API, e.g.
/// `{base}/models/{model}:streamGenerateContent?alt=sse`.
pub fn model_method_url(base_url: &str, model: &str, method: &str) -> String {
    let model = model.strip_prefix("models/").unwrap_or(model);
    construct_api_url(base_url, &format!("models/{model}:{method}"))
}

/// Appends `name=value` to the URL's query string.
pub fn append_query_param(url: &str, name: &str, value: &str) -> String {
    let separator = match url.find('?') {
        Some(index) if index + 1 == url.len() || url.ends_with('&') => "",
        Some(_) => "&",
        None => "?",
    };
    format!("{url}{separator}{name}={value}")
}
