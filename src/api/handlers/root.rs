use axum::response::IntoResponse;

/// Plain banner for the bare domain; the website itself lives elsewhere.
pub async fn root() -> impl IntoResponse {
    concat!("greenroom ", env!("CARGO_PKG_VERSION"))
}
