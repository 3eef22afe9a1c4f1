use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves `html` for GET requests at `url_path`.
pub async fn mount_html_page(server: &MockServer, url_path: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html.to_string())
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

/// Answers GET requests at `url_path` with a bare status code.
pub async fn mount_status(server: &MockServer, url_path: &str, status_code: u16) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(status_code))
        .mount(server)
        .await;
}

/// Answers every GET with `status_code` and verifies on drop that exactly
/// `expected_calls` requests arrived.
pub async fn mount_status_expecting(server: &MockServer, status_code: u16, expected_calls: u64) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status_code))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// 503 carrying a Retry-After header, the polite form of rate limiting.
pub async fn mount_retry_after(server: &MockServer, url_path: &str) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(503).insert_header("retry-after", "120"))
        .mount(server)
        .await;
}

/// Redirects `url_path` to `location` on the same server.
pub async fn mount_redirect(server: &MockServer, url_path: &str, location: &str) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(302).insert_header("location", location))
        .mount(server)
        .await;
}
