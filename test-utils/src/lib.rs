//! `test-utils` is used for testing in both `fastbio-lib` and `fastbio-bin`.
//! This crate does not depend on either of them, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock web server, which responds with a predefined status to any
/// request. Further methods of the `ResponseTemplate` can be appended:
///
/// ```ignore
/// let server = mock_server!(StatusCode::OK, set_body_string("pong"));
/// ```
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::any()).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Mount a route on an existing mock server which answers requests with the
/// given method and path. With `expect = n`, the server panics on drop unless
/// the route was called exactly `n` times.
///
/// ```ignore
/// mock_route!(server, "GET", "/gene/1017", ResponseTemplate::new(200), expect = 1);
/// ```
#[macro_export]
macro_rules! mock_route {
    ($server:expr, $method:expr, $path:expr, $template:expr $(, expect = $times:expr)? $(,)?) => {{
        wiremock::Mock::given(wiremock::matchers::method($method))
            .and(wiremock::matchers::path($path))
            .respond_with($template)
            $(.expect($times))?
            .mount(&$server)
            .await;
    }};
}
