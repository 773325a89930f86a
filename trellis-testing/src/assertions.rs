// Assertions over `TestResponse`

use crate::TestResponse;
use serde_json::Value;
use trellis_core::HttpStatus;

/// Assert the status code.
pub fn assert_status(response: &TestResponse, expected: u16) {
    assert_eq!(
        response.status(),
        expected,
        "Expected status {}, got {} (body: {})",
        expected,
        response.status(),
        response.body_string()
    );
}

pub fn assert_http_status(response: &TestResponse, expected: HttpStatus) {
    assert_status(response, expected.code());
}

pub fn assert_success(response: &TestResponse) {
    assert!(
        (200..300).contains(&response.status()),
        "Expected a 2xx status, got {}",
        response.status()
    );
}

pub fn assert_client_error(response: &TestResponse) {
    assert!(
        (400..500).contains(&response.status()),
        "Expected a 4xx status, got {}",
        response.status()
    );
}

pub fn assert_server_error(response: &TestResponse) {
    assert!(
        (500..600).contains(&response.status()),
        "Expected a 5xx status, got {}",
        response.status()
    );
}

/// Assert a header value, matching the name case-insensitively.
pub fn assert_header(response: &TestResponse, name: &str, expected: &str) {
    match response.header(name) {
        Some(actual) => assert_eq!(
            actual, expected,
            "Header {} mismatch: expected `{}`, got `{}`",
            name, expected, actual
        ),
        None => panic!("Header {} not found", name),
    }
}

pub fn assert_no_header(response: &TestResponse, name: &str) {
    assert!(
        response.header(name).is_none(),
        "Unexpected header {}: {:?}",
        name,
        response.header(name)
    );
}

/// Assert the `Content-Type` essence, ignoring parameters.
pub fn assert_content_type(response: &TestResponse, expected: &str) {
    let actual = response
        .header("Content-Type")
        .unwrap_or_else(|| panic!("Content-Type not set"));
    let essence = actual.split(';').next().unwrap_or("").trim();
    assert!(
        essence.eq_ignore_ascii_case(expected),
        "Expected Content-Type {}, got {}",
        expected,
        actual
    );
}

/// Assert the `Allow` header lists exactly these methods, in any order.
pub fn assert_allow(response: &TestResponse, expected: &[&str]) {
    let mut actual = response.allow();
    actual.sort();
    let mut expected: Vec<String> = expected.iter().map(|m| m.to_string()).collect();
    expected.sort();
    assert_eq!(actual, expected, "Allow header mismatch");
}

pub fn assert_json(response: &TestResponse, expected: &Value) {
    let actual: Value = response
        .body_json()
        .unwrap_or_else(|e| panic!("{} (body: {})", e, response.body_string()));
    assert_eq!(&actual, expected, "JSON body mismatch");
}

pub fn assert_body_contains(response: &TestResponse, needle: &str) {
    let body = response.body_string();
    assert!(
        body.contains(needle),
        "Expected body to contain `{}`, got `{}`",
        needle,
        body
    );
}

pub fn assert_empty_body(response: &TestResponse) {
    assert!(
        response.body().is_empty(),
        "Expected an empty body, got {} bytes",
        response.body().len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::HttpResponse;

    fn response() -> TestResponse {
        TestResponse::new(
            HttpResponse::new(201)
                .with_header("Content-Type", "application/json; charset=utf-8")
                .with_body(r#"{"id":7}"#),
        )
    }

    #[test]
    fn test_passing_assertions() {
        let response = response();
        assert_status(&response, 201);
        assert_http_status(&response, HttpStatus::Created);
        assert_success(&response);
        assert_content_type(&response, "application/json");
        assert_json(&response, &json!({"id": 7}));
        assert_body_contains(&response, "\"id\"");
        assert_no_header(&response, "Allow");
    }

    #[test]
    #[should_panic(expected = "Expected status 404")]
    fn test_status_mismatch_panics() {
        assert_status(&response(), 404);
    }

    #[test]
    #[should_panic(expected = "Header X-Missing not found")]
    fn test_missing_header_panics() {
        assert_header(&response(), "X-Missing", "1");
    }
}
