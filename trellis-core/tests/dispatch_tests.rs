use serde_json::{json, Value};
use trellis_core::{
    Deployment, Error, HttpRequest, HttpResponse, HttpStatus, Invocation, Reply, Resource, RouteSpec,
};

async fn user(inv: Invocation) -> Result<Reply, Error> {
    let id = inv.param("id").unwrap_or_default().to_string();
    Reply::json(&json!({ "id": id }))
}

async fn me(_: Invocation) -> Result<Reply, Error> {
    Ok(Reply::text("me"))
}

fn deployment() -> Deployment {
    Deployment::builder()
        .resource(
            Resource::new("/users")
                .produces("application/json")
                .route(RouteSpec::get("/{id}", user))
                .route(RouteSpec::get("/me", me).produces("text/plain")),
        )
        .route(RouteSpec::post("/users", |inv: Invocation| async move {
            let body: Value = inv.json()?;
            Ok(Reply::json(&body)?.with_status(201))
        })
        .consumes("application/json"))
        .build()
        .unwrap()
}

fn body_json(response: &HttpResponse) -> Value {
    serde_json::from_slice(&response.body).unwrap()
}

#[tokio::test]
async fn test_literal_segment_wins_over_parameter() {
    let response = deployment().handle(HttpRequest::new("GET", "/users/me")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body_str(), Some("me"));
}

#[tokio::test]
async fn test_parameter_route_inherits_resource_produces() {
    let response = deployment().handle(HttpRequest::new("GET", "/users/42")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(body_json(&response), json!({ "id": "42" }));
}

#[tokio::test]
async fn test_trailing_slash_and_duplicate_separators() {
    let response = deployment()
        .handle(HttpRequest::new("GET", "//users///42/"))
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(body_json(&response)["id"], "42");
}

#[tokio::test]
async fn test_unknown_path_is_404_json() {
    let response = deployment().handle(HttpRequest::new("GET", "/teams")).await;
    assert_eq!(response.status, 404);
    assert_eq!(body_json(&response)["status"], 404);
}

#[tokio::test]
async fn test_wrong_method_lists_allowed_methods() {
    let response = deployment()
        .handle(HttpRequest::new("DELETE", "/users"))
        .await;
    assert_eq!(response.status, 405);
    assert_eq!(response.header("Allow"), Some("POST, OPTIONS"));
}

#[tokio::test]
async fn test_unknown_method_is_405() {
    let response = deployment()
        .handle(HttpRequest::new("BREW", "/users/1"))
        .await;
    assert_eq!(response.status, 405);
    assert_eq!(response.header("Allow"), Some("GET, HEAD, OPTIONS"));
}

#[tokio::test]
async fn test_unsupported_content_type() {
    let response = deployment()
        .handle(
            HttpRequest::new("POST", "/users")
                .with_header("Content-Type", "text/csv")
                .with_body("a,b"),
        )
        .await;
    assert_eq!(response.status, 415);
}

#[tokio::test]
async fn test_json_body_round_trips_through_endpoint() {
    let response = deployment()
        .handle(
            HttpRequest::new("POST", "/users")
                .with_header("Content-Type", "application/json; charset=utf-8")
                .with_body(r#"{"name":"ada"}"#),
        )
        .await;
    assert_eq!(response.status, 201);
    assert_eq!(body_json(&response), json!({ "name": "ada" }));
}

#[tokio::test]
async fn test_malformed_json_is_client_error() {
    let response = deployment()
        .handle(
            HttpRequest::new("POST", "/users")
                .with_header("Content-Type", "application/json")
                .with_body("{"),
        )
        .await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_not_acceptable() {
    let response = deployment()
        .handle(HttpRequest::new("GET", "/users/1").with_header("Accept", "application/xml"))
        .await;
    assert_eq!(response.status, 406);
    // the error body is still produced
    assert_eq!(response.header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn test_head_matches_get_without_body() {
    let deployment = deployment();
    let get = deployment.handle(HttpRequest::new("GET", "/users/7")).await;
    let head = deployment.handle(HttpRequest::new("HEAD", "/users/7")).await;

    assert_eq!(head.status, 200);
    assert!(head.body.is_empty());
    assert_eq!(head.header("Content-Length"), get.header("Content-Length"));
    assert_eq!(head.header("Content-Type"), get.header("Content-Type"));
}

#[tokio::test]
async fn test_options_without_explicit_route() {
    let response = deployment()
        .handle(HttpRequest::new("OPTIONS", "/users/7"))
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.header("Allow"), Some("GET, HEAD, OPTIONS"));
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_explicit_status_error() {
    let deployment = Deployment::builder()
        .route(RouteSpec::get("/locked", |_: Invocation| async {
            Err::<Reply, _>(Error::status(HttpStatus::Conflict, "resource is locked"))
        }))
        .build()
        .unwrap();

    let response = deployment.handle(HttpRequest::new("GET", "/locked")).await;
    assert_eq!(response.status, 409);
    assert_eq!(body_json(&response)["status"], 409);
}
