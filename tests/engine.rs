use std::fs;

use anyhow::Result;
use httpmock::prelude::*;
use serde_json::json;
use tempfile::tempdir;

use repost::batch::{self, BatchFailure};
use repost::definition::RequestId;
use repost::engine::{Engine, EngineError, ExecutionOptions};
use repost::project::Project;
use repost::schema::{infer, load_schema, store_schema, validate, Schema};

fn seed_store(project: &Project, server: &MockServer, extra: &str) -> Result<()> {
    let contents = format!(
        "env: dev\nenvs:\n  dev:\n    BASE_URL: {}\n{extra}",
        server.base_url()
    );
    fs::write(project.store_path(), contents)?;
    Ok(())
}

fn write_request(project: &Project, ident: &str, contents: &str) -> Result<RequestId> {
    let id = RequestId::parse(ident)?;
    let path = project.definition_path(&id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(id)
}

fn engine(project: &Project) -> Engine {
    Engine::new(project.clone(), ExecutionOptions::default())
}

#[tokio::test]
async fn resolves_placeholders_in_url_headers_and_query() -> Result<()> {
    let temp = tempdir()?;
    let (project, _) = Project::init(temp.path())?;
    let server = MockServer::start_async().await;
    seed_store(
        &project,
        &server,
        "    TOKEN: token-123\n    TERM: rust lang\n",
    )?;

    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/search")
                .query_param("q", "rust lang")
                .header("authorization", "Bearer token-123");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"ok":true}"#);
        })
        .await;

    let id = write_request(
        &project,
        "GET_search",
        concat!(
            "url: \"{BASE_URL}/search?q={TERM}\"\n",
            "headers:\n",
            "  Authorization: \"Bearer {TOKEN}\"\n",
        ),
    )?;

    let response = engine(&project).execute(&id).await?;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, r#"{"ok":true}"#);
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn persists_cookies_and_replays_them() -> Result<()> {
    let temp = tempdir()?;
    let (project, _) = Project::init(temp.path())?;
    let server = MockServer::start_async().await;
    seed_store(&project, &server, "")?;

    let hello = server
        .mock_async(|when, then| {
            when.method(GET).path("/hello");
            then.status(200).header("set-cookie", "session=abc123; Path=/; HttpOnly");
        })
        .await;
    let me = server
        .mock_async(|when, then| {
            when.method(GET).path("/me").header("cookie", "session=abc123");
            then.status(200).body(r#"{"name":"ada"}"#);
        })
        .await;

    let hello_id = write_request(&project, "GET_hello", "url: \"{BASE_URL}/hello\"\n")?;
    let me_id = write_request(&project, "GET_me", "url: \"{BASE_URL}/me\"\n")?;

    let engine = engine(&project);
    engine.execute(&hello_id).await?;
    let env = engine.store().load_active()?;
    assert_eq!(env.cookies.get("session").map(String::as_str), Some("abc123"));

    engine.execute(&me_id).await?;
    hello.assert_async().await;
    me.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn captures_variables_from_body_and_header() -> Result<()> {
    let temp = tempdir()?;
    let (project, _) = Project::init(temp.path())?;
    let server = MockServer::start_async().await;
    seed_store(&project, &server, "")?;

    server
        .mock_async(|when, then| {
            when.method(POST).path("/login");
            then.status(200)
                .header("x-trace-id", "tr-9")
                .body(r#"{"token":"t-1","user_id":42}"#);
        })
        .await;

    let id = write_request(
        &project,
        "POST_session",
        concat!(
            "url: \"{BASE_URL}/login\"\n",
            "method: POST\n",
            "set-env-var:\n",
            "  TOKEN:\n",
            "    body: token\n",
            "  USER_ID:\n",
            "    body: user_id\n",
            "  TRACE:\n",
            "    header: X-Trace-Id\n",
        ),
    )?;

    let engine = engine(&project);
    engine.execute(&id).await?;

    let env = engine.store().load_active()?;
    assert_eq!(env.variables.get("TOKEN").map(String::as_str), Some("t-1"));
    assert_eq!(env.variables.get("USER_ID").map(String::as_str), Some("42"));
    assert_eq!(env.variables.get("TRACE").map(String::as_str), Some("tr-9"));
    Ok(())
}

#[tokio::test]
async fn login_retry_recovers_the_original_request() -> Result<()> {
    let temp = tempdir()?;
    let (project, _) = Project::init(temp.path())?;
    let server = MockServer::start_async().await;
    seed_store(&project, &server, "    TOKEN: stale\n")?;

    let rejected = server
        .mock_async(|when, then| {
            when.method(GET).path("/secret").header("authorization", "Bearer stale");
            then.status(401);
        })
        .await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST).path("/login");
            then.status(200).body(r#"{"token":"fresh"}"#);
        })
        .await;
    let accepted = server
        .mock_async(|when, then| {
            when.method(GET).path("/secret").header("authorization", "Bearer fresh");
            then.status(200).body(r#"{"ok":true}"#);
        })
        .await;

    write_request(
        &project,
        "POST_login",
        concat!(
            "url: \"{BASE_URL}/login\"\n",
            "set-env-var:\n",
            "  TOKEN:\n",
            "    body: token\n",
        ),
    )?;
    let id = write_request(
        &project,
        "GET_secret",
        concat!(
            "url: \"{BASE_URL}/secret\"\n",
            "headers:\n",
            "  Authorization: \"Bearer {TOKEN}\"\n",
            "login:\n",
            "  request: POST_login\n",
            "  triggered_by: [401]\n",
        ),
    )?;

    let engine = engine(&project);
    let response = engine.execute(&id).await?;
    assert_eq!(response.status, 200);

    rejected.assert_async().await;
    login.assert_async().await;
    accepted.assert_async().await;
    assert_eq!(
        engine.store().load_active()?.variables.get("TOKEN").map(String::as_str),
        Some("fresh")
    );
    Ok(())
}

#[tokio::test]
async fn login_runs_at_most_once() -> Result<()> {
    let temp = tempdir()?;
    let (project, _) = Project::init(temp.path())?;
    let server = MockServer::start_async().await;
    seed_store(&project, &server, "    TOKEN: stale\n")?;

    let rejected = server
        .mock_async(|when, then| {
            when.method(GET).path("/secret");
            then.status(401);
        })
        .await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST).path("/login");
            then.status(200).body(r#"{"token":"stale"}"#);
        })
        .await;

    let id = write_request(
        &project,
        "GET_secret",
        concat!(
            "url: \"{BASE_URL}/secret\"\n",
            "login:\n",
            "  request: POST_login\n",
            "  triggered_by: [401]\n",
        ),
    )?;
    write_request(
        &project,
        "POST_login",
        "url: \"{BASE_URL}/login\"\nset-env-var:\n  TOKEN:\n    body: token\n",
    )?;

    let response = engine(&project).execute(&id).await?;
    assert_eq!(response.status, 401);

    // First attempt, then exactly one retry after the single login.
    rejected.assert_hits_async(2).await;
    login.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn pre_flight_runs_before_and_post_flight_after() -> Result<()> {
    let temp = tempdir()?;
    let (project, _) = Project::init(temp.path())?;
    let server = MockServer::start_async().await;
    seed_store(&project, &server, "")?;

    let before = server
        .mock_async(|when, then| {
            when.method(GET).path("/prepare");
            then.status(200).body(r#"{"suffix":"ready"}"#);
        })
        .await;
    let main = server
        .mock_async(|when, then| {
            when.method(GET).path("/main/ready");
            then.status(200).body(r#"{"ok":true}"#);
        })
        .await;
    let after = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/cleanup");
            then.status(204);
        })
        .await;

    write_request(
        &project,
        "GET_prepare",
        "url: \"{BASE_URL}/prepare\"\nset-env-var:\n  SUFFIX:\n    body: suffix\n",
    )?;
    write_request(&project, "DELETE_cleanup", "url: \"{BASE_URL}/cleanup\"\n")?;
    // The main URL only resolves once the pre-flight capture landed.
    let id = write_request(
        &project,
        "GET_main",
        concat!(
            "url: \"{BASE_URL}/main/{SUFFIX}\"\n",
            "pre-flight: GET_prepare\n",
            "post-flight: DELETE_cleanup\n",
        ),
    )?;

    let response = engine(&project).execute(&id).await?;
    assert_eq!(response.status, 200);
    before.assert_async().await;
    main.assert_async().await;
    after.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn mismatched_content_type_fails_before_sending() -> Result<()> {
    let temp = tempdir()?;
    let (project, _) = Project::init(temp.path())?;
    let server = MockServer::start_async().await;
    seed_store(&project, &server, "")?;

    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/items");
            then.status(200);
        })
        .await;

    let id = write_request(
        &project,
        "POST_items",
        concat!(
            "url: \"{BASE_URL}/items\"\n",
            "headers:\n",
            "  Content-Type: application/xml\n",
            "body:\n",
            "  json:\n",
            "    name: widget\n",
        ),
    )?;

    let err = engine(&project).execute(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedBodyEncoding { .. }));
    assert_eq!(mock.hits_async().await, 0);
    Ok(())
}

#[tokio::test]
async fn unresolved_url_placeholder_is_an_error() -> Result<()> {
    let temp = tempdir()?;
    let (project, _) = Project::init(temp.path())?;
    fs::write(project.store_path(), "env: dev\nenvs:\n  dev: {}\n")?;

    let id = write_request(&project, "GET_ping", "url: \"{BASE_URL}/ping\"\n")?;

    let err = engine(&project).execute(&id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::PlaceholderUnresolved { ref token, .. } if token == "BASE_URL"
    ));
    Ok(())
}

#[tokio::test]
async fn form_bodies_hit_the_wire_encoded() -> Result<()> {
    let temp = tempdir()?;
    let (project, _) = Project::init(temp.path())?;
    let server = MockServer::start_async().await;
    seed_store(&project, &server, "")?;

    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/search")
                .header("content-type", "application/x-www-form-urlencoded")
                .body("page=1&q=rust");
            then.status(200);
        })
        .await;

    let id = write_request(
        &project,
        "POST_search",
        concat!(
            "url: \"{BASE_URL}/search\"\n",
            "body:\n",
            "  form-urlencoded:\n",
            "    q: rust\n",
            "    page: \"1\"\n",
        ),
    )?;

    engine(&project).execute(&id).await?;
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn infer_schema_persists_an_artifact() -> Result<()> {
    let temp = tempdir()?;
    let (project, _) = Project::init(temp.path())?;
    let server = MockServer::start_async().await;
    seed_store(&project, &server, "")?;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/users/1");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"id":1,"name":"ada","joined":"2024-05-01T10:30:00Z"}"#);
        })
        .await;

    let id = write_request(&project, "users/GET_one", "url: \"{BASE_URL}/users/1\"\n")?;
    let engine = Engine::new(
        project.clone(),
        ExecutionOptions {
            infer_schema: true,
            login_retry: true,
        },
    );

    let response = engine.execute(&id).await?;
    let stored = load_schema(&project.schema_path(&id))?;
    let Schema::Object { ref properties, .. } = stored else {
        panic!("expected an object schema");
    };
    assert!(properties.contains_key("joined"));
    assert_eq!(
        validate(&stored, &serde_json::from_str(&response.body)?),
        Vec::new()
    );
    Ok(())
}

#[tokio::test]
async fn infer_schema_skips_failed_responses() -> Result<()> {
    let temp = tempdir()?;
    let (project, _) = Project::init(temp.path())?;
    let server = MockServer::start_async().await;
    seed_store(&project, &server, "")?;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/broken");
            then.status(500).body(r#"{"error":"boom"}"#);
        })
        .await;

    let id = write_request(&project, "GET_broken", "url: \"{BASE_URL}/broken\"\n")?;
    let engine = Engine::new(
        project.clone(),
        ExecutionOptions {
            infer_schema: true,
            login_retry: true,
        },
    );

    let response = engine.execute(&id).await?;
    assert_eq!(response.status, 500);
    assert!(!project.schema_path(&id).exists());
    Ok(())
}

#[tokio::test]
async fn batch_flags_schema_drift_and_missing_schemas() -> Result<()> {
    let temp = tempdir()?;
    let (project, _) = Project::init(temp.path())?;
    let server = MockServer::start_async().await;
    seed_store(&project, &server, "")?;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/alpha");
            then.status(200).body(r#"{"id":1}"#);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/beta");
            then.status(200).body(r#"{"id":"two"}"#);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/gamma");
            then.status(200).body(r#"{"id":3}"#);
        })
        .await;

    let alpha = write_request(&project, "GET_alpha", "url: \"{BASE_URL}/alpha\"\n")?;
    let beta = write_request(&project, "GET_beta", "url: \"{BASE_URL}/beta\"\n")?;
    // A leftover placeholder makes delta fail before reaching the wire.
    write_request(&project, "GET_delta", "url: \"{BASE_URL}/{NOPE}\"\n")?;
    write_request(&project, "GET_gamma", "url: \"{BASE_URL}/gamma\"\n")?;

    store_schema(&project.schema_path(&alpha), &infer(&json!({"id": 1})))?;
    store_schema(&project.schema_path(&beta), &infer(&json!({"id": 2})))?;

    let engine = Engine::new(
        project.clone(),
        ExecutionOptions {
            infer_schema: false,
            login_retry: false,
        },
    );
    let report = batch::run_all(&engine).await?;

    let idents: Vec<&str> = report.outcomes.iter().map(|o| o.ident.as_str()).collect();
    assert_eq!(idents, vec!["GET_alpha", "GET_beta", "GET_delta", "GET_gamma"]);
    assert!(report.outcomes[0].passed());
    assert!(matches!(
        report.outcomes[1].failure,
        Some(BatchFailure::SchemaMismatch(_))
    ));
    assert!(matches!(
        report.outcomes[2].failure,
        Some(BatchFailure::Execution(EngineError::PlaceholderUnresolved { .. }))
    ));
    assert!(report.outcomes[2].status.is_none());
    assert!(matches!(
        report.outcomes[3].failure,
        Some(BatchFailure::SchemaMissing)
    ));
    assert_eq!(report.passed(), 1);
    assert_eq!(report.failed(), 3);
    assert!(!report.all_passed());
    Ok(())
}

#[tokio::test]
async fn batch_runs_the_environment_login_first() -> Result<()> {
    let temp = tempdir()?;
    let (project, _) = Project::init(temp.path())?;
    let server = MockServer::start_async().await;
    seed_store(
        &project,
        &server,
        concat!(
            "    login:\n",
            "      request: POST_login\n",
            "      triggered_by: [401]\n",
        ),
    )?;

    let login = server
        .mock_async(|when, then| {
            when.method(POST).path("/login");
            then.status(200).header("set-cookie", "session=s1");
        })
        .await;
    let item = server
        .mock_async(|when, then| {
            when.method(GET).path("/item").header("cookie", "session=s1");
            then.status(200).body(r#"{"id":1}"#);
        })
        .await;

    write_request(&project, "POST_login", "url: \"{BASE_URL}/login\"\n")?;
    let item_id = write_request(&project, "GET_item", "url: \"{BASE_URL}/item\"\n")?;
    store_schema(&project.schema_path(&item_id), &infer(&json!({"id": 1})))?;

    let engine = Engine::new(
        project.clone(),
        ExecutionOptions {
            infer_schema: false,
            login_retry: false,
        },
    );
    let report = batch::run_all(&engine).await?;

    // The login request itself is not re-run as part of the sweep.
    login.assert_async().await;
    item.assert_async().await;
    assert_eq!(report.outcomes.len(), 1);
    assert!(report.all_passed());
    Ok(())
}
