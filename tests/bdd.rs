use std::{fmt, fs::File, net::SocketAddr};

use anyhow::Context;
use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method, Request, StatusCode,
    },
    Router,
};
use chrono::Duration;
use cucumber::{given, then, when, World as _};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use trips::{
    auth::issue_token,
    config::AppConfig,
    db::{init_pool, migrate},
    routes::create_router,
    state::AppState,
};

const SECRET: &str = "bdd-secret";

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    status: Option<StatusCode>,
    raw_body: Vec<u8>,
    body: Value,
    created: Option<Value>,
}

impl AppWorld {
    fn test_state(&self) -> &TestState {
        self.state.as_ref().expect("state must be initialised first")
    }

    fn created(&self) -> &Value {
        self.created.as_ref().expect("a trip must be created first")
    }

    fn created_path(&self, owner: Option<&str>) -> String {
        let trip = self.created();
        let owner = owner
            .or_else(|| trip["username"].as_str())
            .expect("created trip has an owner");
        format!("/trips/{owner}/{}", trip["id"])
    }

    async fn send(
        &mut self,
        method: Method,
        uri: &str,
        token: Option<String>,
        body: Option<String>,
    ) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(raw) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(raw)
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("request");

        let response = self
            .test_state()
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        self.status = Some(response.status());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        self.raw_body = bytes.to_vec();
        self.body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body is JSON")
        };
    }

    async fn post_trip(&mut self, token: Option<String>, path: &str, body: String) {
        self.send(Method::POST, path, token, Some(body)).await;
        if self.status == Some(StatusCode::CREATED) {
            self.created = Some(self.body["trip"].clone());
        }
    }

    async fn stored_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM trips")
            .fetch_one(&self.test_state().app.db)
            .await
            .expect("count trips")
    }
}

struct TestState {
    app: AppState,
    router: Router,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let db_path = root.path().join("bdd.sqlite");
        File::create(&db_path)?;
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            secret_key: SECRET.into(),
            default_page_size: 10,
            max_page_size: 100,
        };

        let db = init_pool(&config.database_url).await?;
        migrate(&db).await?;

        let app = AppState::new(config, db);
        let router = create_router(app.clone());
        Ok(Self {
            app,
            router,
            _root: root,
        })
    }
}

fn token_for(username: &str) -> String {
    issue_token(SECRET, username, Duration::hours(1)).expect("issue token")
}

#[given("a fresh trip service")]
async fn given_fresh_service(world: &mut AppWorld) {
    world.state = Some(TestState::new().await.expect("state"));
    world.created = None;
}

#[given(regex = r#"^"([^"]+)" has created (\d+) trips$"#)]
async fn given_created_trips(world: &mut AppWorld, username: String, count: usize) {
    for i in 0..count {
        let body = json!({ "title": format!("{username}s trip {i}"), "start": "Ho Chi Minh", "finish": "Hanoi" });
        create_for(world, &username, body).await;
    }
}

#[given(regex = r#"^"([^"]+)" has created (\d+) trips at "([^"]+)"$"#)]
async fn given_created_trips_at(world: &mut AppWorld, username: String, count: usize, at: String) {
    for i in 0..count {
        let body = json!({ "title": format!("{username}s trip {i}"), "created_at": at });
        create_for(world, &username, body).await;
    }
}

async fn create_for(world: &mut AppWorld, username: &str, body: Value) {
    let path = format!("/trips/{username}");
    world
        .post_trip(Some(token_for(username)), &path, body.to_string())
        .await;
    assert_eq!(world.status, Some(StatusCode::CREATED), "{}", world.body);
}

#[when(regex = r#"^"([^"]+)" posts '(.*)' to "([^"]+)"$"#)]
async fn when_user_posts(world: &mut AppWorld, username: String, body: String, path: String) {
    world.post_trip(Some(token_for(&username)), &path, body).await;
}

#[when(regex = r#"^"([^"]+)" posts with an expired token '(.*)' to "([^"]+)"$"#)]
async fn when_user_posts_expired(world: &mut AppWorld, username: String, body: String, path: String) {
    let token = issue_token(SECRET, &username, Duration::hours(-2)).expect("issue token");
    world.post_trip(Some(token), &path, body).await;
}

#[when(regex = r#"^an anonymous client posts '(.*)' to "([^"]+)"$"#)]
async fn when_anonymous_posts(world: &mut AppWorld, body: String, path: String) {
    world.post_trip(None, &path, body).await;
}

#[when(regex = r#"^I request "([^"]+)"$"#)]
async fn when_request(world: &mut AppWorld, path: String) {
    world.send(Method::GET, &path, None, None).await;
}

#[when(regex = r#"^I request the created trip under "([^"]+)"$"#)]
async fn when_request_created_under(world: &mut AppWorld, owner: String) {
    let path = world.created_path(Some(owner.as_str()));
    world.send(Method::GET, &path, None, None).await;
}

#[when(regex = r#"^"([^"]+)" deletes the created trip$"#)]
async fn when_delete_created(world: &mut AppWorld, username: String) {
    let path = world.created_path(None);
    world
        .send(Method::DELETE, &path, Some(token_for(&username)), None)
        .await;
}

#[when(regex = r#"^"([^"]+)" deletes the created trip under "([^"]+)"$"#)]
async fn when_delete_created_under(world: &mut AppWorld, username: String, owner: String) {
    let path = world.created_path(Some(owner.as_str()));
    world
        .send(Method::DELETE, &path, Some(token_for(&username)), None)
        .await;
}

#[when(regex = r#"^"([^"]+)" deletes trip (\d+) of "([^"]+)"$"#)]
async fn when_delete_by_id(world: &mut AppWorld, username: String, id: i64, owner: String) {
    let path = format!("/trips/{owner}/{id}");
    world
        .send(Method::DELETE, &path, Some(token_for(&username)), None)
        .await;
}

#[then(regex = r"^the response status is (\d+)$")]
async fn then_status(world: &mut AppWorld, status: u16) {
    assert_eq!(
        world.status.map(|s| s.as_u16()),
        Some(status),
        "body: {}",
        world.body
    );
}

#[then(regex = r#"^the response message is "([^"]*)"$"#)]
async fn then_message_is(world: &mut AppWorld, message: String) {
    assert_eq!(world.body["message"], message.as_str());
}

#[then(regex = r#"^the response message contains "([^"]*)"$"#)]
async fn then_message_contains(world: &mut AppWorld, fragment: String) {
    let message = world.body["message"].as_str().unwrap_or_default();
    assert!(message.contains(&fragment), "message was {message:?}");
}

#[then("the response body is empty")]
async fn then_body_empty(world: &mut AppWorld) {
    assert!(world.raw_body.is_empty(), "body: {}", world.body);
}

#[then("the response reports the service version")]
async fn then_reports_version(world: &mut AppWorld) {
    assert_eq!(world.body["version"], env!("CARGO_PKG_VERSION"));
}

#[then(regex = r"^the stored trip count is (\d+)$")]
async fn then_stored_count(world: &mut AppWorld, expected: i64) {
    assert_eq!(world.stored_count().await, expected);
}

#[then(regex = r#"^the created trip belongs to "([^"]+)" with title "([^"]+)"$"#)]
async fn then_created_fields(world: &mut AppWorld, username: String, title: String) {
    let trip = world.created();
    assert_eq!(trip["username"], username.as_str());
    assert_eq!(trip["title"], title.as_str());
    assert_eq!(trip["public"], true);
    assert!(trip["id"].is_i64());
    assert!(trip.get("complete").is_none());
}

#[then(regex = r#"^the created trip was created at "([^"]+)"$"#)]
async fn then_created_at(world: &mut AppWorld, created_at: String) {
    assert_eq!(world.created()["created_at"], created_at.as_str());
}

#[then("fetching the created trip returns the same trip")]
async fn then_fetch_round_trip(world: &mut AppWorld) {
    let created = world.created().clone();
    let path = world.created_path(None);
    world.send(Method::GET, &path, None, None).await;
    assert_eq!(world.status, Some(StatusCode::OK));
    assert_eq!(world.body["trip"], created);
}

#[then(regex = r"^the response lists (\d+) trips out of (\d+)$")]
async fn then_lists(world: &mut AppWorld, listed: usize, total: i64) {
    assert_eq!(world.status, Some(StatusCode::OK), "body: {}", world.body);
    let trips = world.body["trips"].as_array().expect("trips array");
    assert_eq!(trips.len(), listed);
    assert_eq!(world.body["total"], total);
}

#[then(regex = r#"^every listed trip belongs to "([^"]+)"$"#)]
async fn then_all_belong_to(world: &mut AppWorld, username: String) {
    let trips = world.body["trips"].as_array().expect("trips array");
    assert!(trips.iter().all(|t| t["username"] == username.as_str()));
}

#[then("the listed trips are newest first")]
async fn then_newest_first(world: &mut AppWorld) {
    let trips = world.body["trips"].as_array().expect("trips array");
    let keys: Vec<(String, i64)> = trips
        .iter()
        .map(|t| {
            (
                t["created_at"].as_str().unwrap_or_default().to_string(),
                t["id"].as_i64().unwrap_or_default(),
            )
        })
        .collect();
    assert!(
        keys.windows(2).all(|pair| pair[0] > pair[1]),
        "not ordered: {keys:?}"
    );
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run_and_exit("tests/features")
        .await;
}
