use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use ladybug_hosting::config::{Config, DatabaseConfig};
use ladybug_hosting::{db, routes, AppState};

async fn app() -> Router {
    let conn = db::connect_in_memory().await.unwrap();
    let config = Config::with_database(DatabaseConfig::new("sqlite::memory:"));
    routes::app(AppState::new(conn, config))
}

/// A browser-like client that keeps the session cookie between requests.
struct Client {
    app: Router,
    cookie: Option<String>,
}

impl Client {
    fn new(app: &Router) -> Self {
        Self {
            app: app.clone(),
            cookie: None,
        }
    }

    async fn send(&mut self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let resp = self.app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        if let Some(set_cookie) = resp.headers().get(header::SET_COOKIE) {
            let set_cookie = set_cookie.to_str().unwrap();
            let pair = set_cookie.split(';').next().unwrap().trim().to_string();
            let cleared = pair.ends_with('=') || set_cookie.contains("Max-Age=0");
            self.cookie = if cleared { None } else { Some(pair) };
        }

        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(&mut self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    async fn post(&mut self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }

    async fn register(&mut self, username: &str) -> Value {
        let (status, body) = self
            .post(
                "/api/auth/register",
                json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": "correct horse",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    async fn admin_login(&mut self) {
        let (status, body) = self
            .post(
                "/api/admin/login",
                json!({ "username": "Ntando", "password": "Ntando" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    async fn create_server(&mut self, name: &str, total: i32, extra: Value) -> String {
        let mut body = json!({
            "name": name,
            "description": format!("{name} for testing"),
            "type": "free",
            "category": "gaming",
            "specs": { "cpu": "2 vCPU", "ram": "4 GB" },
            "location": "Durban",
            "capacity": { "total": total },
            "connectionDetails": {
                "host": "game.example.net",
                "port": 25565,
                "username": "player",
                "password": "hunter2",
                "protocol": "ssh"
            },
            "ownerUsername": "hoster",
            "tags": ["minecraft"]
        });
        if let (Some(base), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                base.insert(key.clone(), value.clone());
            }
        }
        let (status, created) = self.post("/api/admin/servers", body).await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        created["server"]["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn register_login_me_logout() {
    let app = app().await;
    let mut client = Client::new(&app);

    let registered = client.register("alice").await;
    assert_eq!(registered["user"]["username"], "alice");
    assert_eq!(registered["user"]["role"], "user");
    assert!(registered["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(registered["user"].get("password").is_none());

    let (status, me) = client.get("/api/auth/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["email"], "alice@example.com");

    let (status, _) = client.post("/api/auth/logout", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = client.get("/api/auth/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Not authenticated");

    let (status, body) = client
        .post(
            "/api/auth/login",
            json!({ "username": "alice@example.com", "password": "correct horse" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Login successful");
    let (status, _) = client.get("/api/auth/me").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn registration_rejects_duplicates_and_missing_fields() {
    let app = app().await;
    let mut client = Client::new(&app);
    client.register("alice").await;

    let (status, body) = client
        .post(
            "/api/auth/register",
            json!({ "username": "alice", "email": "new@example.com", "password": "x" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User already exists");

    let (status, body) = client
        .post(
            "/api/auth/register",
            json!({ "username": "other", "email": "alice@example.com", "password": "x" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User already exists");

    let (status, body) = client
        .post("/api/auth/register", json!({ "username": "bob" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "All fields are required");
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let app = app().await;
    let mut client = Client::new(&app);
    client.register("alice").await;

    let mut stranger = Client::new(&app);
    let (status, body) = stranger
        .post("/api/auth/login", json!({ "username": "alice", "password": "wrong" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");

    let (status, body) = stranger
        .post("/api/auth/login", json!({ "username": "alice" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username and password are required");
}

#[tokio::test]
async fn admin_routes_require_admin_flag() {
    let app = app().await;
    let mut anonymous = Client::new(&app);
    let mut user = Client::new(&app);
    user.register("alice").await;

    for client in [&mut anonymous, &mut user] {
        for uri in [
            "/api/admin/dashboard",
            "/api/admin/users",
            "/api/admin/servers",
            "/api/admin/connections",
        ] {
            let (status, body) = client.get(uri).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body["error"], "Admin access required");
        }
        let (status, _) = client
            .post("/api/admin/servers/anything/toggle-status", json!({}))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = client.send(Method::DELETE, "/api/admin/servers/anything", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, body) = anonymous
        .post("/api/admin/login", json!({ "username": "Ntando", "password": "nope" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid admin credentials");
}

#[tokio::test]
async fn admin_session_ends_on_logout() {
    let app = app().await;
    let mut admin = Client::new(&app);
    admin.admin_login().await;

    let (status, dashboard) = admin.get("/api/admin/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["stats"]["totalUsers"], 0);

    let (status, body) = admin
        .get("/api/admin/users?page=18446744073709551615&limit=100")
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["users"].as_array().unwrap().is_empty());

    let (status, _) = admin.post("/api/admin/logout", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = admin.get("/api/admin/dashboard").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn connect_and_disconnect_track_capacity() {
    let app = app().await;
    let mut admin = Client::new(&app);
    admin.admin_login().await;
    let server_id = admin.create_server("Solo", 1, json!({})).await;

    let mut alice = Client::new(&app);
    alice.register("alice").await;
    let mut bob = Client::new(&app);
    bob.register("bob").await;

    let connect = format!("/api/servers/{server_id}/connect");
    let disconnect = format!("/api/servers/{server_id}/disconnect");

    let (status, body) = alice.post(&connect, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["connectionDetails"]["password"], "hunter2");
    assert_eq!(body["connectionDetails"]["port"], 25565);
    assert!(body["connectionDetails"]["authToken"].is_string());

    let (status, body) = alice.post(&connect, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Already connected to this server");

    let (status, body) = bob.post(&connect, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Server is at full capacity");

    let (_, detail) = alice.get(&format!("/api/servers/{server_id}")).await;
    assert_eq!(detail["server"]["isConnected"], true);
    assert_eq!(detail["server"]["capacity"]["used"], 1);
    assert_eq!(detail["server"]["availability"], 0);
    assert_eq!(detail["server"]["connectionDetails"]["host"], "game.example.net");
    assert!(detail["server"]["connectionDetails"].get("password").is_none());

    let (_, detail) = bob.get(&format!("/api/servers/{server_id}")).await;
    assert_eq!(detail["server"]["isConnected"], false);
    assert!(detail["server"]["connectionDetails"].is_null());

    let (status, mine) = alice.get("/api/servers/my/connections").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["connections"].as_array().unwrap().len(), 1);
    assert_eq!(mine["connections"][0]["server"]["name"], "Solo");

    let (status, _) = alice.post(&disconnect, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = alice.post(&disconnect, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Connection not found");

    let (_, detail) = bob.get(&format!("/api/servers/{server_id}")).await;
    assert_eq!(detail["server"]["capacity"]["used"], 0);

    let (status, _) = bob.post(&connect, json!({})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn connecting_requires_a_session() {
    let app = app().await;
    let mut admin = Client::new(&app);
    admin.admin_login().await;
    let server_id = admin.create_server("Alpha", 3, json!({})).await;

    let mut anonymous = Client::new(&app);
    for action in ["connect", "disconnect"] {
        let (status, body) = anonymous
            .post(&format!("/api/servers/{server_id}/{action}"), json!({}))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required");
    }
    let (status, _) = anonymous.get("/api/servers/my/connections").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn catalog_filters_and_hides_private_listings() {
    let app = app().await;
    let mut admin = Client::new(&app);
    admin.admin_login().await;
    admin.create_server("Alpha", 3, json!({})).await;
    admin
        .create_server(
            "Webby",
            3,
            json!({ "type": "paid", "category": "web", "price": 9.99, "tags": ["nginx"] }),
        )
        .await;
    let hidden = admin.create_server("Hidden", 3, json!({ "isPublic": false })).await;

    let mut visitor = Client::new(&app);
    let (status, all) = visitor.get("/api/servers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["servers"].as_array().unwrap().len(), 2);
    assert!(all["servers"][0].get("connectionDetails").is_none());

    let (_, paid) = visitor.get("/api/servers?type=paid").await;
    assert_eq!(paid["servers"].as_array().unwrap().len(), 1);
    assert_eq!(paid["servers"][0]["name"], "Webby");
    assert_eq!(paid["servers"][0]["owner"], "hoster");

    let (_, ignored) = visitor.get("/api/servers?category=spaceship").await;
    assert_eq!(ignored["servers"].as_array().unwrap().len(), 2);

    let (_, searched) = visitor.get("/api/servers?search=NGINX").await;
    assert_eq!(searched["servers"].as_array().unwrap().len(), 1);

    let (status, body) = visitor.get(&format!("/api/servers/{hidden}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Server not found");

    let (_, listed) = admin.get("/api/admin/servers?limit=2").await;
    assert_eq!(listed["pagination"]["total"], 3);
    assert_eq!(listed["pagination"]["pages"], 2);
    assert_eq!(listed["servers"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn admin_maintains_listings() {
    let app = app().await;
    let mut admin = Client::new(&app);
    admin.admin_login().await;
    let server_id = admin.create_server("Alpha", 3, json!({})).await;

    let mut alice = Client::new(&app);
    alice.register("alice").await;
    let (status, _) = alice
        .post(&format!("/api/servers/{server_id}/connect"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = admin
        .send(
            Method::PUT,
            &format!("/api/admin/servers/{server_id}"),
            Some(json!({ "capacity": { "total": 0 } })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = admin
        .send(
            Method::PUT,
            &format!("/api/admin/servers/{server_id}"),
            Some(json!({ "name": "Alpha 2", "status": "maintenance" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["server"]["name"], "Alpha 2");
    assert_eq!(body["server"]["status"], "maintenance");

    let (status, body) = admin
        .post(&format!("/api/admin/servers/{server_id}/toggle-status"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");
    assert_eq!(body["message"], "Server status changed to online");

    let (_, connections) = admin.get("/api/admin/connections").await;
    assert_eq!(connections["connections"][0]["user"]["username"], "alice");
    assert_eq!(connections["connections"][0]["server"]["name"], "Alpha 2");

    let (_, users) = admin.get("/api/admin/users?search=ali").await;
    assert_eq!(users["users"].as_array().unwrap().len(), 1);
    assert!(users["users"][0].get("passwordHash").is_none());

    let (status, _) = admin
        .send(Method::DELETE, &format!("/api/admin/servers/{server_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, connections) = admin.get("/api/admin/connections").await;
    assert!(connections["connections"].as_array().unwrap().is_empty());
    let (_, mine) = alice.get("/api/servers/my/connections").await;
    assert!(mine["connections"].as_array().unwrap().is_empty());

    let (status, _) = admin
        .send(Method::DELETE, &format!("/api/admin/servers/{server_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn errors_are_json() {
    let app = app().await;
    let mut client = Client::new(&app);

    let (status, body) = client.get("/api/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Route not found");

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}
