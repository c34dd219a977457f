#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{RawQuery, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use tokio::{net::TcpListener, task::JoinHandle};

/// Foreign-key filters and the largest id the seeded catalog holds for each.
const FK_CEILINGS: [(&str, i64); 4] = [
    ("age_group", 3),
    ("difficulty", 3),
    ("duration", 3),
    ("player_count", 4),
];
const M2M_FILTERS: [&str; 3] = ["genre", "mechanic", "type"];
const SORT_KEYS: [&str; 2] = ["price", "title"];

#[derive(Debug, Clone, Copy, Default)]
pub struct StubBehavior {
    /// Sleep before answering, for timeout tests.
    pub delay: Option<Duration>,
    /// Answer `200` to every query instead of validating it.
    pub lenient: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct StubGame {
    pub id: i64,
    pub title: &'static str,
    pub price: f64,
    pub age_group: i64,
    pub difficulty: i64,
    pub duration: i64,
    pub player_count: i64,
    pub genres: &'static [i64],
    pub mechanics: &'static [i64],
    pub types: &'static [i64],
}

impl StubGame {
    fn foreign_key(&self, name: &str) -> i64 {
        match name {
            "age_group" => self.age_group,
            "difficulty" => self.difficulty,
            "duration" => self.duration,
            _ => self.player_count,
        }
    }

    fn many(&self, name: &str) -> &'static [i64] {
        match name {
            "genre" => self.genres,
            "mechanic" => self.mechanics,
            _ => self.types,
        }
    }

    fn to_value(self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "price": self.price,
            "age_group": self.age_group,
            "difficulty": self.difficulty,
            "duration": self.duration,
            "player_count": self.player_count,
            "genre": self.genres,
            "mechanic": self.mechanics,
            "type": self.types,
        })
    }
}

pub fn catalog() -> &'static [StubGame] {
    &[
        StubGame {
            id: 1,
            title: "Magic Quest",
            price: 120.0,
            age_group: 2,
            difficulty: 1,
            duration: 3,
            player_count: 3,
            genres: &[1, 2],
            mechanics: &[2],
            types: &[1],
        },
        StubGame {
            id: 2,
            title: "Cyber Wars",
            price: 250.0,
            age_group: 3,
            difficulty: 2,
            duration: 2,
            player_count: 4,
            genres: &[2],
            mechanics: &[1, 3],
            types: &[2],
        },
        StubGame {
            id: 3,
            title: "Solo Run",
            price: 90.0,
            age_group: 1,
            difficulty: 1,
            duration: 1,
            player_count: 1,
            genres: &[3],
            mechanics: &[2],
            types: &[2],
        },
        StubGame {
            id: 4,
            title: "Castle Siege",
            price: 480.0,
            age_group: 2,
            difficulty: 3,
            duration: 3,
            player_count: 3,
            genres: &[1],
            mechanics: &[1],
            types: &[1],
        },
        StubGame {
            id: 5,
            title: "Tiny Tactics",
            price: 0.0,
            age_group: 1,
            difficulty: 2,
            duration: 1,
            player_count: 2,
            genres: &[2, 3],
            mechanics: &[3],
            types: &[2],
        },
    ]
}

#[derive(Default)]
struct StubState {
    behavior: StubBehavior,
    hits: AtomicUsize,
    queries: Mutex<Vec<String>>,
    authorization: Mutex<Option<String>>,
}

/// Games listing service bound to an ephemeral local port.
pub struct GamesStub {
    addr: SocketAddr,
    state: Arc<StubState>,
    server: JoinHandle<()>,
}

impl GamesStub {
    pub async fn spawn() -> Self {
        Self::spawn_with(StubBehavior::default()).await
    }

    pub async fn spawn_with(behavior: StubBehavior) -> Self {
        let state = Arc::new(StubState {
            behavior,
            ..StubState::default()
        });
        let router = Router::new()
            .route("/api/games/", get(list_games))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub address");
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("stub server");
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Raw query strings in arrival order, exactly as they were put on the wire.
    pub fn raw_queries(&self) -> Vec<String> {
        self.state.queries.lock().expect("queries lock").clone()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.state
            .authorization
            .lock()
            .expect("authorization lock")
            .clone()
    }
}

impl Drop for GamesStub {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn list_games(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let raw = raw.unwrap_or_default();
    state.queries.lock().expect("queries lock").push(raw.clone());
    *state.authorization.lock().expect("authorization lock") = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    if let Some(delay) = state.behavior.delay {
        tokio::time::sleep(delay).await;
    }

    if state.behavior.lenient {
        return (StatusCode::OK, Json(json!([]))).into_response();
    }

    match filter_games(&raw) {
        Ok(games) => (
            StatusCode::OK,
            Json(Value::Array(games.into_iter().map(StubGame::to_value).collect())),
        )
            .into_response(),
        Err(message) => validation_failed(message),
    }
}

fn filter_games(raw: &str) -> Result<Vec<StubGame>, String> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    let values = |name: &str| params.get(name).cloned().unwrap_or_default();

    let mut games: Vec<StubGame> = catalog().to_vec();

    for (name, ceiling) in FK_CEILINGS {
        let ids = parse_ids(name, &values(name))?;
        if let Some(unknown) = ids.iter().find(|id| **id > ceiling) {
            return Err(format!("{name}: unknown id {unknown}"));
        }
        if !ids.is_empty() {
            games.retain(|game| ids.contains(&game.foreign_key(name)));
        }
    }

    for name in M2M_FILTERS {
        let ids = parse_ids(name, &values(name))?;
        if !ids.is_empty() {
            games.retain(|game| game.many(name).iter().any(|id| ids.contains(id)));
        }
    }

    let min_price = parse_price("min_price", &values("min_price"))?;
    let max_price = parse_price("max_price", &values("max_price"))?;
    if let (Some(min), Some(max)) = (min_price, max_price) {
        if min > max {
            return Err("min_price must not exceed max_price".into());
        }
    }
    if let Some(min) = min_price {
        games.retain(|game| game.price >= min);
    }
    if let Some(max) = max_price {
        games.retain(|game| game.price <= max);
    }

    if let Some(search) = values("search").last().filter(|text| !text.is_empty()) {
        let needle = search.to_lowercase();
        games.retain(|game| game.title.to_lowercase().contains(&needle));
    }

    if let Some(sort) = values("sort").last().filter(|key| !key.is_empty()) {
        let (descending, key) = match sort.strip_prefix('-') {
            Some(key) => (true, key),
            None => (false, sort.as_str()),
        };
        if !SORT_KEYS.contains(&key) {
            return Err(format!("sort: unsupported key '{sort}'"));
        }
        if key == "price" {
            games.sort_by(|a, b| a.price.total_cmp(&b.price));
        } else {
            games.sort_by(|a, b| a.title.cmp(b.title));
        }
        if descending {
            games.reverse();
        }
    }

    Ok(games)
}

fn parse_ids(name: &str, raw: &[String]) -> Result<Vec<i64>, String> {
    raw.iter()
        .filter(|value| !value.is_empty())
        .map(|value| match value.parse::<i64>() {
            Ok(id) if id >= 1 => Ok(id),
            _ => Err(format!("{name}: '{value}' is not a valid id")),
        })
        .collect()
}

fn parse_price(name: &str, raw: &[String]) -> Result<Option<f64>, String> {
    let Some(value) = raw.last().filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    match value.parse::<f64>() {
        Ok(price) if price.is_finite() && price >= 0.0 => Ok(Some(price)),
        _ => Err(format!("{name}: '{value}' is not a valid price")),
    }
}

fn validation_failed(message: impl Into<String>) -> Response {
    let payload = json!({
        "error": {
            "code": "VALIDATION_FAILED",
            "message": message.into()
        }
    });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}
