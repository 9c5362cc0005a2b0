use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;

use crate::api::models::{AppState, EventsQuery, SequencedEvent, StatsResponse};
use crate::catalog;
use crate::engine;

/// The full broadcast snapshot published by the last tick.
#[get("/network/")]
pub async fn network_snapshot(state: web::Data<AppState>) -> impl Responder {
    let snapshot = state.snapshot.lock().expect("mutex poisoned").clone();
    HttpResponse::Ok().json(snapshot)
}

#[derive(Serialize)]
struct EventsResponse {
    events: Vec<SequencedEvent>,
    cursor: u64,
}

/// Sequenced engine events at or after the `since` cursor. Clients poll with
/// the returned cursor to consume each event exactly once.
#[get("/events/")]
pub async fn events(state: web::Data<AppState>, query: web::Query<EventsQuery>) -> impl Responder {
    let (events, cursor) = state
        .events
        .lock()
        .expect("mutex poisoned")
        .since(query.since);
    HttpResponse::Ok().json(EventsResponse { events, cursor })
}

#[get("/leaderboard/")]
pub async fn leaderboard(state: web::Data<AppState>) -> impl Responder {
    let entries = state
        .snapshot
        .lock()
        .expect("mutex poisoned")
        .leaderboard
        .clone();
    HttpResponse::Ok().json(entries)
}

#[get("/stats/")]
pub async fn stats(state: web::Data<AppState>) -> impl Responder {
    let now = engine::now_ms();
    let online_users = state.sessions.lock().expect("mutex poisoned").len();
    let total_users = state.working_set.lock().expect("mutex poisoned").len();
    let net = state.network.lock().expect("mutex poisoned");
    HttpResponse::Ok().json(StatsResponse {
        block_height: net.block_height,
        block_reward: net.block_reward,
        difficulty: net.difficulty,
        progress: net.progress,
        network_hash_rate: net.network_hash_rate,
        total_mined: net.total_mined,
        reward_pool: net.reward_pool,
        total_users,
        online_users,
        epoch_age_ms: (now - net.epoch_start_ms).max(0),
        last_block_age_ms: (now - net.last_block_ms).max(0),
    })
}

#[derive(Serialize)]
struct ShopResponse {
    items: &'static [catalog::ShopItem],
    global_sold: std::collections::BTreeMap<String, u32>,
}

/// The immutable catalog plus the live sold counters for limited items.
#[get("/shop/")]
pub async fn shop(state: web::Data<AppState>) -> impl Responder {
    let global_sold = state
        .network
        .lock()
        .expect("mutex poisoned")
        .global_sold
        .clone();
    HttpResponse::Ok().json(ShopResponse {
        items: catalog::catalog(),
        global_sold,
    })
}

#[get("/tasks/")]
pub async fn tasks(state: web::Data<AppState>) -> impl Responder {
    let tasks = state.tasks.lock().expect("mutex poisoned").clone();
    HttpResponse::Ok().json(tasks)
}
