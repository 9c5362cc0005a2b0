use actix_web::{HttpRequest, HttpResponse, Responder, delete, post, web};
use log::{info, warn};

use crate::api::models::{AppState, CreditRequest, EconomyTuning, Task};
use crate::catalog::Currency;
use crate::engine;

/// All admin endpoints require the configured key in `X-Admin-Key`. With no
/// key configured the surface stays disabled.
fn authorized(state: &AppState, req: &HttpRequest) -> bool {
    let Some(expected) = state.config.admin_key.as_deref() else {
        return false;
    };
    req.headers()
        .get("X-Admin-Key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|key| key == expected)
}

fn forbidden() -> HttpResponse {
    HttpResponse::Forbidden().json(serde_json::json!({ "error": "admin access denied" }))
}

/// Queue a tuning snapshot; the tick loop applies it atomically between
/// ticks. Validated here against a copy of the current state so the caller
/// gets an immediate error instead of a silent drop at apply time.
#[post("/admin/tuning/")]
pub async fn queue_tuning(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<EconomyTuning>,
) -> impl Responder {
    if !authorized(&state, &req) {
        return forbidden();
    }
    let tuning = body.into_inner();

    let mut preview = state.network.lock().expect("mutex poisoned").clone();
    if let Err(e) = tuning.apply_to(&mut preview) {
        return HttpResponse::BadRequest().json(serde_json::json!({ "error": e }));
    }

    *state.pending_tuning.lock().expect("mutex poisoned") = Some(tuning);
    info!("admin tuning queued for the next tick");
    HttpResponse::Accepted().json(serde_json::json!({ "status": "queued" }))
}

/// Manual balance adjustment. Negative amounts debit; balances floor at zero.
#[post("/admin/credit/")]
pub async fn credit(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreditRequest>,
) -> impl Responder {
    if !authorized(&state, &req) {
        return forbidden();
    }
    let request = body.into_inner();
    if !request.amount.is_finite() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "error": "amount must be finite" }));
    }

    let ledger = {
        let mut ws = state.working_set.lock().expect("mutex poisoned");
        let Some(ledger) = ws.get_mut(&request.user_id) else {
            return HttpResponse::NotFound().json(serde_json::json!({ "error": "unknown user" }));
        };
        match request.currency {
            Currency::Nrc => {
                ledger.balance_nrc = (ledger.balance_nrc + request.amount).max(0.0)
            }
            Currency::Ton => {
                ledger.balance_ton = (ledger.balance_ton + request.amount).max(0.0)
            }
        }
        ledger.clone()
    };
    warn!(
        "admin adjusted balance of {} by {} {:?}",
        request.user_id, request.amount, request.currency
    );
    if let Err(e) = engine::flush(&state) {
        log::error!("flush after admin credit failed: {e}");
    }
    HttpResponse::Ok().json(ledger)
}

#[post("/admin/tasks/")]
pub async fn add_task(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<Task>,
) -> impl Responder {
    if !authorized(&state, &req) {
        return forbidden();
    }
    let task = body.into_inner();
    let mut tasks = state.tasks.lock().expect("mutex poisoned");
    if tasks.iter().any(|t| t.id == task.id) {
        return HttpResponse::Conflict().json(serde_json::json!({ "error": "duplicate task id" }));
    }
    info!("admin added task {}", task.id);
    tasks.push(task);
    HttpResponse::Created().json(serde_json::json!({ "status": "created" }))
}

#[delete("/admin/tasks/{task_id}/")]
pub async fn delete_task(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    if !authorized(&state, &req) {
        return forbidden();
    }
    let task_id = path.into_inner();
    let mut tasks = state.tasks.lock().expect("mutex poisoned");
    let before = tasks.len();
    tasks.retain(|t| t.id != task_id);
    if tasks.len() == before {
        return HttpResponse::NotFound().json(serde_json::json!({ "error": "unknown task" }));
    }
    info!("admin removed task {task_id}");
    HttpResponse::Ok().json(serde_json::json!({ "status": "deleted" }))
}
