pub mod admin;
pub mod health;
pub mod models;
pub mod network;
pub mod session;

use actix_web::web;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(session::connect)
            .service(session::action)
            .service(network::network_snapshot)
            .service(network::events)
            .service(network::leaderboard)
            .service(network::stats)
            .service(network::shop)
            .service(network::tasks)
            .service(admin::queue_tuning)
            .service(admin::credit)
            .service(admin::add_task)
            .service(admin::delete_task),
    );
}
