mod api;
mod casino;
mod catalog;
mod config;
mod economy;
mod engine;
mod payment;
mod store;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use std::io;

use api::models::AppState;
use config::EngineConfig;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = EngineConfig::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let host = config.host.clone();
    let port = config.port;

    println!("⛏️ Starting hashgrid engine at http://{host}:{port}");

    let state = web::Data::new(AppState::bootstrap(config, engine::now_ms())?);
    engine::spawn(state.clone());

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
