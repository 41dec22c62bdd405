use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::io;
use std::sync::Arc;

use photofeed::api::{self, AppState};
use photofeed::auth::AuthService;
use photofeed::config::Config;
use photofeed::store::Store;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env();

    // Initialize store
    let store = Arc::new(Store::new(&config.database_path).map_err(io::Error::other)?);
    log::info!("Database: {}", config.database_path);

    // Initialize auth service
    let auth_service = Arc::new(AuthService::from_config(&config, store.clone()));

    // Bootstrap a staff account from the environment if configured
    if let Some(admin) = &config.admin {
        match auth_service.ensure_staff_account(&admin.username, &admin.email, &admin.password) {
            Ok(true) => log::info!("Created staff account {}", admin.username),
            Ok(false) => log::info!("Staff account {} already exists", admin.username),
            Err(e) => log::error!("Failed to create staff account {}: {}", admin.username, e),
        }
    }

    let state = web::Data::new(AppState {
        store,
        auth_service,
    });

    log::info!("Starting photofeed server on port {}", config.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::configure_routes)
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await
}
