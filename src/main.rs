use actix_web::{web, App, HttpServer};
use messaging_service::{
    config, db, error, logging,
    middleware::auth,
    routes,
    sse::EventStreamRegistry,
    state::AppState,
    websocket::ConnectionRegistry,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    // Initialize DB pool and apply the schema
    let db = db::init_pool(&cfg.database_url).await?;

    // Token validation shares the identity provider's signing secret
    auth::init_validation(&cfg.access_token_secret);

    let registry = ConnectionRegistry::new();
    let streams = EventStreamRegistry::new();

    let state = AppState {
        db,
        registry,
        streams,
        config: cfg.clone(),
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting messaging-service");

    let server_state = state.clone();
    let server_cfg = cfg.clone();

    HttpServer::new(move || {
        let cors = if server_cfg.cors_allowed_origins.is_empty() {
            actix_cors::Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600)
        } else {
            server_cfg
                .cors_allowed_origins
                .iter()
                .fold(actix_cors::Cors::default(), |cors, origin| {
                    cors.allowed_origin(origin)
                })
                .allow_any_method()
                .allow_any_header()
                .supports_credentials()
                .max_age(3600)
        };

        App::new()
            .wrap(cors)
            .wrap(actix_middleware::RequestId::new())
            .wrap(actix_middleware::Logging)
            .wrap(auth::Authentication::new())
            .app_data(web::Data::new(server_state.clone()))
            .service(routes::conversations::start_conversation)
            .service(routes::conversations::get_conversations)
            .service(routes::conversations::reconcile_conversations)
            .service(routes::messages::send_message)
            .service(routes::messages::get_messages)
            .service(routes::messages::mark_read)
            .service(routes::messages::unread_count)
            .service(routes::messages::poll_messages)
            .service(routes::notifications::get_notifications)
            .service(routes::sse::event_stream)
            .service(routes::wsroute::ws_handler)
            .route("/health", web::get().to(|| async { "OK" }))
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("run server: {e}")))
}
