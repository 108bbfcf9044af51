use events::EventPublisher;
use log::*;
use realtime::domain_event_handler::RealtimeDomainEventHandler;
use realtime::Manager;
use service::{config::Config, logging::Logger, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config);

    info!(
        "Starting chat platform backend in {} mode",
        config.runtime_env
    );

    let realtime_manager = Arc::new(Manager::new());

    // The realtime handler is the post-commit hook: the CRUD layer
    // publishes events after persistence, and the handler fans them out.
    let event_publisher = EventPublisher::new().with_handler(Arc::new(
        RealtimeDomainEventHandler::new(realtime_manager.clone()),
    ));

    let mut app_state = AppState::new(config, &realtime_manager);
    app_state.set_event_publisher(event_publisher);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server failed: {e}");
        std::process::exit(1);
    }
}
