mod config;
pub mod net;
pub mod telemetry;
pub mod world;

pub use net::command::{parse_command, Command, InvalidReason};
pub use net::dispatch::{dispatch, DispatchOutcome, SessionTransition};
pub use net::registry::{Registry, Session, SessionId, SessionState};
pub use net::server::{RoomServer, RoomServerConfig, ServerControl};
pub use world::direction::Direction;
pub use world::room::{NeighborAddr, RoomState, TakeOutcome};

pub fn run(args: &[String]) -> Result<(), String> {
    let config = config::RoomConfig::from_args(args)?;
    telemetry::logging::init(&config.log_root)?;

    let room = config.build_room();
    let server_config = RoomServerConfig {
        bind_addr: config.bind_addr.clone(),
        idle_timeout: config.idle_timeout,
        ..RoomServerConfig::default()
    };
    let server = RoomServer::bind(server_config, room)?;
    let port = server
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(config.port);

    println!("Room starting description:");
    println!();
    println!("{}", server.room().summary(None));
    println!();
    println!("Room will wait for players at port: {}", port);
    telemetry::logging::log_room(&format!(
        "room '{}' serving on {}",
        server.room().name(),
        config.bind_addr
    ));

    let control = std::sync::Arc::new(ServerControl::new());
    net::server::install_interrupt_handler();
    server.run(&control)?;

    println!("roomd: shutting down");
    telemetry::logging::log_room("room shut down");
    Ok(())
}
