//! The roster broker daemon: load config, seed users, serve forever.

mod config;

use std::fs::File;

use roster_net::Broker;

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("roster")
        .join("broker.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = File::create(&log_path)
        .unwrap_or_else(|_| File::create("/tmp/roster-broker.log").expect("Cannot create log file"));

    WriteLogger::init(log_level, Config::default(), log_file).expect("Failed to initialize logger");

    log::info!("roster-broker starting (log level: {:?})", log_level);
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let config = config::Config::load();
    let listen = args
        .iter()
        .position(|a| a == "--listen")
        .and_then(|i| args.get(i + 1).cloned())
        .unwrap_or_else(|| config.listen().to_string());

    let broker = Broker::bind(&listen)?;

    {
        let state = broker.state();
        let mut state = state.lock().unwrap();
        for user in config.users() {
            if let Err(e) = state.new_user(&user.name) {
                log::warn!("config: skipping seed user {}: {}", user.name, e);
                continue;
            }
            if let Err(e) = state.set_password(&user.name, &user.password) {
                log::warn!("config: no password for {}: {}", user.name, e);
            }
            log::info!("config: seeded user {}", user.name);
        }
        log::debug!("{}", state.directory().describe());
    }

    broker.run()
}
