//! Headless bulletin client
//!
//! `bulletin [config.json] <user-id> [display name]` signs in, loads the
//! board once and prints the snapshot as JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use site_bulletin::app::App;
use site_bulletin::config::{load_config, CONFIG_FILE};
use site_bulletin::session::Identity;

const USAGE: &str = "usage: bulletin [config.json] <user-id> [display name]";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bulletin: {}", e);
            let _ = rolling_logger::error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config_path, user_id, display_name) = match args.as_slice() {
        [user_id] => (PathBuf::from(CONFIG_FILE), user_id.clone(), None),
        [config, user_id] => (PathBuf::from(config), user_id.clone(), None),
        [config, user_id, name, ..] => (PathBuf::from(config), user_id.clone(), Some(name.clone())),
        [] => return Err(USAGE.to_string()),
    };

    let config = load_config(&config_path)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("{} not found", config_path.display()))?
        .apply_env();

    let log_dir = config.log_dir.clone().unwrap_or_else(|| PathBuf::from("logs"));
    rolling_logger::init_logger(log_dir, "SiteBulletin")?;
    rolling_logger::info(&format!("starting as {}", user_id))?;

    let app = App::start(&config).await.map_err(|e| e.to_string())?;
    if let Err(e) = app.store.fetch_users().await {
        rolling_logger::error(&format!("user list unavailable: {}", e))?;
    }
    let display_name = display_name.unwrap_or_else(|| app.store.resolve_user_name(&user_id));
    app.session.sign_in(Identity::new(user_id, display_name));

    let snapshot = app.store.settled().await;
    let json = serde_json::to_string_pretty(&*snapshot).map_err(|e| e.to_string())?;
    println!("{}", json);

    let failed = snapshot.error.clone();
    app.shutdown();
    match failed {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
