use syncdeck_core::Engine;

use crate::error::CliError;

pub async fn run_status(engine: &Engine) -> Result<(), CliError> {
    let installation = engine.installation();
    match installation.path {
        Some(path) => println!("mutagen: {path}"),
        None => println!("mutagen: not installed (see {})", installation.install_url),
    }
    println!("daemon: {}", engine.daemon_status().await);
    Ok(())
}

pub async fn run_start(engine: &Engine) -> Result<(), CliError> {
    engine.start_daemon().await?;
    println!("daemon: {}", engine.daemon_status().await);
    Ok(())
}

pub fn run_keys(engine: &Engine) {
    let keys = engine.ssh_keys();
    if keys.is_empty() {
        println!("No private keys found");
    }
    for key in keys {
        println!("{}  {}", key.name, key.path);
    }
}
