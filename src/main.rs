use std::sync::Arc;

use actix_web::{App, HttpServer};
use clap::{Command, arg, crate_authors, crate_description, crate_name, crate_version};
use fern::colors::{Color, ColoredLevelConfig};
use log::{LevelFilter, error, info};
use offlineshelf::{
    backend::{OriginFetcher, StorageBackend},
    conf::ServerConfig,
    frontend::setup_service_config,
    host::LifecycleHost,
    interceptor::CacheInterceptor,
};

fn setup_logger(level: LevelFilter) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            let colors = ColoredLevelConfig::new()
                .info(Color::BrightGreen)
                .error(Color::BrightRed)
                .warn(Color::BrightYellow);
            out.finish(format_args!(
                "[{}] {}",
                colors.color(record.level()),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .chain(fern::log_file("output.log")?)
        .apply()?;
    Ok(())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cmd = Command::new(crate_name!())
        .version(crate_version!())
        .author(crate_authors!(","))
        .about(crate_description!())
        .arg(arg!(-c --config <FILE> "Path to a config file").required(false))
        .arg(arg!(-l --log_level <LEVEL> "Sets the logging level").required(false))
        .get_matches();

    let level = cmd
        .get_one::<String>("log_level")
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    let _ = setup_logger(level);

    let config = match ServerConfig::load(cmd.get_one::<String>("config").map(|v| v.as_str())) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to load server configuration: {}", e);
            return Err(std::io::Error::other(e));
        }
    };

    let storage = match StorageBackend::from_config(&config) {
        Ok(v) => Arc::new(v),
        Err(e) => {
            error!("Failed to set up cache storage: {}", e);
            return Err(std::io::Error::other(e));
        }
    };
    let network = match OriginFetcher::from_config(&config) {
        Ok(v) => Arc::new(v),
        Err(e) => {
            error!("Failed to set up origin: {}", e);
            return Err(std::io::Error::other(e));
        }
    };

    // Install once, before any worker starts taking requests
    let mut host = LifecycleHost::new(network.clone());
    CacheInterceptor::from_config(&config, storage.clone(), network.clone()).register(&mut host);
    let activated = match host.dispatch_install().await {
        Ok(_) => {
            info!("Install complete; serving {} offline-first", config.scope.url);
            true
        }
        Err(e) => {
            error!("Install failed, serving straight from the origin: {}", e);
            false
        }
    };

    let address = (config.general.address.clone(), config.general.port);
    info!("{} listening on {}:{}", config.general.name, address.0, address.1);
    HttpServer::new(move || {
        let config = config.clone();
        let storage = storage.clone();
        let network = network.clone();
        App::new().configure(move |f| {
            setup_service_config(f, &config, storage, network, activated);
        })
    })
    .bind(address)?
    .run()
    .await
}
