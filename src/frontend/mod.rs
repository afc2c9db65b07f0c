use std::sync::Arc;

use actix_web::web::{self, ServiceConfig};
use log::warn;
use routes::{RoutingState, register_routes_to_config};

use crate::{
    CacheStorage, Fetcher, conf::ServerConfig, host::LifecycleHost, interceptor::CacheInterceptor,
};

pub mod routes;

/// Wires a lifecycle host into an Actix configuration.
///
/// # Arguments
///
/// - `activated` - Whether install succeeded. If not, no interceptor is
///   registered and every request goes straight to `network`.
pub fn setup_service_config<
    'a,
    S: CacheStorage + 'static,
    F: Fetcher + 'static,
>(
    web_config: &'a mut ServiceConfig,
    server_config: &'a ServerConfig,
    storage: Arc<S>,
    network: Arc<F>,
    activated: bool,
) -> &'a mut ServiceConfig {
    let mut host = LifecycleHost::new(network.clone());
    match activated {
        true => CacheInterceptor::from_config(server_config, storage, network).register(&mut host),
        false => warn!("No active interceptor; every request goes to the origin"),
    }

    web_config.app_data(web::Data::new(RoutingState {
        host,
        scope: server_config.scope.url.clone(),
    }));
    web_config.configure(|f| {
        register_routes_to_config::<F>(f);
    });

    web_config
}
