use actix_web::web::{self, ServiceConfig};
use url::Url;

use crate::{Fetcher, host::LifecycleHost};

pub mod intercept;

/// This serves as state for the Actix server.
pub struct RoutingState<F: Fetcher> {
    pub host: LifecycleHost<F>,
    pub scope: Url,
}

/* -------------------------------------------------------------------------- */
/*                                Registration                                */
/* -------------------------------------------------------------------------- */

/// Register default routes for the server to an Actix configuration.
pub fn register_routes_to_config<F: Fetcher + 'static>(
    config: &mut ServiceConfig,
) -> &mut ServiceConfig {
    config.route("/{tail:.*}", web::route().to(intercept::intercept::<F>))
}
