mod app_state;
mod routes;
mod stats;

pub(crate) use app_state::AppState;
pub(crate) use routes::rest_router;
