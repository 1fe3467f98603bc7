use crate::AppState;
use axum::Router;

mod home;
mod plugins;

pub fn routes() -> Router<AppState> {
	Router::new()
		.merge(home::routes())
		.merge(plugins::routes())
}
