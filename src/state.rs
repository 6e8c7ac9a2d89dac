use crate::{auth::TokenVerifier, config::AppConfig, db::DbPool, services::trips::TripService};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub trips: TripService,
    pub tokens: TokenVerifier,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool) -> Self {
        let tokens = TokenVerifier::new(&config.secret_key);
        let trips = TripService::new(db.clone());
        Self {
            config,
            db,
            trips,
            tokens,
        }
    }
}
