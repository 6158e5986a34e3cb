use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::broadcast;

use crate::config;
use crate::db::repositories::PgProgressStore;
use crate::progress::{CompletionEvent, EnrollmentProgressEngine};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub env: config::Config,
    pub engine: Arc<EnrollmentProgressEngine<PgProgressStore>>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        env: config::Config,
        completion_tx: broadcast::Sender<CompletionEvent>,
    ) -> Self {
        let engine = Arc::new(EnrollmentProgressEngine::new(
            PgProgressStore::new(db.clone()),
            completion_tx,
        ));
        Self { db, env, engine }
    }
}
