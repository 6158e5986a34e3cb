//! Certificate issuance listener. The progress engine publishes a
//! [`CompletionEvent`] when an enrollment first reaches 100%; this task
//! records a certificate row pointing at the externally generated document.

use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::progress::CompletionEvent;

pub async fn run_issuer(
    pool: PgPool,
    certificate_base_url: String,
    mut rx: broadcast::Receiver<CompletionEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Err(err) = issue(&pool, &certificate_base_url, event).await {
                    error!(
                        enrollment_id = %event.enrollment_id,
                        "Failed to issue certificate: {err}"
                    );
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Certificate issuer lagged, {missed} completion events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn issue(
    pool: &PgPool,
    certificate_base_url: &str,
    event: CompletionEvent,
) -> Result<(), sqlx::Error> {
    let certificate_id = Uuid::new_v4();
    let certificate_url = format!("{certificate_base_url}/{certificate_id}.pdf");

    // One certificate per enrollment; a replayed completion event is a no-op.
    let result = sqlx::query(
        r#"
        INSERT INTO certificates (id, enrollment_id, certificate_url)
        VALUES ($1, $2, $3)
        ON CONFLICT (enrollment_id) DO NOTHING
        "#,
    )
    .bind(certificate_id)
    .bind(event.enrollment_id)
    .bind(&certificate_url)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        info!(
            enrollment_id = %event.enrollment_id,
            learner_id = %event.learner_id,
            course_id = %event.course_id,
            %certificate_url,
            "Certificate issued"
        );
    }

    Ok(())
}
