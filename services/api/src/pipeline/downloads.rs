//! services/api/src/pipeline/downloads.rs
//!
//! The entitlement ledger: decides whether a download is free or paid, issues the
//! short-lived link and writes the audit record.

use mock_exam_core::domain::{ExamGeneration, PAID_DOWNLOAD_COST_CENTS};
use mock_exam_core::ports::{DatabaseService, ObjectStore, PortError, PortResult};
use tracing::info;
use uuid::Uuid;

/// Lifetime of an issued download link.
pub const SIGNED_URL_TTL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Issued {
        signed_url: String,
        cost_cents: i32,
        free_downloads_remaining: i32,
    },
    /// No free credit left and the caller has not confirmed payment.
    PaymentRequired { free_downloads_remaining: i32 },
}

/// Loads an exam and checks that `user_id` owns it.
pub async fn load_owned_exam(
    db: &dyn DatabaseService,
    user_id: Uuid,
    exam_id: Uuid,
) -> PortResult<ExamGeneration> {
    let exam = db.get_exam_generation_by_id(exam_id).await?;
    if exam.owner_id != user_id {
        return Err(PortError::Forbidden(
            "You do not have access to this exam.".to_string(),
        ));
    }
    Ok(exam)
}

/// The stored PDF of an exam, or `BadRequest` when none was rendered yet.
pub fn pdf_path(exam: &ExamGeneration) -> PortResult<&str> {
    exam.pdf_storage_path
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| PortError::BadRequest("This exam has no PDF yet.".to_string()))
}

/// Issues one download link, consuming a free credit when one is left.
///
/// Without a credit the download costs `PAID_DOWNLOAD_COST_CENTS` and needs
/// `confirm_paid`. Every issued link is recorded exactly once.
pub async fn issue_download(
    db: &dyn DatabaseService,
    store: &dyn ObjectStore,
    user_id: Uuid,
    exam_id: Uuid,
    confirm_paid: bool,
) -> PortResult<DownloadOutcome> {
    let exam = load_owned_exam(db, user_id, exam_id).await?;
    let path = pdf_path(&exam)?;

    let balance = db.get_or_create_profile(user_id).await?.free_downloads_remaining;
    let consumed = balance > 0 && db.try_consume_free_download(user_id).await?;

    let cost_cents = if consumed {
        0
    } else if confirm_paid {
        PAID_DOWNLOAD_COST_CENTS
    } else {
        return Ok(DownloadOutcome::PaymentRequired {
            free_downloads_remaining: balance.max(0),
        });
    };

    let free_downloads_remaining = db.get_or_create_profile(user_id).await?.free_downloads_remaining;
    let signed_url = store.create_signed_url(path, SIGNED_URL_TTL_SECS).await?;
    db.record_download(exam.id, user_id, cost_cents).await?;

    info!(
        "Issued download of exam {} to {} (cost {} cents, {} free left)",
        exam.id, user_id, cost_cents, free_downloads_remaining
    );
    Ok(DownloadOutcome::Issued {
        signed_url,
        cost_cents,
        free_downloads_remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::{FakeDb, FakeObjectStore};
    use futures::future::join_all;
    use std::sync::Arc;

    const PDF: &str = "owner/exams/abc.pdf";

    async fn setup(credits: Option<i32>) -> (Arc<FakeDb>, FakeObjectStore, Uuid, Uuid) {
        let db = Arc::new(FakeDb::default());
        let store = FakeObjectStore::default();
        store.put(PDF, b"%PDF-1.7", Some("application/pdf"));
        let owner = Uuid::new_v4();
        if let Some(credits) = credits {
            db.set_credits(owner, credits);
        }
        let exam_id = db.seed_exam(owner, Some(PDF));
        (db, store, owner, exam_id)
    }

    #[tokio::test]
    async fn new_user_spends_a_free_credit() {
        let (db, store, owner, exam_id) = setup(None).await;

        let outcome = issue_download(db.as_ref(), &store, owner, exam_id, false).await.unwrap();
        match outcome {
            DownloadOutcome::Issued {
                signed_url,
                cost_cents,
                free_downloads_remaining,
            } => {
                assert!(signed_url.contains(PDF));
                assert_eq!(cost_cents, 0);
                assert_eq!(free_downloads_remaining, 2);
            }
            other => panic!("expected a link, got {:?}", other),
        }
        assert_eq!(db.download_costs(), vec![0]);
        assert_eq!(store.signed_ttls(), vec![SIGNED_URL_TTL_SECS]);
    }

    #[tokio::test]
    async fn exhausted_credits_without_confirmation_require_payment() {
        let (db, store, owner, exam_id) = setup(Some(0)).await;

        let outcome = issue_download(db.as_ref(), &store, owner, exam_id, false).await.unwrap();
        assert_eq!(
            outcome,
            DownloadOutcome::PaymentRequired {
                free_downloads_remaining: 0
            }
        );
        assert!(db.download_costs().is_empty());
        assert!(store.signed_ttls().is_empty());
    }

    #[tokio::test]
    async fn confirmed_payment_is_charged_and_leaves_credits_alone() {
        let (db, store, owner, exam_id) = setup(Some(0)).await;

        let outcome = issue_download(db.as_ref(), &store, owner, exam_id, true).await.unwrap();
        assert!(matches!(
            outcome,
            DownloadOutcome::Issued {
                cost_cents: 100,
                free_downloads_remaining: 0,
                ..
            }
        ));
        assert_eq!(db.download_costs(), vec![100]);
        assert_eq!(db.credits(owner), Some(0));
    }

    #[tokio::test]
    async fn confirmation_still_prefers_a_free_credit() {
        let (db, store, owner, exam_id) = setup(Some(2)).await;

        let outcome = issue_download(db.as_ref(), &store, owner, exam_id, true).await.unwrap();
        assert!(matches!(outcome, DownloadOutcome::Issued { cost_cents: 0, .. }));
        assert_eq!(db.credits(owner), Some(1));
    }

    #[tokio::test]
    async fn concurrent_downloads_share_one_credit() {
        let (db, store, owner, exam_id) = setup(Some(1)).await;
        let store = Arc::new(store);

        let attempts = (0..8).map(|_| {
            let db = db.clone();
            let store = store.clone();
            tokio::spawn(async move {
                issue_download(db.as_ref(), store.as_ref(), owner, exam_id, false).await
            })
        });
        let outcomes: Vec<DownloadOutcome> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let free = outcomes
            .iter()
            .filter(|o| matches!(o, DownloadOutcome::Issued { cost_cents: 0, .. }))
            .count();
        let refused = outcomes
            .iter()
            .filter(|o| matches!(o, DownloadOutcome::PaymentRequired { .. }))
            .count();
        assert_eq!(free, 1);
        assert_eq!(refused, 7);
        assert_eq!(db.credits(owner), Some(0));
        assert_eq!(db.download_costs(), vec![0]);
    }

    #[tokio::test]
    async fn ownership_and_pdf_presence_are_checked() {
        let (db, store, _owner, exam_id) = setup(None).await;
        let stranger = Uuid::new_v4();
        assert!(matches!(
            issue_download(db.as_ref(), &store, stranger, exam_id, false).await,
            Err(PortError::Forbidden(_))
        ));
        assert!(matches!(
            issue_download(db.as_ref(), &store, stranger, Uuid::new_v4(), false).await,
            Err(PortError::NotFound(_))
        ));

        let owner = Uuid::new_v4();
        let unrendered = db.seed_exam(owner, None);
        assert!(matches!(
            issue_download(db.as_ref(), &store, owner, unrendered, false).await,
            Err(PortError::BadRequest(_))
        ));
        assert!(db.download_costs().is_empty());
    }
}
