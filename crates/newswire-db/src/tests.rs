use newswire_core::{
    Article, AutomationConfig, ComposeTier, ComposedPost, Importance, PendingStatus,
    PublishReceipt, SECS_PER_DAY, Timestamp,
};
use newswire_util_error::BoxedErrorResult;
use snafu::ResultExt as _;
use tempfile::{TempDir, tempdir};

use crate::{Database, DbError, LEDGER_RETENTION_DAYS, RecordOutcome};

const NOW: u64 = 1_700_000_000;

async fn temp_db() -> BoxedErrorResult<(TempDir, Database)> {
    let dir = tempdir()?;
    let db = Database::open(dir.path().join("newswire.redb"))
        .await
        .boxed()?;

    Ok((dir, db))
}

fn article(title: &str, url: &str) -> Article {
    Article::new(title, url, "Some body text", "test", Timestamp::from(NOW)).expect("valid")
}

fn receipt(id: &str) -> PublishReceipt {
    PublishReceipt {
        id: id.into(),
        url: format!("https://x.com/i/web/status/{id}"),
    }
}

fn post_for(article: &Article) -> ComposedPost {
    ComposedPost {
        body_text: article.title().into(),
        emojis: vec![],
        hashtags: vec!["#Tech".into()],
        url: article.url().into(),
        final_text: format!("{} #Tech\n\n🔗 {}", article.title(), article.url()),
        tier: ComposeTier::BareTitle,
    }
}

fn score(v: u8) -> Importance {
    Importance::new(v).expect("in range")
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn duplicate_by_url_or_hash() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let a = article("Startup raises $10M", "https://www.example.com/story/?utm_source=x");

    assert!(!db.is_duplicate(&a).await?);
    db.record_published(&a, &receipt("1"), Timestamp::from(NOW))
        .await?;
    assert!(db.is_duplicate(&a).await?);

    // Same page behind different URL decoration.
    let same_url = article("Completely different title", "https://example.com/story");
    assert!(db.is_duplicate(&same_url).await?);

    // Same title behind a different URL.
    let same_title = article("Startup raises $10M", "https://other.example.org/x");
    assert!(db.is_duplicate(&same_title).await?);

    let fresh = article("Something else", "https://example.com/other");
    assert!(!db.is_duplicate(&fresh).await?);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn record_is_idempotent_per_hash() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let a = article("One story", "https://example.com/one");

    let first = db
        .record_published(&a, &receipt("1"), Timestamp::from(NOW))
        .await?;
    assert!(matches!(first, RecordOutcome::Appended(_)));

    let second = db
        .record_published(&a, &receipt("2"), Timestamp::from(NOW + 10))
        .await?;
    assert!(matches!(second, RecordOutcome::AlreadyRecorded(_)));
    assert_eq!(second.entry().external_post_id, "1");
    assert_eq!(db.ledger_count().await?, 1);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn compaction_drops_old_entries_and_keeps_recent() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let now = Timestamp::from(NOW);

    let old = article("Old story", "https://example.com/old");
    let recent = article("Recent story", "https://example.com/recent");
    db.record_published(&old, &receipt("1"), now - 40 * SECS_PER_DAY)
        .await?;
    db.record_published(&recent, &receipt("2"), now - SECS_PER_DAY)
        .await?;

    let report = db.compact_ledger(LEDGER_RETENTION_DAYS, now).await?;
    assert_eq!(report.kept, 1);
    assert_eq!(report.removed, 1);

    assert!(!db.is_duplicate(&old).await?, "index rebuilt without old entry");
    assert!(db.is_duplicate(&recent).await?);

    let again = db.compact_ledger(LEDGER_RETENTION_DAYS, now).await?;
    assert_eq!(again.removed, 0);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn list_and_recent_count() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let now = Timestamp::from(NOW);

    for (i, age_days) in [10, 3, 0].into_iter().enumerate() {
        let a = article(&format!("Story {i}"), &format!("https://example.com/{i}"));
        db.record_published(&a, &receipt(&i.to_string()), now - age_days * SECS_PER_DAY)
            .await?;
    }

    let listed = db.list_ledger(2).await?;
    assert_eq!(
        listed.iter().map(|e| e.title.as_str()).collect::<Vec<_>>(),
        ["Story 2", "Story 1"]
    );
    assert_eq!(db.recent_ledger_count(7, now).await?, 2);
    assert_eq!(db.ledger_count().await?, 3);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn pending_lifecycle() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let now = Timestamp::from(NOW);

    let a = article("Queued one", "https://example.com/a");
    let b = article("Queued two", "https://example.com/b");
    let id_a = db
        .enqueue_pending(a.clone(), post_for(&a), score(7), now)
        .await?;
    let id_b = db
        .enqueue_pending(b.clone(), post_for(&b), score(6), now)
        .await?;
    assert!(id_a < id_b);
    assert!(db.is_queued(&a).await?);

    // Same article again maps onto the existing entry.
    let again = db
        .enqueue_pending(a.clone(), post_for(&a), score(9), now)
        .await?;
    assert_eq!(again, id_a);

    let pending: Vec<_> = db.list_pending().await?.into_iter().map(|(id, _)| id).collect();
    assert_eq!(pending, [id_a, id_b]);

    let rejected = db.reject_pending(id_b, now + 5).await?;
    assert_eq!(rejected.status, PendingStatus::Rejected);
    assert!(!db.is_queued(&b).await?);
    assert!(db.is_rejected(&b).await?);
    assert!(!db.is_rejected(&a).await?);

    let err = db
        .reject_pending(id_b, now + 6)
        .await
        .expect_err("already rejected");
    assert!(matches!(
        err,
        DbError::InvalidTransition {
            status: PendingStatus::Rejected,
            ..
        }
    ));

    let outcome = db
        .record_publication(&a, &receipt("99"), Some(id_a), now + 10)
        .await?;
    assert!(matches!(outcome, RecordOutcome::Appended(_)));

    let posted = db.get_pending(id_a).await?.expect("still stored");
    assert_eq!(posted.status, PendingStatus::Posted);
    assert_eq!(posted.receipt, Some(receipt("99")));
    assert!(db.is_duplicate(&a).await?);
    assert!(!db.is_queued(&a).await?);
    assert!(db.list_pending().await?.is_empty());

    assert!(matches!(
        db.get_pending_for_decision(id_a).await,
        Err(DbError::InvalidTransition { .. })
    ));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn unknown_pending_id_is_not_found() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;

    let err = db
        .reject_pending(42.into(), Timestamp::from(NOW))
        .await
        .expect_err("no such entry");
    assert!(matches!(err, DbError::PendingNotFound { .. }));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn clear_pending_keeps_posted_and_never_reuses_ids() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let now = Timestamp::from(NOW);

    let a = article("Will post", "https://example.com/a");
    let b = article("Will wait", "https://example.com/b");
    let id_a = db
        .enqueue_pending(a.clone(), post_for(&a), score(8), now)
        .await?;
    let id_b = db
        .enqueue_pending(b.clone(), post_for(&b), score(8), now)
        .await?;
    db.record_publication(&a, &receipt("1"), Some(id_a), now)
        .await?;

    assert_eq!(db.clear_pending().await?, 1);
    let all = db.list_all_pending().await?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].0, id_a);
    assert!(!db.is_queued(&b).await?);

    let id_c = db
        .enqueue_pending(b.clone(), post_for(&b), score(8), now)
        .await?;
    assert!(id_b < id_c);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn rejection_is_remembered_until_cleared() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let now = Timestamp::from(NOW);

    let a = article("Not interesting", "https://example.com/a");
    let id = db
        .enqueue_pending(a.clone(), post_for(&a), score(6), now)
        .await?;
    db.reject_pending(id, now).await?;
    assert!(db.is_rejected(&a).await?);

    db.clear_pending().await?;
    assert!(!db.is_rejected(&a).await?);

    let id = db
        .enqueue_pending(a.clone(), post_for(&a), score(6), now)
        .await?;
    db.reject_pending(id, now).await?;
    db.reset().await?;
    assert!(!db.is_rejected(&a).await?);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn config_round_trips_and_rejects_invalid() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;

    assert_eq!(db.load_config().await?, AutomationConfig::default());

    let config = AutomationConfig {
        min_score: 7,
        auto_mode: true,
        ..AutomationConfig::default()
    };
    let saved = db.save_config(config, Timestamp::from(NOW)).await?;
    assert_eq!(saved.last_updated, Some(Timestamp::from(NOW)));
    assert_eq!(db.load_config().await?, saved);

    let invalid = AutomationConfig {
        min_score: 0,
        max_articles_per_run: 100,
        ..saved.clone()
    };
    let err = db
        .save_config(invalid, Timestamp::from(NOW + 1))
        .await
        .expect_err("invalid");
    let DbError::InvalidConfig { errors } = err else {
        panic!("expected InvalidConfig");
    };
    assert_eq!(errors.len(), 2);
    assert_eq!(db.load_config().await?, saved, "left untouched");
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn stats_and_reset() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let now = Timestamp::from(NOW);

    let a = article("Posted", "https://example.com/a");
    let b = article("Waiting", "https://example.com/b");
    let old = article("Old", "https://example.com/old");
    db.record_published(&old, &receipt("0"), now - 10 * SECS_PER_DAY)
        .await?;
    let id_a = db
        .enqueue_pending(a.clone(), post_for(&a), score(8), now)
        .await?;
    db.enqueue_pending(b.clone(), post_for(&b), score(8), now)
        .await?;
    db.record_publication(&a, &receipt("1"), Some(id_a), now)
        .await?;
    db.save_config(
        AutomationConfig {
            min_score: 9,
            ..AutomationConfig::default()
        },
        now,
    )
    .await?;

    let stats = db.stats(now).await?;
    assert_eq!(stats.ledger_entries, 2);
    assert_eq!(stats.posted_last_7_days, 1);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.posted, 1);
    assert_eq!(stats.rejected, 0);

    db.reset().await?;
    let stats = db.stats(now).await?;
    assert_eq!(stats, crate::DataStats::default());
    assert!(!db.is_duplicate(&a).await?);
    assert!(!db.is_queued(&b).await?);
    assert_eq!(db.load_config().await?.min_score, 9, "settings survive reset");
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn reopen_keeps_data() -> BoxedErrorResult<()> {
    let dir = tempdir()?;
    let path = dir.path().join("newswire.redb");
    let a = article("Persistent", "https://example.com/p");

    {
        let db = Database::open(&path).await.boxed()?;
        db.record_published(&a, &receipt("1"), Timestamp::from(NOW))
            .await?;
    }

    let db = Database::open(&path).await.boxed()?;
    assert!(db.is_duplicate(&a).await?);
    Ok(())
}
