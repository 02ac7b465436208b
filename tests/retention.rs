//! Retention passes driven end to end through `force_immediately`

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tanglegc::gc::{
    ActionError, GarbageCollector, GcSettings, PassFailed, Purpose, PurposeClassifier,
};
use tanglegc::goals::{Goal, GoalBook};
use tanglegc::log::{
    LogError, LogStore, MemoryLog, Msg, MsgId, Record, TangleId, create_tangle, publish,
};

use common::{FaultyLog, is_deleted, is_erased, is_present, texts};

fn collector<L: LogStore + 'static>(log: &Arc<L>, goals: &[(TangleId, Goal)]) -> GarbageCollector {
    let book = GoalBook::new(log.clone());
    for (tangle, goal) in goals {
        book.set(tangle.clone(), *goal);
    }
    GarbageCollector::new(log.clone(), Arc::new(book), GcSettings::default())
}

async fn post_feed(log: &dyn LogStore, count: usize) -> (TangleId, Vec<MsgId>) {
    let feed = create_tangle(log, "post").await.unwrap();
    let mut posts = Vec::new();
    for i in 0..count {
        let rec = publish(log, &feed, json!({ "text": format!("A{}", i) }))
            .await
            .unwrap();
        posts.push(rec.id);
    }
    (feed, posts)
}

async fn profile(log: &dyn LogStore) -> (TangleId, Vec<MsgId>) {
    let tangle = create_tangle(log, "profile").await.unwrap();
    let mut updates = Vec::new();
    for update in [
        json!({ "name": "alice" }),
        json!({ "age": 24 }),
        json!({ "name": "Alice" }),
        json!({ "age": 25 }),
        json!({ "name": "ALICE" }),
    ] {
        let rec = publish(log, &tangle, json!({ "update": update }))
            .await
            .unwrap();
        updates.push(rec.id);
    }
    (tangle, updates)
}

#[tokio::test]
async fn test_newest_goal_deletes_older_posts() {
    let log = Arc::new(MemoryLog::new());
    let account = create_tangle(log.as_ref(), "account").await.unwrap();
    let (feed, posts) = post_feed(log.as_ref(), 5).await;
    let gc = collector(&log, &[(account.clone(), Goal::All), (feed.clone(), Goal::Newest(3))]);

    assert_eq!(texts(log.as_ref()).await, ["A0", "A1", "A2", "A3", "A4"]);

    let report = gc.force_immediately().await.unwrap();
    let pass = report.pass_report().unwrap();
    assert_eq!(pass.deleted, 2);
    assert!(pass.failures.is_empty());
    assert!(report.compacted());

    assert_eq!(texts(log.as_ref()).await, ["A2", "A3", "A4"]);
    assert!(is_deleted(&log.get(&posts[0]).await.unwrap()));
    assert!(is_deleted(&log.get(&posts[1]).await.unwrap()));
    assert!(log.get(&account).await.unwrap().is_some());
    assert!(log.get(&feed).await.unwrap().is_some());
}

#[tokio::test]
async fn test_record_goal_ghosts_and_trails() {
    let log = Arc::new(MemoryLog::new());
    let (tangle, updates) = profile(log.as_ref()).await;
    let gc = collector(&log, &[(tangle.clone(), Goal::Record { ghost_span: 2 })]);

    let report = gc.force_immediately().await.unwrap();
    let pass = report.pass_report().unwrap();
    assert_eq!((pass.deleted, pass.ghosted, pass.erased), (1, 1, 1));
    assert_eq!(pass.kept, 3);

    assert!(is_deleted(&log.get(&updates[0]).await.unwrap()));
    assert!(is_deleted(&log.get(&updates[1]).await.unwrap()));
    assert!(is_erased(&log.get(&updates[2]).await.unwrap()));
    assert!(is_present(&log.get(&updates[3]).await.unwrap()));
    assert!(is_present(&log.get(&updates[4]).await.unwrap()));

    assert_eq!(log.ghosts(&tangle).await.unwrap(), vec![updates[1].clone()]);
}

#[tokio::test]
async fn test_trail_already_erased_is_left_alone() {
    let log = Arc::new(MemoryLog::new());
    let (feed, posts) = post_feed(log.as_ref(), 10).await;
    for id in &posts[3..6] {
        log.delete(id).await.unwrap();
    }
    log.erase(&posts[6]).await.unwrap();
    let gc = collector(&log, &[(feed.clone(), Goal::Newest(4))]);

    let report = gc.force_immediately().await.unwrap();
    let pass = report.pass_report().unwrap();
    assert_eq!(pass.deleted, 3);
    assert_eq!(pass.erased, 0);
    assert_eq!(pass.already_erased, 1);

    assert_eq!(texts(log.as_ref()).await, ["A7", "A8", "A9"]);
    for id in &posts[0..3] {
        assert!(is_deleted(&log.get(id).await.unwrap()));
    }
    assert!(is_erased(&log.get(&posts[6]).await.unwrap()));
}

#[tokio::test]
async fn test_tangles_without_goal_are_removed() {
    let log = Arc::new(MemoryLog::new());
    let account = create_tangle(log.as_ref(), "account").await.unwrap();
    let (feed, posts) = post_feed(log.as_ref(), 3).await;
    let gc = collector(&log, &[(account.clone(), Goal::All)]);

    gc.force_immediately().await.unwrap();

    assert!(log.get(&feed).await.unwrap().is_none());
    for id in &posts {
        assert!(is_deleted(&log.get(id).await.unwrap()));
    }
    assert!(log.get(&account).await.unwrap().is_some());
    assert!(texts(log.as_ref()).await.is_empty());
}

#[tokio::test]
async fn test_goal_records_are_untouched() {
    let log = Arc::new(MemoryLog::new());
    let (feed, _) = post_feed(log.as_ref(), 4).await;
    let gc = collector(&log, &[(feed.clone(), Goal::All)]);
    let before = log.records().await.unwrap();

    let report = gc.force_immediately().await.unwrap();

    assert!(report.pass_report().unwrap().is_noop());
    assert_eq!(log.records().await.unwrap(), before);
}

#[tokio::test]
async fn test_second_pass_changes_nothing() {
    let log = Arc::new(MemoryLog::new());
    let (tangle, _) = profile(log.as_ref()).await;
    let (feed, _) = post_feed(log.as_ref(), 6).await;
    let gc = collector(
        &log,
        &[(tangle.clone(), Goal::Record { ghost_span: 2 }), (feed, Goal::Newest(2))],
    );

    let first = gc.force_immediately().await.unwrap();
    assert!(!first.pass_report().unwrap().is_noop());
    let after_first = log.records().await.unwrap();
    let ghosts = log.ghosts(&tangle).await.unwrap();

    let second = gc.force_immediately().await.unwrap();
    let pass = second.pass_report().unwrap();
    assert!(pass.is_noop());
    assert_eq!(pass.already_erased, 1);
    assert_eq!(log.records().await.unwrap(), after_first);
    assert_eq!(log.ghosts(&tangle).await.unwrap(), ghosts);
}

#[tokio::test]
async fn test_failed_ghost_keeps_record() {
    let log = Arc::new(FaultyLog::new());
    log.fail_ghosts.store(true, Ordering::SeqCst);
    let (tangle, updates) = profile(log.as_ref()).await;
    let gc = collector(&log, &[(tangle.clone(), Goal::Record { ghost_span: 2 })]);

    let report = gc.force_immediately().await.unwrap();
    let pass = report.pass_report().unwrap();

    assert_eq!(pass.failures.len(), 1);
    assert_eq!(pass.failures[0].id, updates[1]);
    assert!(matches!(pass.failures[0].error, ActionError::AddGhost { .. }));
    assert_eq!(
        pass.outcome(),
        Err(PassFailed {
            failed: 1,
            attempted: 3
        })
    );

    // The ghost candidate survives, everything else still got processed
    assert!(is_present(&log.get(&updates[1]).await.unwrap()));
    assert!(is_deleted(&log.get(&updates[0]).await.unwrap()));
    assert!(is_erased(&log.get(&updates[2]).await.unwrap()));
    assert!(log.ghosts(&tangle).await.unwrap().is_empty());
    assert!(report.compacted());

    let metrics = gc.metrics();
    assert_eq!(metrics.action_failures, 1);
    assert_eq!(metrics.compactions, 1);
}

#[tokio::test]
async fn test_failed_compaction_is_reported() {
    let log = Arc::new(FaultyLog::new());
    log.fail_compaction.store(true, Ordering::SeqCst);
    let (feed, _) = post_feed(log.as_ref(), 4).await;
    let gc = collector(&log, &[(feed, Goal::Newest(1))]);

    let report = gc.force_immediately().await.unwrap();

    assert_eq!(report.pass_report().unwrap().deleted, 3);
    assert!(matches!(report.compaction, Some(Err(_))));
    assert_eq!(gc.metrics().compaction_failures, 1);
    assert_eq!(texts(log.as_ref()).await, ["A3"]);
}

/// Goal book that publishes into `target` once the pass has taken its snapshot
struct PublishesDuringPass {
    book: GoalBook,
    log: Arc<MemoryLog>,
    target: TangleId,
    published: Mutex<Option<MsgId>>,
}

#[async_trait]
impl PurposeClassifier for PublishesDuringPass {
    async fn classify(&self, id: &MsgId, msg: &Msg) -> Result<Purpose, LogError> {
        self.book.classify(id, msg).await
    }

    async fn classify_snapshot(&self, records: &[Record]) -> Vec<Result<Purpose, LogError>> {
        let rec = publish(self.log.as_ref(), &self.target, json!({ "text": "late" }))
            .await
            .unwrap();
        *self.published.lock().unwrap() = Some(rec.id);
        self.book.classify_snapshot(records).await
    }
}

#[tokio::test]
async fn test_records_appended_during_pass_are_left_for_next_pass() {
    let log = Arc::new(MemoryLog::new());
    let account = create_tangle(log.as_ref(), "account").await.unwrap();
    let (feed, posts) = post_feed(log.as_ref(), 3).await;
    let book = GoalBook::new(log.clone());
    book.set(account.clone(), Goal::All);
    let classifier = Arc::new(PublishesDuringPass {
        book,
        log: log.clone(),
        target: feed.clone(),
        published: Mutex::new(None),
    });
    let gc = GarbageCollector::new(log.clone(), classifier.clone(), GcSettings::default());
    let snapshot_len = log.records().await.unwrap().len();

    let report = gc.force_immediately().await.unwrap();
    let pass = report.pass_report().unwrap();

    assert_eq!(pass.scanned, snapshot_len);
    assert_eq!(pass.deleted, posts.len() + 1);
    let late = classifier.published.lock().unwrap().clone().unwrap();
    assert!(is_present(&log.get(&late).await.unwrap()));
    assert_eq!(texts(log.as_ref()).await, ["late"]);

    // The next pass picks it up
    let second = gc.force_immediately().await.unwrap();
    assert_eq!(second.pass_report().unwrap().deleted, 1);
    assert!(log.get(&late).await.unwrap().is_none());
}
