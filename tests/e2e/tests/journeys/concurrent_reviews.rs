//! Concurrent Reviews Journey
//!
//! Several request threads touching the same learner at once must never
//! duplicate cards or lose reviews.

use std::sync::Arc;
use std::thread;

use cadence_core::{ErrorKind, NextItem, ReviewInput, Submission};
use cadence_e2e_tests::harness::db_manager::TestDatabaseManager;
use chrono::Utc;

#[test]
fn test_parallel_reviews_of_one_card_are_all_counted_or_rejected() {
    let db = TestDatabaseManager::new_temp();
    let ids = db.seed_topic("algebra", 1);
    let engine = Arc::clone(&db.engine);
    let now = Utc::now();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let item_id = ids[0].clone();
            thread::spawn(move || engine.review("learner", &item_id, ReviewInput::Explicit(3), now))
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => applied += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
        }
    }
    assert!(applied >= 1);

    let card = db.storage.get_card("learner", &ids[0]).unwrap().unwrap();
    assert_eq!(card.reps, applied);
    assert_eq!(db.storage.card_stats("learner").unwrap().total_cards, 1);
}

#[test]
fn test_parallel_sessions_for_different_learners() {
    let db = Arc::new(TestDatabaseManager::new_temp());
    db.seed_topic("geometry", 5);
    let now = Utc::now();

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let user = format!("learner-{}", n);
                let session = db.start_practice(&user, &["geometry"], 5, now);
                while let NextItem::Presented { item, .. } =
                    db.sessions.next(&session.session_id, now).unwrap()
                {
                    db.sessions
                        .submit(
                            &session.session_id,
                            &Submission {
                                item_id: item.id,
                                answer: vec![0],
                                response_time_secs: 10.0,
                            },
                            now,
                        )
                        .unwrap();
                }
                user
            })
        })
        .collect();

    for handle in handles {
        let user = handle.join().unwrap();
        let stats = db.storage.card_stats(&user).unwrap();
        assert_eq!(stats.total_cards, 5);
        assert_eq!(stats.total_reps, 5);
        assert_eq!(db.storage.get_progress(&user).unwrap().total_answered, 5);
    }
}
