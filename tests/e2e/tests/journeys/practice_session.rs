//! Practice Session Journey
//!
//! A learner picks a topic, works through a bounded session and the
//! answers land in cards, counters and the review log.

use std::collections::HashSet;

use cadence_core::{
    ErrorKind, NextItem, ReviewRating, SessionKind, SessionPhase, StartOutcome, Submission,
};
use cadence_e2e_tests::harness::db_manager::{AnswerPolicy, TestDatabaseManager};
use cadence_e2e_tests::TestDataFactory;
use chrono::Utc;

#[test]
fn test_full_practice_session() {
    let db = TestDatabaseManager::new_temp();
    db.seed_topic("algebra", 12);
    db.seed_topic("geometry", 4);
    let now = Utc::now();

    let session = db.start_practice("learner", &["Algebra"], 10, now);
    assert_eq!(session.item_count, 10);
    assert_eq!(session.topics, vec!["algebra"]);

    let results = db.answer_all(&session.session_id, AnswerPolicy::Alternating, 5.0, now);
    assert_eq!(results.len(), 10);

    // No repeats, all from the requested topic
    let presented: HashSet<&String> = results.iter().map(|(id, _)| id).collect();
    assert_eq!(presented.len(), 10);
    assert!(presented.iter().all(|id| id.starts_with("algebra-")));

    for (i, (_, result)) in results.iter().enumerate() {
        let position = i + 1;
        assert_eq!(result.is_correct, position % 2 == 1);
        if result.is_correct {
            assert_ne!(result.rating, ReviewRating::Again);
        } else {
            assert_eq!(result.rating, ReviewRating::Again);
        }
        assert_eq!(result.card.reps, 1);
    }

    // Completion is reported again on every later call
    for _ in 0..2 {
        assert_eq!(
            db.sessions.next(&session.session_id, now).unwrap(),
            NextItem::Completed { items_presented: 10 }
        );
    }
    let stored = db.sessions.get(&session.session_id).unwrap();
    assert_eq!(stored.phase, SessionPhase::Completed);
    assert!(stored.available_items.is_empty());

    let progress = db.storage.get_progress("learner").unwrap();
    assert_eq!(progress.total_answered, 10);
    assert_eq!(progress.total_correct, 5);
    assert_eq!(progress.best_streak, 1);

    assert_eq!(db.storage.review_records("learner", 100).unwrap().len(), 10);

    let stats = db.storage.card_stats("learner").unwrap();
    assert_eq!(stats.total_cards, 10);
    assert_eq!(stats.total_reps, 10);
}

#[test]
fn test_fast_correct_answer_is_easy_and_wrong_is_again() {
    let db = TestDatabaseManager::new_temp();
    db.storage
        .upsert_item(&TestDataFactory::item_with_difficulty("q1", "arithmetic", 1, 3))
        .unwrap();
    db.storage
        .upsert_item(&TestDataFactory::item_with_difficulty("q2", "arithmetic", 1, 3))
        .unwrap();
    let now = Utc::now();
    let session = db.start_practice("learner", &["arithmetic"], 2, now);

    let mut answers = vec![vec![0], vec![1]];
    let mut ratings = Vec::new();
    while let NextItem::Presented { item, .. } = db.sessions.next(&session.session_id, now).unwrap() {
        let answer = answers.pop().unwrap();
        let result = db
            .sessions
            .submit(
                &session.session_id,
                &Submission {
                    item_id: item.id,
                    answer,
                    response_time_secs: 5.0,
                },
                now,
            )
            .unwrap();
        ratings.push((result.is_correct, result.rating));
    }

    assert_eq!(
        ratings,
        vec![(true, ReviewRating::Easy), (false, ReviewRating::Again)]
    );
    // The wrong answer broke the streak
    let progress = db.storage.get_progress("learner").unwrap();
    assert_eq!(progress.current_streak, 0);
    assert_eq!(progress.best_streak, 1);
}

#[test]
fn test_multi_answer_items_grade_as_sets() {
    let db = TestDatabaseManager::new_temp();
    db.storage
        .upsert_item(&TestDataFactory::multi_answer_item("m1", "chemistry"))
        .unwrap();
    let now = Utc::now();
    let session = db.start_practice("learner", &["chemistry"], 1, now);

    let NextItem::Presented { item, .. } = db.sessions.next(&session.session_id, now).unwrap() else {
        panic!("expected an item");
    };
    assert_eq!(item.answer_count, 2);

    let submit = |answer: Vec<i64>| {
        db.sessions.submit(
            &session.session_id,
            &Submission {
                item_id: "m1".into(),
                answer,
                response_time_secs: 12.0,
            },
            now,
        )
    };

    assert!(submit(vec![2, 0]).unwrap().is_correct);
    assert!(!submit(vec![0]).unwrap().is_correct);
    assert!(!submit(vec![0, 1, 2]).unwrap().is_correct);
    assert_eq!(submit(vec![4]).unwrap_err().kind(), ErrorKind::InvalidInput);
    assert_eq!(submit(vec![-1]).unwrap_err().kind(), ErrorKind::InvalidInput);

    // Rejected submissions leave no trace
    let card = db.storage.get_card("learner", "m1").unwrap().unwrap();
    assert_eq!(card.reps, 3);
    assert_eq!(db.storage.get_progress("learner").unwrap().total_answered, 3);
}

#[test]
fn test_unknown_topic_reports_available_topics() {
    let db = TestDatabaseManager::new_temp();
    db.seed_topic("algebra", 2);
    db.seed_topic("geometry", 2);

    match db.try_start("learner", &["history"], SessionKind::Practice, 5, Utc::now()) {
        StartOutcome::NoItemsAvailable {
            requested_topics,
            available_topics,
        } => {
            assert_eq!(requested_topics, vec!["history"]);
            assert_eq!(available_topics, vec!["algebra", "geometry"]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_session_survives_reopen() {
    let mut db = TestDatabaseManager::new_temp();
    db.seed_topic("algebra", 3);
    let now = Utc::now();
    let session = db.start_practice("learner", &["algebra"], 3, now);

    let NextItem::Presented { item: first, .. } = db.sessions.next(&session.session_id, now).unwrap()
    else {
        panic!("expected an item");
    };

    db.reopen();

    match db.sessions.next(&session.session_id, now).unwrap() {
        NextItem::Presented {
            item,
            position,
            remaining,
            ..
        } => {
            assert_ne!(item.id, first.id);
            assert_eq!(position, 2);
            assert_eq!(remaining, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_missing_session_is_not_found() {
    let db = TestDatabaseManager::new_temp();
    let err = db.sessions.next("no-such-session", Utc::now()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
