use std::sync::Arc;

use chrono::{Duration, Utc};

use promise_ledger::LedgerError;
use promise_ledger::commands::Commands;
use promise_ledger::models::{Difficulty, Outcome, PromiseFilter, PromiseStatus};
use promise_ledger::services::reputation::level_for;
use promise_ledger::services::{AuditLog, MemoryStore};

fn ledger() -> Commands {
    Commands::with_store(Arc::new(MemoryStore::new()), AuditLog::disabled())
}

fn week() -> chrono::DateTime<Utc> {
    Utc::now() + Duration::days(7)
}

#[test]
fn create_then_complete_builds_reputation() {
    let l = ledger();

    let p = l
        .create_promise("0xabc", "run 5k", week(), "fitness", Difficulty::Easy)
        .expect("create");
    assert_eq!(p.status, PromiseStatus::Active);
    assert_eq!(l.get_user("0xabc").expect("user").total_promises, 1);

    l.update_promise_status(&p.id, Outcome::Completed, None)
        .expect("complete");
    let u = l.get_user("0xabc").expect("user");
    assert_eq!(u.reputation, 10);
    assert_eq!(u.completed_promises, 1);
    assert_eq!(u.streak, 1);
    assert_eq!(u.level, 1);

    // second promise fails: 10 - 5
    let p2 = l
        .create_promise("0xabc", "read a book", week(), "learning", Difficulty::Medium)
        .expect("create 2");
    l.update_promise_status(&p2.id, Outcome::Failed, Some("  ".into()))
        .expect("fail");
    let u = l.get_user("0xabc").expect("user");
    assert_eq!(u.reputation, 5);
    assert_eq!(u.failed_promises, 1);
    assert_eq!(u.streak, 0);
    assert_eq!(u.level, 1);
    assert_eq!(u.total_promises, 2);

    let failed = l.get_promise(&p2.id).expect("get");
    assert_eq!(failed.status, PromiseStatus::Failed);
    assert_eq!(failed.proof, None, "blank proof is dropped");
}

#[test]
fn address_is_normalized() {
    let l = ledger();
    l.create_promise("  0xABC ", "stretch", week(), "", Difficulty::Hard)
        .expect("create");
    let u = l.get_user("0xabc").expect("lowercase lookup");
    assert_eq!(u.address, "0xabc");
    let ps = l
        .list_promises(&PromiseFilter {
            address: Some("0XAbc".into()),
            status: None,
        })
        .expect("list");
    assert_eq!(ps.len(), 1);
    assert_eq!(ps[0].category, "general");
}

#[test]
fn blank_inputs_are_rejected_without_writes() {
    let store = Arc::new(MemoryStore::new());
    let l = Commands::with_store(store.clone(), AuditLog::disabled());

    let err = l
        .create_promise("   ", "x", week(), "c", Difficulty::Easy)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    let err = l
        .create_promise("0xabc", "", week(), "c", Difficulty::Easy)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(store.write_count(), 0);
}

#[test]
fn past_deadlines_are_accepted() {
    let l = ledger();
    let p = l
        .create_promise("0xabc", "yesterday", Utc::now() - Duration::days(1), "c", Difficulty::Easy)
        .expect("past deadline is fine");
    assert!(p.deadline < Utc::now());
}

#[test]
fn unknown_promise_is_not_found() {
    let l = ledger();
    let err = l
        .update_promise_status("nope", Outcome::Completed, None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { kind: "promise", .. }));
}

#[test]
fn terminal_promises_reject_repeat_transitions() {
    let l = ledger();
    let p = l
        .create_promise("0xabc", "swim", week(), "fitness", Difficulty::Easy)
        .expect("create");
    l.update_promise_status(&p.id, Outcome::Completed, Some("pic.jpg".into()))
        .expect("complete");

    for outcome in [Outcome::Completed, Outcome::Failed] {
        let err = l.update_promise_status(&p.id, outcome, None).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }

    let u = l.get_user("0xabc").expect("user");
    assert_eq!(u.reputation, 10, "reputation applied exactly once");
    assert_eq!(u.completed_promises, 1);
    assert_eq!(l.get_promise(&p.id).expect("get").proof.as_deref(), Some("pic.jpg"));
}

#[test]
fn admin_progress_is_range_checked_and_isolated() {
    let l = ledger();
    let p = l
        .create_promise("0xabc", "meditate", week(), "health", Difficulty::Easy)
        .expect("create");

    for bad in [-1, 101, 1000] {
        let err = l.admin_set_progress(&p.id, bad).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)), "progress {bad}");
    }

    let updated = l.admin_set_progress(&p.id, 60).expect("set");
    assert_eq!(updated.admin_adjusted_progress, Some(60));
    assert_eq!(updated.status, PromiseStatus::Active);
    assert_eq!(l.get_user("0xabc").expect("user").reputation, 0);

    let edge = l.admin_set_progress(&p.id, 100).expect("100 allowed");
    assert_eq!(edge.admin_adjusted_progress, Some(100));

    let err = l.admin_set_progress("missing", 10).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[test]
fn stats_follow_status_changes() {
    let l = ledger();
    l.touch_session("s1", "10.0.0.1").expect("session");
    let a = l
        .create_promise("0xa", "one", week(), "c", Difficulty::Easy)
        .expect("a");
    l.create_promise("0xb", "two", week(), "c", Difficulty::Easy)
        .expect("b");

    let s = l.stats().expect("stats");
    assert_eq!(s.total_promises, 2);
    assert_eq!(s.completion_rate, 0.0);

    l.update_promise_status(&a.id, Outcome::Completed, None)
        .expect("complete");
    let s = l.stats().expect("stats");
    assert_eq!(s.completion_rate, 50.0);
    assert_eq!(s.total_users, 1);
    assert_eq!(s.average_reputation, 10.0);
    assert_eq!(s.top_performer.as_deref(), Some("0xa"));
    assert!((0.0..=100.0).contains(&s.completion_rate));
}

#[test]
fn level_matches_reputation_after_long_run() {
    let l = ledger();
    let outcomes = [Outcome::Completed, Outcome::Completed, Outcome::Failed];
    for (i, outcome) in outcomes.iter().cycle().take(30).enumerate() {
        let p = l
            .create_promise("0xrun", &format!("step {i}"), week(), "c", Difficulty::Easy)
            .expect("create");
        l.update_promise_status(&p.id, *outcome, None).expect("resolve");
        let u = l.get_user("0xrun").expect("user");
        assert_eq!(u.level, level_for(u.reputation));
    }
    let u = l.get_user("0xrun").expect("user");
    assert_eq!(u.reputation, 150);
    assert_eq!(u.level, 4);
}

#[test]
fn listings_are_newest_first_and_filterable() {
    let l = ledger();
    let first = l
        .create_promise("0xa", "first", week(), "c", Difficulty::Easy)
        .expect("first");
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = l
        .create_promise("0xa", "second", week(), "c", Difficulty::Easy)
        .expect("second");
    l.update_promise_status(&first.id, Outcome::Failed, None)
        .expect("fail");

    let all = l.get_promises().expect("all");
    assert_eq!(all[0].id, second.id);
    assert_eq!(all[1].id, first.id);

    let active = l
        .list_promises(&PromiseFilter {
            address: None,
            status: Some(PromiseStatus::Active),
        })
        .expect("active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second.id);
}

#[test]
fn leaderboard_orders_by_reputation() {
    let l = ledger();
    for (addr, wins) in [("0xlow", 1), ("0xhigh", 3), ("0xmid", 2)] {
        for i in 0..wins {
            let p = l
                .create_promise(addr, &format!("p{i}"), week(), "c", Difficulty::Easy)
                .expect("create");
            l.update_promise_status(&p.id, Outcome::Completed, None)
                .expect("complete");
        }
    }
    let board = l.leaderboard(2).expect("board");
    let names: Vec<&str> = board.iter().map(|u| u.address.as_str()).collect();
    assert_eq!(names, ["0xhigh", "0xmid"]);
}
