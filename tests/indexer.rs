/*
 * Open-address hash insertion: threads claim table slots with CAS and probe
 * onward after losing a race. Conflicts only arise on colliding slots, so
 * partial-order reduction keeps the search small while brute force would
 * churn through every interleaving of independent inserts.
 */

use weft::Checker;
use weft::explore::chess::ChessOptions;
use weft::program::mem::Atomic;
use weft::program::start_thread;

const THREADS: usize = 4;
const KEYS: i64 = 2;
const SIZE: i64 = 8;

fn indexer_checker() -> Checker {
    let table: Vec<Atomic<i64>> = (0..SIZE).map(|_| Atomic::leaked(0)).collect();
    let table = std::rc::Rc::new(table);
    Checker::new(
        move || {
            for slot in table.iter() {
                slot.store(0);
            }
            for tid in 0..THREADS as i64 {
                let table = table.clone();
                start_thread(move || {
                    for m in 1..=KEYS {
                        let w = m * 11 + tid;
                        let mut h = (w * 7) % SIZE;
                        while !table[h as usize].cas(0, w) {
                            h = (h + 1) % SIZE;
                        }
                    }
                });
            }
        },
        || {},
    )
}

#[test]
fn dpor_completes_the_indexer() {
    let checker = indexer_checker();
    let report = checker.run_dpor().unwrap();
    // Keys 22 (thread 0) and 14 (thread 3) collide on slot 2, so there is
    // more than one inequivalent outcome, but far fewer than the raw
    // interleaving count.
    assert!(report.leaves >= 2);
    assert_eq!(checker.violations(), 0);
}

#[test]
fn chess_without_preemptions_completes_the_indexer() {
    let checker = indexer_checker();
    let report = checker
        .run_chess(ChessOptions {
            max_preemptions: Some(0),
            ..ChessOptions::default()
        })
        .unwrap();
    assert!(report.leaves >= 1);
    assert_eq!(checker.violations(), 0);
}

#[test]
fn every_key_lands_in_some_slot() {
    let table: Vec<Atomic<i64>> = (0..SIZE).map(|_| Atomic::leaked(0)).collect();
    let table = std::rc::Rc::new(table);
    let check_table = table.clone();
    let checker = Checker::new(
        move || {
            for slot in table.iter() {
                slot.store(0);
            }
            for tid in 0..THREADS as i64 {
                let table = table.clone();
                start_thread(move || {
                    for m in 1..=KEYS {
                        let w = m * 11 + tid;
                        let mut h = (w * 7) % SIZE;
                        while !table[h as usize].cas(0, w) {
                            h = (h + 1) % SIZE;
                        }
                    }
                });
            }
        },
        move || {
            let filled = check_table.iter().filter(|slot| slot.load() != 0).count();
            if filled != THREADS * KEYS as usize {
                weft::program::found();
            }
        },
    );
    checker.run_dpor().unwrap();
    assert_eq!(checker.violations(), 0);
}
