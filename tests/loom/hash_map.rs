#![cfg(loom)]

use loom::sync::Arc;
use loom::sync::atomic::Ordering;
use loom::thread;
use resreg::table::HashMap;
use resreg::table::Key;

fn key(bits: u64) -> Key {
  Key::new(bits).unwrap()
}

#[test]
fn concurrent_add_single_winner() {
  loom::model(|| {
    let map: Arc<HashMap> = Arc::new(HashMap::with_capacity(4));

    let threads: Vec<_> = (1..=2)
      .map(|value| {
        let map: Arc<HashMap> = Arc::clone(&map);

        thread::spawn(move || map.add(key(7), value).unwrap())
      })
      .collect();

    let wins: usize = threads
      .into_iter()
      .map(|handle| handle.join().unwrap())
      .filter(|won| *won)
      .count();

    assert_eq!(wins, 1, "Exactly one add must win!");
    assert_ne!(map.get(key(7)), HashMap::NUL, "Winner's value lost!");
    assert_eq!(map.len(), 1);
  });
}

#[test]
fn concurrent_distinct_keys() {
  loom::model(|| {
    let map: Arc<HashMap> = Arc::new(HashMap::with_capacity(4));

    let threads: Vec<_> = (1..=2)
      .map(|bits| {
        let map: Arc<HashMap> = Arc::clone(&map);

        thread::spawn(move || map.add(key(bits), bits * 10).unwrap())
      })
      .collect();

    for handle in threads {
      assert!(handle.join().unwrap(), "Distinct keys must not collide!");
    }

    assert_eq!(map.get(key(1)), 10);
    assert_eq!(map.get(key(2)), 20);
  });
}

#[test]
fn entry_is_shared() {
  loom::model(|| {
    let map: Arc<HashMap> = Arc::new(HashMap::with_capacity(4));

    let t1 = {
      let map: Arc<HashMap> = Arc::clone(&map);

      thread::spawn(move || {
        let cell = map.entry(key(3)).unwrap();
        let _ = cell.compare_exchange(HashMap::NUL, 1, Ordering::AcqRel, Ordering::Acquire);
      })
    };

    let t2 = {
      let map: Arc<HashMap> = Arc::clone(&map);

      thread::spawn(move || {
        let cell = map.entry(key(3)).unwrap();
        let _ = cell.compare_exchange(HashMap::NUL, 2, Ordering::AcqRel, Ordering::Acquire);
      })
    };

    t1.join().unwrap();
    t2.join().unwrap();

    let value: u64 = map.get(key(3));

    assert!(value == 1 || value == 2, "Both writers lost!");
  });
}
