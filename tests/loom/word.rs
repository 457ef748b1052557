#![cfg(loom)]

use loom::sync::Arc;
use loom::sync::atomic::Ordering;
use loom::thread;
use resreg::registry::AtomicWord;
use resreg::registry::Status;
use resreg::registry::Word;

const ADDR: usize = 0x1000;
const REPLACEMENT: usize = 0x2000;

fn word(refcount: u16) -> AtomicWord {
  AtomicWord::new(Word::pack(ADDR, Status::Ready, 0, refcount).unwrap())
}

#[test]
fn concurrent_reference_and_release() {
  loom::model(|| {
    let cell: Arc<AtomicWord> = Arc::new(word(1));

    let threads: Vec<_> = (0..2)
      .map(|_| {
        let cell: Arc<AtomicWord> = Arc::clone(&cell);

        thread::spawn(move || {
          cell.reference().unwrap();
          cell.release();
        })
      })
      .collect();

    for handle in threads {
      handle.join().unwrap();
    }

    let out: Word = cell.load(Ordering::Acquire);

    assert_eq!(out.refcount(), 1, "Lost a refcount update!");
    assert_eq!(out.addr(), ADDR, "Address changed!");
  });
}

#[test]
fn repack_preserves_concurrent_references() {
  loom::model(|| {
    let cell: Arc<AtomicWord> = Arc::new(word(1));

    let t1 = {
      let cell: Arc<AtomicWord> = Arc::clone(&cell);

      thread::spawn(move || {
        cell.reference().unwrap();
      })
    };

    let t2 = {
      let cell: Arc<AtomicWord> = Arc::clone(&cell);

      thread::spawn(move || {
        cell
          .update(|word| word.repack(REPLACEMENT, Status::Ready).ok())
          .unwrap();
      })
    };

    t1.join().unwrap();
    t2.join().unwrap();

    let out: Word = cell.load(Ordering::Acquire);

    assert_eq!(out.refcount(), 2, "Repack dropped a reference!");
    assert_eq!(out.addr(), REPLACEMENT, "Reference undid the repack!");
  });
}

#[test]
fn reference_fails_after_reclaim() {
  loom::model(|| {
    let cell: Arc<AtomicWord> = Arc::new(word(0));
    let live: Word = cell.load(Ordering::Acquire);

    let t1 = {
      let cell: Arc<AtomicWord> = Arc::clone(&cell);

      thread::spawn(move || cell.compare_exchange(live, Word::ZERO, Ordering::AcqRel, Ordering::Acquire).is_ok())
    };

    let t2 = {
      let cell: Arc<AtomicWord> = Arc::clone(&cell);

      thread::spawn(move || cell.reference().is_ok())
    };

    let reclaimed: bool = t1.join().unwrap();
    let referenced: bool = t2.join().unwrap();

    assert!(reclaimed != referenced, "Reclaim and reference must not both win!");

    if referenced {
      assert_eq!(cell.load(Ordering::Acquire).refcount(), 1);
    } else {
      assert!(cell.load(Ordering::Acquire).is_zero());
    }
  });
}
