#![cfg(loom)]

use loom::sync::Arc;
use loom::thread;
use resreg::Handle;
use resreg::Key;
use resreg::Maintenance;
use resreg::Registry;
use resreg::RegistryConfig;
use resreg::registry::Factory;
use resreg::registry::Status;

struct Numbers;

impl Factory for Numbers {
  type Resource = u64;
  type Payload = u64;

  fn create(&self, _identifier: &str, payload: u64) -> Option<u64> {
    Some(payload)
  }
}

const KEY: Key = Key::from_static("a");

fn registry() -> Arc<Registry<Numbers>> {
  let mut config: RegistryConfig = RegistryConfig::with_capacity(2);
  config.indexed_slots = 0;

  Arc::new(Registry::new(config, Numbers, 0))
}

#[test]
fn concurrent_resolve_same_slot() {
  loom::model(|| {
    let registry: Arc<Registry<Numbers>> = registry();

    let threads: Vec<_> = (0..2)
      .map(|_| {
        let registry: Arc<Registry<Numbers>> = Arc::clone(&registry);

        thread::spawn(move || {
          let handle: Handle<'_, Numbers> = registry.resolve(KEY, None);
          assert_eq!(handle.status(), Status::Missing);
          assert!(handle.refcount() >= 1, "Handle without a reference!");
        })
      })
      .collect();

    for handle in threads {
      handle.join().unwrap();
    }

    assert_eq!(registry.len(), 1, "Key linked more than once!");
  });
}

#[test]
fn resolve_during_reclaim() {
  loom::model(|| {
    let registry: Arc<Registry<Numbers>> = registry();

    drop(registry.resolve(KEY, None));

    let t1 = {
      let registry: Arc<Registry<Numbers>> = Arc::clone(&registry);

      thread::spawn(move || {
        let handle: Handle<'_, Numbers> = registry.resolve(KEY, None);
        assert_eq!(handle.status(), Status::Missing, "Resolved a reclaimed slot!");
        assert_eq!(handle.refcount(), 1);
      })
    };

    let t2 = {
      let registry: Arc<Registry<Numbers>> = Arc::clone(&registry);

      thread::spawn(move || {
        registry.flush(1);
      })
    };

    t1.join().unwrap();
    t2.join().unwrap();

    registry.flush(1);

    assert_eq!(registry.len(), 0, "Unreferenced slot survived a flush!");
  });
}

#[test]
fn insert_races_with_resolve() {
  loom::model(|| {
    let registry: Arc<Registry<Numbers>> = registry();

    let t1 = {
      let registry: Arc<Registry<Numbers>> = Arc::clone(&registry);

      thread::spawn(move || {
        drop(registry.insert("a", None, 7, false));
      })
    };

    let t2 = {
      let registry: Arc<Registry<Numbers>> = Arc::clone(&registry);

      thread::spawn(move || {
        drop(registry.resolve(KEY, None));
      })
    };

    t1.join().unwrap();
    t2.join().unwrap();

    // Whichever thread linked the slot, the insert must have claimed it.
    assert_eq!(registry.status(KEY), Some(Status::Loading));

    let handle: Handle<'_, Numbers> = registry.resolve(KEY, None);
    let mut token: Maintenance<'_, Numbers> = registry.maintenance();

    assert_eq!(token.flush(4), 1);
    assert_eq!(handle.status(), Status::Ready);
    assert_eq!(*handle.get(&token), 7);
  });
}

#[test]
fn compaction_excludes_resolvers() {
  loom::model(|| {
    let mut config: RegistryConfig = RegistryConfig::with_capacity(3);
    config.indexed_slots = 0;

    let registry: Arc<Registry<Numbers>> = Arc::new(Registry::new(config, Numbers, 0));

    drop(registry.resolve(Key::from_static("b"), None));
    drop(registry.resolve(Key::from_static("c"), None));

    let t1 = {
      let registry: Arc<Registry<Numbers>> = Arc::clone(&registry);

      thread::spawn(move || {
        let handle: Handle<'_, Numbers> = registry.resolve(KEY, None);
        assert_eq!(handle.status(), Status::Missing);
        assert_eq!(handle.refcount(), 1);
      })
    };

    let t2 = {
      let registry: Arc<Registry<Numbers>> = Arc::clone(&registry);

      thread::spawn(move || {
        registry.flush(1);
      })
    };

    t1.join().unwrap();
    t2.join().unwrap();

    assert_eq!(registry.status(Key::from_static("b")), None, "Reclaimed key still linked!");
    assert_eq!(registry.status(Key::from_static("c")), None, "Reclaimed key still linked!");

    let handle: Handle<'_, Numbers> = registry.resolve(KEY, None);
    assert_eq!(handle.refcount(), 1, "Resolver lost its slot to compaction!");
  });
}
