use criterion::BenchmarkGroup;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use resreg::Handle;
use resreg::Key;
use resreg::Registry;
use resreg::RegistryConfig;
use resreg::registry::Factory;
use std::hint::black_box;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

const THREADS: &[usize] = &[2, 4, 6, 8, 10];
const KEYS: usize = 256;

struct Blobs;

impl Factory for Blobs {
  type Resource = Vec<u8>;
  type Payload = usize;

  fn create(&self, _identifier: &str, size: usize) -> Option<Vec<u8>> {
    Some(vec![0; size])
  }
}

fn registry() -> Arc<Registry<Blobs>> {
  Arc::new(Registry::new(RegistryConfig::with_capacity(KEYS * 2), Blobs, Vec::new()))
}

fn keys() -> Vec<Key> {
  (0..KEYS)
    .map(|index| Key::from_identifier(&format!("blobs/{index}")))
    .collect()
}

fn bench_resolve(criterion: &mut Criterion) {
  let mut group: BenchmarkGroup<_> = criterion.benchmark_group("resolve");
  let registry: Arc<Registry<Blobs>> = registry();
  let keys: Arc<Vec<Key>> = Arc::new(keys());

  // Keep every slot linked so the benchmark measures the lookup path.
  let pinned: Vec<Handle<'_, Blobs>> = keys.iter().map(|key| registry.resolve(*key, None)).collect();

  group.bench_function("single-threaded", |bench| {
    let mut index: usize = 0;

    bench.iter(|| {
      index = (index + 1) % KEYS;
      black_box(registry.resolve(keys[index], None));
    })
  });

  for threads in THREADS {
    let id: BenchmarkId = BenchmarkId::new("multi-threaded", threads);

    group.bench_with_input(id, threads, |bench, &threads| {
      bench.iter_custom(|iters| {
        let barrier: Arc<Barrier> = Arc::new(Barrier::new(threads + 1));
        let mut handles: Vec<JoinHandle<Duration>> = Vec::with_capacity(threads);

        for offset in 0..threads {
          let barrier: Arc<Barrier> = barrier.clone();
          let registry: Arc<Registry<Blobs>> = registry.clone();
          let keys: Arc<Vec<Key>> = keys.clone();

          let handle: JoinHandle<Duration> = thread::spawn(move || {
            barrier.wait();

            let start: Instant = Instant::now();

            for iter in 0..iters as usize {
              black_box(registry.resolve(keys[(iter + offset) % KEYS], None));
            }

            start.elapsed()
          });

          handles.push(handle);
        }

        barrier.wait();

        handles
          .into_iter()
          .map(|handle| handle.join().unwrap())
          .sum()
      })
    });
  }

  drop(pinned);
  group.finish();
}

fn bench_handle_clone(criterion: &mut Criterion) {
  let mut group: BenchmarkGroup<_> = criterion.benchmark_group("handle_clone");
  let registry: Arc<Registry<Blobs>> = registry();
  let key: Key = Key::from_static("blobs/shared");

  group.bench_function("single-threaded", |bench| {
    let handle: Handle<'_, Blobs> = registry.resolve(key, None);

    bench.iter(|| {
      black_box(handle.clone());
    })
  });

  for threads in THREADS {
    let id: BenchmarkId = BenchmarkId::new("multi-threaded", threads);

    group.bench_with_input(id, threads, |bench, &threads| {
      bench.iter_custom(|iters| {
        let barrier: Arc<Barrier> = Arc::new(Barrier::new(threads + 1));
        let mut handles: Vec<JoinHandle<Duration>> = Vec::with_capacity(threads);

        for _ in 0..threads {
          let barrier: Arc<Barrier> = barrier.clone();
          let registry: Arc<Registry<Blobs>> = registry.clone();

          let handle: JoinHandle<Duration> = thread::spawn(move || {
            let handle: Handle<'_, Blobs> = registry.resolve(key, None);

            barrier.wait();

            let start: Instant = Instant::now();

            for _ in 0..iters {
              black_box(handle.clone());
            }

            start.elapsed()
          });

          handles.push(handle);
        }

        barrier.wait();

        handles
          .into_iter()
          .map(|handle| handle.join().unwrap())
          .sum()
      })
    });
  }

  group.finish();
}

fn bench_flush(criterion: &mut Criterion) {
  let mut group: BenchmarkGroup<_> = criterion.benchmark_group("flush");
  let registry: Arc<Registry<Blobs>> = registry();
  let names: Vec<String> = (0..KEYS).map(|index| format!("blobs/{index}")).collect();

  group.bench_function("insert-create-reclaim", |bench| {
    bench.iter(|| {
      for name in &names {
        drop(registry.insert(name, None, 64, false));
      }

      black_box(registry.flush(KEYS));
    })
  });

  group.finish();
}

criterion_group! {
  name = benches;
  config = Criterion::default();
  targets = bench_resolve, bench_handle_clone, bench_flush
}

criterion_main!(benches);
