//! Benchmarks for the resreg registry; see `benches/`.
