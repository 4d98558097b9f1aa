/// Data layer: core types, loading, table operations and persistence.
///
/// Architecture:
/// ```text
///   features + targets + ids (per split)       .parquet / .json / .csv
///        │                                            │
///        ▼                                            ▼
///   ┌──────────┐                                ┌──────────┐
///   │  table    │  annotate, attach siteID,     │  loader   │  site attributes
///   └──────────┘  concatenate                   └──────────┘
///        │                                            │
///        └──────────────► table::inner_join ◄─────────┘
///                               │
///                               ▼
///                         ┌──────────┐
///                         │  writer   │  merged table → .parquet
///                         └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod table;
pub mod writer;
