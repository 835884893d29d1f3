//! Data layer: core types, loading, validation, and cached access.
//!
//! Architecture:
//! ```text
//!  .csv / .tsv            document store
//!        │                      │
//!        ▼                      ▼
//!   ┌──────────┐         ┌──────────────┐
//!   │  loader   │         │    store      │  records ⇄ Dataset
//!   └──────────┘         └──────────────┘
//!        │                      │
//!        └─────────┬────────────┘
//!                  ▼
//!          ┌──────────────┐
//!          │  repository   │  cache by source id, viz projection
//!          └──────────────┘
//!                  │
//!                  ▼
//!          ┌──────────────┐
//!          │  validator    │  schema checks, type coercion
//!          └──────────────┘
//! ```

pub mod loader;
pub mod model;
pub mod repository;
pub mod store;
pub mod validator;
