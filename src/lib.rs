//! schooltable - student management on a single DynamoDB table
//!
//! Every entity (users, subjects, classes, enrollments, posts, comments,
//! reactions, assignments, submissions, notifications, audit logs) lives in
//! one table keyed by `(PK, SK)` with a single overloaded secondary index
//! `GSI1` serving the "list by type/owner" read patterns.
//!
//! Layering:
//! - [`keys`] owns every key format; nothing else concatenates prefixes.
//! - [`storage`] is the generic item store (DynamoDB or in-memory).
//! - [`repository`] holds the per-entity repositories and workflows.
//! - [`collab`] defines the external collaborator contracts (identity
//!   provider, object storage, mailer, event bus).
//!
//! The store offers no cross-item transactions; multi-step workflows are
//! sequences of independent writes and a crash mid-sequence leaves partial
//! state. The only optimistic-concurrency guard is the conditional update
//! on the class enrollment counter.

pub mod collab;
pub mod config;
pub mod domain;
pub mod error;
pub mod keys;
pub mod repository;
pub mod schema;
pub mod search;
pub mod storage;

pub use error::{DomainError, Result};
