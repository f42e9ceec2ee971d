//! Best-effort execution of compensating actions.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use domain::EntityRef;
use futures_util::FutureExt;
use repository::{Repository, RepositoryExt};

/// Runs a compensating action, logging instead of propagating any failure.
///
/// A compensation that fails, or panics, leaves the resource for operator
/// repair; the original flow failure is what the caller sees.
pub async fn best_effort<F, E>(task: &str, action: F)
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match AssertUnwindSafe(action).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            metrics::counter!("task_compensation_failures_total", "task" => task.to_string())
                .increment(1);
            tracing::error!(task, %error, "compensation failed");
        }
        Err(_) => {
            metrics::counter!("task_compensation_failures_total", "task" => task.to_string())
                .increment(1);
            tracing::error!(task, "compensation panicked");
        }
    }
}

/// Marks one resource ERROR, best-effort.
pub async fn mark_error<R>(repo: &R, entity: EntityRef, task: &str)
where
    R: Repository + ?Sized,
{
    tracing::warn!(task, %entity, "marking resource ERROR");
    best_effort(task, repo.mark_error(entity)).await;
}
