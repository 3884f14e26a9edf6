use std::convert::identity;
use tokio::task::JoinError;

/// Runs the blocking closure `f` on the tokio blocking thread pool, inside
/// the current `tracing` span.
pub async fn spawn_blocking<F, R, E>(f: F) -> Result<R, E>
where
    F: FnOnce() -> Result<R, E> + Send + 'static,
    R: Send + 'static,
    E: Send + From<JoinError> + 'static,
{
    let current_span = tracing::Span::current();
    tokio::task::spawn_blocking(move || current_span.in_scope(f))
        .await
        // Convert `JoinError` to `E`
        .map_err(Into::into)
        // Flatten `Result<Result<_, E>, E>` to `Result<_, E>`
        .and_then(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_ok_eq};

    #[tokio::test]
    async fn returns_closure_result() {
        let result = spawn_blocking(|| Ok::<_, anyhow::Error>(42)).await;
        assert_ok_eq!(result, 42);
    }

    #[tokio::test]
    async fn converts_panics_into_errors() {
        let result = spawn_blocking::<_, (), anyhow::Error>(|| panic!("boom")).await;
        assert_err!(result);
    }
}
