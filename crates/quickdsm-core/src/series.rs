use std::future::Future;

/// Failure of [`first_success`].
#[derive(Debug, thiserror::Error)]
pub enum SeriesError<E> {
    /// There was nothing to try and no default to fall back to.
    #[error("no inputs to try")]
    Empty,
    /// Every input was tried and failed; errors are in attempt order.
    #[error("all {} attempts failed", .0.len())]
    Exhausted(Vec<E>),
}

impl<E> SeriesError<E> {
    pub fn errors(&self) -> &[E] {
        match self {
            SeriesError::Empty => &[],
            SeriesError::Exhausted(errors) => errors,
        }
    }
}

/// Try each input in order until one attempt succeeds.
///
/// Attempts never overlap: the next one starts only after the previous one
/// failed. An empty input resolves to `default` if one is given, otherwise to
/// [`SeriesError::Empty`] without calling `attempt` at all.
pub async fn first_success<I, T, E, F, Fut>(
    inputs: impl IntoIterator<Item = I>,
    default: Option<T>,
    mut attempt: F,
) -> Result<T, SeriesError<E>>
where
    F: FnMut(I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut errors = Vec::new();
    for input in inputs {
        match attempt(input).await {
            Ok(value) => return Ok(value),
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        return default.ok_or(SeriesError::Empty);
    }
    Err(SeriesError::Exhausted(errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test]
    async fn returns_first_success_and_stops() {
        let tried = RefCell::new(Vec::new());
        let result = first_success(vec![1, 2, 3, 4], None, |n| {
            tried.borrow_mut().push(n);
            async move { if n >= 2 { Ok(n * 10) } else { Err(format!("no {}", n)) } }
        })
        .await;

        assert_eq!(result.unwrap(), 20);
        assert_eq!(*tried.borrow(), vec![1, 2]);
    }

    #[tokio::test]
    async fn exhausted_collects_errors_in_order() {
        let result: Result<(), _> =
            first_success(["a", "b"], None, |s| async move { Err(s.to_string()) }).await;

        match result {
            Err(SeriesError::Exhausted(errors)) => assert_eq!(errors, vec!["a", "b"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_without_default_is_rejected() {
        let mut calls = 0;
        let result: Result<u8, SeriesError<()>> =
            first_success(Vec::<u8>::new(), None, |n| {
                calls += 1;
                async move { Ok(n) }
            })
            .await;

        assert!(matches!(result, Err(SeriesError::Empty)));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn empty_with_default_resolves_to_default() {
        let result: Result<u8, SeriesError<()>> =
            first_success(Vec::<u8>::new(), Some(7), |n| async move { Ok(n) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn default_is_not_used_after_failures() {
        let result: Result<u8, SeriesError<&str>> =
            first_success([1u8], Some(7), |_| async { Err("down") }).await;
        assert_eq!(result.unwrap_err().errors(), &["down"]);
    }
}
