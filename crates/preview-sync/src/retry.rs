use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Done(T),
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    Exhausted { attempts: u32 },
    Fatal(E),
}

pub fn retry_on_conflict<T, E, F>(max_attempts: u32, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Result<Attempt<T>, E>,
{
    for attempt in 1..=max_attempts {
        match op(attempt).map_err(RetryError::Fatal)? {
            Attempt::Done(value) => return Ok(value),
            Attempt::Conflict => {
                warn!(attempt, max_attempts, "write conflict");
            }
        }
    }

    Err(RetryError::Exhausted {
        attempts: max_attempts,
    })
}
