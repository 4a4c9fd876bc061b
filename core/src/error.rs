use thiserror::Error;

/// Failures surfaced by a [`GlucoseStore`](crate::store::GlucoseStore).
///
/// None of these are recovered locally. Callers report them and leave the
/// user's input intact.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened or the schema could not be created.
    #[error("storage unavailable")]
    Unavailable(#[source] rusqlite::Error),
    /// A write was rejected (constraint violation, lost connection, ...).
    #[error("failed to save readings")]
    Write(#[source] rusqlite::Error),
    /// Reading the history back failed.
    #[error("failed to load readings")]
    Read(#[source] rusqlite::Error),
}
